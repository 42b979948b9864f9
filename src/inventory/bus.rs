//! Command and snapshot bus shared by every application's inventory.
//!
//! Commands are routed to the inventory registered for their application.
//! Snapshots are broadcast to every subscriber; each inventory publishes
//! its snapshots in order.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::inventory::snapshot::OriginsSnapshot;
use crate::origin::{AppId, OriginId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginsCommand {
    EnableOrigin { app_id: AppId, origin_id: OriginId },
    DisableOrigin { app_id: AppId, origin_id: OriginId },
    GetSnapshot { app_id: AppId },
}

impl OriginsCommand {
    pub fn app_id(&self) -> &AppId {
        match self {
            OriginsCommand::EnableOrigin { app_id, .. }
            | OriginsCommand::DisableOrigin { app_id, .. }
            | OriginsCommand::GetSnapshot { app_id } => app_id,
        }
    }
}

pub trait OriginsCommandListener: Send + Sync {
    fn on_command(&self, command: &OriginsCommand);
}

pub struct OriginsBus {
    listeners: DashMap<AppId, Weak<dyn OriginsCommandListener>>,
    snapshots: broadcast::Sender<Arc<OriginsSnapshot>>,
}

impl OriginsBus {
    pub fn new() -> Self {
        let (snapshots, _) = broadcast::channel(256);
        Self {
            listeners: DashMap::new(),
            snapshots,
        }
    }

    pub fn register(&self, app_id: AppId, listener: Weak<dyn OriginsCommandListener>) {
        self.listeners.insert(app_id, listener);
    }

    pub fn unregister(&self, app_id: &AppId) {
        self.listeners.remove(app_id);
    }

    pub fn is_registered(&self, app_id: &AppId) -> bool {
        self.listeners.get(app_id).is_some_and(|l| l.strong_count() > 0)
    }

    /// Deliver a command to its application's inventory. Returns false when
    /// no live inventory is registered for it.
    pub fn send(&self, command: OriginsCommand) -> bool {
        let listener = self.listeners.get(command.app_id()).and_then(|entry| entry.value().upgrade());
        match listener {
            Some(listener) => {
                listener.on_command(&command);
                true
            }
            None => {
                tracing::debug!(app = %command.app_id(), "No inventory registered for command");
                false
            }
        }
    }

    pub fn publish(&self, snapshot: Arc<OriginsSnapshot>) {
        // No subscribers is fine.
        let _ = self.snapshots.send(snapshot);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OriginsSnapshot>> {
        self.snapshots.subscribe()
    }
}

impl Default for OriginsBus {
    fn default() -> Self {
        Self::new()
    }
}
