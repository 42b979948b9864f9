//! Per-application origin inventory.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arc_swap::ArcSwap;

use crate::client::HostHttpClient;
use crate::health::{HealthStatusListener, NoHealthMonitor, OriginHealthMonitor};
use crate::inventory::bus::{OriginsBus, OriginsCommand, OriginsCommandListener};
use crate::inventory::listeners::{Announcer, OriginsChangeListener};
use crate::inventory::snapshot::{Changes, OriginsSnapshot};
use crate::inventory::state::{transition, OriginEvent, OriginState};
use crate::load_balancer::{ActiveOrigins, RemoteHost};
use crate::net::HttpConnectionFactory;
use crate::observability::metrics;
use crate::origin::{AppId, Origin, OriginId};
use crate::pool::{
    ConnectionPool, ConnectionPoolFactory, ConnectionPoolSettings, PoolStats, SimpleConnectionPoolFactory,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// An origin together with its pool, client handle and state.
pub struct MonitoredOrigin {
    origin: Origin,
    pool: Arc<dyn ConnectionPool>,
    host: RemoteHost,
    state: AtomicU8,
    closed: AtomicBool,
    /// Serializes events for this origin.
    events: Mutex<()>,
}

impl MonitoredOrigin {
    fn new(origin: Origin, pool_factory: &dyn ConnectionPoolFactory) -> Self {
        let pool = pool_factory.create_pool(&origin);
        let client = HostHttpClient::new(Arc::clone(&pool));
        let host = RemoteHost::new(origin.clone(), Arc::new(client));
        metrics::record_origin_status(&origin, OriginState::Active);
        Self {
            origin,
            pool,
            host,
            state: AtomicU8::new(OriginState::Active as u8),
            closed: AtomicBool::new(false),
            events: Mutex::new(()),
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn host(&self) -> &RemoteHost {
        &self.host
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    pub fn state(&self) -> OriginState {
        OriginState::from(self.state.load(Ordering::Acquire))
    }

    /// Apply `event`. Returns the transition taken, if any.
    fn handle(&self, event: OriginEvent, monitor: &dyn OriginHealthMonitor) -> Option<(OriginState, OriginState)> {
        let _serial = lock(&self.events);
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let old = self.state();
        let new = transition(old, event)?;
        self.state.store(new as u8, Ordering::Release);

        tracing::info!(origin = %self.origin, from = %old, to = %new, ?event, "Origin state change");

        if new == OriginState::Disabled {
            monitor.stop_monitoring(std::slice::from_ref(&self.origin));
        } else if old == OriginState::Disabled {
            monitor.monitor(std::slice::from_ref(&self.origin));
        }
        metrics::record_origin_status(&self.origin, new);

        Some((old, new))
    }

    fn close(&self, monitor: &dyn OriginHealthMonitor) {
        if self.shut_down(monitor) {
            metrics::remove_origin_status(&self.origin);
        }
    }

    /// Close a member whose id lives on in a replacement. The status gauge
    /// belongs to the replacement from now on.
    fn retire(&self, monitor: &dyn OriginHealthMonitor) {
        self.shut_down(monitor);
    }

    fn shut_down(&self, monitor: &dyn OriginHealthMonitor) -> bool {
        let _serial = lock(&self.events);
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.state().is_monitored() {
            monitor.stop_monitoring(std::slice::from_ref(&self.origin));
        }
        self.pool.close();
        tracing::debug!(origin = %self.origin, "Origin closed");
        true
    }
}

pub struct OriginsInventoryBuilder {
    app_id: AppId,
    monitor: Arc<dyn OriginHealthMonitor>,
    pool_factory: Option<Arc<dyn ConnectionPoolFactory>>,
    bus: Option<Arc<OriginsBus>>,
    origins: Vec<Origin>,
}

impl OriginsInventoryBuilder {
    pub fn health_monitor(mut self, monitor: Arc<dyn OriginHealthMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn pool_factory(mut self, factory: Arc<dyn ConnectionPoolFactory>) -> Self {
        self.pool_factory = Some(factory);
        self
    }

    pub fn bus(mut self, bus: Arc<OriginsBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn initial_origins(mut self, origins: impl IntoIterator<Item = Origin>) -> Self {
        self.origins.extend(origins);
        self
    }

    pub fn build(self) -> Arc<OriginsInventory> {
        let pool_factory = self.pool_factory.unwrap_or_else(|| {
            Arc::new(SimpleConnectionPoolFactory::new(
                ConnectionPoolSettings::default(),
                Arc::new(HttpConnectionFactory::new()),
            )) as Arc<dyn ConnectionPoolFactory>
        });
        let bus = self.bus.unwrap_or_default();
        let app_id = self.app_id;
        let monitor = self.monitor;

        let inventory = Arc::new_cyclic(|weak: &Weak<OriginsInventory>| {
            let empty = Arc::new(OriginsSnapshot::empty(app_id.clone()));
            OriginsInventory {
                app_id: app_id.clone(),
                members: ArcSwap::from_pointee(Vec::new()),
                membership: Mutex::new(()),
                published: Mutex::new(Arc::clone(&empty)),
                current: ArcSwap::new(empty),
                announcer: Announcer::new(),
                pending: Mutex::new(VecDeque::new()),
                delivering: AtomicBool::new(false),
                bus: Arc::clone(&bus),
                monitor: Arc::clone(&monitor),
                pool_factory,
                closed: AtomicBool::new(false),
                weak_self: weak.clone(),
            }
        });

        let as_health: Weak<dyn HealthStatusListener> = inventory.weak_self.clone();
        monitor.add_listener(as_health);
        let as_command: Weak<dyn OriginsCommandListener> = inventory.weak_self.clone();
        bus.register(app_id, as_command);

        if !self.origins.is_empty() {
            inventory.add_origins(&self.origins);
        }
        inventory
    }
}

/// The origins of one backend application and their states.
///
/// Membership is an atomically swapped list; readers never wait for
/// writers. Every change republishes a snapshot, serialized per inventory.
pub struct OriginsInventory {
    app_id: AppId,
    members: ArcSwap<Vec<Arc<MonitoredOrigin>>>,
    /// Serializes membership updates.
    membership: Mutex<()>,
    /// Last published snapshot; held while publishing.
    published: Mutex<Arc<OriginsSnapshot>>,
    current: ArcSwap<OriginsSnapshot>,
    announcer: Announcer,
    /// Changes queued for listeners, in publish order.
    pending: Mutex<VecDeque<(Arc<OriginsSnapshot>, Changes)>>,
    delivering: AtomicBool,
    bus: Arc<OriginsBus>,
    monitor: Arc<dyn OriginHealthMonitor>,
    pool_factory: Arc<dyn ConnectionPoolFactory>,
    closed: AtomicBool,
    weak_self: Weak<OriginsInventory>,
}

impl OriginsInventory {
    pub fn builder(app_id: impl Into<AppId>) -> OriginsInventoryBuilder {
        OriginsInventoryBuilder {
            app_id: app_id.into(),
            monitor: Arc::new(NoHealthMonitor),
            pool_factory: None,
            bus: None,
            origins: Vec::new(),
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn bus(&self) -> &Arc<OriginsBus> {
        &self.bus
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn add_listener(&self, listener: Arc<dyn OriginsChangeListener>) {
        self.announcer.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn OriginsChangeListener>) {
        self.announcer.remove(listener);
    }

    /// Register origins not yet present. Each starts ACTIVE and monitored.
    pub fn add_origins(&self, origins: &[Origin]) {
        if self.is_closed() {
            tracing::warn!(app = %self.app_id, "Ignoring origins added to a closed inventory");
            return;
        }
        {
            let _membership = lock(&self.membership);
            let current = self.members.load_full();
            let mut members: Vec<_> = current.iter().cloned().collect();
            let mut added = Vec::new();

            for origin in origins {
                if members.iter().any(|m| m.origin.id() == origin.id()) {
                    tracing::warn!(origin = %origin, "Origin id already present, not adding");
                    continue;
                }
                members.push(Arc::new(MonitoredOrigin::new(origin.clone(), self.pool_factory.as_ref())));
                added.push(origin.clone());
            }

            if !added.is_empty() {
                tracing::info!(app = %self.app_id, count = added.len(), "Origins added");
                self.members.store(Arc::new(members));
                self.monitor.monitor(&added);
            }
        }
        self.publish();
    }

    /// Replace the membership with `origins`.
    ///
    /// New ids are added ACTIVE, changed definitions are replaced by a fresh
    /// ACTIVE origin, unchanged origins keep their state and pool, missing
    /// ids are closed. Publishes only when something changed.
    pub fn set_origins(&self, origins: &[Origin]) {
        if self.is_closed() {
            tracing::warn!(app = %self.app_id, "Ignoring origin update for a closed inventory");
            return;
        }
        {
            let _membership = lock(&self.membership);
            let current = self.members.load_full();

            let mut seen = HashSet::new();
            let mut members = Vec::with_capacity(origins.len());
            let mut to_monitor = Vec::new();
            let mut to_close = Vec::new();
            let mut replaced = Vec::new();

            for origin in origins {
                if !seen.insert(origin.id().clone()) {
                    tracing::warn!(origin = %origin, "Duplicate origin id in update, keeping the first");
                    continue;
                }
                match current.iter().find(|m| m.origin.id() == origin.id()) {
                    Some(existing) if existing.origin == *origin => members.push(Arc::clone(existing)),
                    Some(existing) => {
                        tracing::info!(from = %existing.origin, to = %origin, "Origin definition changed");
                        replaced.push(Arc::clone(existing));
                        members.push(Arc::new(MonitoredOrigin::new(origin.clone(), self.pool_factory.as_ref())));
                        to_monitor.push(origin.clone());
                    }
                    None => {
                        tracing::info!(origin = %origin, "Origin added");
                        members.push(Arc::new(MonitoredOrigin::new(origin.clone(), self.pool_factory.as_ref())));
                        to_monitor.push(origin.clone());
                    }
                }
            }
            for member in current.iter() {
                if !seen.contains(member.origin.id()) {
                    tracing::info!(origin = %member.origin, "Origin removed");
                    to_close.push(Arc::clone(member));
                }
            }

            if to_monitor.is_empty() && to_close.is_empty() {
                return;
            }

            self.members.store(Arc::new(members));
            for member in &replaced {
                member.retire(self.monitor.as_ref());
            }
            for member in &to_close {
                member.close(self.monitor.as_ref());
            }
            self.monitor.monitor(&to_monitor);
        }
        self.publish();
    }

    /// Close every origin and detach from the bus. Only the first call acts.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let _membership = lock(&self.membership);
            let members = self.members.swap(Arc::new(Vec::new()));
            for member in members.iter() {
                member.close(self.monitor.as_ref());
            }
        }
        self.publish();
        self.bus.unregister(&self.app_id);
        tracing::info!(app = %self.app_id, "Origins inventory closed");
    }

    pub fn origins(&self) -> Vec<Origin> {
        self.members.load().iter().map(|m| m.origin.clone()).collect()
    }

    pub fn origin_count(&self, state: OriginState) -> usize {
        self.members.load().iter().filter(|m| m.state() == state).count()
    }

    pub fn state_of(&self, id: &OriginId) -> Option<OriginState> {
        self.find_by_id(id).map(|m| m.state())
    }

    pub fn pool_stats(&self) -> Vec<(OriginId, PoolStats)> {
        self.members
            .load()
            .iter()
            .map(|m| (m.origin.id().clone(), m.pool.stats()))
            .collect()
    }

    /// The most recently published snapshot.
    pub fn current_snapshot(&self) -> Arc<OriginsSnapshot> {
        self.current.load_full()
    }

    /// Apply an administrative or health event to the origin with `id`.
    /// Returns false when no such origin exists.
    pub fn apply(&self, id: &OriginId, event: OriginEvent) -> bool {
        let Some(member) = self.find_by_id(id) else {
            tracing::debug!(app = %self.app_id, origin = %id, ?event, "Event for unknown origin");
            return false;
        };
        if member.handle(event, self.monitor.as_ref()).is_some() {
            self.publish();
        }
        true
    }

    fn find_by_id(&self, id: &OriginId) -> Option<Arc<MonitoredOrigin>> {
        self.members.load().iter().find(|m| m.origin.id() == id).cloned()
    }

    fn on_health(&self, origin: &Origin, event: OriginEvent) {
        if !self.monitor.is_enabled() || origin.app_id() != &self.app_id {
            return;
        }
        // Signals for a replaced definition are stale.
        let member = self.members.load().iter().find(|m| m.origin == *origin).cloned();
        if let Some(member) = member {
            if member.handle(event, self.monitor.as_ref()).is_some() {
                self.publish();
            }
        }
    }

    fn build_snapshot(&self) -> OriginsSnapshot {
        let mut active = Vec::new();
        let mut inactive = Vec::new();
        let mut disabled = Vec::new();
        for member in self.members.load().iter() {
            let bucket = match member.state() {
                OriginState::Active => &mut active,
                OriginState::Inactive => &mut inactive,
                OriginState::Disabled => &mut disabled,
            };
            bucket.push(member.host.clone());
        }
        OriginsSnapshot::new(self.app_id.clone(), active, inactive, disabled)
    }

    /// Publish the current state. Listeners hear about non-empty changes;
    /// the bus receives every snapshot.
    fn publish(&self) {
        {
            let mut published = lock(&self.published);
            let snapshot = Arc::new(self.build_snapshot());
            let changes = Changes::between(&published, &snapshot);

            self.current.store(Arc::clone(&snapshot));
            if !changes.is_empty() {
                tracing::debug!(app = %self.app_id, ?changes, "Origins changed");
                lock(&self.pending).push_back((Arc::clone(&snapshot), changes));
            }
            self.bus.publish(Arc::clone(&snapshot));
            *published = snapshot;
        }
        self.deliver();
    }

    /// Announce queued changes outside every inventory lock, so listeners
    /// may call back into the inventory. One caller delivers at a time;
    /// changes queued meanwhile are picked up by that caller.
    fn deliver(&self) {
        loop {
            if self.delivering.swap(true, Ordering::AcqRel) {
                return;
            }
            loop {
                let next = lock(&self.pending).pop_front();
                let Some((snapshot, changes)) = next else { break };
                if let Err(e) = self.announcer.announce(&snapshot, &changes) {
                    tracing::warn!(app = %self.app_id, error = %e, "Origins change listener failed");
                }
            }
            self.delivering.store(false, Ordering::Release);
            if lock(&self.pending).is_empty() {
                return;
            }
        }
    }
}

impl ActiveOrigins for OriginsInventory {
    fn snapshot(&self) -> Vec<RemoteHost> {
        self.current.load().active().to_vec()
    }
}

impl HealthStatusListener for OriginsInventory {
    fn origin_healthy(&self, origin: &Origin) {
        self.on_health(origin, OriginEvent::Healthy);
    }

    fn origin_unhealthy(&self, origin: &Origin) {
        self.on_health(origin, OriginEvent::Unhealthy);
    }
}

impl OriginsCommandListener for OriginsInventory {
    fn on_command(&self, command: &OriginsCommand) {
        if command.app_id() != &self.app_id {
            return;
        }
        match command {
            OriginsCommand::EnableOrigin { origin_id, .. } => {
                self.apply(origin_id, OriginEvent::Enable);
            }
            OriginsCommand::DisableOrigin { origin_id, .. } => {
                self.apply(origin_id, OriginEvent::Disable);
            }
            OriginsCommand::GetSnapshot { .. } => self.publish(),
        }
    }
}

impl Drop for OriginsInventory {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            for member in self.members.load().iter() {
                member.close(self.monitor.as_ref());
            }
        }
    }
}

impl std::fmt::Debug for OriginsInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginsInventory")
            .field("app_id", &self.app_id)
            .field("origins", &self.members.load().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
