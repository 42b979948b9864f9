//! Point-in-time views of an inventory and the differences between them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::inventory::state::OriginState;
use crate::load_balancer::RemoteHost;
use crate::origin::{AppId, Origin, OriginId};

/// Membership and state of every origin of one application.
#[derive(Debug, Clone)]
pub struct OriginsSnapshot {
    app_id: AppId,
    active: Vec<RemoteHost>,
    inactive: Vec<RemoteHost>,
    disabled: Vec<RemoteHost>,
}

impl OriginsSnapshot {
    pub fn new(app_id: AppId, active: Vec<RemoteHost>, inactive: Vec<RemoteHost>, disabled: Vec<RemoteHost>) -> Self {
        Self {
            app_id,
            active,
            inactive,
            disabled,
        }
    }

    pub fn empty(app_id: AppId) -> Self {
        Self::new(app_id, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn active(&self) -> &[RemoteHost] {
        &self.active
    }

    pub fn inactive(&self) -> &[RemoteHost] {
        &self.inactive
    }

    pub fn disabled(&self) -> &[RemoteHost] {
        &self.disabled
    }

    pub fn state_of(&self, id: &OriginId) -> Option<OriginState> {
        self.states().get(id).map(|(_, state)| *state)
    }

    fn states(&self) -> BTreeMap<&OriginId, (&Origin, OriginState)> {
        let groups = [
            (&self.active, OriginState::Active),
            (&self.inactive, OriginState::Inactive),
            (&self.disabled, OriginState::Disabled),
        ];
        groups
            .into_iter()
            .flat_map(|(hosts, state)| hosts.iter().map(move |h| (h.id(), (h.origin(), state))))
            .collect()
    }

    /// Serializable form for the admin API and logs.
    pub fn summary(&self) -> SnapshotSummary {
        let ids = |hosts: &[RemoteHost]| hosts.iter().map(|h| h.id().to_string()).collect();
        SnapshotSummary {
            app_id: self.app_id.to_string(),
            active: ids(&self.active),
            inactive: ids(&self.inactive),
            disabled: ids(&self.disabled),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub app_id: String,
    pub active: Vec<String>,
    pub inactive: Vec<String>,
    pub disabled: Vec<String>,
}

/// What changed between two snapshots, keyed by origin id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Changes {
    pub added: BTreeSet<OriginId>,
    pub removed: BTreeSet<OriginId>,
    /// Present in both, with a different state or definition.
    pub updated: BTreeSet<OriginId>,
}

impl Changes {
    pub fn between(previous: &OriginsSnapshot, current: &OriginsSnapshot) -> Self {
        let before = previous.states();
        let after = current.states();

        let mut changes = Changes::default();
        for (id, (origin, state)) in &after {
            match before.get(id) {
                None => {
                    changes.added.insert((*id).clone());
                }
                Some((old_origin, old_state)) if old_origin != origin || old_state != state => {
                    changes.updated.insert((*id).clone());
                }
                Some(_) => {}
            }
        }
        for id in before.keys() {
            if !after.contains_key(id) {
                changes.removed.insert((*id).clone());
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::host;

    fn snapshot(active: &[&str], inactive: &[&str], disabled: &[&str]) -> OriginsSnapshot {
        let hosts = |ids: &[&str]| ids.iter().map(|id| host(id)).collect();
        OriginsSnapshot::new("shop".into(), hosts(active), hosts(inactive), hosts(disabled))
    }

    fn set(ids: &[&str]) -> BTreeSet<OriginId> {
        ids.iter().map(|id| OriginId::new(id)).collect()
    }

    #[test]
    fn detects_state_change_as_update() {
        let before = snapshot(&["a", "b"], &[], &[]);
        let after = snapshot(&["b"], &["a"], &[]);

        let changes = Changes::between(&before, &after);

        assert_eq!(changes.updated, set(&["a"]));
        assert!(changes.added.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn detects_membership_changes() {
        let before = snapshot(&["a", "b"], &[], &[]);
        let after = snapshot(&["b", "c"], &[], &[]);

        let changes = Changes::between(&before, &after);

        assert_eq!(changes.added, set(&["c"]));
        assert_eq!(changes.removed, set(&["a"]));
        assert!(changes.updated.is_empty());
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let a = snapshot(&["a"], &["b"], &["c"]);
        let b = snapshot(&["a"], &["b"], &["c"]);
        assert!(Changes::between(&a, &b).is_empty());
    }

    #[test]
    fn summary_lists_ids_per_state() {
        let summary = snapshot(&["a"], &["b"], &["c"]).summary();
        assert_eq!(summary.active, ["a"]);
        assert_eq!(summary.inactive, ["b"]);
        assert_eq!(summary.disabled, ["c"]);
        assert_eq!(snapshot(&["a"], &[], &[]).state_of(&"a".into()), Some(OriginState::Active));
    }
}
