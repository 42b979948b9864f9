//! Inventory change listeners.

use std::sync::{Arc, Mutex};

use crate::inventory::snapshot::{Changes, OriginsSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("origins change listener failed: {0}")]
pub struct ListenerError(pub String);

/// Notified of membership and state changes, in publish order. Called
/// outside the inventory's locks; a listener may call back into it.
pub trait OriginsChangeListener: Send + Sync {
    fn origins_changed(&self, snapshot: &OriginsSnapshot, changes: &Changes) -> Result<(), ListenerError>;
}

/// Ordered listener list. Every listener is invoked in registration order;
/// the first failure is reported.
#[derive(Default)]
pub struct Announcer {
    listeners: Mutex<Vec<Arc<dyn OriginsChangeListener>>>,
}

impl Announcer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn OriginsChangeListener>) {
        self.lock().push(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn OriginsChangeListener>) {
        self.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn announce(&self, snapshot: &OriginsSnapshot, changes: &Changes) -> Result<(), ListenerError> {
        let listeners = self.lock().clone();
        let mut first_error = None;
        for listener in listeners {
            if let Err(e) = listener.origins_changed(snapshot, changes) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn OriginsChangeListener>>> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl OriginsChangeListener for Named {
        fn origins_changed(&self, _snapshot: &OriginsSnapshot, _changes: &Changes) -> Result<(), ListenerError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(ListenerError(self.name.to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn invokes_all_in_order_and_reports_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let announcer = Announcer::new();
        for (name, fail) in [("one", false), ("two", true), ("three", true)] {
            announcer.add(Arc::new(Named {
                name,
                fail,
                log: log.clone(),
            }));
        }

        let result = announcer.announce(&OriginsSnapshot::empty("shop".into()), &Changes::default());

        assert_eq!(result, Err(ListenerError("two".to_string())));
        assert_eq!(*log.lock().unwrap(), ["one", "two", "three"]);
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let announcer = Announcer::new();
        let listener: Arc<dyn OriginsChangeListener> = Arc::new(Named {
            name: "gone",
            fail: false,
            log: log.clone(),
        });
        announcer.add(listener.clone());
        announcer.remove(&listener);

        announcer
            .announce(&OriginsSnapshot::empty("shop".into()), &Changes::default())
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert!(announcer.is_empty());
    }
}
