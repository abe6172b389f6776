//! Transfer progress values and the registry of in-flight progress streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Completed share in `0.0..=1.0`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.completed as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

pub type ProgressSender = Arc<watch::Sender<Progress>>;

/// Maps in-flight request ids to their progress channel. Entries live exactly
/// as long as their [`ProgressRegistration`].
#[derive(Default)]
pub struct ProgressRegistry {
    entries: Mutex<HashMap<Uuid, ProgressSender>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(self: &Arc<Self>) -> (ProgressRegistration, watch::Receiver<Progress>) {
        let (tx, rx) = watch::channel(Progress::default());
        let sender = Arc::new(tx);
        let id = Uuid::new_v4();
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id, Arc::clone(&sender));
        }
        let registration = ProgressRegistration {
            id,
            sender,
            registry: Arc::clone(self),
        };
        (registration, rx)
    }

    pub fn sender(&self, id: &Uuid) -> Option<ProgressSender> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(id).cloned())
    }

    /// Number of requests currently reporting progress.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its registry entry when dropped, whether the call settled or was cancelled.
pub struct ProgressRegistration {
    id: Uuid,
    sender: ProgressSender,
    registry: Arc<ProgressRegistry>,
}

impl ProgressRegistration {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sender(&self) -> &ProgressSender {
        &self.sender
    }
}

impl Drop for ProgressRegistration {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.registry.entries.lock() {
            entries.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_unknown_and_empty_totals() {
        assert_eq!(Progress { completed: 5, total: None }.fraction(), None);
        assert_eq!(Progress { completed: 0, total: Some(0) }.fraction(), Some(1.0));
        assert_eq!(Progress { completed: 25, total: Some(100) }.fraction(), Some(0.25));
    }

    #[test]
    fn registration_drop_removes_entry() {
        let registry = Arc::new(ProgressRegistry::new());
        let (registration, rx) = registry.register();
        assert_eq!(registry.len(), 1);
        assert!(registry.sender(&registration.id()).is_some());

        registration.sender().send_replace(Progress {
            completed: 3,
            total: Some(10),
        });
        assert_eq!(rx.borrow().completed, 3);

        drop(registration);
        assert!(registry.is_empty());
    }
}
