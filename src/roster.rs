//! Roster of live device sessions
//!
//! Maps device identity to a session handle, keeps the latest discrete
//! snapshot per device, and publishes `joined`/`updated`/`left` events to
//! subscribers. Sessions register at READY and retire on close; external
//! callers reach devices exclusively through [`Roster::execute_action`].

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::device::{DeviceHandle, DeviceSnapshot};
use crate::{Error, Result};

/// Capacity of the subscriber event channel
const EVENT_CAPACITY: usize = 64;

/// Event published to roster subscribers.
///
/// Snapshots are value copies; subscribers never see references into
/// session state.
#[derive(Debug, Clone)]
pub enum RosterEvent {
    /// A device reached READY and joined the roster
    Joined(DeviceSnapshot),
    /// A live device's snapshot changed
    Updated(DeviceSnapshot),
    /// A device left the roster
    Left(String),
}

struct Entry {
    handle: DeviceHandle,
    snapshot: DeviceSnapshot,
}

/// The set of currently-live device sessions
pub struct Roster {
    entries: RwLock<HashMap<String, Entry>>,
    events: broadcast::Sender<RosterEvent>,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    /// Create an empty roster
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to the roster event feed
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }

    /// Register a session that reached READY.
    ///
    /// A live entry under the same identity is told to close and dropped
    /// from the roster before the new session takes its place; its later
    /// retirement is a no-op.
    pub fn add(&self, handle: DeviceHandle, snapshot: DeviceSnapshot) {
        let id = handle.id().to_string();
        let previous = {
            let mut entries = self.entries.write().expect("roster lock poisoned");
            entries.insert(
                id.clone(),
                Entry {
                    handle,
                    snapshot: snapshot.clone(),
                },
            )
        };
        if let Some(previous) = previous {
            tracing::warn!(device = %id, "replacing live session for identity");
            previous.handle.request_disconnect();
            let _ = self.events.send(RosterEvent::Left(id.clone()));
        }
        tracing::info!(device = %id, kind = %snapshot.device_type, "device joined");
        let _ = self.events.send(RosterEvent::Joined(snapshot));
    }

    /// Store a device's latest snapshot and notify subscribers.
    ///
    /// Updates for identities not in the roster are dropped.
    pub fn update(&self, snapshot: DeviceSnapshot) {
        let mut entries = self.entries.write().expect("roster lock poisoned");
        let Some(entry) = entries.get_mut(&snapshot.id) else {
            return;
        };
        entry.snapshot = snapshot.clone();
        drop(entries);
        let _ = self.events.send(RosterEvent::Updated(snapshot));
    }

    /// Remove a device by identity. Idempotent; the session is asked to
    /// close if still live.
    pub fn remove(&self, id: &str) {
        let removed = {
            let mut entries = self.entries.write().expect("roster lock poisoned");
            entries.remove(id)
        };
        if let Some(entry) = removed {
            entry.handle.request_disconnect();
            let _ = self.events.send(RosterEvent::Left(id.to_string()));
            tracing::info!(device = %id, "device left");
        }
    }

    /// Remove the entry belonging to this exact session handle.
    ///
    /// A retired session whose identity was already taken over by a newer
    /// session leaves the newer entry untouched.
    pub(crate) fn retire(&self, handle: &DeviceHandle) {
        let removed = {
            let mut entries = self.entries.write().expect("roster lock poisoned");
            match entries.get(handle.id()) {
                Some(entry) if entry.handle.token() == handle.token() => {
                    entries.remove(handle.id())
                }
                _ => None,
            }
        };
        if removed.is_some() {
            let _ = self.events.send(RosterEvent::Left(handle.id().to_string()));
            tracing::info!(device = %handle.id(), "device left");
        }
    }

    /// Handle of a live device, if any
    #[must_use]
    pub fn get(&self, id: &str) -> Option<DeviceHandle> {
        self.entries
            .read()
            .expect("roster lock poisoned")
            .get(id)
            .map(|entry| entry.handle.clone())
    }

    /// Latest snapshots of every live device, ordered by identity
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let entries = self.entries.read().expect("roster lock poisoned");
        let mut snapshots: Vec<DeviceSnapshot> =
            entries.values().map(|entry| entry.snapshot.clone()).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Forward a named action to a live device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown identities, otherwise
    /// whatever the session's dispatch table decides.
    pub async fn execute_action(&self, id: &str, action: &str, params: &[String]) -> Result<()> {
        let handle = self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))?;
        handle.execute(action, params).await
    }

    /// Number of live devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("roster lock poisoned").len()
    }

    /// Whether the roster is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::session::test_handle;

    fn sample_snapshot(id: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            id: id.to_string(),
            name: "GenericBoard".to_string(),
            firmware_version: Some("2.5".to_string()),
            vendor_id: None,
            product_id: None,
            device_type: "Generic".to_string(),
            current_program: "idle".to_string(),
            online: true,
            commands: vec!["BLINKON".to_string()],
            pins: Vec::new(),
        }
    }

    #[test]
    fn add_and_get() {
        let roster = Roster::new();
        roster.add(test_handle("a"), sample_snapshot("a"));

        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("a").unwrap().id(), "a");
        assert!(roster.get("b").is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let roster = Roster::new();
        roster.add(test_handle("a"), sample_snapshot("a"));
        roster.remove("a");
        roster.remove("a");
        assert!(roster.is_empty());
    }

    #[test]
    fn add_emits_joined() {
        let roster = Roster::new();
        let mut events = roster.subscribe();
        roster.add(test_handle("a"), sample_snapshot("a"));

        match events.try_recv().unwrap() {
            RosterEvent::Joined(snapshot) => assert_eq!(snapshot.id, "a"),
            other => panic!("expected Joined, got {other:?}"),
        }
    }

    #[test]
    fn double_add_replaces_and_emits_left_first() {
        let roster = Roster::new();
        roster.add(test_handle("a"), sample_snapshot("a"));

        let mut events = roster.subscribe();
        let replacement = test_handle("a");
        let token = replacement.token();
        roster.add(replacement, sample_snapshot("a"));

        assert!(matches!(events.try_recv().unwrap(), RosterEvent::Left(_)));
        assert!(matches!(events.try_recv().unwrap(), RosterEvent::Joined(_)));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("a").unwrap().token(), token);
    }

    #[test]
    fn retire_ignores_superseded_handles() {
        let roster = Roster::new();
        let old = test_handle("a");
        roster.add(old.clone(), sample_snapshot("a"));

        let new = test_handle("a");
        roster.add(new.clone(), sample_snapshot("a"));

        // The replaced session retiring must not evict its successor.
        roster.retire(&old);
        assert_eq!(roster.len(), 1);

        roster.retire(&new);
        assert!(roster.is_empty());
    }

    #[test]
    fn update_for_unknown_identity_is_dropped() {
        let roster = Roster::new();
        let mut events = roster.subscribe();
        roster.update(sample_snapshot("ghost"));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn snapshots_are_ordered() {
        let roster = Roster::new();
        roster.add(test_handle("b"), sample_snapshot("b"));
        roster.add(test_handle("a"), sample_snapshot("a"));

        let ids: Vec<String> = roster.snapshot().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn execute_action_on_unknown_device() {
        let roster = Roster::new();
        let err = roster.execute_action("ghost", "BLINKON", &[]).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
