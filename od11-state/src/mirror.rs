//! StateMirror - the in-memory copy of one device's state
//!
//! The session's I/O loop is the only writer. Readers (entities, the CLI,
//! tests) take cheap snapshots or typed reads, and may watch property keys
//! to receive [`ChangeEvent`]s through a blocking [`ChangeIterator`].
//!
//! ```rust,ignore
//! use od11_state::{StateMirror, Volume};
//!
//! let mirror = StateMirror::new();
//! mirror.watch(Volume::KEY);
//! mirror.apply_message(&DeviceMessage::parse(frame)?);
//!
//! if let Some(volume) = mirror.get::<Volume>() {
//!     println!("volume is {}", volume.value());
//! }
//! ```

use std::collections::HashSet;
use std::sync::mpsc::{self, TrySendError};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use od11_api::DeviceMessage;

use crate::decoder::{decode, PropertyChange};
use crate::event::ChangeEvent;
use crate::iter::ChangeIterator;
use crate::property::{CurrentSource, Property, Sources, ALL_KEYS};
use crate::state::DeviceState;

/// Result of merging one message into the mirror
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Keys whose value changed, in application order
    pub changed: Vec<&'static str>,
    /// Keys whose change was refused
    pub rejected: Vec<&'static str>,
    /// This message completed the handshake snapshot
    pub snapshot_completed: bool,
}

impl ApplyOutcome {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.rejected.is_empty() && !self.snapshot_completed
    }
}

/// Change events kept for consumers before the oldest are dropped
pub const EVENT_QUEUE_CAPACITY: usize = 1000;

/// Shared, clonable handle to a device's mirrored state
///
/// Clones share the same state, watch set and event queue. The queue holds at
/// most [`EVENT_QUEUE_CAPACITY`] events; when it is full the oldest is dropped.
#[derive(Clone)]
pub struct StateMirror {
    state: Arc<RwLock<DeviceState>>,
    watched: Arc<RwLock<HashSet<&'static str>>>,
    event_tx: mpsc::SyncSender<ChangeEvent>,
    event_rx: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_QUEUE_CAPACITY)
    }

    /// Mirror whose change queue holds at most `capacity` events
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (event_tx, event_rx) = mpsc::sync_channel(capacity.max(1));
        Self {
            state: Arc::new(RwLock::new(DeviceState::default())),
            watched: Arc::new(RwLock::new(HashSet::new())),
            event_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
        }
    }

    /// Current value of a property
    pub fn get<P: Property>(&self) -> Option<P> {
        P::read(&self.state.read())
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> DeviceState {
        self.state.read().clone()
    }

    /// Whether the `group_joined` snapshot has been applied since the last reset
    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready()
    }

    /// Decode an inbound message and merge it
    pub fn apply_message(&self, message: &DeviceMessage) -> ApplyOutcome {
        let decoded = decode(message);
        let mut outcome = self.apply(decoded.changes);

        if decoded.completes_snapshot {
            let mut state = self.state.write();
            if !state.snapshot_received {
                state.snapshot_received = true;
                outcome.snapshot_completed = true;
            }
        }

        if !outcome.is_empty() {
            debug!(
                kind = %decoded.kind,
                changed = ?outcome.changed,
                rejected = ?outcome.rejected,
                "Applied device message"
            );
        }
        outcome
    }

    /// Merge property changes
    ///
    /// Only the properties present in `changes` are written. Writes that
    /// leave a value unchanged produce no event.
    pub fn apply(&self, changes: Vec<PropertyChange>) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        {
            let mut state = self.state.write();
            for change in changes {
                let key = change.key();
                match merge(&mut state, change) {
                    Merge::Changed(keys) => outcome.changed.extend(keys),
                    Merge::Unchanged => {}
                    Merge::Rejected => outcome.rejected.push(key),
                }
            }
        }

        for key in outcome.changed.iter().copied() {
            self.maybe_emit_change(key);
        }
        outcome
    }

    /// Forget everything, as after a disconnect
    ///
    /// Watched keys that held a value receive a change event.
    pub fn reset(&self) {
        let cleared = {
            let mut state = self.state.write();
            let old = std::mem::take(&mut *state);
            present_keys(&old)
        };

        for key in cleared {
            self.maybe_emit_change(key);
        }
    }

    /// Register a property key for change events
    pub fn watch(&self, property_key: &'static str) {
        self.watched.write().insert(property_key);
    }

    pub fn unwatch(&self, property_key: &'static str) {
        self.watched.write().remove(property_key);
    }

    pub fn is_watched(&self, property_key: &'static str) -> bool {
        self.watched.read().contains(property_key)
    }

    /// Blocking iterator over events for watched keys
    pub fn iter(&self) -> ChangeIterator {
        ChangeIterator::new(Arc::clone(&self.event_rx))
    }

    fn maybe_emit_change(&self, property_key: &'static str) {
        if !self.is_watched(property_key) {
            return;
        }
        let event = match self.event_tx.try_send(ChangeEvent::new(property_key)) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(event)) => event,
        };

        // A consumer holding the receiver is draining the queue already
        if let Some(rx) = self.event_rx.try_lock() {
            let _ = rx.try_recv();
        }
        if self.event_tx.try_send(event).is_err() {
            debug!(property = property_key, "Change queue full, dropping event");
        }
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMirror")
            .field("state", &*self.state.read())
            .field("watched", &*self.watched.read())
            .finish()
    }
}

enum Merge {
    Changed(Vec<&'static str>),
    Unchanged,
    Rejected,
}

fn merge(state: &mut DeviceState, change: PropertyChange) -> Merge {
    match change {
        PropertyChange::SessionToken(v) => set(state, v),
        PropertyChange::Volume(v) => set(state, v),
        PropertyChange::CurrentSource(v) => merge_current_source(state, v),
        PropertyChange::Sources(v) => merge_sources(state, v),
        PropertyChange::WifiQuality(v) => set(state, v),
        PropertyChange::FirmwareRevision(v) => set(state, v),
        PropertyChange::MacAddress(v) => set(state, v),
        PropertyChange::Ssid(v) => set(state, v),
    }
}

fn set<P: Property>(state: &mut DeviceState, value: P) -> Merge {
    if P::read(state).as_ref() == Some(&value) {
        return Merge::Unchanged;
    }
    value.write(state);
    Merge::Changed(vec![P::KEY])
}

// The current source must be one of the listed sources
fn merge_current_source(state: &mut DeviceState, value: CurrentSource) -> Merge {
    if let Some(sources) = state.sources.as_ref().filter(|s| !s.map().is_empty()) {
        if !sources.contains(value.id()) {
            warn!(
                source = %value.id(),
                known = ?sources.map().keys().map(ToString::to_string).collect::<Vec<_>>(),
                "Ignoring input change to a source the device did not list"
            );
            return Merge::Rejected;
        }
    }
    set(state, value)
}

// A new list may strand the current source, which is then dropped
fn merge_sources(state: &mut DeviceState, value: Sources) -> Merge {
    let dangling = state
        .current_source
        .as_ref()
        .is_some_and(|current| !value.map().is_empty() && !value.contains(current.id()));

    let mut keys = match set(state, value) {
        Merge::Changed(keys) => keys,
        other => return other,
    };

    if dangling {
        if let Some(current) = state.current_source.take() {
            debug!(source = %current.id(), "Current source no longer listed, clearing it");
            keys.push(CurrentSource::KEY);
        }
    }
    Merge::Changed(keys)
}

fn present_keys(state: &DeviceState) -> Vec<&'static str> {
    let present = [
        state.session_id.is_some(),
        state.volume.is_some(),
        state.current_source.is_some(),
        state.sources.is_some(),
        state.wifi_quality.is_some(),
        state.firmware_revision.is_some(),
        state.mac_address.is_some(),
        state.ssid.is_some(),
    ];
    ALL_KEYS
        .iter()
        .zip(present)
        .filter_map(|(key, present)| present.then_some(*key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{SessionToken, Ssid, Volume};
    use od11_api::{SessionId, SourceId, SourceMap};
    use std::time::Duration;

    fn example_snapshot() -> DeviceMessage {
        DeviceMessage::parse(
            r#"{"response":"group_joined","sid":7,
                "sources":[{"id":"a","name":"AirPlay"},{"id":"o","name":"Optical"}],
                "state":[{"update":"group_volume_changed","vol":30},
                         {"update":"group_input_source_changed","source":"a"}]}"#,
        )
        .unwrap()
    }

    fn push(text: &str) -> DeviceMessage {
        DeviceMessage::parse(text).unwrap()
    }

    #[test]
    fn test_snapshot_makes_mirror_ready() {
        let mirror = StateMirror::new();
        assert!(!mirror.is_ready());

        let outcome = mirror.apply_message(&example_snapshot());
        assert!(outcome.snapshot_completed);
        assert!(mirror.is_ready());

        let state = mirror.snapshot();
        assert_eq!(state.volume(), Some(30));
        assert_eq!(state.current_source_id(), Some(&SourceId::new("a")));
        assert_eq!(state.current_source_name(), Some("AirPlay"));
        assert_eq!(mirror.get::<SessionToken>(), Some(SessionToken(SessionId::from(7))));
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mirror = StateMirror::new();
        mirror.apply_message(&example_snapshot());

        mirror.apply_message(&push(r#"{"update":"group_input_source_changed","source":"o"}"#));

        let state = mirror.snapshot();
        assert_eq!(state.current_source_id(), Some(&SourceId::new("o")));
        assert_eq!(state.volume(), Some(30));
        assert_eq!(state.source_map().len(), 2);
    }

    #[test]
    fn test_unlisted_source_is_rejected() {
        let mirror = StateMirror::new();
        mirror.apply_message(&example_snapshot());

        let outcome =
            mirror.apply_message(&push(r#"{"update":"group_input_source_changed","source":"zz"}"#));
        assert_eq!(outcome.rejected, vec!["source_id"]);
        assert!(outcome.changed.is_empty());
        assert_eq!(mirror.snapshot().current_source_id(), Some(&SourceId::new("a")));
    }

    #[test]
    fn test_new_source_list_drops_dangling_current_source() {
        let mirror = StateMirror::new();
        mirror.apply_message(&example_snapshot());

        let mut sources = SourceMap::new();
        sources.insert(SourceId::new("o"), "Optical".to_string());
        let outcome = mirror.apply(vec![PropertyChange::Sources(Sources(sources))]);

        assert_eq!(outcome.changed, vec!["sources", "source_id"]);
        assert!(mirror.snapshot().current_source.is_none());
    }

    #[test]
    fn test_unchanged_value_emits_nothing() {
        let mirror = StateMirror::new();
        mirror.watch(Volume::KEY);
        mirror.apply_message(&push(r#"{"update":"group_volume_changed","vol":40}"#));
        let outcome = mirror.apply_message(&push(r#"{"update":"group_volume_changed","vol":40}"#));

        assert!(outcome.changed.is_empty());
        assert_eq!(mirror.iter().try_iter().count(), 1);
    }

    #[test]
    fn test_only_watched_keys_emit_events() {
        let mirror = StateMirror::new();
        mirror.watch(CurrentSource::KEY);
        mirror.apply_message(&example_snapshot());

        let keys: Vec<_> = mirror.iter().try_iter().map(|e| e.property_key).collect();
        assert_eq!(keys, vec!["source_id"]);

        mirror.unwatch(CurrentSource::KEY);
        assert!(!mirror.is_watched(CurrentSource::KEY));
        mirror.apply_message(&push(r#"{"update":"group_input_source_changed","source":"o"}"#));
        assert!(mirror.iter().try_recv().is_none());
    }

    #[test]
    fn test_full_queue_drops_oldest_event() {
        let mirror = StateMirror::with_event_capacity(2);
        mirror.apply_message(&example_snapshot());
        mirror.watch(Volume::KEY);
        mirror.watch(CurrentSource::KEY);

        for vol in 31..=40 {
            mirror.apply_message(&push(&format!(
                r#"{{"update":"group_volume_changed","vol":{vol}}}"#
            )));
        }
        mirror.apply_message(&push(r#"{"update":"group_input_source_changed","source":"o"}"#));

        let keys: Vec<_> = mirror.iter().try_iter().map(|e| e.property_key).collect();
        assert_eq!(keys, vec!["volume", "source_id"]);
        assert_eq!(mirror.get::<Volume>().map(|v| v.value()), Some(40));
    }

    #[test]
    fn test_reset_clears_state_and_notifies() {
        let mirror = StateMirror::new();
        mirror.apply_message(&example_snapshot());
        mirror.watch(Volume::KEY);
        mirror.watch(Ssid::KEY);

        mirror.reset();

        assert!(!mirror.is_ready());
        assert_eq!(mirror.snapshot(), DeviceState::default());
        let event = mirror.iter().recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(event.property_key, "volume");
        // ssid was never set, so no event
        assert!(mirror.iter().try_recv().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let mirror = StateMirror::new();
        let clone = mirror.clone();
        mirror.apply_message(&push(r#"{"update":"group_volume_changed","vol":12}"#));
        assert_eq!(clone.get::<Volume>(), Some(Volume(12)));
    }

    #[test]
    fn test_snapshot_completes_once() {
        let mirror = StateMirror::new();
        assert!(mirror.apply_message(&example_snapshot()).snapshot_completed);
        assert!(!mirror.apply_message(&example_snapshot()).snapshot_completed);
    }
}
