use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use tracing::debug;

use crate::app::tile::display::TileDisplayState;
use crate::app::tile::services::{CallbackId, KeyguardMonitor, PanelHost, RecordingController};

/// Metrics-category identifier reported to the host's metrics logger.
pub const METRICS_CATEGORY_QS_SCREENRECORD: u32 = 1203;

/// Action a tile can hand back to the host for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileAction {
    LaunchActivity(String),
}

/// Notifications from the external services. They carry no transition logic;
/// each one just schedules a state recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileEvent {
    RecordingStateChanged(bool),
    KeyguardChanged,
}

/// Capability surface a tile exposes to its host container.
pub trait QsTile {
    fn tile_label(&self) -> &str;
    fn metrics_category(&self) -> u32;
    fn on_listening_changed(&mut self, is_listening: bool);
    fn on_user_activate(&self);
    fn on_long_activate(&self) -> Option<TileAction>;
    fn compute_display_state(&self) -> TileDisplayState;
}

struct Subscriptions {
    recording: CallbackId,
    keyguard: CallbackId,
}

pub struct ScreenrecordTile {
    recording: Arc<dyn RecordingController>,
    keyguard: Arc<dyn KeyguardMonitor>,
    host: Arc<dyn PanelHost>,
    label: String,
    subscriptions: Option<Subscriptions>,
    events_tx: Sender<TileEvent>,
}

impl ScreenrecordTile {
    /// Builds the tile and hands the host the event stream its refresh loop
    /// drains. Events start flowing once the tile is listening.
    pub fn new(
        recording: Arc<dyn RecordingController>,
        keyguard: Arc<dyn KeyguardMonitor>,
        host: Arc<dyn PanelHost>,
        label: impl Into<String>,
    ) -> (Self, Receiver<TileEvent>) {
        let (events_tx, events_rx) = channel();
        (
            Self {
                recording,
                keyguard,
                host,
                label: label.into(),
                subscriptions: None,
                events_tx,
            },
            events_rx,
        )
    }

    pub fn is_listening(&self) -> bool {
        self.subscriptions.is_some()
    }
}

impl QsTile for ScreenrecordTile {
    fn tile_label(&self) -> &str {
        &self.label
    }

    fn metrics_category(&self) -> u32 {
        METRICS_CATEGORY_QS_SCREENRECORD
    }

    fn on_listening_changed(&mut self, is_listening: bool) {
        if is_listening == self.is_listening() {
            // Repeated transitions to the same state must not stack
            // subscriptions; exactly one add/remove pair per edge.
            return;
        }
        if is_listening {
            let recording_tx = self.events_tx.clone();
            let recording_id = self.recording.add_callback(Arc::new(move |value| {
                let _ = recording_tx.send(TileEvent::RecordingStateChanged(value));
            }));
            let keyguard_tx = self.events_tx.clone();
            let keyguard_id = self.keyguard.add_callback(Arc::new(move || {
                let _ = keyguard_tx.send(TileEvent::KeyguardChanged);
            }));
            self.subscriptions = Some(Subscriptions {
                recording: recording_id,
                keyguard: keyguard_id,
            });
            debug!(label = %self.label, "tile listening");
        } else if let Some(subscriptions) = self.subscriptions.take() {
            self.recording.remove_callback(subscriptions.recording);
            self.keyguard.remove_callback(subscriptions.keyguard);
            debug!(label = %self.label, "tile stopped listening");
        }
    }

    fn on_user_activate(&self) {
        // Panel collapse first so the recording never captures the shade.
        self.host.collapse_panels();
        self.recording.auto_record();
    }

    fn on_long_activate(&self) -> Option<TileAction> {
        // Reserved for a future long-press surface.
        None
    }

    fn compute_display_state(&self) -> TileDisplayState {
        let value = self.recording.is_recording();
        TileDisplayState::from_recording(value, &self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tile::display::TileIcon;
    use crate::app::tile::services::{KeyguardCallback, RecordingCallback};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockRecording {
        recording: AtomicBool,
        next_id: AtomicU64,
        callbacks: Mutex<HashMap<u64, RecordingCallback>>,
        adds: AtomicU64,
        removes: AtomicU64,
        calls: Mutex<Vec<&'static str>>,
    }

    impl MockRecording {
        fn notify(&self, value: bool) {
            self.recording.store(value, Ordering::SeqCst);
            let callbacks = self.callbacks.lock().expect("callbacks");
            for callback in callbacks.values() {
                callback(value);
            }
        }
    }

    impl RecordingController for MockRecording {
        fn is_recording(&self) -> bool {
            self.recording.load(Ordering::SeqCst)
        }

        fn auto_record(&self) {
            self.calls.lock().expect("calls").push("auto_record");
        }

        fn add_callback(&self, callback: RecordingCallback) -> CallbackId {
            self.adds.fetch_add(1, Ordering::SeqCst);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.callbacks
                .lock()
                .expect("callbacks")
                .insert(id, callback);
            CallbackId(id)
        }

        fn remove_callback(&self, id: CallbackId) {
            self.removes.fetch_add(1, Ordering::SeqCst);
            self.callbacks.lock().expect("callbacks").remove(&id.0);
        }
    }

    #[derive(Default)]
    struct MockKeyguard {
        showing: AtomicBool,
        next_id: AtomicU64,
        callbacks: Mutex<HashMap<u64, KeyguardCallback>>,
        adds: AtomicU64,
        removes: AtomicU64,
    }

    impl KeyguardMonitor for MockKeyguard {
        fn is_showing(&self) -> bool {
            self.showing.load(Ordering::SeqCst)
        }

        fn add_callback(&self, callback: KeyguardCallback) -> CallbackId {
            self.adds.fetch_add(1, Ordering::SeqCst);
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.callbacks
                .lock()
                .expect("callbacks")
                .insert(id, callback);
            CallbackId(id)
        }

        fn remove_callback(&self, id: CallbackId) {
            self.removes.fetch_add(1, Ordering::SeqCst);
            self.callbacks.lock().expect("callbacks").remove(&id.0);
        }
    }

    struct OrderedHost {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PanelHost for OrderedHost {
        fn collapse_panels(&self) {
            self.calls.lock().expect("calls").push("collapse_panels");
        }
    }

    struct OrderedRecording {
        inner: MockRecording,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingController for OrderedRecording {
        fn is_recording(&self) -> bool {
            self.inner.is_recording()
        }

        fn auto_record(&self) {
            self.calls.lock().expect("calls").push("auto_record");
        }

        fn add_callback(&self, callback: RecordingCallback) -> CallbackId {
            self.inner.add_callback(callback)
        }

        fn remove_callback(&self, id: CallbackId) {
            self.inner.remove_callback(id)
        }
    }

    struct NoopHost;

    impl PanelHost for NoopHost {
        fn collapse_panels(&self) {}
    }

    fn build_tile(
        recording: Arc<dyn RecordingController>,
        keyguard: Arc<MockKeyguard>,
        host: Arc<dyn PanelHost>,
    ) -> (ScreenrecordTile, Receiver<TileEvent>) {
        ScreenrecordTile::new(recording, keyguard, host, "Screen record")
    }

    #[test]
    fn listening_transitions_balance_subscriptions() {
        let recording = Arc::new(MockRecording::default());
        let keyguard = Arc::new(MockKeyguard::default());
        let (mut tile, _events) = build_tile(
            Arc::clone(&recording) as Arc<dyn RecordingController>,
            Arc::clone(&keyguard),
            Arc::new(NoopHost),
        );

        tile.on_listening_changed(true);
        tile.on_listening_changed(false);

        assert_eq!(recording.adds.load(Ordering::SeqCst), 1);
        assert_eq!(recording.removes.load(Ordering::SeqCst), 1);
        assert_eq!(keyguard.adds.load(Ordering::SeqCst), 1);
        assert_eq!(keyguard.removes.load(Ordering::SeqCst), 1);
        assert!(recording.callbacks.lock().expect("callbacks").is_empty());
        assert!(keyguard.callbacks.lock().expect("callbacks").is_empty());
    }

    #[test]
    fn repeated_listening_values_do_not_stack_subscriptions() {
        let recording = Arc::new(MockRecording::default());
        let keyguard = Arc::new(MockKeyguard::default());
        let (mut tile, _events) = build_tile(
            Arc::clone(&recording) as Arc<dyn RecordingController>,
            Arc::clone(&keyguard),
            Arc::new(NoopHost),
        );

        tile.on_listening_changed(true);
        tile.on_listening_changed(true);
        tile.on_listening_changed(false);
        tile.on_listening_changed(false);

        assert_eq!(recording.adds.load(Ordering::SeqCst), 1);
        assert_eq!(recording.removes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn activate_collapses_panels_before_toggling_recording() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recording = Arc::new(OrderedRecording {
            inner: MockRecording::default(),
            calls: Arc::clone(&calls),
        });
        let keyguard = Arc::new(MockKeyguard::default());
        let host = Arc::new(OrderedHost {
            calls: Arc::clone(&calls),
        });
        let (tile, _events) = build_tile(recording, keyguard, host);

        tile.on_user_activate();

        assert_eq!(
            *calls.lock().expect("calls"),
            vec!["collapse_panels", "auto_record"]
        );
    }

    #[test]
    fn long_activate_is_a_designed_noop() {
        let recording = Arc::new(MockRecording::default());
        let keyguard = Arc::new(MockKeyguard::default());
        let (tile, _events) = build_tile(recording.clone(), keyguard, Arc::new(NoopHost));

        assert_eq!(tile.on_long_activate(), None);
        recording.notify(true);
        assert_eq!(tile.on_long_activate(), None);
    }

    #[test]
    fn recording_notification_drives_a_refresh_to_the_recording_icon() {
        let recording = Arc::new(MockRecording::default());
        let keyguard = Arc::new(MockKeyguard::default());
        let (mut tile, events) = build_tile(
            Arc::clone(&recording) as Arc<dyn RecordingController>,
            keyguard,
            Arc::new(NoopHost),
        );

        tile.on_listening_changed(true);
        assert!(!tile.compute_display_state().value);

        recording.notify(true);
        assert_eq!(
            events.recv().expect("event"),
            TileEvent::RecordingStateChanged(true)
        );

        let state = tile.compute_display_state();
        assert!(state.value);
        assert_eq!(state.icon, TileIcon::Recording);
        assert_eq!(state.label, "Screen record");
    }

    #[test]
    fn keyguard_notification_requests_a_refresh_without_hiding_the_tile() {
        let recording = Arc::new(MockRecording::default());
        let keyguard = Arc::new(MockKeyguard::default());
        let (mut tile, events) = build_tile(
            Arc::clone(&recording) as Arc<dyn RecordingController>,
            Arc::clone(&keyguard),
            Arc::new(NoopHost),
        );

        tile.on_listening_changed(true);
        keyguard.showing.store(true, Ordering::SeqCst);
        for callback in keyguard.callbacks.lock().expect("callbacks").values() {
            callback();
        }

        assert_eq!(events.recv().expect("event"), TileEvent::KeyguardChanged);
        assert!(tile.compute_display_state().visible);
    }

    #[test]
    fn events_stop_after_unsubscribe() {
        let recording = Arc::new(MockRecording::default());
        let keyguard = Arc::new(MockKeyguard::default());
        let (mut tile, events) = build_tile(
            Arc::clone(&recording) as Arc<dyn RecordingController>,
            keyguard,
            Arc::new(NoopHost),
        );

        tile.on_listening_changed(true);
        tile.on_listening_changed(false);
        recording.notify(true);

        assert!(events.try_recv().is_err());
    }
}
