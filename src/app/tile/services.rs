use std::sync::Arc;

/// Handle returned by a subscription; removing it must balance the add 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

pub type RecordingCallback = Arc<dyn Fn(bool) + Send + Sync>;
pub type KeyguardCallback = Arc<dyn Fn() + Send + Sync>;

/// Recording-state query and toggle service. Failures stay inside the
/// implementation; the tile never retries or surfaces them.
pub trait RecordingController: Send + Sync {
    fn is_recording(&self) -> bool;
    /// Toggles recording: starts when idle, stops when active.
    fn auto_record(&self);
    fn add_callback(&self, callback: RecordingCallback) -> CallbackId;
    fn remove_callback(&self, id: CallbackId);
}

/// Lock-screen state notifier.
pub trait KeyguardMonitor: Send + Sync {
    fn is_showing(&self) -> bool;
    fn add_callback(&self, callback: KeyguardCallback) -> CallbackId;
    fn remove_callback(&self, id: CallbackId);
}

/// The quick-settings container the tile lives in.
pub trait PanelHost: Send + Sync {
    fn collapse_panels(&self);
}
