// src/events/options.rs

use std::sync::atomic::{AtomicI64, Ordering};

/// Listener capacity every emitter starts with unless configured otherwise.
pub const DEFAULT_MAX_LISTENERS: i64 = 10;

// Process-wide default, read at every capacity check by emitters without
// their own limit. Changing it affects those emitters immediately.
static PROCESS_MAX_LISTENERS: AtomicI64 = AtomicI64::new(DEFAULT_MAX_LISTENERS);

/// The current process-wide listener capacity.
pub fn default_max_listeners() -> i64 {
  PROCESS_MAX_LISTENERS.load(Ordering::Relaxed)
}

/// Replaces the process-wide listener capacity.
///
/// This is global mutable state: it applies to every emitter in the process
/// that has no per-instance limit, including ones created earlier.
/// A value `<= 0` disables registration on those emitters.
pub fn set_default_max_listeners(max: i64) {
  tracing::debug!(max, "Setting process-wide default max listeners");
  PROCESS_MAX_LISTENERS.store(max, Ordering::Relaxed);
}

/// Per-emitter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitterOptions {
  /// Listener capacity per event name. `None` follows the process-wide default.
  pub max_listeners: Option<i64>,
}

impl EmitterOptions {
  pub fn with_max_listeners(max: i64) -> Self {
    Self {
      max_listeners: Some(max),
    }
  }

  /// The limit in effect right now.
  pub fn effective_max_listeners(&self) -> i64 {
    self.max_listeners.unwrap_or_else(default_max_listeners)
  }
}
