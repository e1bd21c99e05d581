// src/runtime/reference.rs

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::events::{SyncEventEmitter, SyncListener};

const EMPTY: &str = "empty";

/// Counts in-flight users of a shared resource and raises `"empty"` when the
/// last one leaves.
///
/// The signal fires synchronously inside the `release()` that moves the count
/// from 1 to exactly 0. Releasing more often than acquiring is not guarded:
/// the count goes negative and stays silent until it climbs back and drops
/// to zero again.
#[derive(Debug, Clone)]
pub struct ReferenceCounter {
  count: Arc<AtomicI64>,
  signals: SyncEventEmitter<()>,
}

impl ReferenceCounter {
  /// Creates a counter at zero with no observers.
  pub fn new() -> Self {
    Self {
      count: Arc::new(AtomicI64::new(0)),
      signals: SyncEventEmitter::new(),
    }
  }

  pub fn acquire(&self) -> &Self {
    let old_count = self.count.fetch_add(1, Ordering::AcqRel);
    if old_count == 0 {
      tracing::trace!("ReferenceCounter acquired from zero");
    }
    self
  }

  /// Decrements the count, raising `"empty"` if it lands on exactly zero.
  pub fn release(&self) -> &Self {
    let old_count = self.count.fetch_sub(1, Ordering::AcqRel);
    if old_count == 1 {
      tracing::trace!("ReferenceCounter reached zero, raising empty");
      self.signals.emit(EMPTY, &());
    } else if old_count <= 0 {
      tracing::warn!(count = old_count - 1, "ReferenceCounter released below zero");
    }
    self
  }

  /// Current count. Negative after unbalanced releases.
  pub fn references(&self) -> i64 {
    self.count.load(Ordering::Acquire)
  }

  /// Observes every transition to zero.
  pub fn on_empty<F>(&self, observer: F) -> &Self
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.signals.add_listener(EMPTY, SyncListener::observer(move |_| observer()));
    self
  }

  /// Observes the next transition to zero only.
  pub fn once_empty<F>(&self, observer: F) -> &Self
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.signals.add_once_listener(EMPTY, SyncListener::observer(move |_| observer()));
    self
  }
}

impl Default for ReferenceCounter {
  fn default() -> Self {
    Self::new()
  }
}
