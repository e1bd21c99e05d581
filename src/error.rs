// src/error.rs

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::task::TaskStatus;

/// Errors raised by the emitters and the task pipeline.
///
/// `Clone` because one failure is usually delivered to several observers
/// (a pending `pause()`, a pending `cancel()` and the `"error"` signal).
#[derive(Error, Debug, Clone)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum FlowError {
  // --- Capacity ---
  #[error("Too many listeners registered for event '{name}' (max {max})")]
  TooManyListeners { name: String, max: i64 },

  // --- Task Protocol Misuse ---
  #[error("The task is not running (status {0:?})")]
  NotRunning(TaskStatus),
  #[error("Task only can be started under READY/COMPLETED status (status {0:?})")]
  InvalidStart(TaskStatus),
  #[error("The task cannot be advanced in status {0:?}")]
  NotAdvanceable(TaskStatus),
  #[error("The next callback could be called only once")]
  ContinuationReused,

  // --- Interrupted Control Requests ---
  #[error("The pause action was interrupted")]
  PauseInterrupted,
  #[error("This task is being cancelled")]
  BeingCancelled,

  // --- Listener / Step Failures ---
  #[error("{0}")]
  Failed(String),
  #[error("{0}")]
  Custom(#[source] Arc<dyn StdError + Send + Sync>),
}

impl FlowError {
  /// Builds a `Failed` error from any message.
  pub fn failed(msg: impl Into<String>) -> Self {
    FlowError::Failed(msg.into())
  }

  /// Wraps an arbitrary error raised by a listener or step.
  pub fn custom<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    FlowError::Custom(Arc::new(err))
  }

  /// True for errors reporting that a task method was used in the wrong state.
  pub fn is_misuse(&self) -> bool {
    matches!(
      self,
      FlowError::NotRunning(_)
        | FlowError::InvalidStart(_)
        | FlowError::NotAdvanceable(_)
        | FlowError::ContinuationReused
    )
  }
}

// Custom errors compare by identity.
impl PartialEq for FlowError {
  fn eq(&self, other: &Self) -> bool {
    use FlowError::*;
    match (self, other) {
      (TooManyListeners { name: a, max: x }, TooManyListeners { name: b, max: y }) => a == b && x == y,
      (NotRunning(a), NotRunning(b)) => a == b,
      (InvalidStart(a), InvalidStart(b)) => a == b,
      (NotAdvanceable(a), NotAdvanceable(b)) => a == b,
      (ContinuationReused, ContinuationReused) => true,
      (PauseInterrupted, PauseInterrupted) => true,
      (BeingCancelled, BeingCancelled) => true,
      (Failed(a), Failed(b)) => a == b,
      (Custom(a), Custom(b)) => Arc::ptr_eq(a, b),
      _ => false,
    }
  }
}
