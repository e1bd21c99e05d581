// src/task/status.rs

/// Lifecycle of a [`TaskPipeline`](super::TaskPipeline).
///
/// `PrePause` and `PreCancel` record a request made while a step was still in
/// flight; they turn into `Paused`/`Cancelled` at the next advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
  Ready,
  Running,
  Paused,
  Cancelled,
  Completed,
  PrePause,
  PreCancel,
}

impl TaskStatus {
  /// `start()` is only accepted from these states.
  pub fn is_startable(self) -> bool {
    matches!(self, TaskStatus::Ready | TaskStatus::Completed)
  }

  /// True while a step may be in flight.
  pub fn is_active(self) -> bool {
    matches!(self, TaskStatus::Running | TaskStatus::PrePause | TaskStatus::PreCancel)
  }
}

impl Default for TaskStatus {
  fn default() -> Self {
    TaskStatus::Ready
  }
}
