// src/task/pipeline.rs

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::status::TaskStatus;
use super::step::{Continuation, Step};
use crate::error::FlowError;
use crate::events::{SyncEventEmitter, SyncListener};
use crate::runtime::{Deferred, Promise, Resolver, Series};

/// Raised when the last step hands control back.
pub const DONE: &str = "done";
/// Raised for protocol misuse and step failures.
pub const ERROR: &str = "error";
/// Settles pending `pause()` calls.
pub const PAUSE_RESULT: &str = "pause-result";
/// Settles pending `cancel()` calls.
pub const CANCEL_RESULT: &str = "cancel-result";

/// Payload of every pipeline signal: `None` for success, `Some` for failure.
pub type Signal = Option<FlowError>;

struct TaskState<A> {
  status: TaskStatus,
  steps: Vec<Step<A>>,
  cursor: usize,
  // What the last continuation forwarded when the pipeline parked at a pause.
  parked: Option<A>,
}

enum Boundary<A> {
  Run(Step<A>, Option<A>),
  Done,
  Paused,
  Cancelled,
  Stuck(TaskStatus),
}

pub(crate) struct TaskInner<A> {
  state: Mutex<TaskState<A>>,
  signals: SyncEventEmitter<Signal>,
  series: Series<Option<A>>,
}

impl<A: Send + 'static> TaskInner<A> {
  /// Called by a step's continuation: move the cursor and advance.
  pub(super) fn advance(self: &Arc<Self>, args: Option<A>) {
    self.state.lock().cursor += 1;
    self.main_loop(args);
  }

  fn main_loop(self: &Arc<Self>, args: Option<A>) {
    self.series.advance_with(args, |args| self.boundary(args));
  }

  /// One advancement: run the step under the cursor, or act on a pending
  /// pause/cancel request now that no step is in flight.
  fn boundary(self: &Arc<Self>, args: Option<A>) {
    let mut args = args;
    let boundary = {
      let mut state = self.state.lock();
      let status = state.status;
      match status {
        TaskStatus::Running => match state.steps.get(state.cursor).cloned() {
          Some(step) => Boundary::Run(step, args.take()),
          None => {
            state.status = TaskStatus::Completed;
            Boundary::Done
          }
        },
        TaskStatus::PrePause => {
          state.status = TaskStatus::Paused;
          state.parked = args.take();
          Boundary::Paused
        }
        TaskStatus::PreCancel => {
          state.status = TaskStatus::Cancelled;
          Boundary::Cancelled
        }
        status => Boundary::Stuck(status),
      }
    };

    match boundary {
      Boundary::Run(step, args) => {
        tracing::trace!(cursor = self.state.lock().cursor, "Running task step");
        step.call(Continuation::new(Arc::clone(self)), args);
      }
      Boundary::Done => {
        tracing::debug!("Task completed");
        self.signals.emit(DONE, &None);
      }
      Boundary::Paused => {
        tracing::debug!(cursor = self.state.lock().cursor, "Task paused");
        self.signals.emit(PAUSE_RESULT, &None);
      }
      Boundary::Cancelled => {
        tracing::debug!(cursor = self.state.lock().cursor, "Task cancelled at step boundary");
        self.signals.emit(PAUSE_RESULT, &Some(FlowError::BeingCancelled));
        self.signals.emit(CANCEL_RESULT, &None);
      }
      Boundary::Stuck(status) => self.raise(FlowError::NotAdvanceable(status)),
    }
  }

  /// Called by a step's continuation with an error: halt the run.
  pub(super) fn fail(self: &Arc<Self>, error: FlowError) {
    let halted = {
      let mut state = self.state.lock();
      let status = state.status;
      if status.is_active() {
        state.status = TaskStatus::Cancelled;
        state.parked = None;
        Ok(())
      } else {
        Err(status)
      }
    };
    match halted {
      Ok(()) => {
        tracing::debug!(error = %error, "Task step failed, halting");
        self.signals.emit(PAUSE_RESULT, &Some(error.clone()));
        self.signals.emit(CANCEL_RESULT, &Some(error.clone()));
        self.raise(error);
      }
      Err(status) => self.raise(FlowError::NotAdvanceable(status)),
    }
  }

  /// Reports on the `"error"` signal.
  pub(super) fn raise(&self, error: FlowError) {
    if error.is_misuse() {
      tracing::warn!(error = %error, "Task misuse");
    }
    if !self.signals.emit(ERROR, &Some(error.clone())) {
      tracing::warn!(error = %error, "Task error raised with no error listener attached");
    }
  }
}

fn settle_on(resolver: Resolver<(), FlowError>) -> SyncListener<Signal> {
  SyncListener::observer(move |outcome: &Signal| {
    resolver.settle(outcome.clone().map_or(Ok(()), Err));
  })
}

/// An ordered list of continuation-passing steps run one at a time, with
/// cooperative pause, resume and cancel.
///
/// Pause and cancel never interrupt a step: requested while a step is in
/// flight, they are recorded (`PrePause`/`PreCancel`) and take effect when
/// that step's continuation fires. Steps may be chained at any time; a step
/// appended before the cursor gets there will run.
pub struct TaskPipeline<A = ()> {
  inner: Arc<TaskInner<A>>,
}

impl<A: Send + 'static> TaskPipeline<A> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(TaskInner {
        state: Mutex::new(TaskState {
          status: TaskStatus::Ready,
          steps: Vec::new(),
          cursor: 0,
          parked: None,
        }),
        signals: SyncEventEmitter::new(),
        series: Series::new(),
      }),
    }
  }

  pub fn status(&self) -> TaskStatus {
    self.inner.state.lock().status
  }

  /// Index of the step in flight or next to run.
  pub fn cursor(&self) -> usize {
    self.inner.state.lock().cursor
  }

  pub fn len(&self) -> usize {
    self.inner.state.lock().steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Appends a step. Legal in every state.
  pub fn chain(&self, step: Step<A>) -> &Self {
    self.inner.state.lock().steps.push(step);
    self
  }

  /// Shorthand for `chain(Step::new(work))`.
  pub fn then<F>(&self, work: F) -> &Self
  where
    F: Fn(Continuation<A>, Option<A>) + Send + Sync + 'static,
  {
    self.chain(Step::new(work))
  }

  /// Runs the steps from the first one.
  ///
  /// Only accepted from `Ready` or `Completed`; otherwise an `InvalidStart`
  /// error is raised on the `"error"` signal.
  pub fn start(&self) -> &Self {
    let started = {
      let mut state = self.inner.state.lock();
      if state.status.is_startable() {
        state.status = TaskStatus::Running;
        state.cursor = 0;
        state.parked = None;
        Ok(state.steps.len())
      } else {
        Err(state.status)
      }
    };
    match started {
      Ok(steps) => {
        tracing::debug!(steps, "Task started");
        self.inner.main_loop(None);
      }
      Err(status) => self.inner.raise(FlowError::InvalidStart(status)),
    }
    self
  }

  /// Requests a pause at the next step boundary.
  ///
  /// Resolves once the pipeline is `Paused`; rejects with `PauseInterrupted`
  /// if `resume()` comes first, or `BeingCancelled` if a cancel wins.
  pub fn pause(&self) -> Promise<(), FlowError> {
    let (resolver, promise) = Deferred::new().split();
    let mut state = self.inner.state.lock();
    let status = state.status;
    match status {
      TaskStatus::Running | TaskStatus::PrePause => {
        state.status = TaskStatus::PrePause;
        // Registered under the state lock so the boundary cannot slip past it.
        self.inner.signals.add_once_listener(PAUSE_RESULT, settle_on(resolver));
        tracing::debug!("Task pause requested");
      }
      TaskStatus::Paused => {
        resolver.resolve(());
      }
      status => {
        resolver.reject(FlowError::NotRunning(status));
      }
    }
    promise
  }

  /// Continues a paused pipeline from the step after the last finished one,
  /// handing it what that step forwarded. Withdraws a pending pause.
  pub fn resume(&self) -> Promise<(), FlowError> {
    let mut state = self.inner.state.lock();
    let status = state.status;
    match status {
      TaskStatus::Running => Promise::resolved(()),
      TaskStatus::PrePause => {
        state.status = TaskStatus::Running;
        drop(state);
        tracing::debug!("Task pause withdrawn");
        self.inner.signals.emit(PAUSE_RESULT, &Some(FlowError::PauseInterrupted));
        Promise::resolved(())
      }
      TaskStatus::Paused => {
        state.status = TaskStatus::Running;
        let parked = state.parked.take();
        drop(state);
        tracing::debug!("Task resumed");
        self.inner.main_loop(parked);
        Promise::resolved(())
      }
      status => Promise::rejected(FlowError::NotRunning(status)),
    }
  }

  /// Cancels the pipeline: immediately when paused, otherwise at the next
  /// step boundary.
  pub fn cancel(&self) -> Promise<(), FlowError> {
    let (resolver, promise) = Deferred::new().split();
    let mut state = self.inner.state.lock();
    let status = state.status;
    match status {
      TaskStatus::Paused => {
        state.status = TaskStatus::Cancelled;
        state.parked = None;
        tracing::debug!("Paused task cancelled");
        resolver.resolve(());
      }
      TaskStatus::Running | TaskStatus::PrePause | TaskStatus::PreCancel => {
        state.status = TaskStatus::PreCancel;
        self.inner.signals.add_once_listener(CANCEL_RESULT, settle_on(resolver));
        tracing::debug!("Task cancel requested");
      }
      status => {
        resolver.reject(FlowError::NotRunning(status));
      }
    }
    promise
  }

  /// Observes every completed run.
  pub fn on_done<F>(&self, f: F) -> &Self
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.inner.signals.add_listener(DONE, SyncListener::observer(move |_| f()));
    self
  }

  /// Observes misuse reports and step failures.
  pub fn on_error<F>(&self, f: F) -> &Self
  where
    F: Fn(&FlowError) + Send + Sync + 'static,
  {
    self.inner.signals.add_listener(
      ERROR,
      SyncListener::observer(move |signal: &Signal| {
        if let Some(err) = signal {
          f(err);
        }
      }),
    );
    self
  }

  /// The raw signal channel (`"done"`, `"error"`, `"pause-result"`, `"cancel-result"`).
  pub fn signals(&self) -> &SyncEventEmitter<Signal> {
    &self.inner.signals
  }
}

impl<A> Clone for TaskPipeline<A> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<A: Send + 'static> Default for TaskPipeline<A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A> fmt::Debug for TaskPipeline<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("TaskPipeline")
      .field("status", &state.status)
      .field("cursor", &state.cursor)
      .field("steps", &state.steps.len())
      .finish()
  }
}
