// src/task/step.rs

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::pipeline::TaskInner;
use crate::error::FlowError;

type StepFn<A> = dyn Fn(Continuation<A>, Option<A>) + Send + Sync;

/// One unit of work in a [`TaskPipeline`](super::TaskPipeline).
///
/// The function receives the continuation and whatever the previous step
/// forwarded (`None` for the first step of a run).
pub struct Step<A> {
  work: Arc<StepFn<A>>,
}

impl<A> Step<A> {
  pub fn new<F>(work: F) -> Self
  where
    F: Fn(Continuation<A>, Option<A>) + Send + Sync + 'static,
  {
    Self { work: Arc::new(work) }
  }

  /// Adapts an async closure into a step.
  ///
  /// `Ok(Some(a))` forwards `a`, `Ok(None)` forwards nothing and `Err` fails
  /// the step. The future is spawned on the current Tokio runtime.
  pub fn from_future<F, Fut>(f: F) -> Self
  where
    F: Fn(Option<A>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<A>, FlowError>> + Send + 'static,
    A: Send + 'static,
  {
    Self::new(move |next, args| {
      let fut = f(args);
      tokio::spawn(async move {
        match fut.await {
          Ok(Some(forward)) => next.proceed_with(forward),
          Ok(None) => next.proceed(),
          Err(err) => next.fail(err),
        }
      });
    })
  }

  pub(super) fn call(&self, next: Continuation<A>, args: Option<A>) {
    (self.work)(next, args)
  }
}

impl<A> Clone for Step<A> {
  fn clone(&self) -> Self {
    Self {
      work: Arc::clone(&self.work),
    }
  }
}

impl<A> fmt::Debug for Step<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Step").field("work", &Arc::as_ptr(&self.work)).finish()
  }
}

/// Hands control back to the pipeline once a step is finished.
///
/// Clones share a single "called" flag: the first use advances the pipeline,
/// any later use is reported on the `"error"` signal and otherwise ignored.
pub struct Continuation<A> {
  task: Arc<TaskInner<A>>,
  called: Arc<AtomicBool>,
}

impl<A: Send + 'static> Continuation<A> {
  pub(super) fn new(task: Arc<TaskInner<A>>) -> Self {
    Self {
      task,
      called: Arc::new(AtomicBool::new(false)),
    }
  }

  /// Moves to the next step without forwarding anything.
  pub fn proceed(self) {
    self.forward(None)
  }

  /// Moves to the next step, handing it `args`.
  pub fn proceed_with(self, args: A) {
    self.forward(Some(args))
  }

  /// Stops the pipeline with `error`.
  pub fn fail(self, error: FlowError) {
    if self.claim() {
      self.task.fail(error);
    }
  }

  /// Whether this continuation (or a clone) was already used.
  pub fn is_called(&self) -> bool {
    self.called.load(Ordering::Acquire)
  }

  fn forward(self, args: Option<A>) {
    if self.claim() {
      self.task.advance(args);
    }
  }

  fn claim(&self) -> bool {
    if self.called.swap(true, Ordering::AcqRel) {
      self.task.raise(FlowError::ContinuationReused);
      return false;
    }
    true
  }
}

impl<A> Clone for Continuation<A> {
  fn clone(&self) -> Self {
    Self {
      task: Arc::clone(&self.task),
      called: Arc::clone(&self.called),
    }
  }
}

impl<A> fmt::Debug for Continuation<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Continuation")
      .field("called", &self.called.load(Ordering::Relaxed))
      .finish()
  }
}
