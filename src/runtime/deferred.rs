// src/runtime/deferred.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A settle-once future whose resolve/reject capabilities live outside of it.
///
/// `Deferred` is created fresh by whatever operation needs to hand back an
/// asynchronous result, split into a [`Resolver`] (kept by the code that will
/// eventually produce the result) and a [`Promise`] (returned to the caller).
#[derive(Debug)]
pub struct Deferred<T, E> {
  resolver: Resolver<T, E>,
  promise: Promise<T, E>,
}

impl<T, E> Deferred<T, E> {
  /// Creates a pending deferred.
  pub fn new() -> Self {
    let (sender, receiver) = oneshot::channel();
    Self {
      resolver: Resolver {
        inner: Arc::new(Mutex::new(Some(sender))),
      },
      promise: Promise {
        state: PromiseState::Waiting(receiver),
      },
    }
  }

  /// Settles the promise with a value. Returns `false` if it was already settled.
  pub fn resolve(&self, value: T) -> bool {
    self.resolver.resolve(value)
  }

  /// Settles the promise with an error. Returns `false` if it was already settled.
  pub fn reject(&self, error: E) -> bool {
    self.resolver.reject(error)
  }

  /// Returns another handle to the settle capabilities.
  pub fn resolver(&self) -> Resolver<T, E> {
    self.resolver.clone()
  }

  /// Separates the settle capabilities from the future.
  pub fn split(self) -> (Resolver<T, E>, Promise<T, E>) {
    (self.resolver, self.promise)
  }

  /// Drops the local settle capabilities and keeps the future.
  ///
  /// Unless a resolver was cloned out first, the returned promise never settles.
  pub fn into_promise(self) -> Promise<T, E> {
    self.promise
  }
}

impl<T, E> Default for Deferred<T, E> {
  fn default() -> Self {
    Self::new()
  }
}

/// The resolve/reject capabilities of a [`Deferred`].
///
/// Clones share one slot; the first `settle` takes the sender and every
/// later call is a no-op that returns `false`.
pub struct Resolver<T, E> {
  inner: Arc<Mutex<Option<oneshot::Sender<Result<T, E>>>>>,
}

impl<T, E> Resolver<T, E> {
  pub fn resolve(&self, value: T) -> bool {
    self.settle(Ok(value))
  }

  pub fn reject(&self, error: E) -> bool {
    self.settle(Err(error))
  }

  /// Settles with either outcome. Returns `true` only for the first call.
  pub fn settle(&self, result: Result<T, E>) -> bool {
    let sender = self.inner.lock().take();
    match sender {
      Some(sender) => {
        // The promise may already be gone; that's a normal outcome.
        let _ = sender.send(result);
        true
      }
      None => false,
    }
  }

  pub fn is_settled(&self) -> bool {
    self.inner.lock().is_none()
  }
}

impl<T, E> Clone for Resolver<T, E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Resolver").field("settled", &self.is_settled()).finish()
  }
}

enum PromiseState<T, E> {
  Ready(Option<Result<T, E>>),
  Waiting(oneshot::Receiver<Result<T, E>>),
  Abandoned,
}

/// The future half of a [`Deferred`].
///
/// If every [`Resolver`] is dropped without settling, the promise stays
/// pending forever, exactly like a continuation that is never called.
pub struct Promise<T, E> {
  state: PromiseState<T, E>,
}

impl<T, E> Promise<T, E> {
  /// A promise that is already fulfilled.
  pub fn resolved(value: T) -> Self {
    Self {
      state: PromiseState::Ready(Some(Ok(value))),
    }
  }

  /// A promise that is already rejected.
  pub fn rejected(error: E) -> Self {
    Self {
      state: PromiseState::Ready(Some(Err(error))),
    }
  }
}

// Values are only moved out, never pinned in place.
impl<T, E> Unpin for Promise<T, E> {}

impl<T, E> Future for Promise<T, E> {
  type Output = Result<T, E>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    match &mut this.state {
      PromiseState::Ready(slot) => match slot.take() {
        Some(result) => Poll::Ready(result),
        None => panic!("Promise polled after completion"),
      },
      PromiseState::Waiting(receiver) => match Pin::new(receiver).poll(cx) {
        Poll::Ready(Ok(result)) => {
          this.state = PromiseState::Ready(None);
          Poll::Ready(result)
        }
        Poll::Ready(Err(_closed)) => {
          tracing::trace!("Promise abandoned by all resolvers; staying pending");
          this.state = PromiseState::Abandoned;
          Poll::Pending
        }
        Poll::Pending => Poll::Pending,
      },
      PromiseState::Abandoned => Poll::Pending,
    }
  }
}

impl<T, E> fmt::Debug for Promise<T, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match self.state {
      PromiseState::Ready(Some(_)) => "ready",
      PromiseState::Ready(None) => "consumed",
      PromiseState::Waiting(_) => "waiting",
      PromiseState::Abandoned => "abandoned",
    };
    f.debug_struct("Promise").field("state", &state).finish()
  }
}
