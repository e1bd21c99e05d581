// src/runtime/series.rs

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

/// Drives a sequence of cooperative steps one advancement at a time.
///
/// A step hands control back by requesting the next advancement, possibly
/// from inside its own call (a listener that completes synchronously). Such
/// nested requests are queued and picked up by the loop already on the stack,
/// so long chains of synchronous steps run iteratively instead of recursing.
/// Requests from other threads while a loop is active are queued the same way.
pub(crate) struct Series<T> {
  state: Mutex<SeriesState<T>>,
}

struct SeriesState<T> {
  active: bool,
  queued: VecDeque<T>,
}

impl<T> Series<T> {
  pub(crate) fn new() -> Self {
    Self {
      state: Mutex::new(SeriesState {
        active: false,
        queued: VecDeque::new(),
      }),
    }
  }

  /// Runs `advance(input)` now, or queues `input` for the loop that is
  /// already running. `advance` is never called concurrently with itself.
  ///
  /// A queued input is processed with the `advance` of the running loop, so
  /// every caller of one series must pass the same advancement logic.
  pub(crate) fn advance_with(&self, input: T, mut advance: impl FnMut(T)) {
    {
      let mut state = self.state.lock();
      if state.active {
        state.queued.push_back(input);
        return;
      }
      state.active = true;
    }

    let mut next = input;
    loop {
      advance(next);
      let mut state = self.state.lock();
      match state.queued.pop_front() {
        Some(queued) => next = queued,
        None => {
          state.active = false;
          return;
        }
      }
    }
  }
}

impl<T> fmt::Debug for Series<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Series")
      .field("active", &state.active)
      .field("queued", &state.queued.len())
      .finish()
  }
}
