// tests/common.rs
#![allow(dead_code)] // Not every test binary uses every helper

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

/// Installs a test-writer tracing subscriber once per test binary.
/// Can be overridden by the RUST_LOG env variable.
pub fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    let default_filter = "coflow=trace,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_max_level(tracing::Level::TRACE)
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// A shared, ordered log that listeners and steps append to.
#[derive(Clone, Default)]
pub struct Journal {
  entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, entry: impl Into<String>) {
    self.entries.lock().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.entries.lock().clone()
  }

  pub fn count(&self, entry: &str) -> usize {
    self.entries.lock().iter().filter(|e| *e == entry).count()
  }
}

/// Parks continuations handed to it so a test can release them later.
pub struct Parking<T> {
  slots: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Parking<T> {
  fn clone(&self) -> Self {
    Self {
      slots: Arc::clone(&self.slots),
    }
  }
}

impl<T> Parking<T> {
  pub fn new() -> Self {
    Self {
      slots: Arc::new(Mutex::new(Vec::new())),
    }
  }

  pub fn park(&self, item: T) {
    self.slots.lock().push(item);
  }

  pub fn len(&self) -> usize {
    self.slots.lock().len()
  }

  /// Takes the oldest parked item.
  pub fn take(&self) -> T {
    let mut slots = self.slots.lock();
    assert!(!slots.is_empty(), "nothing parked");
    slots.remove(0)
  }
}
