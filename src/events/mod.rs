// src/events/mod.rs

//! Name-keyed event emitters with synchronous and asynchronous dispatch.

pub mod async_emitter;
pub mod options;
pub mod sync_emitter;

pub use async_emitter::{AsyncEventEmitter, AsyncListener, Next};
pub use options::{default_max_listeners, set_default_max_listeners, EmitterOptions, DEFAULT_MAX_LISTENERS};
pub use sync_emitter::{SyncEventEmitter, SyncListener};

use crate::error::FlowError;

/// The registration surface shared by every emitter variant.
///
/// `on`/`once` append to the queue of `name`, `listen`/`listen_once` put the
/// listener in front of it. The `once` forms fire at most once. All of them
/// return the emitter so registrations chain with `?`.
pub trait EventEmitter {
  type Listener;

  fn on(&self, name: &str, listener: Self::Listener) -> Result<&Self, FlowError>;

  fn once(&self, name: &str, listener: Self::Listener) -> Result<&Self, FlowError>;

  fn listen(&self, name: &str, listener: Self::Listener) -> Result<&Self, FlowError>;

  fn listen_once(&self, name: &str, listener: Self::Listener) -> Result<&Self, FlowError>;

  fn listener_count(&self, name: &str) -> usize;

  /// Names that have a queue, in first-registration order.
  fn event_names(&self) -> Vec<String>;
}
