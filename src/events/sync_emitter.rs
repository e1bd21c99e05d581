// src/events/sync_emitter.rs

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use super::EventEmitter;
use crate::error::FlowError;

type SyncCallback<A> = dyn Fn(&A) -> ControlFlow<()> + Send + Sync;

/// A listener for [`SyncEventEmitter`].
///
/// Returning `ControlFlow::Break(())` stops delivery to the listeners after it.
/// Clones share identity, which is what `unbind` matches on.
pub struct SyncListener<A> {
  callback: Arc<SyncCallback<A>>,
}

impl<A> SyncListener<A> {
  pub fn new<F>(callback: F) -> Self
  where
    F: Fn(&A) -> ControlFlow<()> + Send + Sync + 'static,
  {
    Self {
      callback: Arc::new(callback),
    }
  }

  /// A listener that never stops delivery.
  pub fn observer<F>(callback: F) -> Self
  where
    F: Fn(&A) + Send + Sync + 'static,
  {
    Self::new(move |args| {
      callback(args);
      ControlFlow::Continue(())
    })
  }

  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.callback, &other.callback)
  }

  fn call(&self, args: &A) -> ControlFlow<()> {
    (self.callback)(args)
  }
}

impl<A> Clone for SyncListener<A> {
  fn clone(&self) -> Self {
    Self {
      callback: Arc::clone(&self.callback),
    }
  }
}

impl<A> fmt::Debug for SyncListener<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SyncListener")
      .field("callback", &Arc::as_ptr(&self.callback))
      .finish()
  }
}

struct SyncRecord<A> {
  listener: SyncListener<A>,
  once: bool,
}

/// Name-keyed event emitter with synchronous delivery.
///
/// `emit` calls the listeners registered at the moment of the call, in order,
/// on the caller's stack. The internal lock is never held while a listener
/// runs, so listeners may register, unbind or emit again.
pub struct SyncEventEmitter<A> {
  events: Arc<Mutex<LinkedHashMap<String, Vec<SyncRecord<A>>>>>,
}

impl<A> SyncEventEmitter<A> {
  pub fn new() -> Self {
    Self {
      events: Arc::new(Mutex::new(LinkedHashMap::new())),
    }
  }

  /// Appends a permanent listener.
  pub fn add_listener(&self, name: &str, listener: SyncListener<A>) -> &Self {
    self.insert(name, SyncRecord { listener, once: false }, false)
  }

  /// Appends a listener that is removed right before its first call.
  pub fn add_once_listener(&self, name: &str, listener: SyncListener<A>) -> &Self {
    self.insert(name, SyncRecord { listener, once: true }, false)
  }

  fn insert(&self, name: &str, record: SyncRecord<A>, prepend: bool) -> &Self {
    let mut events = self.events.lock();
    if !events.contains_key(name) {
      events.insert(name.to_string(), Vec::new());
    }
    if let Some(records) = events.get_mut(name) {
      if prepend {
        records.insert(0, record);
      } else {
        records.push(record);
      }
    }
    self
  }

  /// Delivers `args` to every listener of `name`.
  ///
  /// Returns `false` if nothing was listening.
  pub fn emit(&self, name: &str, args: &A) -> bool {
    let snapshot: Vec<(SyncListener<A>, bool)> = {
      let events = self.events.lock();
      match events.get(name) {
        Some(records) if !records.is_empty() => records.iter().map(|r| (r.listener.clone(), r.once)).collect(),
        _ => return false,
      }
    };

    for (listener, once) in snapshot {
      // A one-shot listener may already have been consumed by a nested emit.
      if once && !self.take_once(name, &listener) {
        continue;
      }
      if listener.call(args).is_break() {
        tracing::trace!(event = name, "Sync listener stopped delivery");
        break;
      }
    }
    true
  }

  fn take_once(&self, name: &str, listener: &SyncListener<A>) -> bool {
    let mut events = self.events.lock();
    let Some(records) = events.get_mut(name) else {
      return false;
    };
    match records.iter().position(|r| r.once && r.listener.ptr_eq(listener)) {
      Some(index) => {
        records.remove(index);
        true
      }
      None => false,
    }
  }

  /// Removes one listener of `name` by identity, or every listener of `name`
  /// when `listener` is `None`. Returns how many were removed.
  pub fn unbind(&self, name: &str, listener: Option<&SyncListener<A>>) -> usize {
    let mut events = self.events.lock();
    match listener {
      Some(listener) => {
        let Some(records) = events.get_mut(name) else {
          return 0;
        };
        match records.iter().position(|r| r.listener.ptr_eq(listener)) {
          Some(index) => {
            records.remove(index);
            1
          }
          None => 0,
        }
      }
      None => events.remove(name).map_or(0, |records| records.len()),
    }
  }
}

impl<A> EventEmitter for SyncEventEmitter<A> {
  type Listener = SyncListener<A>;

  fn on(&self, name: &str, listener: SyncListener<A>) -> Result<&Self, FlowError> {
    Ok(self.insert(name, SyncRecord { listener, once: false }, false))
  }

  fn once(&self, name: &str, listener: SyncListener<A>) -> Result<&Self, FlowError> {
    Ok(self.insert(name, SyncRecord { listener, once: true }, false))
  }

  fn listen(&self, name: &str, listener: SyncListener<A>) -> Result<&Self, FlowError> {
    Ok(self.insert(name, SyncRecord { listener, once: false }, true))
  }

  fn listen_once(&self, name: &str, listener: SyncListener<A>) -> Result<&Self, FlowError> {
    Ok(self.insert(name, SyncRecord { listener, once: true }, true))
  }

  fn listener_count(&self, name: &str) -> usize {
    self.events.lock().get(name).map_or(0, Vec::len)
  }

  fn event_names(&self) -> Vec<String> {
    self.events.lock().keys().cloned().collect()
  }
}

impl<A> Clone for SyncEventEmitter<A> {
  fn clone(&self) -> Self {
    Self {
      events: Arc::clone(&self.events),
    }
  }
}

impl<A> Default for SyncEventEmitter<A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<A> fmt::Debug for SyncEventEmitter<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SyncEventEmitter")
      .field("events", &self.event_names())
      .finish()
  }
}
