// src/events/async_emitter.rs

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use super::options::EmitterOptions;
use super::EventEmitter;
use crate::error::FlowError;
use crate::runtime::{Deferred, Promise, ReferenceCounter, Resolver, Series};

type AsyncCallback<A, E> = dyn Fn(Next<E>, A) + Send + Sync;

/// A listener for [`AsyncEventEmitter`].
///
/// The callback receives the emission's continuation and a clone of the
/// emitted arguments. It must eventually call [`Next::done`] or [`Next::fail`]
/// (from any thread, at any later time) for the emission to move on.
pub struct AsyncListener<A, E = FlowError> {
  callback: Arc<AsyncCallback<A, E>>,
}

impl<A, E> AsyncListener<A, E> {
  pub fn new<F>(callback: F) -> Self
  where
    F: Fn(Next<E>, A) + Send + Sync + 'static,
  {
    Self {
      callback: Arc::new(callback),
    }
  }

  /// Adapts an async closure into a continuation-passing listener.
  ///
  /// The future is spawned on the current Tokio runtime; its result is fed
  /// into the continuation. Panics outside a runtime, like `tokio::spawn`.
  pub fn from_future<F, Fut>(f: F) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Send + 'static,
  {
    Self::new(move |next, args| {
      let fut = f(args);
      tokio::spawn(async move {
        next.settle(fut.await);
      });
    })
  }

  /// True if both handles refer to the same registered callback.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.callback, &other.callback)
  }

  fn call(&self, next: Next<E>, args: A) {
    (self.callback)(next, args)
  }
}

impl<A, E> Clone for AsyncListener<A, E> {
  fn clone(&self) -> Self {
    Self {
      callback: Arc::clone(&self.callback),
    }
  }
}

impl<A, E> fmt::Debug for AsyncListener<A, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncListener")
      .field("callback", &Arc::as_ptr(&self.callback))
      .finish()
  }
}

/// How a listener handed control back.
enum Flow<E> {
  Continue,
  Stop,
  Fail(E),
}

/// Something an emission continuation can advance.
trait Advance<E>: Send + Sync {
  fn advance(self: Arc<Self>, flow: Flow<E>);
}

/// The continuation handed to each invoked listener.
///
/// Consumed on use, so a listener can hand control back only once. Dropping
/// it unused stalls the emission: its promise never settles.
pub struct Next<E = FlowError> {
  emission: Option<Arc<dyn Advance<E>>>,
}

impl<E> Next<E> {
  /// Proceeds to the next listener.
  pub fn done(self) {
    self.settle(Ok(()))
  }

  /// Halts the emission; its promise rejects with `error`.
  pub fn fail(self, error: E) {
    self.settle(Err(error))
  }

  /// Ends the emission successfully without calling the remaining listeners.
  pub fn stop(self) {
    self.advance(Flow::Stop)
  }

  pub fn settle(self, result: Result<(), E>) {
    match result {
      Ok(()) => self.advance(Flow::Continue),
      Err(err) => self.advance(Flow::Fail(err)),
    }
  }

  fn advance(mut self, flow: Flow<E>) {
    if let Some(emission) = self.emission.take() {
      emission.advance(flow);
    }
  }
}

impl<E> Drop for Next<E> {
  fn drop(&mut self) {
    if self.emission.is_some() {
      tracing::warn!("Listener continuation dropped without being called; the emission will never settle");
    }
  }
}

impl<E> fmt::Debug for Next<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Next").field("pending", &self.emission.is_some()).finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnceState {
  NotEmitted,
  Emitted,
}

struct ListenerRecord<A, E> {
  listener: AsyncListener<A, E>,
  // None for permanent listeners.
  once: Option<OnceState>,
}

struct ListenerQueue<A, E> {
  // Replaced whenever the queue is cleared; emissions started before that
  // stop dispatching from it.
  generation: u64,
  records: Vec<ListenerRecord<A, E>>,
}

struct EmitterState<A, E> {
  queues: LinkedHashMap<String, ListenerQueue<A, E>>,
  // One per name, created with the first registration. Kept apart from the
  // queues so in-flight emissions survive remove_all_listeners.
  counters: HashMap<String, ReferenceCounter>,
  last_generation: u64,
  options: EmitterOptions,
}

impl<A, E> EmitterState<A, E> {
  fn next_generation(&mut self) -> u64 {
    self.last_generation += 1;
    self.last_generation
  }

  /// Runs when the last in-flight emission of `name` finishes.
  fn sweep(&mut self, name: &str) {
    match self.queues.get_mut(name) {
      Some(queue) => {
        let before = queue.records.len();
        queue.records.retain(|record| record.once != Some(OnceState::Emitted));
        let removed = before - queue.records.len();
        if removed > 0 {
          tracing::trace!(event = name, removed, "Swept consumed once-listeners");
        }
      }
      None => {
        if self.counters.get(name).map_or(false, |counter| counter.references() == 0) {
          self.counters.remove(name);
          tracing::trace!(event = name, "Dropped emission counter of removed queue");
        }
      }
    }
  }
}

/// Ordered, asynchronous, continuation-passing event emitter.
///
/// Each `emit` walks the listeners of one name strictly in queue order, one at
/// a time: the next listener runs only after the previous one calls its
/// [`Next`]. Emissions of the same name may interleave; a once-listener still
/// fires at most once, and consumed once-listeners are only physically removed
/// when no emission of that name is in flight.
pub struct AsyncEventEmitter<A, E = FlowError> {
  state: Arc<Mutex<EmitterState<A, E>>>,
}

impl<A, E> AsyncEventEmitter<A, E>
where
  A: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  /// Creates an emitter that follows the process-wide listener capacity.
  pub fn new() -> Self {
    Self::with_options(EmitterOptions::default())
  }

  pub fn with_options(options: EmitterOptions) -> Self {
    tracing::debug!(max_listeners = ?options.max_listeners, "Created new AsyncEventEmitter");
    Self {
      state: Arc::new(Mutex::new(EmitterState {
        queues: LinkedHashMap::new(),
        counters: HashMap::new(),
        last_generation: 0,
        options,
      })),
    }
  }

  pub fn get_max_listeners(&self) -> i64 {
    self.state.lock().options.effective_max_listeners()
  }

  /// Overrides the capacity for this emitter only.
  pub fn set_max_listeners(&self, max: i64) -> &Self {
    tracing::debug!(max, "Setting emitter max listeners");
    self.state.lock().options.max_listeners = Some(max);
    self
  }

  /// Alias of [`EventEmitter::on`].
  pub fn add_listener(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, false, false)
  }

  /// Alias of [`EventEmitter::listen`].
  pub fn prepend_listener(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, false, true)
  }

  /// Alias of [`EventEmitter::listen_once`].
  pub fn prepend_once_listener(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, true, true)
  }

  fn register(&self, name: &str, listener: AsyncListener<A, E>, once: bool, prepend: bool) -> Result<&Self, FlowError> {
    let mut state = self.state.lock();
    let max = state.options.effective_max_listeners();
    let len = state.queues.get(name).map_or(0, |queue| queue.records.len());
    if max <= 0 || i64::try_from(len).map_or(true, |len| len >= max) {
      tracing::warn!(event = name, max, "Too many listeners registered");
      return Err(FlowError::TooManyListeners {
        name: name.to_string(),
        max,
      });
    }

    let record = ListenerRecord {
      listener,
      once: once.then_some(OnceState::NotEmitted),
    };
    if !state.queues.contains_key(name) {
      let generation = state.next_generation();
      state.queues.insert(
        name.to_string(),
        ListenerQueue {
          generation,
          records: Vec::new(),
        },
      );
    }
    if let Some(queue) = state.queues.get_mut(name) {
      if prepend {
        queue.records.insert(0, record);
      } else {
        queue.records.push(record);
      }
    }

    if !state.counters.contains_key(name) {
      let counter = ReferenceCounter::new();
      let weak = Arc::downgrade(&self.state);
      let swept = name.to_string();
      counter.on_empty(move || sweep_by_name(&weak, &swept));
      state.counters.insert(name.to_string(), counter);
    }
    tracing::trace!(event = name, once, prepend, "Registered listener");
    Ok(self)
  }

  /// Runs every listener of `name` in order with a clone of `args`.
  ///
  /// Resolves once the last listener hands control back, or rejects with the
  /// first error a listener passes to its continuation. Resolves immediately
  /// when nothing listens to `name`.
  pub fn emit(&self, name: &str, args: A) -> Promise<(), E> {
    let (resolver, promise) = Deferred::new().split();

    let prepared = {
      let state = self.state.lock();
      match (state.queues.get(name), state.counters.get(name)) {
        (Some(queue), Some(counter)) if !queue.records.is_empty() => {
          // Acquired under the lock so the counter cannot be dropped first.
          counter.acquire();
          Some((queue.records.len(), queue.generation, counter.clone()))
        }
        _ => None,
      }
    };
    let Some((len, generation, counter)) = prepared else {
      tracing::trace!(event = name, "Emit with no listeners");
      resolver.resolve(());
      return promise;
    };

    tracing::trace!(event = name, listeners = len, generation, "Emitting");
    let emission = Arc::new(Emission {
      state: Arc::clone(&self.state),
      name: name.to_string(),
      args,
      len,
      generation,
      cursor: AtomicUsize::new(0),
      counter,
      resolver,
      series: Series::new(),
    });
    emission.drive(Flow::Continue);
    promise
  }

  /// The callbacks registered for `name`, in dispatch order.
  pub fn listeners(&self, name: &str) -> Vec<AsyncListener<A, E>> {
    self
      .state
      .lock()
      .queues
      .get(name)
      .map(|queue| queue.records.iter().map(|record| record.listener.clone()).collect())
      .unwrap_or_default()
  }

  /// Removes the first record of `name` whose callback is `listener`.
  pub fn remove_listener(&self, name: &str, listener: &AsyncListener<A, E>) -> &Self {
    let mut state = self.state.lock();
    if let Some(queue) = state.queues.get_mut(name) {
      if let Some(index) = queue.records.iter().position(|record| record.listener.ptr_eq(listener)) {
        queue.records.remove(index);
        tracing::trace!(event = name, index, "Removed listener");
      }
    }
    self
  }

  /// Empties the queue of `name`, or drops every queue when `name` is `None`.
  ///
  /// Emissions already in flight for a cleared name call no further
  /// listeners, including ones registered after the clear.
  pub fn remove_all_listeners(&self, name: Option<&str>) -> &Self {
    let mut state = self.state.lock();
    match name {
      Some(name) => {
        let generation = state.next_generation();
        if let Some(queue) = state.queues.get_mut(name) {
          queue.generation = generation;
          queue.records.clear();
        }
      }
      None => {
        state.queues.clear();
        // Names with an emission in flight keep theirs until it finishes.
        state.counters.retain(|_, counter| counter.references() != 0);
      }
    }
    tracing::debug!(event = ?name, "Removed all listeners");
    self
  }
}

fn sweep_by_name<A, E>(state: &Weak<Mutex<EmitterState<A, E>>>, name: &str) {
  if let Some(state) = state.upgrade() {
    state.lock().sweep(name);
  }
}

impl<A, E> EventEmitter for AsyncEventEmitter<A, E>
where
  A: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  type Listener = AsyncListener<A, E>;

  fn on(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, false, false)
  }

  fn once(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, true, false)
  }

  fn listen(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, false, true)
  }

  fn listen_once(&self, name: &str, listener: AsyncListener<A, E>) -> Result<&Self, FlowError> {
    self.register(name, listener, true, true)
  }

  fn listener_count(&self, name: &str) -> usize {
    self.state.lock().queues.get(name).map_or(0, |queue| queue.records.len())
  }

  fn event_names(&self) -> Vec<String> {
    self.state.lock().queues.keys().cloned().collect()
  }
}

impl<A, E> Clone for AsyncEventEmitter<A, E> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<A, E> Default for AsyncEventEmitter<A, E>
where
  A: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<A, E> fmt::Debug for AsyncEventEmitter<A, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("AsyncEventEmitter")
      .field("events", &state.queues.keys().collect::<Vec<_>>())
      .field("options", &state.options)
      .finish()
  }
}

/// One in-flight `emit`: walks the queue of `name` by index.
struct Emission<A, E> {
  state: Arc<Mutex<EmitterState<A, E>>>,
  name: String,
  args: A,
  // Queue length when the emission started; later registrations are not visited.
  len: usize,
  // Queue generation when the emission started.
  generation: u64,
  cursor: AtomicUsize,
  counter: ReferenceCounter,
  resolver: Resolver<(), E>,
  series: Series<Flow<E>>,
}

impl<A, E> Emission<A, E>
where
  A: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  fn drive(self: &Arc<Self>, flow: Flow<E>) {
    self.series.advance_with(flow, |flow| self.step(flow));
  }

  fn step(self: &Arc<Self>, flow: Flow<E>) {
    match flow {
      Flow::Continue => {}
      Flow::Stop => {
        tracing::trace!(event = %self.name, "Listener stopped the emission");
        self.finish(Ok(()));
        return;
      }
      Flow::Fail(err) => {
        tracing::debug!(event = %self.name, "Listener failed, halting emission");
        self.finish(Err(err));
        return;
      }
    }

    loop {
      let index = self.cursor.fetch_add(1, Ordering::AcqRel);
      if index >= self.len {
        self.finish(Ok(()));
        return;
      }
      match self.claim(index) {
        Some(listener) => {
          tracing::trace!(event = %self.name, index, "Dispatching listener");
          let emission: Arc<dyn Advance<E>> = Arc::clone(self) as Arc<dyn Advance<E>>;
          listener.call(
            Next {
              emission: Some(emission),
            },
            self.args.clone(),
          );
          return;
        }
        None => tracing::trace!(event = %self.name, index, "Skipping removed or consumed listener"),
      }
    }
  }

  /// Fetches the record at `index`, marking a once-listener as emitted.
  /// Nothing is claimed from a queue cleared since the emission started.
  fn claim(&self, index: usize) -> Option<AsyncListener<A, E>> {
    let mut state = self.state.lock();
    let queue = state.queues.get_mut(&self.name)?;
    if queue.generation != self.generation {
      return None;
    }
    let record = queue.records.get_mut(index)?;
    match record.once {
      None => Some(record.listener.clone()),
      Some(OnceState::NotEmitted) => {
        record.once = Some(OnceState::Emitted);
        Some(record.listener.clone())
      }
      Some(OnceState::Emitted) => None,
    }
  }

  fn finish(&self, result: Result<(), E>) {
    // May sweep the queue; the state lock must not be held here.
    self.counter.release();
    tracing::trace!(event = %self.name, ok = result.is_ok(), "Emission finished");
    self.resolver.settle(result);
  }
}

impl<A, E> Advance<E> for Emission<A, E>
where
  A: Clone + Send + Sync + 'static,
  E: Send + 'static,
{
  fn advance(self: Arc<Self>, flow: Flow<E>) {
    self.drive(flow);
  }
}
