// src/lib.rs

//! coflow - cooperative asynchronous control-flow primitives.
//!
//! Everything here coordinates work that hands control back through
//! continuations: nothing is preempted, nothing times out, and ordering is
//! decided by who calls `next` when.

/// In-memory key/value tables with expiry.
pub mod cache;
/// Defines the error type shared by emitters and pipelines.
pub mod error;
/// Synchronous and asynchronous name-keyed event emitters.
pub mod events;
/// Deferreds, reference counters and the series driver.
pub mod runtime;
/// The cooperative step pipeline.
pub mod task;

// Re-export core types for user convenience, making them accessible directly
// from the crate root (e.g., `coflow::FlowError`, `coflow::TaskPipeline`).
pub use error::FlowError;
pub use events::{AsyncEventEmitter, AsyncListener, EmitterOptions, EventEmitter, Next, SyncEventEmitter, SyncListener};
pub use runtime::{Deferred, Promise, ReferenceCounter, Resolver};
pub use task::{Continuation, Step, TaskPipeline, TaskStatus};

// --- Top-Level Library Information Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// # Examples
///
/// ```
/// let (major, minor, patch) = coflow::version();
/// println!("coflow version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
