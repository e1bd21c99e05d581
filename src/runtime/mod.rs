// src/runtime/mod.rs

//! Core cooperative primitives: deferreds, reference counting and the series driver.

pub mod deferred;
pub mod reference;
pub(crate) mod series;

pub use deferred::{Deferred, Promise, Resolver};
pub use reference::ReferenceCounter;
pub(crate) use series::Series;
