// src/task/mod.rs

//! A sequential, pausable, cancelable step pipeline.

pub mod pipeline;
pub mod status;
pub mod step;

pub use pipeline::{Signal, TaskPipeline, CANCEL_RESULT, DONE, ERROR, PAUSE_RESULT};
pub use status::TaskStatus;
pub use step::{Continuation, Step};
