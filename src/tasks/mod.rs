//! Tasks and calls.
//!
//! A [`Task`] wraps a body closure with the metadata that decides its command-line surface
//! (positional, optional, iterable and incrementing parameters, short flags, help text) and
//! the tasks that run around it. A [`Call`] binds a task to concrete values.

mod call;
mod task;

pub use call::{Call, call};
pub use task::{Body, BodyError, Param, Params, Task, TaskBuilder, TaskError};

pub(crate) use task::help_line;
