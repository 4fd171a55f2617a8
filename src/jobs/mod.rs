//! Job declarations and the execution path shared by every queue backend.

mod job;
pub use job::*;

mod handler_error;
pub use handler_error::*;

mod processor;
pub use processor::*;

mod context;
pub use context::*;

mod runner;
pub use runner::execute_job;
