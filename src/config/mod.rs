//! Configuration for the queue manager: broker connection parameters and
//! process-level settings read from the environment.

mod connection;
pub use connection::*;

mod queue_config;
pub use queue_config::*;
