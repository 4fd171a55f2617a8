//! Redis queue backend built on Apalis.
//!
//! Each processor gets its own `RedisStorage` namespaced by its queue name;
//! all storages share one multiplexed connection.

mod backend;
mod worker;

pub use backend::{RedisBackend, RedisQueue};
pub use worker::RedisWorker;
