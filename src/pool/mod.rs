//! Backend connection pooling.

mod connection;
mod manager;

pub use connection::{ConnectionError, PooledConnection};
pub use manager::PoolManager;
