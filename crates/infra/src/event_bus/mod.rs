//! Broker-backed bus implementations.
//!
//! The bus contract and the in-process broker live in `medchain-events`;
//! this module adds transports that need a running server.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisBusError, RedisStreamsBus};
