use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::StoreAddress;
use crate::error::Result;

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryConnection, MemoryStore};
pub use self::redis::{RedisConnection, RedisConnector};

/// Opens connection handles to a store.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: StoreHandle;

    /// Creates a handle and completes the initial handshake. Failures are
    /// reported as `Error::Connection`.
    async fn connect(&self, address: &StoreAddress) -> Result<Self::Handle>;
}

/// A live session to the store, one method per store primitive.
///
/// Clones share the same underlying session; the store client orders the
/// commands sent over it.
#[async_trait]
pub trait StoreHandle: Clone + Send + Sync + 'static {
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// SET, with EX when `ttl` is given. A plain SET drops any previous TTL.
    async fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> Result<()>;

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>>;

    /// HSET of every pair. With `ttl`, EXPIRE follows atomically and only when
    /// the HSET succeeded.
    async fn hset(&mut self, key: &str, fields: &[(String, String)], ttl: Option<u64>)
        -> Result<()>;

    async fn del(&mut self, key: &str) -> Result<u64>;

    /// One SCAN round trip. Returns the next cursor (0 once exhausted) and
    /// the batch of matching keys.
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize)
        -> Result<(u64, Vec<String>)>;

    async fn unlink(&mut self, keys: &[String]) -> Result<u64>;

    async fn quit(&mut self) -> Result<()>;
}
