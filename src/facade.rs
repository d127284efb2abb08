use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::StoreAddress;
use crate::error::{Error, Result};
use crate::observer::{ConnectionObserver, LogObserver};
use crate::store::{Connector, RedisConnector, StoreHandle};

pub const DEFAULT_SCAN_BATCH: usize = 100;

/// Which fields `hget` fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashFields {
    All,
    Single(String),
    List(Vec<String>),
}

impl From<&str> for HashFields {
    fn from(field: &str) -> Self {
        HashFields::Single(field.to_string())
    }
}

impl From<String> for HashFields {
    fn from(field: String) -> Self {
        HashFields::Single(field)
    }
}

impl From<Vec<String>> for HashFields {
    fn from(fields: Vec<String>) -> Self {
        HashFields::List(fields)
    }
}

impl From<&[&str]> for HashFields {
    fn from(fields: &[&str]) -> Self {
        HashFields::List(fields.iter().map(|f| f.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for HashFields {
    fn from(fields: [&str; N]) -> Self {
        HashFields::from(&fields[..])
    }
}

/// Field to value mapping returned by `hget`. A requested field that the hash
/// lacks maps to `None`.
pub type HashEntries = HashMap<String, Option<String>>;

struct Slot<H> {
    handle: Option<H>,
    // bumped on every successful connect, lets a failed command tell whether
    // the handle it used is still the current one
    generation: u64,
}

/// Typed convenience operations over one lazily opened store connection.
///
/// The connection is created by the first operation (or an explicit
/// `connect`) and reused afterwards. Connecting is single-flight: callers that
/// arrive while a connect is in progress wait for it instead of opening
/// their own handle. A command that fails because the connection was lost
/// clears the handle, so the next operation connects again. Nothing is
/// retried here.
pub struct KeyValueFacade<C: Connector = RedisConnector> {
    connector: C,
    address: StoreAddress,
    observer: Arc<dyn ConnectionObserver>,
    slot: Mutex<Slot<C::Handle>>,
}

impl KeyValueFacade<RedisConnector> {
    pub fn redis(address: StoreAddress) -> Self {
        KeyValueFacade::new(RedisConnector, address)
    }
}

impl<C: Connector> KeyValueFacade<C> {
    pub fn new(connector: C, address: StoreAddress) -> Self {
        KeyValueFacade {
            connector,
            address,
            observer: Arc::new(LogObserver),
            slot: Mutex::new(Slot {
                handle: None,
                generation: 0,
            }),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn address(&self) -> &StoreAddress {
        &self.address
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.handle.is_some()
    }

    pub async fn connect(&self) -> Result<()> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<(C::Handle, u64)> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = &slot.handle {
            return Ok((handle.clone(), slot.generation));
        }

        if slot.generation > 0 {
            self.observer.on_reconnecting(&self.address);
        }

        match self.connector.connect(&self.address).await {
            Ok(handle) => {
                slot.generation += 1;
                slot.handle = Some(handle.clone());
                self.observer.on_connect(&self.address);
                self.observer.on_ready(&self.address);
                Ok((handle, slot.generation))
            }
            Err(e) => {
                self.observer.on_error(&self.address, &e);
                Err(e)
            }
        }
    }

    async fn settle<T>(&self, generation: u64, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_connection() {
                self.observer.on_error(&self.address, e);
                let mut slot = self.slot.lock().await;
                if slot.generation == generation && slot.handle.take().is_some() {
                    self.observer.on_end(&self.address);
                }
            }
        }
        result
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let (mut handle, generation) = self.handle().await?;
        let result = handle.get(key).await;
        self.settle(generation, result).await
    }

    /// Reads from the hash at `key`.
    ///
    /// - `All` returns every field, or `None` when the hash is missing or empty.
    /// - `Single(f)` returns `{f: value}`, or `None` when the field is missing.
    /// - `List(fs)` returns every requested field, missing ones mapped to
    ///   `None`. When none of them exist the result is `None`.
    pub async fn hget(
        &self,
        key: &str,
        fields: impl Into<HashFields>,
    ) -> Result<Option<HashEntries>> {
        require_key(key)?;
        let fields = fields.into();
        if let HashFields::List(list) = &fields {
            if list.is_empty() {
                return Err(Error::invalid("field list is empty"));
            }
        }

        let (mut handle, generation) = self.handle().await?;
        match fields {
            HashFields::All => {
                let result = handle.hgetall(key).await;
                let all = self.settle(generation, result).await?;
                if all.is_empty() {
                    return Ok(None);
                }
                Ok(Some(all.into_iter().map(|(f, v)| (f, Some(v))).collect()))
            }
            HashFields::Single(field) => {
                let result = handle.hget(key, &field).await;
                let value = self.settle(generation, result).await?;
                Ok(value.map(|v| HashMap::from([(field, Some(v))])))
            }
            HashFields::List(list) => {
                let result = handle.hmget(key, &list).await;
                let values = self.settle(generation, result).await?;
                if values.iter().all(Option::is_none) {
                    return Ok(None);
                }
                Ok(Some(list.into_iter().zip(values).collect()))
            }
        }
    }

    /// Writes `value` at `key`. A positive `ttl` (seconds) makes the key
    /// expire; otherwise the key persists and any earlier TTL is dropped.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        let (mut handle, generation) = self.handle().await?;
        let result = handle.set(key, value, positive(ttl)).await;
        self.settle(generation, result).await
    }

    /// Merges `fields` into the hash at `key`, creating it if needed. A
    /// positive `ttl` applies to the whole key and is only set once the write
    /// succeeded. Without one, an existing TTL is kept.
    pub async fn hset<I, F, V>(&self, key: &str, fields: I, ttl: Option<u64>) -> Result<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        require_key(key)?;
        let fields: Vec<(String, String)> = fields
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .collect();
        if fields.is_empty() {
            return Err(Error::invalid("hash field mapping is empty"));
        }

        let (mut handle, generation) = self.handle().await?;
        let result = handle.hset(key, &fields, positive(ttl)).await;
        self.settle(generation, result).await
    }

    pub async fn hset_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Option<u64>,
    ) -> Result<()> {
        self.hset(key, [(field, value)], ttl).await
    }

    pub async fn del(&self, key: &str) -> Result<u64> {
        let (mut handle, generation) = self.handle().await?;
        let result = handle.del(key).await;
        self.settle(generation, result).await
    }

    pub async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        self.scan_batched(pattern, DEFAULT_SCAN_BATCH).await
    }

    /// Every key matching `pattern`, collected with cursor SCAN calls of
    /// `batch_size` until the cursor wraps back to 0. Keys reported more than
    /// once are returned once, in first-seen order.
    pub async fn scan_batched(&self, pattern: &str, batch_size: usize) -> Result<Vec<String>> {
        require_pattern(pattern, batch_size)?;

        let (mut handle, generation) = self.handle().await?;
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut cursor = 0;
        let mut round_trips = 0;
        loop {
            let result = handle.scan(cursor, pattern, batch_size).await;
            let (next, batch) = self.settle(generation, result).await?;
            round_trips += 1;

            for key in batch {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        log::debug!(
            "scan {} matched {} keys in {} round trips",
            pattern,
            keys.len(),
            round_trips
        );
        Ok(keys)
    }

    pub async fn unlink_by_pattern(&self, pattern: &str) -> Result<u64> {
        self.unlink_by_pattern_batched(pattern, DEFAULT_SCAN_BATCH).await
    }

    /// Scans for `pattern` and unlinks every match in a single UNLINK.
    /// Returns 0 without touching the store when nothing matched.
    pub async fn unlink_by_pattern_batched(
        &self,
        pattern: &str,
        batch_size: usize,
    ) -> Result<u64> {
        let keys = self.scan_batched(pattern, batch_size).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let (mut handle, generation) = self.handle().await?;
        let result = handle.unlink(&keys).await;
        self.settle(generation, result).await
    }

    /// Closes the connection if one is open. The next operation reconnects.
    pub async fn quit(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        match slot.handle.take() {
            Some(mut handle) => {
                let result = handle.quit().await;
                self.observer.on_end(&self.address);
                result
            }
            None => Ok(()),
        }
    }
}

fn positive(ttl: Option<u64>) -> Option<u64> {
    ttl.filter(|seconds| *seconds > 0)
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid("key is empty"));
    }
    Ok(())
}

fn require_pattern(pattern: &str, batch_size: usize) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::invalid("pattern is empty"));
    }
    if batch_size == 0 {
        return Err(Error::invalid("batch size must be positive"));
    }
    Ok(())
}
