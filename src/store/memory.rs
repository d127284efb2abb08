// in-process store with redis semantics for strings, hashes, ttl and scan
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::StoreAddress;
use crate::error::{Error, Result};
use crate::store::{Connector, StoreHandle};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A shared in-memory store. Clones see the same data.
///
/// Besides the data it keeps the bookkeeping tests need: how many handles
/// were created, how often each command ran, and switches to refuse or delay
/// connections or to sever every live handle.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    entries: Mutex<BTreeMap<String, Entry>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    connects: AtomicUsize,
    epoch: AtomicU64,
    refuse: AtomicBool,
    connect_delay_ms: AtomicU64,
    // scan cursor -> last key examined by the batch that handed it out
    cursors: Mutex<HashMap<u64, String>>,
    last_cursor: AtomicU64,
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

enum Value {
    Str(String),
    Hash(HashMap<String, String>),
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |at| at <= Instant::now())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.inner
            .connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Invalidates every handle created so far, as if the server dropped
    /// all its clients.
    pub fn sever_connections(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn command_count(&self, command: &str) -> usize {
        self.inner
            .calls
            .lock()
            .map(|calls| calls.get(command).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .map(|entries| entries.values().filter(|e| !e.is_expired()).count())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`, `None` if the key is missing or
    /// persistent.
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        let entries = self.inner.entries.lock().ok()?;
        let entry = entries.get(key).filter(|e| !e.is_expired())?;
        entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl Connector for MemoryStore {
    type Handle = MemoryConnection;

    async fn connect(&self, _address: &StoreAddress) -> Result<MemoryConnection> {
        let delay = self.inner.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection("connection refused"));
        }

        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.clone(),
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            open: Arc::new(AtomicBool::new(true)),
        })
    }
}

/// Handle to a `MemoryStore`. Clones share one session: quitting any of
/// them closes all.
#[derive(Clone)]
pub struct MemoryConnection {
    store: MemoryStore,
    epoch: u64,
    open: Arc<AtomicBool>,
}

type Entries<'a> = MutexGuard<'a, BTreeMap<String, Entry>>;

impl MemoryConnection {
    fn check(&self, command: &'static str) -> Result<()> {
        let shared = &self.store.inner;
        if !self.open.load(Ordering::SeqCst) || self.epoch != shared.epoch.load(Ordering::SeqCst) {
            return Err(Error::connection("connection closed"));
        }

        let mut calls = shared
            .calls
            .lock()
            .map_err(|e| Error::command(command, e.to_string()))?;
        *calls.entry(command).or_default() += 1;
        Ok(())
    }

    fn begin(&self, command: &'static str) -> Result<Entries<'_>> {
        self.check(command)?;
        self.store
            .inner
            .entries
            .lock()
            .map_err(|e| Error::command(command, e.to_string()))
    }
}

// drops `key` first if it has expired
fn live<'a>(entries: &'a mut BTreeMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if entries.get(key).map_or(false, Entry::is_expired) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn deadline(seconds: u64) -> Instant {
    Instant::now() + Duration::from_secs(seconds)
}

#[async_trait]
impl StoreHandle for MemoryConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let mut entries = self.begin("GET")?;
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(Error::command("GET", WRONGTYPE)),
        }
    }

    async fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        let mut entries = self.begin("SET")?;
        if ttl == Some(0) {
            return Err(Error::command(
                "SET",
                "ERR invalid expire time in 'set' command",
            ));
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(deadline),
            },
        );
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        let mut entries = self.begin("HGET")?;
        match live(&mut entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.get(field).cloned()),
            Some(_) => Err(Error::command("HGET", WRONGTYPE)),
        }
    }

    async fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        let mut entries = self.begin("HMGET")?;
        if fields.is_empty() {
            return Err(Error::command(
                "HMGET",
                "ERR wrong number of arguments for 'hmget' command",
            ));
        }

        match live(&mut entries, key) {
            None => Ok(vec![None; fields.len()]),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(fields.iter().map(|f| h.get(f).cloned()).collect()),
            Some(_) => Err(Error::command("HMGET", WRONGTYPE)),
        }
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        let mut entries = self.begin("HGETALL")?;
        match live(&mut entries, key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.clone()),
            Some(_) => Err(Error::command("HGETALL", WRONGTYPE)),
        }
    }

    async fn hset(
        &mut self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<u64>,
    ) -> Result<()> {
        let mut entries = self.begin("HSET")?;
        let command = if ttl.is_some() { "HSET/EXPIRE" } else { "HSET" };
        if fields.is_empty() {
            return Err(Error::command(
                command,
                "ERR wrong number of arguments for 'hset' command",
            ));
        }

        live(&mut entries, key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(h) => h.extend(fields.iter().cloned()),
            Value::Str(_) => return Err(Error::command(command, WRONGTYPE)),
        }

        match ttl {
            // EXPIRE with a non-positive ttl deletes the key
            Some(0) => {
                entries.remove(key);
            }
            Some(seconds) => entry.expires_at = Some(deadline(seconds)),
            None => {}
        }
        Ok(())
    }

    async fn del(&mut self, key: &str) -> Result<u64> {
        let mut entries = self.begin("DEL")?;
        Ok(match entries.remove(key) {
            Some(entry) if !entry.is_expired() => 1,
            _ => 0,
        })
    }

    async fn scan(
        &mut self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>)> {
        let mut entries = self.begin("SCAN")?;
        entries.retain(|_, entry| !entry.is_expired());

        let mut cursors = self
            .store
            .inner
            .cursors
            .lock()
            .map_err(|e| Error::command("SCAN", e.to_string()))?;
        let resume = match cursor {
            0 => None,
            _ => Some(
                cursors
                    .remove(&cursor)
                    .ok_or_else(|| Error::command("SCAN", "ERR invalid cursor"))?,
            ),
        };
        let lower = resume.as_deref().map_or(Unbounded, Excluded);

        // COUNT bounds the keys examined, not the keys returned
        let mut last = None;
        let mut batch = Vec::new();
        let examined = entries
            .range::<str, _>((lower, Unbounded))
            .take(count.max(1));
        for (key, _) in examined {
            if glob_match(pattern, key) {
                batch.push(key.clone());
            }
            last = Some(key.clone());
        }

        let next = match last {
            Some(last)
                if entries
                    .range::<str, _>((Excluded(last.as_str()), Unbounded))
                    .next()
                    .is_some() =>
            {
                let next = self.store.inner.last_cursor.fetch_add(1, Ordering::SeqCst) + 1;
                cursors.insert(next, last);
                next
            }
            _ => 0,
        };
        Ok((next, batch))
    }

    async fn unlink(&mut self, keys: &[String]) -> Result<u64> {
        let mut entries = self.begin("UNLINK")?;
        if keys.is_empty() {
            return Err(Error::command(
                "UNLINK",
                "ERR wrong number of arguments for 'unlink' command",
            ));
        }

        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn quit(&mut self) -> Result<()> {
        self.check("QUIT")?;
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Redis glob matching: `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(p: &[char], t: &[char]) -> bool {
    let (mut pi, mut ti) = (0, 0);
    while pi < p.len() {
        match p[pi] {
            '*' => {
                while pi + 1 < p.len() && p[pi + 1] == '*' {
                    pi += 1;
                }
                if pi + 1 == p.len() {
                    return true;
                }
                return (ti..=t.len()).any(|start| match_from(&p[pi + 1..], &t[start..]));
            }
            '?' => {
                if ti >= t.len() {
                    return false;
                }
                ti += 1;
            }
            '[' => {
                if ti >= t.len() {
                    return false;
                }
                let (matched, next) = match_class(p, pi + 1, t[ti]);
                if !matched {
                    return false;
                }
                pi = next;
                ti += 1;
                continue;
            }
            '\\' if pi + 1 < p.len() => {
                pi += 1;
                if ti >= t.len() || p[pi] != t[ti] {
                    return false;
                }
                ti += 1;
            }
            c => {
                if ti >= t.len() || c != t[ti] {
                    return false;
                }
                ti += 1;
            }
        }
        pi += 1;
    }
    ti == t.len()
}

// matches `c` against the class starting at `p[i]`, returns the verdict and
// the index just past the closing bracket. An unterminated class runs to the
// end of the pattern.
fn match_class(p: &[char], mut i: usize, c: char) -> (bool, usize) {
    let negate = i < p.len() && p[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < p.len() && p[i] != ']' {
        if p[i] == '\\' && i + 1 < p.len() {
            i += 1;
            matched |= p[i] == c;
        } else if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            let (lo, hi) = if p[i] <= p[i + 2] {
                (p[i], p[i + 2])
            } else {
                (p[i + 2], p[i])
            };
            matched |= lo <= c && c <= hi;
            i += 2;
        } else {
            matched |= p[i] == c;
        }
        i += 1;
    }

    (matched != negate, i + 1)
}
