// kv-facade: a thin typed facade over a remote key-value store

pub mod config;
pub mod error;
pub mod facade;
pub mod observer;
pub mod store;

pub use config::{StoreAddress, StoreConfig};
pub use error::{Error, Result};
pub use facade::{HashEntries, HashFields, KeyValueFacade, DEFAULT_SCAN_BATCH};
pub use observer::{ConnectionObserver, LogObserver};

#[cfg(test)]
pub mod tests;
