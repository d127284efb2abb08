use crate::config::StoreAddress;
use crate::error::Error;

/// Receives connection lifecycle events from a facade.
///
/// Observers only watch: they run inline on the caller's task and have no say
/// over connecting, reconnecting or error propagation.
pub trait ConnectionObserver: Send + Sync {
    fn on_connect(&self, _address: &StoreAddress) {}

    fn on_ready(&self, _address: &StoreAddress) {}

    fn on_error(&self, _address: &StoreAddress, _error: &Error) {}

    fn on_reconnecting(&self, _address: &StoreAddress) {}

    fn on_end(&self, _address: &StoreAddress) {}
}

/// Default observer, writes every event to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ConnectionObserver for LogObserver {
    fn on_connect(&self, address: &StoreAddress) {
        log::info!("{} connected to store", address);
    }

    fn on_ready(&self, address: &StoreAddress) {
        log::info!("store client for {} is ready", address);
    }

    fn on_error(&self, address: &StoreAddress, error: &Error) {
        log::error!("store connection error on {}: {}", address, error);
    }

    fn on_reconnecting(&self, address: &StoreAddress) {
        log::info!("reconnecting to {}", address);
    }

    fn on_end(&self, address: &StoreAddress) {
        log::info!("store connection to {} closed", address);
    }
}
