// store address parsing and the side-channel connection config
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

const PLAIN_SCHEME: &str = "redis";
const TLS_SCHEME: &str = "rediss";
const INSECURE_FRAGMENT: &str = "insecure";

/// A normalized store address.
///
/// Accepts a bare `host[:port]` or a full `redis://` / `rediss://` URL with
/// optional credentials, database path and `#insecure` fragment. The port is
/// always explicit after parsing.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreAddress {
    url: Url,
}

impl StoreAddress {
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_with_port(input, DEFAULT_PORT)
    }

    /// Parses `input`, using `fallback_port` when the address names none.
    pub fn parse_with_port(input: &str, fallback_port: u16) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::invalid("store address is empty"));
        }

        let qualified = if input.contains("://") {
            input.to_string()
        } else {
            format!("{}://{}", PLAIN_SCHEME, input)
        };

        let mut url = Url::parse(&qualified)
            .map_err(|e| Error::invalid(format!("malformed store address {}: {}", input, e)))?;

        if url.scheme() != PLAIN_SCHEME && url.scheme() != TLS_SCHEME {
            return Err(Error::invalid(format!(
                "unsupported scheme {} in store address",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::invalid(format!("store address {} has no host", input)));
        }
        if url.port().is_none() {
            url.set_port(Some(fallback_port))
                .map_err(|_| Error::invalid(format!("cannot set port on {}", input)))?;
        }

        let address = StoreAddress { url };
        address.parse_db()?;
        Ok(address)
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.url.port().unwrap_or(DEFAULT_PORT)
    }

    pub fn db(&self) -> i64 {
        self.parse_db().unwrap_or_default()
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == TLS_SCHEME
    }

    pub fn verifies_tls(&self) -> bool {
        self.url.fragment() != Some(INSECURE_FRAGMENT)
    }

    pub fn has_password(&self) -> bool {
        self.url.password().is_some()
    }

    /// The full connection URL, credentials included. Use `Display` for logs.
    pub fn as_url(&self) -> &str {
        self.url.as_str()
    }

    pub fn with_port(mut self, port: u16) -> Result<Self> {
        self.url
            .set_port(Some(port))
            .map_err(|_| Error::invalid("cannot set port on store address"))?;
        Ok(self)
    }

    pub fn with_username(mut self, username: &str) -> Result<Self> {
        self.url
            .set_username(username)
            .map_err(|_| Error::invalid("cannot set username on store address"))?;
        Ok(self)
    }

    pub fn with_credentials(self, username: Option<&str>, password: &str) -> Result<Self> {
        let mut address = self.with_username(username.unwrap_or_default())?;
        address
            .url
            .set_password(Some(password))
            .map_err(|_| Error::invalid("cannot set password on store address"))?;
        Ok(address)
    }

    pub fn with_tls(mut self, tls: bool) -> Result<Self> {
        let scheme = if tls { TLS_SCHEME } else { PLAIN_SCHEME };
        self.url
            .set_scheme(scheme)
            .map_err(|_| Error::invalid(format!("cannot switch store address to {}", scheme)))?;
        Ok(self)
    }

    pub fn with_tls_verification(mut self, verify: bool) -> Self {
        if verify {
            self.url.set_fragment(None);
        } else {
            self.url.set_fragment(Some(INSECURE_FRAGMENT));
        }
        self
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.url.set_path(&format!("/{}", db));
        self
    }

    fn parse_db(&self) -> Result<i64> {
        let path = self.url.path().trim_matches('/');
        if path.is_empty() {
            return Ok(0);
        }
        path.parse::<i64>().map_err(|_| {
            Error::invalid(format!("invalid database index {} in store address", path))
        })
    }
}

impl FromStr for StoreAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StoreAddress::parse(s)
    }
}

impl fmt::Display for StoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.url.password().is_none() {
            return f.write_str(self.url.as_str());
        }
        let mut redacted = self.url.clone();
        let _ = redacted.set_password(Some("***"));
        f.write_str(redacted.as_str())
    }
}

impl fmt::Debug for StoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StoreAddress").field(&self.to_string()).finish()
    }
}

/// Deployment settings for reaching the store.
///
/// `port` only applies when `url` carries no port of its own. `tls` upgrades
/// the scheme to `rediss`; `verify_tls = false` skips certificate checks.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: Option<i64>,
    pub tls: bool,
    pub verify_tls: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            url: DEFAULT_HOST.to_string(),
            port: None,
            username: None,
            password: None,
            db: None,
            tls: false,
            verify_tls: true,
        }
    }
}

impl StoreConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {} failed: {}", path.display(), e)))?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn address(&self) -> Result<StoreAddress> {
        let mut address =
            StoreAddress::parse_with_port(&self.url, self.port.unwrap_or(DEFAULT_PORT))?;

        match (self.username.as_deref(), self.password.as_deref()) {
            (username, Some(password)) => {
                address = address.with_credentials(username, password)?;
            }
            (Some(username), None) => address = address.with_username(username)?,
            (None, None) => {}
        }
        if let Some(db) = self.db {
            address = address.with_db(db);
        }
        if self.tls {
            address = address.with_tls(true)?;
        }
        if !self.verify_tls {
            address = address.with_tls_verification(false);
        }

        Ok(address)
    }
}
