use std::fs;

use tempfile::TempDir;

use crate::config::{StoreAddress, StoreConfig, DEFAULT_PORT};
use crate::error::Error;

#[test]
fn parses_bare_host_and_port() {
    let address = StoreAddress::parse("cache.internal:7000").unwrap();
    assert_eq!(address.host(), "cache.internal");
    assert_eq!(address.port(), 7000);
    assert!(!address.is_tls());
    assert_eq!(address.db(), 0);
    assert_eq!(address.as_url(), "redis://cache.internal:7000");

    let moved = address.with_port(7100).unwrap().with_db(4);
    assert_eq!(moved.as_url(), "redis://cache.internal:7100/4");
}

#[test]
fn bare_host_gets_default_port() {
    let address: StoreAddress = "localhost".parse().unwrap();
    assert_eq!(address.port(), DEFAULT_PORT);

    let address = StoreAddress::parse_with_port("localhost", 7001).unwrap();
    assert_eq!(address.port(), 7001);

    let address = StoreAddress::parse_with_port("localhost:7002", 7001).unwrap();
    assert_eq!(address.port(), 7002);
}

#[test]
fn parses_full_url() {
    let address = StoreAddress::parse("redis://:secret@10.0.0.5:6380/3").unwrap();
    assert_eq!(address.host(), "10.0.0.5");
    assert_eq!(address.port(), 6380);
    assert_eq!(address.db(), 3);
    assert!(address.has_password());

    let display = address.to_string();
    assert!(!display.contains("secret"));
    assert!(display.contains("***"));
    assert!(!format!("{:?}", address).contains("secret"));
    assert!(address.as_url().contains("secret"));
}

#[test]
fn parses_tls_url() {
    let address = StoreAddress::parse("rediss://cache.internal#insecure").unwrap();
    assert!(address.is_tls());
    assert!(!address.verifies_tls());
    assert_eq!(address.port(), DEFAULT_PORT);

    let address = StoreAddress::parse("rediss://cache.internal:6380").unwrap();
    assert!(address.verifies_tls());
}

#[test]
fn rejects_malformed_addresses() {
    for input in ["", "   ", "http://cache.internal", "redis://", "redis://host/db"] {
        let err = StoreAddress::parse(input).unwrap_err();
        assert!(
            matches!(err, Error::InvalidArgument(_)),
            "{} gave {}",
            input,
            err
        );
    }
}

#[test]
fn config_defaults() {
    let config = StoreConfig::from_toml("").unwrap();
    assert_eq!(config, StoreConfig::default());

    let address = config.address().unwrap();
    assert_eq!(address.host(), "127.0.0.1");
    assert_eq!(address.port(), DEFAULT_PORT);
    assert!(address.verifies_tls());
}

#[test]
fn config_port_only_fills_a_missing_port() {
    let config = StoreConfig {
        url: "cache.internal".to_string(),
        port: Some(7001),
        ..StoreConfig::default()
    };
    assert_eq!(config.address().unwrap().port(), 7001);

    let config = StoreConfig {
        url: "cache.internal:7000".to_string(),
        port: Some(7001),
        ..StoreConfig::default()
    };
    assert_eq!(config.address().unwrap().port(), 7000);
}

#[test]
fn config_side_channel_options() {
    let config = StoreConfig::from_toml(
        r#"
        url = "cache.internal"
        port = 6380
        username = "app"
        password = "p@ss word"
        db = 2
        tls = true
        verify_tls = false
        "#,
    )
    .unwrap();

    let address = config.address().unwrap();
    assert!(address.is_tls());
    assert!(!address.verifies_tls());
    assert!(address.has_password());
    assert_eq!(address.db(), 2);
    assert_eq!(address.port(), 6380);
    assert!(address.as_url().starts_with("rediss://app:"));
    assert!(!address.to_string().contains("p@ss"));
}

#[test]
fn config_username_without_password_is_kept() {
    let config = StoreConfig {
        url: "cache.internal".to_string(),
        username: Some("app".to_string()),
        ..StoreConfig::default()
    };

    let address = config.address().unwrap();
    assert!(!address.has_password());
    assert_eq!(address.as_url(), "redis://app@cache.internal:6379");
}

#[test]
fn config_from_file() {
    let tmp_dir = TempDir::new().unwrap();
    let path = tmp_dir.path().join("store.toml");
    fs::write(&path, "url = \"redis://cache.internal:6390\"\n").unwrap();

    let config = StoreConfig::from_file(&path).unwrap();
    assert_eq!(config.address().unwrap().port(), 6390);

    let err = StoreConfig::from_file(tmp_dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));

    fs::write(&path, "port = \"not a number\"\n").unwrap();
    let err = StoreConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
