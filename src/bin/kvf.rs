use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use kv_facade::{HashFields, KeyValueFacade, StoreConfig, DEFAULT_SCAN_BATCH};

#[derive(Parser, Debug)]
#[command(version, about = "talk to a key-value store through kv-facade")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// host:port or redis:// / rediss:// url
    #[arg(long, env = "KVF_ADDR")]
    addr: Option<String>,

    /// toml file with url, port, username, password, db, tls, verify_tls
    #[arg(long, env = "KVF_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "KVF_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "get value from store by key")]
    Get { key: String },
    #[command(about = "set value to store by key")]
    Set {
        key: String,
        value: String,
        #[arg(long)]
        ttl: Option<u64>,
    },
    #[command(name = "hget", about = "get hash fields, all of them when none are named")]
    HashGet { key: String, fields: Vec<String> },
    #[command(name = "hset", about = "merge field=value pairs into a hash")]
    HashSet {
        key: String,
        #[arg(required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
        #[arg(long)]
        ttl: Option<u64>,
    },
    #[command(about = "remove key from store")]
    Del { key: String },
    #[command(about = "list keys matching a glob pattern")]
    Scan {
        pattern: String,
        #[arg(long, default_value_t = DEFAULT_SCAN_BATCH)]
        count: usize,
    },
    #[command(about = "unlink every key matching a glob pattern")]
    Unlink {
        pattern: String,
        #[arg(long, default_value_t = DEFAULT_SCAN_BATCH)]
        count: usize,
    },
}

fn parse_pair(s: &str) -> Result<(String, String)> {
    let (field, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected field=value, got {}", s))?;
    Ok((field.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };
    if let Some(addr) = cli.addr {
        config.url = addr;
    }
    if let Some(password) = cli.password {
        config.password = Some(password);
    }

    let facade = KeyValueFacade::redis(config.address()?);
    let res = run(&facade, cli.command).await;

    if let Err(e) = facade.quit().await {
        log::warn!("close store connection failed, reason: {}", e);
    }

    res
}

async fn run(facade: &KeyValueFacade, command: Commands) -> Result<()> {
    match command {
        Commands::Get { key } => match facade.get(&key).await? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Commands::Set { key, value, ttl } => facade.set(&key, &value, ttl).await?,
        Commands::HashGet { key, fields } => {
            let requested = fields.clone();
            let selection = if fields.is_empty() {
                HashFields::All
            } else {
                HashFields::List(fields)
            };

            match facade.hget(&key, selection).await? {
                None => println!("(nil)"),
                Some(entries) if requested.is_empty() => {
                    for (field, value) in entries.into_iter().collect::<BTreeMap<_, _>>() {
                        println!("{}={}", field, value.unwrap_or_default());
                    }
                }
                Some(entries) => {
                    for field in requested {
                        match entries.get(&field).cloned().flatten() {
                            Some(value) => println!("{}={}", field, value),
                            None => println!("{}=(nil)", field),
                        }
                    }
                }
            }
        }
        Commands::HashSet { key, pairs, ttl } => facade.hset(&key, pairs, ttl).await?,
        Commands::Del { key } => println!("{}", facade.del(&key).await?),
        Commands::Scan { pattern, count } => {
            for key in facade.scan_batched(&pattern, count).await? {
                println!("{}", key);
            }
        }
        Commands::Unlink { pattern, count } => {
            println!("{}", facade.unlink_by_pattern_batched(&pattern, count).await?)
        }
    }

    Ok(())
}
