use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError, Script};

use crate::config::StoreAddress;
use crate::error::{Error, Result};
use crate::store::{Connector, StoreHandle};

// redis.call aborts the script on error, a failed HSET never reaches EXPIRE
const HSET_THEN_EXPIRE: &str = r#"
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
redis.call('EXPIRE', KEYS[1], ARGV[1])
return 0
"#;

/// Connects to a Redis server over a tokio multiplexed connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

#[async_trait]
impl Connector for RedisConnector {
    type Handle = RedisConnection;

    async fn connect(&self, address: &StoreAddress) -> Result<RedisConnection> {
        let client = Client::open(address.as_url()).map_err(Error::connection)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(Error::connection)?;

        Ok(RedisConnection { conn })
    }
}

#[derive(Clone)]
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

// lost or unreachable sessions are connection errors, everything else is the
// server rejecting the command
fn classify(command: &'static str, err: RedisError) -> Error {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        Error::connection(err)
    } else {
        Error::command(command, err)
    }
}

#[async_trait]
impl StoreHandle for RedisConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("GET", e))
    }

    async fn set(&mut self, key: &str, value: &str, ttl: Option<u64>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl);
        }

        let _: () = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("SET", e))?;
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("HGET", e))
    }

    async fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("HMGET", e))
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>> {
        redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("HGETALL", e))
    }

    async fn hset(
        &mut self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<u64>,
    ) -> Result<()> {
        match ttl {
            None => {
                let mut hset = redis::cmd("HSET");
                hset.arg(key);
                for (field, value) in fields {
                    hset.arg(field).arg(value);
                }
                let _: () = hset
                    .query_async(&mut self.conn)
                    .await
                    .map_err(|e| classify("HSET", e))?;
            }
            Some(ttl) => {
                let script = Script::new(HSET_THEN_EXPIRE);
                let mut invocation = script.prepare_invoke();
                invocation.key(key).arg(ttl);
                for (field, value) in fields {
                    invocation.arg(field).arg(value);
                }
                let _: () = invocation
                    .invoke_async(&mut self.conn)
                    .await
                    .map_err(|e| classify("HSET/EXPIRE", e))?;
            }
        }

        Ok(())
    }

    async fn del(&mut self, key: &str) -> Result<u64> {
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("DEL", e))
    }

    async fn scan(
        &mut self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>)> {
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("SCAN", e))
    }

    async fn unlink(&mut self, keys: &[String]) -> Result<u64> {
        redis::cmd("UNLINK")
            .arg(keys)
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("UNLINK", e))
    }

    async fn quit(&mut self) -> Result<()> {
        let _: () = redis::cmd("QUIT")
            .query_async(&mut self.conn)
            .await
            .map_err(|e| classify("QUIT", e))?;
        Ok(())
    }
}
