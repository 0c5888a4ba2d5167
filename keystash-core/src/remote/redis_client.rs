use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use redis::{Client, Commands, Connection, Script};
use serde_json::Value;

use super::{decode, encode, RemoteClient};
use crate::error::{CacheError, Result};
use crate::options::StorageOptions;
use crate::storage::{LockStore, LockToken, MappingStore, SequenceStore, ValueStore};

/// Pause between `SET NX` attempts while waiting for a lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Deletes the lock key only if it still carries the caller's token.
static RELEASE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('del', KEYS[1])
        else
            return 0
        end",
    )
});

/// A remote client talking to a Redis server.
///
/// Lists map to Redis lists, mappings to hashes, value cells to plain string keys,
/// and locks to `SET NX PX` keys holding the owner's token.
#[derive(Clone)]
pub struct RedisRemote {
    client: Client,
}

impl RedisRemote {
    /// Opens a client for `url` and checks that the server answers.
    pub fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| CacheError::Connection(e.to_string()))?;
        let mut connection = client
            .get_connection()
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        redis::cmd("PING")
            .query::<String>(&mut connection)
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    fn connection(client: &Client) -> Result<Connection> {
        Ok(client.get_connection()?)
    }
}

impl RemoteClient for RedisRemote {
    fn make_list(
        &self,
        name: &str,
        marshal: bool,
        _options: &StorageOptions,
    ) -> Result<Arc<dyn SequenceStore>> {
        Ok(Arc::new(RedisList {
            client: self.client.clone(),
            name: name.to_string(),
            marshal,
        }))
    }

    fn make_map(&self, name: &str) -> Result<Arc<dyn MappingStore>> {
        Ok(Arc::new(RedisHash {
            client: self.client.clone(),
            name: name.to_string(),
        }))
    }

    fn make_value(
        &self,
        name: &str,
        marshal: bool,
        _options: &StorageOptions,
    ) -> Result<Arc<dyn ValueStore>> {
        Ok(Arc::new(RedisValue {
            client: self.client.clone(),
            name: name.to_string(),
            marshal,
        }))
    }

    fn make_lock(
        &self,
        name: &str,
        expiration: Duration,
        timeout: Duration,
        _options: &StorageOptions,
    ) -> Result<Arc<dyn LockStore>> {
        Ok(Arc::new(RedisLock {
            client: self.client.clone(),
            name: name.to_string(),
            expiration,
            timeout,
        }))
    }
}

struct RedisList {
    client: Client,
    name: String,
    marshal: bool,
}

impl SequenceStore for RedisList {
    fn push(&self, value: Value) -> Result<()> {
        let raw = encode(&value, self.marshal)?;
        RedisRemote::connection(&self.client)?.rpush::<_, _, ()>(&self.name, raw)?;
        Ok(())
    }

    fn get(&self, index: usize) -> Result<Option<Value>> {
        let index = isize::try_from(index).map_err(|e| CacheError::Backend(e.to_string()))?;
        let raw: Option<String> = RedisRemote::connection(&self.client)?.lindex(&self.name, index)?;
        raw.map(|raw| decode(raw, self.marshal)).transpose()
    }

    fn len(&self) -> Result<usize> {
        Ok(RedisRemote::connection(&self.client)?.llen(&self.name)?)
    }

    fn to_vec(&self) -> Result<Vec<Value>> {
        let raw: Vec<String> = RedisRemote::connection(&self.client)?.lrange(&self.name, 0, -1)?;
        raw.into_iter()
            .map(|raw| decode(raw, self.marshal))
            .collect()
    }

    fn clear(&self) -> Result<()> {
        RedisRemote::connection(&self.client)?.del::<_, ()>(&self.name)?;
        Ok(())
    }
}

struct RedisHash {
    client: Client,
    name: String,
}

impl MappingStore for RedisHash {
    fn insert(&self, field: &str, value: Value) -> Result<()> {
        let raw = encode(&value, false)?;
        RedisRemote::connection(&self.client)?.hset::<_, _, _, ()>(&self.name, field, raw)?;
        Ok(())
    }

    fn get(&self, field: &str) -> Result<Option<Value>> {
        let raw: Option<String> = RedisRemote::connection(&self.client)?.hget(&self.name, field)?;
        raw.map(|raw| decode(raw, false)).transpose()
    }

    fn remove(&self, field: &str) -> Result<bool> {
        let removed: usize = RedisRemote::connection(&self.client)?.hdel(&self.name, field)?;
        Ok(removed > 0)
    }

    fn contains(&self, field: &str) -> Result<bool> {
        Ok(RedisRemote::connection(&self.client)?.hexists(&self.name, field)?)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(RedisRemote::connection(&self.client)?.hkeys(&self.name)?)
    }

    fn len(&self) -> Result<usize> {
        Ok(RedisRemote::connection(&self.client)?.hlen(&self.name)?)
    }

    fn clear(&self) -> Result<()> {
        RedisRemote::connection(&self.client)?.del::<_, ()>(&self.name)?;
        Ok(())
    }
}

struct RedisValue {
    client: Client,
    name: String,
    marshal: bool,
}

impl ValueStore for RedisValue {
    fn get(&self) -> Result<Option<Value>> {
        let raw: Option<String> = RedisRemote::connection(&self.client)?.get(&self.name)?;
        raw.map(|raw| decode(raw, self.marshal)).transpose()
    }

    fn set(&self, value: Option<Value>) -> Result<()> {
        let mut connection = RedisRemote::connection(&self.client)?;
        match value {
            Some(value) => {
                let raw = encode(&value, self.marshal)?;
                connection.set::<_, _, ()>(&self.name, raw)?;
            }
            None => connection.del::<_, ()>(&self.name)?,
        }
        Ok(())
    }
}

struct RedisLock {
    client: Client,
    name: String,
    expiration: Duration,
    timeout: Duration,
}

impl LockStore for RedisLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> Result<LockToken> {
        let token = LockToken::random();
        let expiration_ms = self.expiration.as_millis().max(1) as u64;
        let deadline = Instant::now() + self.timeout;
        let mut connection = RedisRemote::connection(&self.client)?;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&self.name)
                .arg(token.id())
                .arg("NX")
                .arg("PX")
                .arg(expiration_ms)
                .query(&mut connection)?;
            if acquired.is_some() {
                return Ok(token);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CacheError::LockTimeout {
                    name: self.name.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(LOCK_RETRY_INTERVAL.min(deadline - now));
        }
    }

    fn release(&self, token: LockToken) -> Result<()> {
        let mut connection = RedisRemote::connection(&self.client)?;
        RELEASE_SCRIPT
            .key(&self.name)
            .arg(token.id())
            .invoke::<i64>(&mut connection)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        RedisRemote::connection(&self.client)?.del::<_, ()>(&self.name)?;
        Ok(())
    }
}
