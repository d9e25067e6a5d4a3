use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

/// The work queue and the verified route cache, shared between the record
/// handler and the verification worker.
///
/// Each operation is atomic on its own: no extra locking is needed around
/// them.
pub trait Store: Send + Sync {
    /// Append a value at the end of a list.
    fn push(
        &self,
        list: &str,
        value: String,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove and return up to `count` values from the head of a list.
    fn pop(
        &self,
        list: &str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Set a value which expires after `ttl`.
    fn set_ex(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("Connected to redis: {}", url);
        Ok(RedisStore { connection })
    }
}

impl Store for RedisStore {
    async fn push(&self, list: &str, value: String) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        connection.rpush::<_, _, ()>(list, value).await?;
        Ok(())
    }

    async fn pop(&self, list: &str, count: usize) -> Result<Vec<String>, StoreError> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Ok(Vec::new());
        };
        let mut connection = self.connection.clone();
        let values: Option<Vec<String>> = connection.lpop(list, Some(count)).await?;
        Ok(values.unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        Ok(connection.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Memory {
    lists: HashMap<String, VecDeque<String>>,
    values: HashMap<String, (String, Instant)>,
}

/// An in-process store, for running without redis. Nothing survives a
/// restart and nothing is shared with other processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Memory>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// How long before a key expires
    #[cfg(test)]
    pub fn expires_in(&self, key: &str) -> Option<Duration> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (_, until) = inner.values.get(key)?;
        until.checked_duration_since(Instant::now())
    }

    #[cfg(test)]
    pub fn len(&self, list: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.lists.get(list).map_or(0, VecDeque::len)
    }
}

impl Store for MemoryStore {
    async fn push(&self, list: &str, value: String) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.lists.entry(list.to_string()).or_default().push_back(value);
        Ok(())
    }

    async fn pop(&self, list: &str, count: usize) -> Result<Vec<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(values) = inner.lists.get_mut(list) else {
            return Ok(Vec::new());
        };
        let count = count.min(values.len());
        Ok(values.drain(..count).collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.values.get(key) {
            Some((value, until)) if *until > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                inner.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .values
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }
}
