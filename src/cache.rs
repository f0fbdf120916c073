//! Best-effort realtime cache over Redis.
//!
//! Keyspace is limited to `realtime:{device_id}` holding the serialized
//! latest sample. Every operation absorbs its own errors: a failed read is
//! a miss, a failed write or delete is a no-op. The API never fails because
//! the cache is unavailable.

use std::time::Duration;

use redis::AsyncCommands;

const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache key for the latest sample of a device.
pub fn realtime_key(device_id: &str) -> String {
    format!("realtime:{device_id}")
}

#[derive(Clone)]
pub struct Cache {
    client: Option<redis::Client>,
    ttl_s: u64,
}

impl Cache {
    /// Creates a cache handle. An unparsable URL is logged and degrades the
    /// cache to a permanent no-op rather than failing startup.
    pub fn new(url: &str, ttl_s: u64) -> Self {
        let client = match redis::Client::open(url) {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(error = %err, "invalid redis URL, cache disabled");
                None
            }
        };
        Self { client, ttl_s }
    }

    pub fn ttl_s(&self) -> u64 {
        self.ttl_s
    }

    /// Reads a key. Any cache error is logged and treated as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        match tokio::time::timeout(CACHE_OP_TIMEOUT, conn.get::<_, Option<String>>(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                tracing::warn!(key, error = %err, "cache read failed, falling back to database");
                None
            }
            Err(_) => {
                tracing::warn!(key, "cache read timed out, falling back to database");
                None
            }
        }
    }

    /// Writes a key with the configured TTL. Failures are logged, not raised.
    pub async fn put(&self, key: &str, value: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        match tokio::time::timeout(
            CACHE_OP_TIMEOUT,
            conn.set_ex::<_, _, ()>(key, value, self.ttl_s),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(key, error = %err, "cache write failed"),
            Err(_) => tracing::warn!(key, "cache write timed out"),
        }
    }

    /// Deletes a key. Failures are logged, not raised.
    pub async fn invalidate(&self, key: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        match tokio::time::timeout(CACHE_OP_TIMEOUT, conn.del::<_, ()>(key)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(key, error = %err, "cache invalidation failed"),
            Err(_) => tracing::warn!(key, "cache invalidation timed out"),
        }
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match tokio::time::timeout(CACHE_OP_TIMEOUT, client.get_multiplexed_async_connection())
            .await
        {
            Ok(Ok(conn)) => Some(conn),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "cache connection failed");
                None
            }
            Err(_) => {
                tracing::warn!("cache connection timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_key_format() {
        assert_eq!(realtime_key("inv-01"), "realtime:inv-01");
    }

    #[tokio::test]
    async fn unreachable_cache_degrades_to_miss() {
        // Nothing listens on this port; every operation must absorb the error.
        let cache = Cache::new("redis://127.0.0.1:1/", 5);
        assert_eq!(cache.get("realtime:inv-01").await, None);
        cache.put("realtime:inv-01", "{}").await;
        cache.invalidate("realtime:inv-01").await;
    }

    #[tokio::test]
    async fn invalid_url_disables_cache() {
        let cache = Cache::new("not-a-url", 5);
        assert_eq!(cache.get("realtime:inv-01").await, None);
    }
}
