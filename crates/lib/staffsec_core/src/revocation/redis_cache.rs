//! Redis-backed revocation cache, shared by every server process.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::info;

use super::{CacheError, RevocationCache};

const KEY_PREFIX: &str = "staffsec:revoked:";

/// Redis connection parameters.
#[derive(Clone, Debug)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisSettings {
    /// Structured connection info. The password is passed through as-is,
    /// so it may contain URL delimiters.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }
}

/// [`RevocationCache`] storing `SET key 1 EX ttl` entries.
#[derive(Clone)]
pub struct RedisRevocationCache {
    conn: ConnectionManager,
}

impl RedisRevocationCache {
    /// Connect once; the manager reconnects on its own afterwards.
    pub async fn connect(settings: &RedisSettings) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.connection_info())?;
        let conn = ConnectionManager::new(client).await?;
        info!(host = %settings.host, port = settings.port, db = settings.db, "connected to redis");
        Ok(Self { conn })
    }
}

fn key(token: &str) -> String {
    format!("{KEY_PREFIX}{token}")
}

#[async_trait]
impl RevocationCache for RedisRevocationCache {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // EX 0 is rejected by Redis.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key(token), 1u8, seconds).await?;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key(token)).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(password: Option<&str>) -> RedisSettings {
        RedisSettings {
            host: "cache".into(),
            port: 6380,
            password: password.map(str::to_string),
            db: 2,
        }
    }

    #[test]
    fn connection_info_carries_host_port_and_db() {
        let info = settings(None).connection_info();
        assert_eq!(info.addr, ConnectionAddr::Tcp("cache".into(), 6380));
        assert_eq!(info.redis.db, 2);
        assert!(info.redis.password.is_none());
    }

    #[test]
    fn password_with_url_delimiters_is_kept_verbatim() {
        let info = settings(Some("p@ss/w#rd:1")).connection_info();
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w#rd:1"));
        assert_eq!(info.addr, ConnectionAddr::Tcp("cache".into(), 6380));
        assert_eq!(info.redis.db, 2);
        assert!(redis::Client::open(info).is_ok());
    }

    #[test]
    fn empty_password_is_ignored() {
        assert!(settings(Some("")).connection_info().redis.password.is_none());
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(key("abc"), "staffsec:revoked:abc");
    }
}
