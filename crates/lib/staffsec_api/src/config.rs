//! API server configuration.

use staffsec_core::auth::authenticator::AuthPolicy;
use staffsec_core::auth::jwt::{
    DEFAULT_ACCESS_TTL_MINUTES, DEFAULT_REFRESH_TTL_HOURS, TokenCodec, resolve_secret,
};
use staffsec_core::bootstrap::DEFAULT_PASSWORD;
use staffsec_core::revocation::redis_cache::RedisSettings;
use staffsec_core::store::LoginLookup;
use tracing::warn;

/// Default Redis port when `REDIS_HOST` is set without `REDIS_PORT`.
const DEFAULT_REDIS_PORT: u16 = 6379;

/// Upper bound for the access token lifetime (one year).
const MAX_ACCESS_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Upper bound for the refresh token lifetime (ten years).
const MAX_REFRESH_TTL_HOURS: i64 = 24 * 365 * 10;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access token signing secret.
    pub jwt_secret: String,
    /// Refresh token signing secret.
    pub jwt_refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_hours: i64,
    /// Password given to new and reset accounts.
    pub default_password: String,
    pub login_lookup: LoginLookup,
    /// Revocation cache backend; in-memory when `None`.
    pub redis: Option<RedisSettings>,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                              | Default                              |
    /// |---------------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                           | `127.0.0.1:3000`                     |
    /// | `DATABASE_URL`                        | `postgres://localhost:5432/staffsec` |
    /// | `JWT_SECRET_KEY`                      | generated & persisted to file        |
    /// | `JWT_REFRESH_KEY`                     | generated & persisted to file        |
    /// | `JWT_SECRET_KEY_EXPIRE_MINUTES_COUNT` | `15`                                 |
    /// | `JWT_REFRESH_KEY_EXPIRE_HOURS_COUNT`  | `24`                                 |
    /// | `DEFAULT_PASSWORD`                    | `88888888`                           |
    /// | `LOGIN_LOOKUP`                        | `exact`                              |
    /// | `REDIS_HOST` / `REDIS_PORT` / `REDIS_PASSWORD` / `REDIS_DB_NUMBER` | unset |
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok());
        if config.jwt_secret.is_empty() {
            config.jwt_secret = resolve_secret("JWT_SECRET_KEY", "jwt-secret");
        }
        if config.jwt_refresh_secret.is_empty() {
            config.jwt_refresh_secret = resolve_secret("JWT_REFRESH_KEY", "jwt-refresh-secret");
        }
        config
    }

    /// Build from an arbitrary variable source. Secrets stay empty when
    /// unset; [`ApiConfig::from_env`] fills them from disk.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let login_lookup = match var("LOGIN_LOOKUP").map(|v| v.parse::<LoginLookup>()) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                warn!("{e}; falling back to exact lookup");
                LoginLookup::Exact
            }
            None => LoginLookup::Exact,
        };

        let redis = var("REDIS_HOST").map(|host| RedisSettings {
            host,
            port: parse_or(var("REDIS_PORT"), "REDIS_PORT", DEFAULT_REDIS_PORT),
            password: var("REDIS_PASSWORD"),
            db: parse_or(var("REDIS_DB_NUMBER"), "REDIS_DB_NUMBER", 0),
        });

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3000".into()),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/staffsec".into()),
            jwt_secret: var("JWT_SECRET_KEY").unwrap_or_default(),
            jwt_refresh_secret: var("JWT_REFRESH_KEY").unwrap_or_default(),
            access_ttl_minutes: parse_lifetime(
                var("JWT_SECRET_KEY_EXPIRE_MINUTES_COUNT"),
                "JWT_SECRET_KEY_EXPIRE_MINUTES_COUNT",
                DEFAULT_ACCESS_TTL_MINUTES,
                MAX_ACCESS_TTL_MINUTES,
            ),
            refresh_ttl_hours: parse_lifetime(
                var("JWT_REFRESH_KEY_EXPIRE_HOURS_COUNT"),
                "JWT_REFRESH_KEY_EXPIRE_HOURS_COUNT",
                DEFAULT_REFRESH_TTL_HOURS,
                MAX_REFRESH_TTL_HOURS,
            ),
            default_password: var("DEFAULT_PASSWORD").unwrap_or_else(|| DEFAULT_PASSWORD.into()),
            login_lookup,
            redis,
        }
    }

    pub fn token_codec(&self) -> TokenCodec {
        TokenCodec::new(
            self.jwt_secret.as_bytes(),
            self.jwt_refresh_secret.as_bytes(),
            chrono::Duration::minutes(self.access_ttl_minutes),
            chrono::Duration::hours(self.refresh_ttl_hours),
        )
    }

    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy {
            lookup: self.login_lookup,
            ..AuthPolicy::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, name: &str, default: T) -> T {
    match value.map(|v| v.trim().parse::<T>()) {
        Some(Ok(parsed)) => parsed,
        Some(Err(_)) => {
            warn!(var = name, "unparseable value, using default");
            default
        }
        None => default,
    }
}

/// Token lifetime in `1..=max`; anything else falls back to `default`.
fn parse_lifetime(value: Option<String>, name: &str, default: i64, max: i64) -> i64 {
    let parsed = parse_or(value, name, default);
    if (1..=max).contains(&parsed) {
        parsed
    } else {
        warn!(var = name, value = parsed, max, "token lifetime out of range, using default");
        default
    }
}
