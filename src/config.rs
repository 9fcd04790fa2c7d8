use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::models::episode::SeasonKey;
use crate::services::episode_cache;

/// The minimum length of the session signing secret in bytes.
pub const MIN_SESSION_SECRET_BYTES: usize = 32;
/// The longest session lifetime accepted: 30 days.
pub const MAX_SESSION_TTL_SECS: i64 = 30 * 24 * 3600;
/// The longest episode cache entry lifetime accepted: 1 day.
pub const MAX_EPISODE_CACHE_TTL_SECS: u64 = 24 * 3600;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server holding revoked sessions, if any.
    pub redis_url: Option<String>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The HMAC key that seals session tokens.
    pub session_secret: Zeroizing<Vec<u8>>,
    /// The lifetime of a session token in seconds.
    pub session_ttl_secs: i64,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Maximum age of an episode cache entry. `None` keeps entries until invalidated.
    pub episode_cache_ttl_secs: Option<u64>,
    /// Maximum number of season listings held by the episode cache.
    pub episode_cache_capacity: u64,
    /// Seasons loaded into the episode cache once at startup.
    pub episode_cache_warm: Vec<SeasonKey>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut secret_hex = env::var("SESSION_SECRET")
            .context("SESSION_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let session_secret = parse_session_secret(&secret_hex);
        secret_hex.zeroize();
        let session_secret = session_secret?;

        let session_ttl_secs = parse_session_ttl(
            &env::var("SESSION_TTL_SECS").unwrap_or_else(|_| "3600".to_string()),
        )?;

        let episode_cache_ttl_secs = match env::var("EPISODE_CACHE_TTL_SECS") {
            Ok(raw) => Some(parse_cache_ttl(&raw)?),
            Err(_) => None,
        };

        let episode_cache_capacity: u64 = match env::var("EPISODE_CACHE_CAPACITY") {
            Ok(raw) => raw.trim().parse().context("Invalid EPISODE_CACHE_CAPACITY")?,
            Err(_) => episode_cache::DEFAULT_CAPACITY,
        };
        if episode_cache_capacity == 0 {
            anyhow::bail!("EPISODE_CACHE_CAPACITY must be positive");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            session_secret,
            session_ttl_secs,
            cors_origins: split_list(
                &env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            ),
            episode_cache_ttl_secs,
            episode_cache_capacity,
            episode_cache_warm: parse_season_keys(
                &env::var("EPISODE_CACHE_WARM").unwrap_or_default(),
            )?,
        })
    }
}

fn parse_session_secret(secret_hex: &str) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = Zeroizing::new(
        hex::decode(secret_hex.trim()).context("SESSION_SECRET must be valid hexadecimal")?,
    );

    if bytes.len() < MIN_SESSION_SECRET_BYTES {
        anyhow::bail!(
            "SESSION_SECRET must be at least {} bytes ({} hex characters)",
            MIN_SESSION_SECRET_BYTES,
            MIN_SESSION_SECRET_BYTES * 2
        );
    }

    Ok(bytes)
}

fn parse_session_ttl(raw: &str) -> Result<i64> {
    let secs: i64 = raw.trim().parse().context("Invalid SESSION_TTL_SECS")?;
    if secs <= 0 {
        anyhow::bail!("SESSION_TTL_SECS must be positive");
    }
    if secs > MAX_SESSION_TTL_SECS {
        anyhow::bail!("SESSION_TTL_SECS must be at most {} (30 days)", MAX_SESSION_TTL_SECS);
    }
    Ok(secs)
}

fn parse_cache_ttl(raw: &str) -> Result<u64> {
    let secs: u64 = raw.trim().parse().context("Invalid EPISODE_CACHE_TTL_SECS")?;
    if secs > MAX_EPISODE_CACHE_TTL_SECS {
        anyhow::bail!(
            "EPISODE_CACHE_TTL_SECS must be at most {} (1 day)",
            MAX_EPISODE_CACHE_TTL_SECS
        );
    }
    Ok(secs)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses a comma-separated list of `show:season` pairs.
pub fn parse_season_keys(raw: &str) -> Result<Vec<SeasonKey>> {
    split_list(raw)
        .iter()
        .map(|pair| {
            let (show, season) = pair
                .split_once(':')
                .with_context(|| format!("Invalid season key '{}', expected show:season", pair))?;
            Ok(SeasonKey::new(
                show.trim().parse().with_context(|| format!("Invalid show id in '{}'", pair))?,
                season.trim().parse().with_context(|| format!("Invalid season id in '{}'", pair))?,
            ))
        })
        .collect()
}
