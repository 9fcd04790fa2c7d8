use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::crypto::signing::SigningKey;
use crate::error::Result;
use crate::repositories::episode::{EpisodeRepository, PgEpisodeRepository};
use crate::repositories::user::{PgUserRepository, UserRepository};
use crate::services::credentials::CredentialStore;
use crate::services::episode_cache::EpisodeCache;
use crate::services::revocation::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};
use crate::services::sessions::SessionIssuer;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Episode storage, used directly for writes.
    pub episodes: Arc<dyn EpisodeRepository>,
    /// Account creation and credential checks.
    pub credentials: CredentialStore,
    /// Session token issuing and validation.
    pub sessions: SessionIssuer,
    /// Cached season listings, read through to `episodes`.
    pub episode_cache: EpisodeCache,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL and, if configured, Redis.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        tracing::info!("PostgreSQL pool initialized");

        let revocations: Arc<dyn RevocationStore> = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let redis = ConnectionManager::new(client).await?;
                tracing::info!("Redis connection manager initialized for session revocation");
                Arc::new(RedisRevocationStore::new(redis))
            }
            None => {
                tracing::warn!("REDIS_URL not set, revoked sessions are tracked in memory only");
                Arc::new(MemoryRevocationStore::new())
            }
        };

        Self::from_parts(
            config,
            Arc::new(PgUserRepository::new(db.clone())),
            Arc::new(PgEpisodeRepository::new(db)),
            revocations,
        )
    }

    /// Assembles an `AppState` from already built collaborators.
    ///
    /// # Arguments
    ///
    /// * `config` - Supplies the session secret and lifetime plus the cache limits.
    /// * `users` - User storage behind the credential store.
    /// * `episodes` - Episode storage, written directly and read through the cache.
    /// * `revocations` - The deny-list of logged out sessions.
    ///
    /// # Returns
    ///
    /// An error if the session secret is too short to sign tokens with.
    pub fn from_parts(
        config: &Config,
        users: Arc<dyn UserRepository>,
        episodes: Arc<dyn EpisodeRepository>,
        revocations: Arc<dyn RevocationStore>,
    ) -> Result<Self> {
        let credentials = CredentialStore::new(users)?;
        let key = SigningKey::new(config.session_secret.as_slice())?;
        let sessions = SessionIssuer::new(
            credentials.clone(),
            key,
            chrono::Duration::seconds(config.session_ttl_secs),
            revocations,
        );

        let max_age = config.episode_cache_ttl_secs.map(Duration::from_secs);
        let episode_cache =
            EpisodeCache::new(episodes.clone(), config.episode_cache_capacity, max_age);

        Ok(Self {
            episodes,
            credentials,
            sessions,
            episode_cache,
        })
    }
}
