//! In-memory collaborators for unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::episode::{Episode, NewEpisode, SeasonKey};
use crate::models::user::{NewUser, User};
use crate::repositories::episode::EpisodeRepository;
use crate::repositories::user::UserRepository;
use crate::services::revocation::MemoryRevocationStore;
use crate::state::AppState;

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<Vec<User>>,
    fail_next_insert: AtomicBool,
}

impl MemoryUserRepository {
    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn deactivate(&self, id: Uuid) {
        for user in self.users.lock().unwrap().iter_mut() {
            if user.id == id {
                user.is_active = false;
            }
        }
    }

    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, new_user: NewUser) -> Result<User> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(AppError::Persistence("simulated insert failure".to_string()));
        }

        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(AppError::DuplicateEmail);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            username: new_user.username,
            display_name: new_user.display_name,
            role: new_user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }
}

#[derive(Default)]
pub struct MemoryEpisodeRepository {
    episodes: Mutex<Vec<Episode>>,
    next_id: AtomicI64,
    fetches: AtomicUsize,
    fail_next_fetch: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    insert_gate: Mutex<Option<Arc<Semaphore>>>,
    inserts_started: AtomicUsize,
}

impl MemoryEpisodeRepository {
    /// Appends episodes with the given titles to a season.
    pub fn seed(&self, key: SeasonKey, titles: &[&str]) {
        let mut episodes = self.episodes.lock().unwrap();
        for title in titles {
            let number = episodes.iter().filter(|e| e.key() == key).count() as i32 + 1;
            let episode = self.build(new_episode(key, number, title));
            episodes.push(episode);
        }
    }

    /// How many times `find_by_season` has read storage.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.lock().unwrap().len()
    }

    pub fn fail_next_fetch(&self) {
        self.fail_next_fetch.store(true, Ordering::SeqCst);
    }

    /// Makes every later fetch wait for a permit after taking its snapshot.
    pub fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Lets later fetches through without waiting.
    pub fn release_fetches(&self) {
        *self.gate.lock().unwrap() = None;
    }

    /// Makes every later insert wait for a permit before it is stored.
    pub fn hold_inserts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.insert_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// How many inserts have reached storage, stored or not.
    pub fn inserts_started(&self) -> usize {
        self.inserts_started.load(Ordering::SeqCst)
    }

    fn build(&self, new_episode: NewEpisode) -> Episode {
        let now = Utc::now();
        Episode {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            show_id: new_episode.show_id,
            season_id: new_episode.season_id,
            episode_number: new_episode.episode_number,
            title: new_episode.title,
            description: new_episode.description,
            air_date: new_episode.air_date,
            runtime_minutes: new_episode.runtime_minutes,
            director: new_episode.director,
            writer: new_episode.writer,
            thumbnail_url: new_episode.thumbnail_url,
            rating: new_episode.rating,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl EpisodeRepository for MemoryEpisodeRepository {
    async fn find_by_season(&self, key: SeasonKey) -> Result<Vec<Episode>> {
        if self.fail_next_fetch.swap(false, Ordering::SeqCst) {
            return Err(AppError::Persistence("simulated fetch failure".to_string()));
        }

        let mut snapshot: Vec<Episode> = self
            .episodes
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.key() == key)
            .cloned()
            .collect();
        snapshot.sort_by_key(|e| (e.episode_number, e.id));
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        Ok(snapshot)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Episode>> {
        let episodes = self.episodes.lock().unwrap();
        Ok(episodes.iter().find(|e| e.id == id).cloned())
    }

    async fn insert(&self, new_episode: NewEpisode) -> Result<Episode> {
        self.inserts_started.fetch_add(1, Ordering::SeqCst);
        let gate = self.insert_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let episode = self.build(new_episode);
        self.episodes.lock().unwrap().push(episode.clone());
        Ok(episode)
    }
}

pub fn new_episode(key: SeasonKey, episode_number: i32, title: &str) -> NewEpisode {
    NewEpisode {
        show_id: key.show_id,
        season_id: key.season_id,
        episode_number,
        title: title.to_string(),
        description: None,
        air_date: None,
        runtime_minutes: None,
        director: None,
        writer: None,
        thumbnail_url: None,
        rating: None,
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        redis_url: None,
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        session_secret: Zeroizing::new(vec![42u8; 32]),
        session_ttl_secs: 3600,
        cors_origins: vec!["http://localhost:3000".to_string()],
        episode_cache_ttl_secs: None,
        episode_cache_capacity: crate::services::episode_cache::DEFAULT_CAPACITY,
        episode_cache_warm: Vec::new(),
    }
}

/// An `AppState` over in-memory repositories.
pub fn test_state() -> (AppState, Arc<MemoryUserRepository>, Arc<MemoryEpisodeRepository>) {
    let users = Arc::new(MemoryUserRepository::default());
    let episodes = Arc::new(MemoryEpisodeRepository::default());
    let state = AppState::from_parts(
        &test_config(),
        users.clone(),
        episodes.clone(),
        Arc::new(MemoryRevocationStore::new()),
    )
    .unwrap();
    (state, users, episodes)
}
