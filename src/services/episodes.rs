use std::sync::Arc;

use garde::Validate;

use crate::{
    error::{AppError, Result},
    models::episode::{Episode, NewEpisode, SeasonKey},
    state::AppState,
};

/// Lists the episodes of one season of one show, through the episode cache.
pub async fn list_episodes(state: &AppState, key: SeasonKey) -> Result<Arc<Vec<Episode>>> {
    state.episode_cache.get(key).await
}

/// Fetches a single episode straight from storage.
///
/// # Returns
///
/// The episode, or `NotFound` if no episode has this ID.
pub async fn get_episode(state: &AppState, id: i64) -> Result<Episode> {
    let episode = state.episodes.find_by_id(id).await?.ok_or(AppError::NotFound)?;
    tracing::debug!("Episode {} found in {}", id, episode.key());
    Ok(episode)
}

/// Creates an episode and invalidates the cached listing of its season.
///
/// The insert and the invalidation run together in one task, so a caller that
/// gives up halfway cannot leave the new episode in storage with the old
/// listing still cached. The invalidation happens before this returns.
pub async fn create_episode(state: &AppState, new_episode: NewEpisode) -> Result<Episode> {
    new_episode
        .validate()
        .map_err(|report| AppError::Validation(report.to_string()))?;

    let key = new_episode.key();
    let episodes = state.episodes.clone();
    let cache = state.episode_cache.clone();

    let episode = tokio::spawn(async move {
        let inserted = episodes.insert(new_episode).await;
        cache.invalidate(key).await;
        inserted
    })
    .await
    .map_err(|e| AppError::Internal(format!("Episode write task failed: {}", e)))??;

    tracing::info!("Episode {} created for {}", episode.id, key);
    Ok(episode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_episode, test_state};

    fn titles(episodes: &[Episode]) -> Vec<&str> {
        episodes.iter().map(|e| e.title.as_str()).collect()
    }

    #[tokio::test]
    async fn created_episode_is_visible_immediately() {
        let (state, _, repo) = test_state();
        let key = SeasonKey::new(1, 1);
        repo.seed(key, &["A", "B"]);

        assert_eq!(titles(&list_episodes(&state, key).await.unwrap()), ["A", "B"]);

        let created = create_episode(&state, new_episode(key, 3, "C")).await.unwrap();
        assert_eq!(created.key(), key);

        assert_eq!(titles(&list_episodes(&state, key).await.unwrap()), ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn write_leaves_other_seasons_cached() {
        let (state, _, repo) = test_state();
        repo.seed(SeasonKey::new(1, 1), &["A"]);
        repo.seed(SeasonKey::new(1, 2), &["X"]);

        list_episodes(&state, SeasonKey::new(1, 1)).await.unwrap();
        list_episodes(&state, SeasonKey::new(1, 2)).await.unwrap();
        assert_eq!(repo.fetch_count(), 2);

        create_episode(&state, new_episode(SeasonKey::new(1, 1), 2, "B"))
            .await
            .unwrap();

        assert_eq!(titles(&list_episodes(&state, SeasonKey::new(1, 2)).await.unwrap()), ["X"]);
        assert_eq!(repo.fetch_count(), 2);
        assert_eq!(
            titles(&list_episodes(&state, SeasonKey::new(1, 1)).await.unwrap()),
            ["A", "B"]
        );
        assert_eq!(repo.fetch_count(), 3);
    }

    #[tokio::test]
    async fn invalid_episode_is_rejected_before_storage() {
        let (state, _, repo) = test_state();
        let err = create_episode(&state, new_episode(SeasonKey::new(1, 1), 0, "Bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(repo.episode_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_create_still_refreshes_the_listing() {
        let (state, _, repo) = test_state();
        let key = SeasonKey::new(1, 1);
        repo.seed(key, &["A"]);
        assert_eq!(titles(&list_episodes(&state, key).await.unwrap()), ["A"]);

        let gate = repo.hold_inserts();
        let caller = {
            let state = state.clone();
            tokio::spawn(async move { create_episode(&state, new_episode(key, 2, "B")).await })
        };
        while repo.inserts_started() == 0 {
            tokio::task::yield_now().await;
        }

        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        gate.add_permits(1);

        let listing = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let listing = list_episodes(&state, key).await.unwrap();
                if listing.len() == 2 {
                    return listing;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listing never picked up the abandoned write");

        assert_eq!(titles(&listing), ["A", "B"]);
        assert_eq!(repo.episode_count(), 2);
    }

    #[tokio::test]
    async fn episode_lookup_by_id() {
        let (state, _, repo) = test_state();
        let key = SeasonKey::new(4, 2);
        repo.seed(key, &["Pilot"]);
        let id = list_episodes(&state, key).await.unwrap()[0].id;

        let episode = get_episode(&state, id).await.unwrap();
        assert_eq!(episode.title, "Pilot");
        assert_eq!(episode.key(), key);

        let err = get_episode(&state, id + 100).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn empty_season_is_an_empty_listing() {
        let (state, _, _) = test_state();
        assert!(list_episodes(&state, SeasonKey::new(9, 9)).await.unwrap().is_empty());
    }
}
