use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    error::Result,
    models::episode::{Episode, NewEpisode, SeasonKey},
};

/// Storage for episodes.
#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    /// Lists the episodes of one season of one show, ordered by episode number.
    async fn find_by_season(&self, key: SeasonKey) -> Result<Vec<Episode>>;

    /// Finds an episode by its ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<Episode>>;

    /// Inserts a new episode.
    async fn insert(&self, new_episode: NewEpisode) -> Result<Episode>;
}

/// An `EpisodeRepository` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgEpisodeRepository {
    pool: Pool,
}

impl PgEpisodeRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

const EPISODE_COLUMNS: &str = "id, show_id, season_id, episode_number, title, description, \
     air_date, runtime_minutes, director, writer, thumbnail_url, rating, created_at, updated_at";

impl TryFrom<&Row> for Episode {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            show_id: row.try_get("show_id")?,
            season_id: row.try_get("season_id")?,
            episode_number: row.try_get("episode_number")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            air_date: row.try_get("air_date")?,
            runtime_minutes: row.try_get("runtime_minutes")?,
            director: row.try_get("director")?,
            writer: row.try_get("writer")?,
            thumbnail_url: row.try_get("thumbnail_url")?,
            rating: row.try_get("rating")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl EpisodeRepository for PgEpisodeRepository {
    async fn find_by_season(&self, key: SeasonKey) -> Result<Vec<Episode>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                SELECT {EPISODE_COLUMNS}
                FROM episodes
                WHERE show_id = $1 AND season_id = $2
                ORDER BY episode_number ASC, id ASC
                "#
            ))
            .await?;

        let rows = client.query(&stmt, &[&key.show_id, &key.season_id]).await?;
        let episodes = rows
            .iter()
            .map(Episode::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Episode>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {EPISODE_COLUMNS} FROM episodes WHERE id = $1"))
            .await?;

        match client.query_opt(&stmt, &[&id]).await? {
            Some(row) => Ok(Some(Episode::try_from(&row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, new_episode: NewEpisode) -> Result<Episode> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                INSERT INTO episodes (show_id, season_id, episode_number, title, description,
                    air_date, runtime_minutes, director, writer, thumbnail_url, rating)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING {EPISODE_COLUMNS}
                "#
            ))
            .await?;

        let row = client
            .query_one(
                &stmt,
                &[
                    &new_episode.show_id,
                    &new_episode.season_id,
                    &new_episode.episode_number,
                    &new_episode.title,
                    &new_episode.description,
                    &new_episode.air_date,
                    &new_episode.runtime_minutes,
                    &new_episode.director,
                    &new_episode.writer,
                    &new_episode.thumbnail_url,
                    &new_episode.rating,
                ],
            )
            .await?;

        Ok(Episode::try_from(&row)?)
    }
}
