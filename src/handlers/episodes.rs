use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, Result},
    models::{
        episode::{NewEpisode, SeasonKey},
        session::Claims,
    },
    handlers::extract::{JsonBody, PathParams, QueryParams},
    services::episodes as episode_service,
    state::AppState,
};

#[derive(Deserialize)]
pub struct ListEpisodesQuery {
    pub show_id: Option<i64>,
    pub season_id: Option<i64>,
}

impl ListEpisodesQuery {
    fn season_key(&self) -> Result<SeasonKey> {
        match (self.show_id, self.season_id) {
            (Some(show_id), Some(season_id)) if show_id > 0 && season_id > 0 => {
                Ok(SeasonKey::new(show_id, season_id))
            }
            (Some(_), Some(_)) => Err(AppError::Validation(
                "show_id and season_id must be positive".to_string(),
            )),
            _ => Err(AppError::Validation(
                "show_id and season_id are required".to_string(),
            )),
        }
    }
}

/// Lists the episodes of one season, in episode order.
pub async fn list_episodes(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListEpisodesQuery>,
) -> Result<Response> {
    let key = query.season_key()?;
    let episodes = episode_service::list_episodes(&state, key).await?;
    Ok(Json(episodes.as_ref()).into_response())
}

/// Fetches one episode by ID.
pub async fn get_episode(
    State(state): State<AppState>,
    PathParams(id): PathParams<i64>,
) -> Result<Response> {
    let episode = episode_service::get_episode(&state, id).await?;
    Ok(Json(episode).into_response())
}

/// Creates an episode. Requires a session.
#[axum::debug_handler]
pub async fn create_episode(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(payload): JsonBody<NewEpisode>,
) -> Result<Response> {
    tracing::debug!("Episode create by user {}", claims.sub);
    let episode = episode_service::create_episode(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(episode)).into_response())
}
