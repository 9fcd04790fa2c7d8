use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    handlers::extract::JsonBody,
    models::{session::Claims, user::PublicUser},
    state::AppState,
};

/// The request payload for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The request payload for user login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The response payload for logout.
#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<Response> {
    tracing::info!("Register attempt for username: {}", payload.username);

    let user = state
        .credentials
        .create_user(
            &payload.email,
            &payload.password,
            &payload.username,
            payload.display_name.as_deref(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))).into_response())
}

/// Handles user login. Responds with a bearer token.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Response> {
    let session = state
        .sessions
        .authenticate_credentials(&payload.email, &payload.password)
        .await?;

    Ok((StatusCode::OK, Json(session)).into_response())
}

/// Handles user logout by revoking the presented token.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response> {
    state.sessions.revoke_session(&claims).await?;

    let response = LogoutResponse {
        success: true,
        message: "Logout successful".to_string(),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the claims of the current session.
pub async fn me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}
