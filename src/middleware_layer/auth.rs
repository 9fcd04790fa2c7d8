use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::{
    error::{AppError, Result, TokenError},
    state::AppState,
};

/// Extracts the bearer token from the `Authorization` header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// A middleware that requires a valid, unrevoked session token.
///
/// On success the session's [`Claims`](crate::models::session::Claims) are
/// inserted into the request extensions.
///
/// # Returns
///
/// The inner response, or a 401 for a missing, malformed, expired or revoked
/// token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let token = extract_bearer_token(request.headers())
        .map(str::to_owned)
        .ok_or_else(|| {
            tracing::debug!("No bearer token on request to {}", request.uri().path());
            AppError::Token(TokenError::Malformed)
        })?;

    let claims = state.sessions.authorize(&token).await?;
    tracing::debug!("Session {} authorized for user {}", claims.jti, claims.sub);

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
