use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::Role;

/// The claims sealed inside a session token.
///
/// Tokens are never stored server-side. A token is valid while its signature
/// verifies, `exp` lies in the future and its `jti` is not revoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// The ID of the user this session belongs to.
    pub sub: Uuid,
    /// The user's role at issue time.
    pub role: Role,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
    /// Unique token ID, the handle used for revocation.
    pub jti: Uuid,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// A freshly issued session token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    /// The opaque, signed token.
    pub token: String,
    /// Always `Bearer`.
    pub token_type: &'static str,
    /// The timestamp when the token expires.
    pub expires_at: DateTime<Utc>,
}
