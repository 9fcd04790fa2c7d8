//! Login, signed session tokens and their validation.
//!
//! A token is `base64url(claims) "." base64url(hmac_sha256(key, base64url(claims)))`.
//! Validation checks, in order: shape, signature, claims decoding, expiry.
//! Revocation is checked on top of that by [`SessionIssuer::authorize`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::crypto::signing::{self, SigningKey, SIGNATURE_LEN};
use crate::error::{AppError, Result, TokenError};
use crate::models::session::{Claims, SessionToken};
use crate::models::user::User;
use crate::services::credentials::CredentialStore;
use crate::services::revocation::RevocationStore;

/// Upper bound on accepted token length, checked before any decoding.
const MAX_TOKEN_LEN: usize = 4096;

/// Issues and validates session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    credentials: CredentialStore,
    key: SigningKey,
    ttl: Duration,
    revocations: Arc<dyn RevocationStore>,
}

impl SessionIssuer {
    /// Creates a new `SessionIssuer`.
    pub fn new(
        credentials: CredentialStore,
        key: SigningKey,
        ttl: Duration,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            credentials,
            key,
            ttl,
            revocations,
        }
    }

    /// Verifies an email/password pair and issues a session for it.
    ///
    /// # Arguments
    ///
    /// * `email` - The email as typed. It is normalized before lookup.
    /// * `password` - The plaintext password.
    ///
    /// # Returns
    ///
    /// A fresh `SessionToken`, or `InvalidCredentials` for an unknown email, a
    /// wrong password and a deactivated account alike.
    pub async fn authenticate_credentials(&self, email: &str, password: &str) -> Result<SessionToken> {
        let user = self.credentials.check_credentials(email, password).await?;
        let session = self.issue_session(&user)?;
        tracing::info!("User authenticated: {}", user.id);
        Ok(session)
    }

    /// Issues a session token for `user`, valid for the configured lifetime.
    pub fn issue_session(&self, user: &User) -> Result<SessionToken> {
        self.issue_session_at(user, Utc::now())
    }

    pub(crate) fn issue_session_at(&self, user: &User, now: DateTime<Utc>) -> Result<SessionToken> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let payload = sonic_rs::to_vec(&claims)
            .map_err(|e| AppError::Internal(format!("Claims serialization failed: {}", e)))?;
        let payload = signing::encode(&payload);
        let signature = signing::encode(&self.key.sign(payload.as_bytes()));

        tracing::debug!("Session {} issued for user {}", claims.jti, claims.sub);

        Ok(SessionToken {
            token: format!("{}.{}", payload, signature),
            token_type: "Bearer",
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at),
        })
    }

    /// Checks a token's integrity and expiry. Performs no I/O.
    pub fn validate_session(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        self.validate_session_at(token, Utc::now())
    }

    pub(crate) fn validate_session_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<Claims, TokenError> {
        if token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::Malformed);
        }

        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        if payload.is_empty() || signature.contains('.') {
            return Err(TokenError::Malformed);
        }

        let signature = signing::decode(signature).ok_or(TokenError::Malformed)?;
        if signature.len() != SIGNATURE_LEN {
            return Err(TokenError::Malformed);
        }

        if !self.key.verify(payload.as_bytes(), &signature) {
            return Err(TokenError::BadSignature);
        }

        let claims_json = signing::decode(payload).ok_or(TokenError::Malformed)?;
        let claims: Claims =
            sonic_rs::from_slice(&claims_json).map_err(|_| TokenError::Malformed)?;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Validates a token presented by a caller, including the revocation list.
    pub async fn authorize(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_session(token)?;
        if self.revocations.is_revoked(claims.jti).await? {
            return Err(TokenError::Revoked.into());
        }
        Ok(claims)
    }

    /// Revokes the session described by `claims` until it would have expired.
    pub async fn revoke_session(&self, claims: &Claims) -> Result<()> {
        let until = claims
            .expires_at()
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;
        self.revocations.revoke(claims.jti, until).await?;
        tracing::info!("Session {} revoked for user {}", claims.jti, claims.sub);
        Ok(())
    }
}
