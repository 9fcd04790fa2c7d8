//! Account creation and password verification.

use std::sync::Arc;

use crate::crypto::password;
use crate::error::{AppError, Result};
use crate::models::user::{NewUser, Role, User};
use crate::repositories::user::UserRepository;
use crate::validation::auth::{
    normalize_email, validate_display_name, validate_email, validate_password, validate_username,
};

/// Owns user records: creates accounts and verifies passwords.
#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserRepository>,
    /// A hash of a random throwaway password. Unknown emails are verified
    /// against it so a failed login costs the same either way.
    decoy_hash: Arc<str>,
}

impl CredentialStore {
    /// Creates a new `CredentialStore`. Computes one Argon2 hash.
    pub fn new(users: Arc<dyn UserRepository>) -> Result<Self> {
        let decoy_hash = password::hash_password(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self {
            users,
            decoy_hash: Arc::from(decoy_hash),
        })
    }

    /// Creates a new user account.
    ///
    /// The email is normalized before the uniqueness check. Only the Argon2id
    /// hash of the password is stored.
    ///
    /// # Arguments
    ///
    /// * `email` - The account email. Trimmed and lowercased before storage.
    /// * `plain_password` - The password, checked against the password policy.
    /// * `username` - The public handle.
    /// * `display_name` - An optional name to show instead of the handle.
    ///
    /// # Returns
    ///
    /// The stored `User`, or `DuplicateEmail` if the normalized email is taken.
    pub async fn create_user(
        &self,
        email: &str,
        plain_password: &str,
        username: &str,
        display_name: Option<&str>,
    ) -> Result<User> {
        let email = normalize_email(email);
        let username = username.trim();
        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());

        validate_email(&email)?;
        validate_username(username)?;
        if let Some(name) = display_name {
            validate_display_name(name)?;
        }
        validate_password(plain_password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            tracing::debug!("Registration rejected: email already in use");
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = hash_blocking(plain_password).await?;

        let user = self
            .users
            .insert(NewUser {
                email,
                password_hash,
                username: username.to_string(),
                display_name: display_name.map(str::to_string),
                role: Role::User,
            })
            .await?;

        tracing::info!("User created with ID: {}", user.id);
        Ok(user)
    }

    /// Checks `candidate` against the user's stored hash.
    pub async fn verify_password(&self, user: &User, candidate: &str) -> bool {
        verify_blocking(candidate, &user.password_hash).await
    }

    /// Looks up an active user by email and verifies the password.
    ///
    /// Unknown email, inactive account and wrong password all yield
    /// `InvalidCredentials`, after the same amount of hashing work.
    pub async fn check_credentials(&self, email: &str, candidate: &str) -> Result<User> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            verify_blocking(candidate, &self.decoy_hash).await;
            return Err(AppError::InvalidCredentials);
        };

        let verified = self.verify_password(&user, candidate).await;
        if !verified || !user.is_active {
            return Err(AppError::InvalidCredentials);
        }

        Ok(user)
    }
}

async fn hash_blocking(plain: &str) -> Result<String> {
    let plain = zeroize::Zeroizing::new(plain.to_string());
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_blocking(candidate: &str, hash: &str) -> bool {
    let candidate = zeroize::Zeroizing::new(candidate.to_string());
    let hash = hash.to_string();
    match tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash)).await {
        Ok(verified) => verified,
        Err(e) => {
            tracing::error!("Password verification task failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryUserRepository;

    async fn store() -> (CredentialStore, Arc<MemoryUserRepository>) {
        let users = Arc::new(MemoryUserRepository::default());
        (CredentialStore::new(users.clone()).unwrap(), users)
    }

    #[tokio::test]
    async fn create_user_stores_only_a_hash() {
        let (store, users) = store().await;
        let user = store
            .create_user("Kim@Example.com", "Correct-Horse-42", "kim", Some("Kim"))
            .await
            .unwrap();

        assert_eq!(user.email, "kim@example.com");
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert!(user.password_hash.starts_with("$argon2id$"));
        assert!(!user.password_hash.contains("Correct-Horse-42"));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn verify_password_accepts_only_the_original() {
        let (store, _) = store().await;
        let user = store
            .create_user("kim@example.com", "Correct-Horse-42", "kim", None)
            .await
            .unwrap();

        assert!(store.verify_password(&user, "Correct-Horse-42").await);
        assert!(!store.verify_password(&user, "Correct-Horse-43").await);
        assert!(!store.verify_password(&user, "correct-horse-42").await);
    }

    #[tokio::test]
    async fn weak_password_is_rejected_without_writing() {
        let (store, users) = store().await;
        let err = store
            .create_user("kim@example.com", "password", "kim", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WeakPassword(_)));
        assert_eq!(users.len(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_leaves_store_unchanged() {
        let (store, users) = store().await;
        store
            .create_user("kim@example.com", "Correct-Horse-42", "kim", None)
            .await
            .unwrap();

        let err = store
            .create_user("  KIM@example.com", "Other-Horse-77", "kim2", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn invalid_email_is_a_validation_error() {
        let (store, users) = store().await;
        let err = store
            .create_user("kim-at-example", "Correct-Horse-42", "kim", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(users.len(), 0);
    }

    #[tokio::test]
    async fn storage_failure_propagates() {
        let users = Arc::new(MemoryUserRepository::default());
        let store = CredentialStore::new(users.clone()).unwrap();
        users.fail_next_insert();

        let err = store
            .create_user("kim@example.com", "Correct-Horse-42", "kim", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        assert_eq!(users.len(), 0);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let (store, _) = store().await;
        store
            .create_user("kim@example.com", "Correct-Horse-42", "kim", None)
            .await
            .unwrap();

        let unknown = store
            .check_credentials("nobody@example.com", "Correct-Horse-42")
            .await
            .unwrap_err();
        let wrong = store
            .check_credentials("kim@example.com", "Wrong-Horse-42")
            .await
            .unwrap_err();

        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn inactive_user_cannot_log_in() {
        let (store, users) = store().await;
        let user = store
            .create_user("kim@example.com", "Correct-Horse-42", "kim", None)
            .await
            .unwrap();
        users.deactivate(user.id);

        let err = store
            .check_credentials("kim@example.com", "Correct-Horse-42")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }
}
