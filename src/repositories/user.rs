use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::{error::SqlState, Row};

use crate::{
    error::{AppError, Result},
    models::user::{NewUser, User},
};

/// Storage for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user by their (normalized) email address.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Inserts a new user. Fails with `DuplicateEmail` when the email is taken.
    async fn insert(&self, new_user: NewUser) -> Result<User>;
}

/// A `UserRepository` backed by PostgreSQL.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool,
}

impl PgUserRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, email, password_hash, username, display_name, role, is_active, created_at, updated_at";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        role: role.parse().map_err(AppError::Persistence)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn unique_violation_to_app_error(e: tokio_postgres::Error) -> AppError {
    if e.code() != Some(&SqlState::UNIQUE_VIOLATION) {
        return AppError::Database(e);
    }
    match e.as_db_error().and_then(|db| db.constraint()) {
        Some("users_username_key") => AppError::Validation("Username already taken".to_string()),
        _ => AppError::DuplicateEmail,
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .await?;
        let row = client.query_opt(&stmt, &[&email]).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn insert(&self, new_user: NewUser) -> Result<User> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(&format!(
                r#"
                INSERT INTO users (email, password_hash, username, display_name, role)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {USER_COLUMNS}
                "#
            ))
            .await?;

        let role: &str = new_user.role.as_str();
        let row = client
            .query_one(
                &stmt,
                &[
                    &new_user.email,
                    &new_user.password_hash,
                    &new_user.username,
                    &new_user.display_name,
                    &role,
                ],
            )
            .await
            .map_err(unique_violation_to_app_error)?;

        row_to_user(&row)
    }
}
