//! Database operations for users.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use confplanner_auth::{User, UserStore, UserStoreError, normalize_username};
use confplanner_core::{Result, UserId};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    password_hash: Option<String>,
    admin: bool,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, UserStoreError> {
        let id = UserId::from_str(&self.id).map_err(|e| UserStoreError::Backend {
            details: format!("invalid user id '{}': {e}", self.id),
        })?;
        Ok(User::with_all_fields(
            id,
            self.username,
            self.password_hash,
            self.admin,
            self.created_at,
        ))
    }
}

fn backend(e: &sqlx::Error) -> UserStoreError {
    UserStoreError::Backend {
        details: e.to_string(),
    }
}

/// `UserStore` backed by the `users` table.
pub struct PgUserStore {
    pool: PgPool,
    accept_registrations: bool,
}

impl PgUserStore {
    /// Creates a new user store.
    pub fn new(pool: PgPool, accept_registrations: bool) -> Self {
        Self {
            pool,
            accept_registrations,
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_name(&self, username: &str) -> Result<Option<User>, UserStoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, admin, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(normalize_username(username))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(&e))?;

        row.map(UserRow::try_into_user).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, UserStoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, username, password_hash, admin, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend(&e))?;

        row.map(UserRow::try_into_user).transpose()
    }

    async fn create(
        &self,
        username: &str,
        password_hash: Option<String>,
    ) -> Result<User, UserStoreError> {
        if !self.accept_registrations {
            return Err(UserStoreError::RegistrationsClosed.into());
        }

        let user = User::new(normalize_username(username), password_hash);
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, admin, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.username())
        .bind(user.password_hash())
        .bind(user.is_admin())
        .bind(user.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                UserStoreError::AlreadyExists {
                    username: user.username().to_string(),
                }
            }
            _ => backend(&e),
        })?;

        Ok(user)
    }
}
