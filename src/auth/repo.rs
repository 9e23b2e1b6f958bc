use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{NewUser, User};

/// Storage for user records.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Inserts a user. Returns `None` when the email is already taken.
    async fn create(&self, user: NewUser) -> anyhow::Result<Option<User>>;

    /// Overwrites the stored refresh token unconditionally.
    async fn update_token(&self, email: &str, token: Option<&str>) -> anyhow::Result<()>;

    /// Replaces the stored refresh token only if it still equals `current`.
    /// Returns whether the swap happened.
    async fn rotate_token(&self, email: &str, current: &str, next: &str) -> anyhow::Result<bool>;

    async fn confirm_email(&self, email: &str) -> anyhow::Result<()>;

    async fn update_avatar(&self, email: &str, url: &str) -> anyhow::Result<Option<User>>;
}

const USER_COLUMNS: &str = "id, username, email, password_hash, avatar, refresh_token, role, \
                            is_verified, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let created = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, avatar)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.avatar)
        .fetch_optional(&self.db)
        .await
        .context("insert user")?;
        Ok(created)
    }

    async fn update_token(&self, email: &str, token: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET refresh_token = $2, updated_at = now()
            WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(token)
        .execute(&self.db)
        .await
        .context("update refresh token")?;
        Ok(())
    }

    async fn rotate_token(&self, email: &str, current: &str, next: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users SET refresh_token = $3, updated_at = now()
            WHERE email = $1 AND refresh_token = $2
            "#,
        )
        .bind(email)
        .bind(current)
        .bind(next)
        .execute(&self.db)
        .await
        .context("rotate refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn confirm_email(&self, email: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users SET is_verified = TRUE, updated_at = now()
            WHERE email = $1
            "#,
        )
        .bind(email)
        .execute(&self.db)
        .await
        .context("confirm email")?;
        Ok(())
    }

    async fn update_avatar(&self, email: &str, url: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET avatar = $2, updated_at = now()
            WHERE email = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(url)
        .fetch_optional(&self.db)
        .await
        .context("update avatar")?;
        Ok(user)
    }
}
