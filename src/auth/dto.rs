use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        repo_types::{Role, User},
        services::is_valid_email,
    },
    error::{AppError, AppResult},
};

/// Request body for signup.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    /// Normalizes the email and checks field constraints.
    pub fn validate(&mut self) -> AppResult<()> {
        self.email = self.email.trim().to_lowercase();
        self.username = self.username.trim().to_string();

        let name_len = self.username.chars().count();
        if !(3..=50).contains(&name_len) {
            return Err(AppError::validation("username must be 3-50 characters"));
        }
        if !is_valid_email(&self.email) || self.email.chars().count() > 150 {
            return Err(AppError::validation("Invalid email"));
        }
        let pw_len = self.password.chars().count();
        if !(6..=64).contains(&pw_len) {
            return Err(AppError::validation("password must be 6-64 characters"));
        }
        Ok(())
    }
}

/// OAuth2-style password form: `username` carries the email.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestEmail {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            avatar: u.avatar,
            role: u.role,
            is_verified: u.is_verified,
            created_at: u.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(username: &str, email: &str, password: &str) -> SignupRequest {
        SignupRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn signup_normalizes_email() {
        let mut req = signup("kadulin", "  Kadulin@Example.COM ", "password");
        req.validate().unwrap();
        assert_eq!(req.email, "kadulin@example.com");
    }

    #[test]
    fn signup_rejects_bad_fields() {
        assert!(signup("ab", "a@b.io", "password").validate().is_err());
        assert!(signup("kadulin", "not-an-email", "password").validate().is_err());
        assert!(signup("kadulin", "a@b.io", "12345").validate().is_err());
    }

    #[test]
    fn user_response_never_contains_secrets() {
        let user = User {
            id: Uuid::new_v4(),
            username: "ann".into(),
            email: "ann@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            avatar: None,
            refresh_token: Some("refresh-secret".into()),
            role: Role::User,
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        let json = serde_json::to_string(&UserResponse::from(user)).unwrap();
        assert!(json.contains("ann@example.com"));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("password"));
        assert!(!json.contains("refresh"));
    }
}
