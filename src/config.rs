use std::str::FromStr;

use anyhow::Context;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

/// Upper bound for any token lifetime: ten years.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365 * 10;

/// Signing algorithms accepted for JWTs. Anything else fails at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum JwtAlgorithm {
    HS256,
    HS512,
}

impl FromStr for JwtAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "HS256" => Ok(Self::HS256),
            "HS512" => Ok(Self::HS512),
            other => anyhow::bail!("{other} is not a valid algorithm"),
        }
    }
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: JwtAlgorithm,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    pub email_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub storage: StorageConfig,
    pub redis_url: String,
    /// Base URL used to build links in outgoing mail.
    pub public_url: String,
    /// Reject logins from users who have not confirmed their email.
    pub require_verified_email: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
            algorithm: env_or("JWT_ALGORITHM", "HS256").parse()?,
            issuer: env_or("JWT_ISSUER", "contactbook"),
            audience: env_or("JWT_AUDIENCE", "contactbook-users"),
            ttl_minutes: ttl_minutes("JWT_TTL_MINUTES", env_parse("JWT_TTL_MINUTES", 15))?,
            refresh_ttl_minutes: ttl_minutes(
                "JWT_REFRESH_TTL_MINUTES",
                env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 7),
            )?,
            email_ttl_minutes: ttl_minutes(
                "JWT_EMAIL_TTL_MINUTES",
                env_parse("JWT_EMAIL_TTL_MINUTES", 60 * 24),
            )?,
        };

        let mail = MailConfig {
            server: env_or("MAIL_SERVER", "localhost"),
            port: env_parse("MAIL_PORT", 587),
            username: env_or("MAIL_USERNAME", ""),
            password: env_or("MAIL_PASSWORD", ""),
            from: env_or("MAIL_FROM", "noreply@localhost"),
            from_name: env_or("MAIL_FROM_NAME", "Contactbook"),
        };

        let endpoint = std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT")?;
        let storage = StorageConfig {
            public_url: env_or("MINIO_PUBLIC_URL", &endpoint),
            endpoint,
            bucket: std::env::var("MINIO_BUCKET").context("MINIO_BUCKET")?,
            access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY")?,
        };

        Ok(Self {
            database_url,
            jwt,
            mail,
            storage,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            public_url: env_or("APP_PUBLIC_URL", "http://localhost:8080"),
            require_verified_email: env_parse("AUTH_REQUIRE_VERIFIED_EMAIL", false),
        })
    }
}

fn ttl_minutes(key: &str, value: i64) -> anyhow::Result<i64> {
    if !(1..=MAX_TTL_MINUTES).contains(&value) {
        anyhow::bail!("{key} must be between 1 and {MAX_TTL_MINUTES} minutes, got {value}");
    }
    Ok(value)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
