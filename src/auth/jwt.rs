use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{
    config::{JwtConfig, MAX_TTL_MINUTES},
    state::AppState,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid token kind")]
    InvalidTokenKind,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
}

/// Signing and verification keys together with token policy.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub email_ttl: Duration,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm.into(),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: minutes(cfg.ttl_minutes),
            refresh_ttl: minutes(cfg.refresh_ttl_minutes),
            email_ttl: minutes(cfg.email_ttl_minutes),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

fn minutes(m: i64) -> Duration {
    Duration::from_secs(m.clamp(0, MAX_TTL_MINUTES) as u64 * 60)
}

impl JwtKeys {
    fn sign_with_kind(&self, subject: &str, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::Email => self.email_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind,
        };
        let token = self.sign_claims(&claims)?;
        debug!(sub = %subject, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub(crate) fn sign_claims(&self, claims: &Claims) -> anyhow::Result<String> {
        Ok(encode(&Header::new(self.algorithm), claims, &self.encoding)?)
    }

    pub fn create_access_token(&self, subject: &str) -> anyhow::Result<String> {
        self.sign_with_kind(subject, TokenKind::Access)
    }

    pub fn create_refresh_token(&self, subject: &str) -> anyhow::Result<String> {
        self.sign_with_kind(subject, TokenKind::Refresh)
    }

    pub fn create_email_token(&self, subject: &str) -> anyhow::Result<String> {
        self.sign_with_kind(subject, TokenKind::Email)
    }

    /// Checks signature, expiry, issuer and audience. The kind is not checked.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::TokenExpired,
                _ => TokenError::TokenInvalid,
            }
        })?;
        debug!(sub = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<String, TokenError> {
        let claims = self.verify(token)?;
        if claims.kind != kind {
            return Err(TokenError::InvalidTokenKind);
        }
        Ok(claims.sub)
    }

    pub fn decode_access_token(&self, token: &str) -> Result<String, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<String, TokenError> {
        self.verify_kind(token, TokenKind::Refresh)
    }

    pub fn get_email_from_token(&self, token: &str) -> Result<String, TokenError> {
        self.verify_kind(token, TokenKind::Email)
    }
}
