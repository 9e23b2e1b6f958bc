use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{LoginForm, SignupRequest, TokenResponse},
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo_types::{NewUser, User},
    },
    cache::USER_TTL_SECS,
    error::{AppError, AppResult},
    mail::{confirmation_email, spawn_send},
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Default avatar for a new account.
pub fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{}?d=identicon", hex::encode(digest))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    AlreadyConfirmed,
    Requested,
}

const INVALID_REFRESH: &str = "Invalid refresh token";
const VERIFICATION_ERROR: &str = "Verification error";

pub async fn signup(state: &AppState, mut req: SignupRequest) -> AppResult<User> {
    req.validate()?;

    if state.users.find_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict("Account already exists".into()));
    }

    let new_user = NewUser {
        avatar: Some(gravatar_url(&req.email)),
        password_hash: hash_password(&req.password)?,
        username: req.username,
        email: req.email,
    };
    let email = new_user.email.clone();
    let user = state.users.create(new_user).await?.ok_or_else(|| {
        warn!(email = %email, "email registered concurrently");
        AppError::Conflict("Account already exists".into())
    })?;

    send_confirmation(state, &user);
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

pub async fn login(state: &AppState, form: LoginForm) -> AppResult<TokenResponse> {
    let email = form.username.trim().to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::unauthorized("Invalid email"));
    };

    if !verify_password(&form.password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized("Invalid password"));
    }

    if state.config.require_verified_email && !user.is_verified {
        warn!(email = %email, user_id = %user.id, "login before email confirmation");
        return Err(AppError::unauthorized("Email not confirmed"));
    }

    let keys = JwtKeys::from_ref(state);
    let pair = issue_pair(&keys, &user.email)?;
    state
        .users
        .update_token(&user.email, Some(&pair.refresh_token))
        .await?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(pair)
}

/// Exchanges the current refresh token for a new pair. A token that does not
/// match the stored one revokes the stored one too.
pub async fn refresh(state: &AppState, token: &str) -> AppResult<TokenResponse> {
    let keys = JwtKeys::from_ref(state);
    let email = keys.decode_refresh_token(token).map_err(|e| {
        warn!(error = %e, "refresh token rejected");
        AppError::unauthorized(e.to_string())
    })?;

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "refresh for unknown user");
        return Err(AppError::unauthorized(INVALID_REFRESH));
    };

    if user.refresh_token.as_deref() != Some(token) {
        warn!(user_id = %user.id, "stale refresh token presented; revoking");
        state.users.update_token(&email, None).await?;
        return Err(AppError::unauthorized(INVALID_REFRESH));
    }

    let pair = issue_pair(&keys, &email)?;
    if !state
        .users
        .rotate_token(&email, token, &pair.refresh_token)
        .await?
    {
        warn!(user_id = %user.id, "refresh token rotated concurrently");
        return Err(AppError::unauthorized(INVALID_REFRESH));
    }

    info!(user_id = %user.id, "tokens refreshed");
    Ok(pair)
}

pub async fn confirm_email(state: &AppState, token: &str) -> AppResult<ConfirmOutcome> {
    let keys = JwtKeys::from_ref(state);
    let email = keys.get_email_from_token(token).map_err(|e| {
        warn!(error = %e, "email token rejected");
        AppError::BadRequest(VERIFICATION_ERROR.into())
    })?;

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "confirmation for unknown user");
        return Err(AppError::BadRequest(VERIFICATION_ERROR.into()));
    };
    if user.is_verified {
        return Ok(ConfirmOutcome::AlreadyConfirmed);
    }

    state.users.confirm_email(&email).await?;
    let user = User {
        is_verified: true,
        ..user
    };
    cache_user(state, &user).await;
    info!(user_id = %user.id, email = %email, "email confirmed");
    Ok(ConfirmOutcome::Confirmed)
}

/// Re-sends the confirmation link. Unknown addresses get the same answer as
/// unverified ones, but nothing is sent.
pub async fn request_email(state: &AppState, email: &str) -> AppResult<ResendOutcome> {
    let email = email.trim().to_lowercase();
    match state.users.find_by_email(&email).await? {
        Some(user) if user.is_verified => Ok(ResendOutcome::AlreadyConfirmed),
        Some(user) => {
            send_confirmation(state, &user);
            Ok(ResendOutcome::Requested)
        }
        None => {
            warn!(email = %email, "confirmation requested for unknown email");
            Ok(ResendOutcome::Requested)
        }
    }
}

/// Resolves an access token to its user, going through the user cache.
pub async fn get_current_user(state: &AppState, token: &str) -> AppResult<User> {
    let keys = JwtKeys::from_ref(state);
    let email = keys.decode_access_token(token).map_err(|e| {
        warn!(error = %e, "access token rejected");
        AppError::unauthorized("Could not validate credentials")
    })?;

    match state.cache.get(&email).await {
        Ok(Some(user)) => return Ok(user),
        Ok(None) => {}
        Err(e) => warn!(error = ?e, "user cache read failed"),
    }

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::unauthorized("Could not validate credentials"))?;

    cache_user(state, &user).await;
    Ok(user)
}

/// Writes `user` to the cache. Cache failures are logged and ignored.
pub(crate) async fn cache_user(state: &AppState, user: &User) {
    if let Err(e) = state.cache.set(user, USER_TTL_SECS).await {
        warn!(error = ?e, "user cache write failed");
    }
}

fn issue_pair(keys: &JwtKeys, email: &str) -> anyhow::Result<TokenResponse> {
    Ok(TokenResponse::bearer(
        keys.create_access_token(email)?,
        keys.create_refresh_token(email)?,
    ))
}

/// Mails a fresh confirmation link without waiting for delivery.
fn send_confirmation(state: &AppState, user: &User) {
    let keys = JwtKeys::from_ref(state);
    let token = match keys.create_email_token(&user.email) {
        Ok(t) => t,
        Err(e) => {
            error!(error = ?e, user_id = %user.id, "email token signing failed");
            return;
        }
    };
    let link = format!(
        "{}/api/auth/confirmed_email/{}",
        state.config.public_url.trim_end_matches('/'),
        token
    );
    spawn_send(
        state.mailer.clone(),
        confirmation_email(&user.email, &user.username, &link),
    );
}
