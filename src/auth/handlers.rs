use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{LoginForm, MessageResponse, RequestEmail, SignupRequest, TokenResponse, UserResponse},
        extractors::BearerToken,
        services::{self, ConfirmOutcome, ResendOutcome},
    },
    error::AppResult,
    extract::{AppForm, AppJson, AppPath},
    state::AppState,
};

const ALREADY_CONFIRMED: &str = "Your email is already confirmed";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh_token", post(refresh_token))
        .route("/auth/request_email", post(request_email))
        .route("/auth/request_email/:email", get(resend_request_email))
        .route("/auth/confirmed_email/:token", get(confirmed_email))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn signup(
    State(state): State<AppState>,
    AppJson(payload): AppJson<SignupRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let user = services::signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, form), fields(email = %form.username))]
pub async fn login(
    State(state): State<AppState>,
    AppForm(form): AppForm<LoginForm>,
) -> AppResult<Json<TokenResponse>> {
    Ok(Json(services::login(&state, form).await?))
}

#[instrument(skip(state, token))]
pub async fn refresh_token(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> AppResult<Json<TokenResponse>> {
    Ok(Json(services::refresh(&state, &token).await?))
}

#[instrument(skip(state))]
pub async fn resend_request_email(
    State(state): State<AppState>,
    AppPath(email): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    resend(&state, &email).await
}

#[instrument(skip(state, body), fields(email = %body.email))]
pub async fn request_email(
    State(state): State<AppState>,
    AppJson(body): AppJson<RequestEmail>,
) -> AppResult<Json<MessageResponse>> {
    resend(&state, &body.email).await
}

async fn resend(state: &AppState, email: &str) -> AppResult<Json<MessageResponse>> {
    let message = match services::request_email(state, email).await? {
        ResendOutcome::AlreadyConfirmed => ALREADY_CONFIRMED,
        ResendOutcome::Requested => "Check your email for confirmation.",
    };
    Ok(Json(MessageResponse { message }))
}

#[instrument(skip(state, token))]
pub async fn confirmed_email(
    State(state): State<AppState>,
    AppPath(token): AppPath<String>,
) -> AppResult<Json<MessageResponse>> {
    let message = match services::confirm_email(&state, &token).await? {
        ConfirmOutcome::AlreadyConfirmed => ALREADY_CONFIRMED,
        ConfirmOutcome::Confirmed => "Email confirmed",
    };
    Ok(Json(MessageResponse { message }))
}
