use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, patch},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    auth::{dto::UserResponse, extractors::CurrentUser, services::cache_user},
    error::{AppError, AppResult},
    state::AppState,
};

const AVATAR_FIELD: &str = "file";
const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(me))
        .route(
            "/users/avatar",
            patch(update_avatar).layer(DefaultBodyLimit::max(MAX_AVATAR_BYTES)),
        )
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(user.into())
}

/// PATCH /users/avatar (multipart, field `file`)
#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<UserResponse>> {
    let mut mp = mp?;
    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some((data, content_type));
        break;
    }
    let Some((data, content_type)) = upload.filter(|(d, _)| !d.is_empty()) else {
        return Err(AppError::BadRequest("file is required".into()));
    };

    let key = format!("avatars/{}", user.id);
    state
        .storage
        .put_object(&key, data, &content_type)
        .await?;
    let url = format!(
        "{}?v={}",
        state.storage.public_url(&key),
        OffsetDateTime::now_utc().unix_timestamp()
    );

    let updated = state
        .users
        .update_avatar(&user.email, &url)
        .await?
        .ok_or_else(|| AppError::unauthorized("Could not validate credentials"))?;

    cache_user(&state, &updated).await;
    info!(user_id = %updated.id, "avatar updated");
    Ok(Json(updated.into()))
}
