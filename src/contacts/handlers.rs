use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{BirthdayQuery, ContactRequest, Pagination, SearchQuery},
    repo_types::Contact,
    services,
};
use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    state::AppState,
};

pub fn contact_routes() -> Router<AppState> {
    Router::new()
        .route("/contacts/", get(list_contacts).post(add_contact))
        .route("/contacts/search", get(search_contacts))
        .route("/contacts/next_birthday", get(next_birthday))
        .route(
            "/contacts/:id",
            get(get_contact).put(update_contact).delete(delete_contact),
        )
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppQuery(page): AppQuery<Pagination>,
) -> AppResult<Json<Vec<Contact>>> {
    Ok(Json(services::list(&state, &user, page).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn search_contacts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppQuery(query): AppQuery<SearchQuery>,
) -> AppResult<Json<Vec<Contact>>> {
    Ok(Json(services::search(&state, &user, query).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn next_birthday(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppQuery(query): AppQuery<BirthdayQuery>,
) -> AppResult<Json<Vec<Contact>>> {
    let days = query.window()?;
    Ok(Json(services::upcoming_birthdays(&state, &user, days).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Contact>> {
    Ok(Json(services::get(&state, &user, id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn add_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(body): AppJson<ContactRequest>,
) -> AppResult<(StatusCode, Json<Contact>)> {
    let fields = body.into_fields()?;
    let contact = services::add(&state, &user, fields).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<ContactRequest>,
) -> AppResult<Json<Contact>> {
    let fields = body.into_fields()?;
    Ok(Json(services::update(&state, &user, id, fields).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    services::delete(&state, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
