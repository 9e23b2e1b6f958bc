use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    auth::repo_types::User,
    contacts::{
        dto::{Pagination, SearchQuery},
        repo_types::{Contact, ContactFields},
    },
    error::{AppError, AppResult},
    state::AppState,
};

fn not_found() -> AppError {
    AppError::NotFound("Contact not found".into())
}

/// `MM-DD` keys for `start` through `start + days`, both ends included.
pub fn birthday_window(start: Date, days: u32) -> Vec<String> {
    (0..=i64::from(days))
        .filter_map(|i| start.checked_add(Duration::days(i)))
        .map(|d| format!("{:02}-{:02}", u8::from(d.month()), d.day()))
        .collect()
}

pub async fn list(state: &AppState, user: &User, page: Pagination) -> AppResult<Vec<Contact>> {
    page.validate()?;
    Ok(state.contacts.list(user.id, page.limit, page.offset).await?)
}

pub async fn search(state: &AppState, user: &User, query: SearchQuery) -> AppResult<Vec<Contact>> {
    let (filter, page) = query.into_parts()?;
    debug!(?filter, "search contacts");
    Ok(state
        .contacts
        .search(user.id, &filter, page.limit, page.offset)
        .await?)
}

pub async fn get(state: &AppState, user: &User, id: Uuid) -> AppResult<Contact> {
    state.contacts.get(user.id, id).await?.ok_or_else(not_found)
}

pub async fn add(state: &AppState, user: &User, fields: ContactFields) -> AppResult<Contact> {
    let contact = state.contacts.create(user.id, &fields).await?;
    info!(user_id = %user.id, contact_id = %contact.id, "contact created");
    Ok(contact)
}

pub async fn update(
    state: &AppState,
    user: &User,
    id: Uuid,
    fields: ContactFields,
) -> AppResult<Contact> {
    let contact = state
        .contacts
        .update(user.id, id, &fields)
        .await?
        .ok_or_else(not_found)?;
    info!(user_id = %user.id, contact_id = %id, "contact updated");
    Ok(contact)
}

pub async fn delete(state: &AppState, user: &User, id: Uuid) -> AppResult<Contact> {
    let contact = state
        .contacts
        .delete(user.id, id)
        .await?
        .ok_or_else(not_found)?;
    info!(user_id = %user.id, contact_id = %id, "contact deleted");
    Ok(contact)
}

pub async fn upcoming_birthdays(state: &AppState, user: &User, days: u32) -> AppResult<Vec<Contact>> {
    let today = OffsetDateTime::now_utc().date();
    let keys = birthday_window(today, days);
    Ok(state.contacts.with_birthdays(user.id, &keys).await?)
}
