use serde::Deserialize;
use time::{macros::format_description, Date};

use crate::{
    auth::services::is_valid_email,
    contacts::repo_types::{ContactFields, ContactFilter},
    error::{AppError, AppResult},
};

pub const MIN_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 500;
pub const MAX_BIRTHDAY_WINDOW: i64 = 365;

/// Request body for creating or replacing a contact.
#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub email: String,
    #[serde(default)]
    pub birthday: Option<String>,
    #[serde(default)]
    pub addition: Option<String>,
}

impl ContactRequest {
    pub fn into_fields(self) -> AppResult<ContactFields> {
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        check_len("first_name", &first_name, 2, 50)?;
        check_len("last_name", &last_name, 2, 50)?;

        let email = self.email.trim().to_string();
        if !is_valid_email(&email) || email.chars().count() > 150 {
            return Err(AppError::validation("Invalid email"));
        }

        let phone = non_blank(self.phone);
        if let Some(p) = &phone {
            check_len("phone", p, 0, 20)?;
        }
        let addition = non_blank(self.addition);
        if let Some(a) = &addition {
            check_len("addition", a, 0, 250)?;
        }
        let birthday = non_blank(self.birthday);
        if let Some(b) = &birthday {
            parse_birthday(b)?;
        }

        Ok(ContactFields {
            first_name,
            last_name,
            phone,
            email,
            birthday,
            addition,
        })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> AppResult<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::validation(format!(
            "{field} must be {min}-{max} characters"
        )));
    }
    Ok(())
}

/// Accepts only `YYYY-MM-DD` calendar dates.
pub fn parse_birthday(value: &str) -> AppResult<Date> {
    let invalid = || AppError::validation("Invalid date format. It should be YYYY-MM-DD.");
    if value.len() != 10 {
        return Err(invalid());
    }
    Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|_| invalid())
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    MIN_LIMIT
}

impl Pagination {
    pub fn validate(&self) -> AppResult<()> {
        check_page(self.limit, self.offset)
    }
}

fn check_page(limit: i64, offset: i64) -> AppResult<()> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::validation(format!(
            "limit must be between {MIN_LIMIT} and {MAX_LIMIT}"
        )));
    }
    if offset < 0 {
        return Err(AppError::validation("offset must be non-negative"));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl SearchQuery {
    pub fn into_parts(self) -> AppResult<(ContactFilter, Pagination)> {
        check_page(self.limit, self.offset)?;
        let filter = ContactFilter {
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
        }
        .normalized();
        Ok((
            filter,
            Pagination {
                limit: self.limit,
                offset: self.offset,
            },
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct BirthdayQuery {
    #[serde(default = "default_window")]
    pub next_day: i64,
}

fn default_window() -> i64 {
    7
}

impl BirthdayQuery {
    pub fn window(&self) -> AppResult<u32> {
        if !(0..=MAX_BIRTHDAY_WINDOW).contains(&self.next_day) {
            return Err(AppError::validation(format!(
                "next_day must be between 0 and {MAX_BIRTHDAY_WINDOW}"
            )));
        }
        Ok(self.next_day as u32)
    }
}
