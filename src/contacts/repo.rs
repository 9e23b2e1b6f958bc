use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::contacts::repo_types::{like_pattern, Contact, ContactFields, ContactFilter};

/// Contact storage. Every operation is scoped to the owning user.
#[async_trait]
pub trait ContactRepo: Send + Sync {
    async fn search(
        &self,
        user_id: Uuid,
        filter: &ContactFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Contact>>;

    async fn list(&self, user_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Contact>> {
        self.search(user_id, &ContactFilter::default(), limit, offset)
            .await
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Contact>>;

    async fn create(&self, user_id: Uuid, fields: &ContactFields) -> anyhow::Result<Contact>;

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        fields: &ContactFields,
    ) -> anyhow::Result<Option<Contact>>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Contact>>;

    /// Contacts whose birthday `MM-DD` is one of `keys`.
    async fn with_birthdays(&self, user_id: Uuid, keys: &[String]) -> anyhow::Result<Vec<Contact>>;
}

const CONTACT_COLUMNS: &str =
    "id, user_id, first_name, last_name, phone, email, birthday, addition, created_at";

#[derive(Clone)]
pub struct PgContactRepo {
    db: PgPool,
}

impl PgContactRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ContactRepo for PgContactRepo {
    async fn search(
        &self,
        user_id: Uuid,
        filter: &ContactFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Contact>> {
        let pattern = |v: &Option<String>| v.as_deref().map(like_pattern);
        let rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM contacts
            WHERE user_id = $1
              AND ($2::text IS NULL OR first_name ILIKE $2)
              AND ($3::text IS NULL OR last_name ILIKE $3)
              AND ($4::text IS NULL OR email ILIKE $4)
            ORDER BY created_at, id
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(user_id)
        .bind(pattern(&filter.first_name))
        .bind(pattern(&filter.last_name))
        .bind(pattern(&filter.email))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("search contacts")?;
        Ok(rows)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get contact")?;
        Ok(row)
    }

    async fn create(&self, user_id: Uuid, fields: &ContactFields) -> anyhow::Result<Contact> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            INSERT INTO contacts (user_id, first_name, last_name, phone, email, birthday, addition)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.phone)
        .bind(&fields.email)
        .bind(&fields.birthday)
        .bind(&fields.addition)
        .fetch_one(&self.db)
        .await
        .context("insert contact")?;
        Ok(row)
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        fields: &ContactFields,
    ) -> anyhow::Result<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            r#"
            UPDATE contacts
               SET first_name = $3, last_name = $4, phone = $5,
                   email = $6, birthday = $7, addition = $8
             WHERE id = $1 AND user_id = $2
            RETURNING {CONTACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(&fields.phone)
        .bind(&fields.email)
        .bind(&fields.birthday)
        .bind(&fields.addition)
        .fetch_optional(&self.db)
        .await
        .context("update contact")?;
        Ok(row)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(&format!(
            "DELETE FROM contacts WHERE id = $1 AND user_id = $2 RETURNING {CONTACT_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("delete contact")?;
        Ok(row)
    }

    async fn with_birthdays(&self, user_id: Uuid, keys: &[String]) -> anyhow::Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>(&format!(
            r#"
            SELECT {CONTACT_COLUMNS}
            FROM contacts
            WHERE user_id = $1
              AND birthday IS NOT NULL
              AND substring(birthday from 6 for 5) = ANY($2)
            ORDER BY created_at, id
            "#
        ))
        .bind(user_id)
        .bind(keys)
        .fetch_all(&self.db)
        .await
        .context("contacts by birthday")?;
        Ok(rows)
    }
}
