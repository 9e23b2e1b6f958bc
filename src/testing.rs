//! Test collaborators: in-memory fakes for the service and HTTP tests, and a
//! shared Postgres for the repository tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use lazy_static::lazy_static;
use sqlx::{postgres::PgPoolOptions, PgPool};
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        repo::UserRepo,
        repo_types::{NewUser, Role, User},
    },
    cache::UserCache,
    config::{AppConfig, JwtAlgorithm, JwtConfig, MailConfig, StorageConfig},
    contacts::{
        repo::ContactRepo,
        repo_types::{Contact, ContactFields, ContactFilter},
    },
    mail::{Mailer, OutgoingEmail},
    state::AppState,
    storage::StorageClient,
};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Mutex<Vec<User>>,
}

impl MemoryUserRepo {
    fn modify<T>(&self, email: &str, f: impl FnOnce(&mut User) -> T) -> Option<T> {
        let mut users = self.users.lock().unwrap();
        users.iter_mut().find(|u| u.email == email).map(|u| {
            let out = f(u);
            u.updated_at = Some(OffsetDateTime::now_utc());
            out
        })
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Ok(None);
        }
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            avatar: user.avatar,
            refresh_token: None,
            role: Role::User,
            is_verified: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        users.push(created.clone());
        Ok(Some(created))
    }

    async fn update_token(&self, email: &str, token: Option<&str>) -> anyhow::Result<()> {
        self.modify(email, |u| u.refresh_token = token.map(str::to_string));
        Ok(())
    }

    async fn rotate_token(&self, email: &str, current: &str, next: &str) -> anyhow::Result<bool> {
        let mut users = self.users.lock().unwrap();
        match users
            .iter_mut()
            .find(|u| u.email == email && u.refresh_token.as_deref() == Some(current))
        {
            Some(u) => {
                u.refresh_token = Some(next.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn confirm_email(&self, email: &str) -> anyhow::Result<()> {
        self.modify(email, |u| u.is_verified = true);
        Ok(())
    }

    async fn update_avatar(&self, email: &str, url: &str) -> anyhow::Result<Option<User>> {
        Ok(self.modify(email, |u| {
            u.avatar = Some(url.to_string());
            u.clone()
        }))
    }
}

/// Same rule as the `ILIKE` search: every present value must be a
/// case-insensitive substring of its field.
fn matches_filter(filter: &ContactFilter, contact: &Contact) -> bool {
    fn contains(haystack: &str, needle: &Option<String>) -> bool {
        match needle {
            Some(n) => haystack.to_lowercase().contains(&n.to_lowercase()),
            None => true,
        }
    }
    contains(&contact.first_name, &filter.first_name)
        && contains(&contact.last_name, &filter.last_name)
        && contains(&contact.email, &filter.email)
}

/// `MM-DD` of a `YYYY-MM-DD` birthday.
fn birthday_key(contact: &Contact) -> Option<&str> {
    contact.birthday.as_deref().and_then(|b| b.get(5..10))
}

#[derive(Default)]
pub struct MemoryContactRepo {
    contacts: Mutex<Vec<Contact>>,
}

#[async_trait]
impl ContactRepo for MemoryContactRepo {
    async fn search(
        &self,
        user_id: Uuid,
        filter: &ContactFilter,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<Contact>> {
        let contacts = self.contacts.lock().unwrap();
        Ok(contacts
            .iter()
            .filter(|c| c.user_id == user_id && matches_filter(filter, c))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Contact>> {
        let contacts = self.contacts.lock().unwrap();
        Ok(contacts
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .cloned())
    }

    async fn create(&self, user_id: Uuid, fields: &ContactFields) -> anyhow::Result<Contact> {
        let contact = Contact {
            id: Uuid::new_v4(),
            user_id,
            first_name: fields.first_name.clone(),
            last_name: fields.last_name.clone(),
            phone: fields.phone.clone(),
            email: fields.email.clone(),
            birthday: fields.birthday.clone(),
            addition: fields.addition.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        // Insertion order stands in for ORDER BY created_at.
        self.contacts.lock().unwrap().push(contact.clone());
        Ok(contact)
    }

    async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        fields: &ContactFields,
    ) -> anyhow::Result<Option<Contact>> {
        let mut contacts = self.contacts.lock().unwrap();
        Ok(contacts
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
            .map(|c| {
                c.first_name = fields.first_name.clone();
                c.last_name = fields.last_name.clone();
                c.phone = fields.phone.clone();
                c.email = fields.email.clone();
                c.birthday = fields.birthday.clone();
                c.addition = fields.addition.clone();
                c.clone()
            }))
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Contact>> {
        let mut contacts = self.contacts.lock().unwrap();
        let pos = contacts
            .iter()
            .position(|c| c.id == id && c.user_id == user_id);
        Ok(pos.map(|i| contacts.remove(i)))
    }

    async fn with_birthdays(&self, user_id: Uuid, keys: &[String]) -> anyhow::Result<Vec<Contact>> {
        let contacts = self.contacts.lock().unwrap();
        Ok(contacts
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| birthday_key(c).is_some_and(|k| keys.iter().any(|x| x == k)))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

/// Stores JSON like the Redis cache does, so secrets are dropped the same way.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl UserCache for MemoryCache {
    async fn get(&self, email: &str) -> anyhow::Result<Option<User>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(email) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User, _ttl_secs: u64) -> anyhow::Result<()> {
        let json = serde_json::to_string(user)?;
        self.entries.lock().unwrap().insert(user.email.clone(), json);
        Ok(())
    }
}

/// Object store keeping `(key, content_type, body)` triples.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<Vec<(String, String, Bytes)>>,
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|(k, _, _)| k != key);
        objects.push((key.to_string(), content_type.to_string(), body));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://storage.test/avatars-bucket/{key}")
    }
}

struct Recorders {
    mailer: Arc<RecordingMailer>,
    storage: Arc<FakeStorage>,
}

lazy_static! {
    // Keyed by the per-state public URL, which is unique for every fake state.
    static ref RECORDERS: Mutex<HashMap<String, Recorders>> = Mutex::new(HashMap::new());
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FakeOptions {
    pub require_verified_email: bool,
}

pub fn fake_state() -> AppState {
    fake_state_with(FakeOptions::default())
}

/// Builds an `AppState` backed by in-memory collaborators. The pool is lazy and
/// never connects unless a test hits a raw SQL path.
pub fn fake_state_with(opts: FakeOptions) -> AppState {
    let public_url = format!("http://{}.test", Uuid::new_v4());
    let config = AppConfig {
        database_url: "postgres://localhost/contactbook_test".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            algorithm: JwtAlgorithm::HS256,
            issuer: "contactbook".into(),
            audience: "contactbook-users".into(),
            ttl_minutes: 15,
            refresh_ttl_minutes: 60 * 24 * 7,
            email_ttl_minutes: 60 * 24,
        },
        mail: MailConfig {
            server: "localhost".into(),
            port: 1025,
            username: String::new(),
            password: String::new(),
            from: "noreply@contactbook.test".into(),
            from_name: "Contactbook".into(),
        },
        storage: StorageConfig {
            endpoint: "http://storage.test".into(),
            bucket: "avatars-bucket".into(),
            access_key: "minio".into(),
            secret_key: "minio123".into(),
            public_url: "http://storage.test".into(),
        },
        redis_url: "redis://localhost".into(),
        public_url: public_url.clone(),
        require_verified_email: opts.require_verified_email,
    };

    let db = PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .expect("lazy pool");

    let mailer = Arc::new(RecordingMailer::default());
    let storage = Arc::new(FakeStorage::default());
    RECORDERS.lock().unwrap().insert(
        public_url,
        Recorders {
            mailer: mailer.clone(),
            storage: storage.clone(),
        },
    );

    AppState {
        db,
        config: Arc::new(config),
        users: Arc::new(MemoryUserRepo::default()),
        contacts: Arc::new(MemoryContactRepo::default()),
        storage,
        mailer,
        cache: Arc::new(MemoryCache::default()),
    }
}

/// Mail handed to the mailer of `state` so far.
pub fn sent_mail(state: &AppState) -> Vec<OutgoingEmail> {
    let recorders = RECORDERS.lock().unwrap();
    recorders
        .get(&state.config.public_url)
        .map(|r| r.mailer.sent.lock().unwrap().clone())
        .unwrap_or_default()
}

/// `(key, content_type)` of every object stored through `state`.
pub fn stored_objects(state: &AppState) -> Vec<(String, String)> {
    let recorders = RECORDERS.lock().unwrap();
    recorders
        .get(&state.config.public_url)
        .map(|r| {
            r.storage
                .objects
                .lock()
                .unwrap()
                .iter()
                .map(|(k, ct, _)| (k.clone(), ct.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Lets spawned background tasks (mail delivery) run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// Migrated database shared by every repository test in the run.
struct SharedPostgres {
    url: String,
    // Keeps the container alive for the whole run.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<Option<SharedPostgres>> = OnceCell::const_new();

async fn start_postgres() -> anyhow::Result<SharedPostgres> {
    let (url, container) = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => (url, None),
        Err(_) => {
            let pg = Postgres::default()
                .with_tag("16")
                .start()
                .await
                .context("start Postgres container")?;
            let host = pg.get_host().await?;
            let port = pg.get_host_port_ipv4(5432).await?;
            (
                format!("postgresql://postgres:postgres@{host}:{port}/postgres"),
                Some(pg),
            )
        }
    };

    let pool = PgPool::connect(&url)
        .await
        .context("connect to Postgres for migrations")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("run migrations")?;
    pool.close().await;

    Ok(SharedPostgres {
        url,
        _container: container,
    })
}

/// Pool on a migrated Postgres: `TEST_DATABASE_URL` when set, otherwise a
/// testcontainer. `None` when neither can be reached, so the caller skips.
pub async fn pg_pool() -> Option<PgPool> {
    let shared = SHARED_PG
        .get_or_init(|| async {
            match start_postgres().await {
                Ok(pg) => Some(pg),
                Err(e) => {
                    eprintln!("Postgres unavailable, skipping repository tests: {e:#}");
                    None
                }
            }
        })
        .await
        .as_ref()?;
    // One pool per test: each #[tokio::test] has its own runtime.
    PgPoolOptions::new()
        .max_connections(4)
        .connect(&shared.url)
        .await
        .ok()
}

mod tests {
    use super::*;

    fn contact(first: &str, last: &str, email: &str, birthday: Option<&str>) -> Contact {
        Contact {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            first_name: first.into(),
            last_name: last.into(),
            phone: None,
            email: email.into(),
            birthday: birthday.map(str::to_string),
            addition: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn fake_filter_is_case_insensitive_and() {
        let john = contact("John", "Doe", "john.doe@example.com", None);
        let jane = contact("Jane", "Doe", "jane.doe@example.com", None);
        let f = ContactFilter {
            first_name: Some("JO".into()),
            last_name: Some("doe".into()),
            ..Default::default()
        };
        assert!(matches_filter(&f, &john));
        assert!(!matches_filter(&f, &jane));
        assert!(matches_filter(&ContactFilter::default(), &jane));
    }

    #[test]
    fn fake_birthday_key_is_month_and_day() {
        assert_eq!(birthday_key(&contact("a", "b", "c", Some("2000-12-30"))), Some("12-30"));
        assert_eq!(birthday_key(&contact("a", "b", "c", None)), None);
    }
}
