use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    auth::repo::{PgUserRepo, UserRepo},
    cache::{RedisUserCache, UserCache},
    config::AppConfig,
    contacts::repo::{ContactRepo, PgContactRepo},
    mail::{Mailer, SmtpMailer},
    storage::{Storage, StorageClient},
};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub contacts: Arc<dyn ContactRepo>,
    pub storage: Arc<dyn StorageClient>,
    pub mailer: Arc<dyn Mailer>,
    pub cache: Arc<dyn UserCache>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(Storage::new(&config.storage, "us-east-1").await?)
            as Arc<dyn StorageClient>;
        let mailer = Arc::new(SmtpMailer::new(&config.mail)?) as Arc<dyn Mailer>;
        let cache = Arc::new(RedisUserCache::new(&config.redis_url)?) as Arc<dyn UserCache>;

        Ok(Self {
            users: Arc::new(PgUserRepo::new(db.clone())),
            contacts: Arc::new(PgContactRepo::new(db.clone())),
            db,
            config,
            storage,
            mailer,
            cache,
        })
    }
}
