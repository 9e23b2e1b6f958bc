use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;

use crate::auth::repo_types::User;

/// How long a cached user record stays valid.
pub const USER_TTL_SECS: u64 = 300;

/// Short-lived cache of user records keyed by email.
#[async_trait]
pub trait UserCache: Send + Sync {
    async fn get(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn set(&self, user: &User, ttl_secs: u64) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct RedisUserCache {
    client: redis::Client,
}

impl RedisUserCache {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("open redis client")?;
        Ok(Self { client })
    }

    fn key(email: &str) -> String {
        format!("user:{email}")
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, email: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect")?;
        let raw: Option<String> = conn.get(Self::key(email)).await.context("redis get")?;
        match raw {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("decode cached user")?,
            )),
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect")?;
        let json = serde_json::to_string(user).context("encode user")?;
        let _: () = conn
            .set_ex(Self::key(&user.email), json, ttl_secs)
            .await
            .context("redis set_ex")?;
        Ok(())
    }
}
