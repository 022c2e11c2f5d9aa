use redis::{aio::MultiplexedConnection, Client, Script};
use std::time::Duration;

use crate::error::AppResult;

/// Deletes the key only while it still holds our token.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    // Job locks
    pub async fn try_acquire_job_lock(
        &self,
        job: &str,
        holder: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let key = format!("job-lock:{}", job);
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(holder)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    pub async fn release_job_lock(&self, job: &str, holder: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = format!("job-lock:{}", job);
        let _: i64 = Script::new(RELEASE_LOCK_SCRIPT)
            .key(&key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
