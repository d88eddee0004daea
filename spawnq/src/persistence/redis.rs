use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::band::ScoreRange;
use crate::config::QueueConfig;
use crate::error::StoreError;
use crate::queue::OrderedStore;

/// Observe and remove the lowest-scored member in one server-side step.
const POP_MIN_IN_RANGE_SCRIPT: &str = r#"
local members = redis.call('ZRANGEBYSCORE', KEYS[1], ARGV[1], ARGV[2], 'LIMIT', 0, 1)
if #members == 0 then
    return false
end
redis.call('ZREM', KEYS[1], members[1])
return members[1]
"#;

/// [`OrderedStore`] over a Redis sorted set.
///
/// One multiplexed connection is opened lazily and shared. A failed command
/// drops it so the next call reconnects; the failed call is not retried.
#[derive(Clone)]
pub struct RedisOrderedStore {
    client: redis::Client,
    connection: Arc<Mutex<Option<redis::aio::MultiplexedConnection>>>,
}

impl std::fmt::Debug for RedisOrderedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisOrderedStore").finish_non_exhaustive()
    }
}

impl RedisOrderedStore {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
        })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, StoreError> {
        Self::new(&config.redis_url)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        tracing::debug!("ordered store connection opened");
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn fail(&self, operation: &'static str, err: redis::RedisError) -> StoreError {
        tracing::warn!(operation, error = %err, "ordered store command failed; dropping connection");
        *self.connection.lock().await = None;
        if err.is_io_error() || err.is_timeout() {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }

    async fn run<T>(&self, operation: &'static str, cmd: redis::Cmd) -> Result<T, StoreError>
    where
        T: redis::FromRedisValue,
    {
        let mut conn = self.connection().await?;
        match cmd.query_async(&mut conn).await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.fail(operation, err).await),
        }
    }
}

/// Render a score bound the way sorted-set commands expect it.
fn score_arg(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

/// Sorted-set `LIMIT` count; negative means "no limit".
fn limit_arg(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}

#[async_trait]
impl OrderedStore for RedisOrderedStore {
    async fn add(&self, key: &str, score: f64, member: &[u8]) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(score_arg(score)).arg(member);
        self.run("zadd", cmd).await
    }

    async fn range_by_score(
        &self,
        key: &str,
        range: ScoreRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key)
            .arg(score_arg(range.min))
            .arg(score_arg(range.max))
            .arg("LIMIT")
            .arg(offset)
            .arg(limit_arg(limit));
        self.run("zrangebyscore", cmd).await
    }

    async fn remove(&self, key: &str, member: &[u8]) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(key).arg(member);
        self.run("zrem", cmd).await
    }

    async fn remove_all(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<(u64, u64)> = redis::pipe()
            .atomic()
            .cmd("ZCARD")
            .arg(key)
            .cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await;
        match result {
            Ok((count, _)) => Ok(count),
            Err(err) => Err(self.fail("zcard_del", err).await),
        }
    }

    async fn cardinality(&self, key: &str) -> Result<u64, StoreError> {
        let mut cmd = redis::cmd("ZCARD");
        cmd.arg(key);
        self.run("zcard", cmd).await
    }

    async fn pop_min_in_range(
        &self,
        key: &str,
        range: ScoreRange,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(POP_MIN_IN_RANGE_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(score_arg(range.min))
            .arg(score_arg(range.max));
        self.run("pop_min", cmd).await
    }
}
