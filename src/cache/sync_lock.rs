use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redis::Client as RedisClient;
use uuid::Uuid;

use crate::error::SyncError;

// 只删除自己持有的锁，避免过期后误删别人的
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub fn sync_lock_key(integration_id: i64) -> String {
    format!("spond:sync:{}", integration_id)
}

/// 每个集成配置同一时间只允许一次同步
#[derive(Clone)]
pub struct SyncLock {
    redis: Arc<RedisClient>,
    ttl: Duration,
}

pub struct SyncLockGuard {
    redis: Arc<RedisClient>,
    key: String,
    token: String,
}

impl SyncLock {
    pub fn new(redis: Arc<RedisClient>, ttl: Duration) -> Self {
        Self { redis, ttl }
    }

    pub async fn acquire(&self, integration_id: i64) -> Result<SyncLockGuard, SyncError> {
        let key = sync_lock_key(integration_id);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        if acquired.is_none() {
            tracing::warn!("Sync lock {} is held by another request", key);
            return Err(SyncError::Conflict("sync already in progress".into()));
        }

        tracing::debug!("Acquired sync lock {}", key);
        Ok(SyncLockGuard {
            redis: self.redis.clone(),
            key,
            token,
        })
    }

    /// 持锁执行，结束后无论成败都释放
    ///
    /// 任务跑在独立的 tokio 任务上，请求断开后同步仍会完成
    pub async fn run<F, T>(&self, integration_id: i64, task: F) -> Result<T, SyncError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.acquire(integration_id).await?;
        run_detached(task, move || async move {
            if let Err(e) = guard.release().await {
                // 锁会按 TTL 自动过期
                tracing::error!("Failed to release sync lock: {}", e);
            }
        })
        .await
    }
}

/// 在独立任务里执行 task，task 结束或 panic 后都会调用 finish
async fn run_detached<F, T, R, RF>(task: F, finish: R) -> Result<T, SyncError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    R: FnOnce() -> RF + Send + 'static,
    RF: Future<Output = ()> + Send,
{
    let handle = tokio::spawn(async move {
        let outcome = tokio::spawn(task).await;
        finish().await;
        outcome
    });
    Ok(handle.await??)
}

impl SyncLockGuard {
    pub async fn release(self) -> Result<(), SyncError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let removed: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            tracing::warn!("Sync lock {} expired before release", self.key);
        } else {
            tracing::debug!("Released sync lock {}", self.key);
        }
        Ok(())
    }
}
