use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::SyncError;
use crate::spond::client::SpondClient;
use crate::store::EventStore;

/// 全俱乐部共用的 Spond 会话
///
/// 首次使用时按当前有效配置创建客户端，令牌随客户端缓存；
/// 配置变更或删除时由路由层调用 `clear`
#[derive(Clone, Default)]
pub struct SpondSession {
    inner: Arc<Mutex<Option<Arc<SpondClient>>>>,
}

impl SpondSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn client(
        &self,
        store: &dyn EventStore,
        config: &Config,
    ) -> Result<Arc<SpondClient>, SyncError> {
        let mut guard = self.inner.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let integration = store
            .get_active_integration_config()
            .await?
            .ok_or(SyncError::NotConfigured)?;

        tracing::info!("Creating Spond session for {}", integration.username);
        let client = Arc::new(SpondClient::new(
            &config.spond_api_base,
            &integration.username,
            &integration.password,
            config.spond_timeout(),
        )?);
        *guard = Some(client.clone());
        Ok(client)
    }

    pub async fn clear(&self) {
        let mut guard = self.inner.lock().await;
        if guard.take().is_some() {
            tracing::info!("Spond session cleared");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.is_some()
    }
}
