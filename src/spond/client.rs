use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::spond::identifier::SpondId;
use crate::spond::models::{
    EventAttendance, EventBatch, EventFilter, EventPayload, RemoteEvent, RemoteGroup,
};

/// 对 Spond 的访问接口，协调器只依赖这个 trait
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn get_groups(&self) -> Result<Vec<RemoteGroup>, SyncError>;

    /// 单条解析失败不影响整批，记在 `EventBatch::malformed`
    async fn get_events(&self, filter: &EventFilter) -> Result<EventBatch, SyncError>;

    async fn get_event(&self, id: &SpondId) -> Result<RemoteEvent, SyncError>;

    async fn get_event_attendance(&self, id: &SpondId) -> Result<EventAttendance, SyncError>;

    async fn create_event(&self, payload: &EventPayload) -> Result<RemoteEvent, SyncError>;

    async fn update_event(
        &self,
        id: &SpondId,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError>;

    async fn delete_event(&self, id: &SpondId) -> Result<(), SyncError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    login_token: Option<String>,
}

pub struct SpondClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl SpondClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self {
            http,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 用账号密码换取令牌并缓存
    pub async fn login(&self) -> Result<(), SyncError> {
        let mut guard = self.token.lock().await;
        let token = self.authenticate().await?;
        *guard = Some(token);
        Ok(())
    }

    async fn authenticate(&self) -> Result<String, SyncError> {
        tracing::debug!("Logging in to Spond as {}", self.username);
        let response = self
            .http
            .post(self.url("login"))
            .json(&json!({ "email": self.username, "password": self.password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!("Spond rejected credentials for {}", self.username);
            return Err(SyncError::Auth("invalid credentials".into()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimit);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::protocol(Some(status.as_u16()), body));
        }

        let body: LoginResponse = response.json().await?;
        body.login_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::protocol(Some(status.as_u16()), "login response has no loginToken"))
    }

    // 没有缓存令牌时登录一次；会话中途过期不会自动重登
    async fn token(&self) -> Result<String, SyncError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.authenticate().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SyncError> {
        let token = self.token().await?;
        let response = request.bearer_auth(token).send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SyncError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth(format!(
            "Spond rejected the session ({}): {}",
            status.as_u16(),
            body
        ))),
        StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimit),
        _ => Err(SyncError::protocol(Some(status.as_u16()), body)),
    }
}

#[async_trait]
impl RemoteApi for SpondClient {
    async fn get_groups(&self) -> Result<Vec<RemoteGroup>, SyncError> {
        self.send_json(self.http.get(self.url("groups/"))).await
    }

    async fn get_events(&self, filter: &EventFilter) -> Result<EventBatch, SyncError> {
        let request = self
            .http
            .get(self.url("sponds/"))
            .query(&filter.query_pairs());
        // 先按原始 JSON 取回，再逐条解码
        let values: Vec<serde_json::Value> = self.send_json(request).await?;
        let batch = EventBatch::from_values(values);
        tracing::debug!(
            "Fetched {} events from Spond, {} malformed",
            batch.len(),
            batch.malformed.len()
        );
        Ok(batch)
    }

    async fn get_event(&self, id: &SpondId) -> Result<RemoteEvent, SyncError> {
        self.send_json(self.http.get(self.url(&format!("sponds/{}", id))))
            .await
    }

    async fn get_event_attendance(&self, id: &SpondId) -> Result<EventAttendance, SyncError> {
        let event = self.get_event(id).await?;
        Ok(event.attendance())
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<RemoteEvent, SyncError> {
        tracing::info!(
            "Creating Spond event '{}' for group {}",
            payload.heading,
            payload.recipient_id()
        );
        self.send_json(self.http.post(self.url("sponds/")).json(payload))
            .await
    }

    async fn update_event(
        &self,
        id: &SpondId,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError> {
        // Spond 更新事件也用 POST
        self.send_json(
            self.http
                .post(self.url(&format!("sponds/{}", id)))
                .json(payload),
        )
        .await
    }

    async fn delete_event(&self, id: &SpondId) -> Result<(), SyncError> {
        self.send(self.http.delete(self.url(&format!("sponds/{}", id))))
            .await?;
        Ok(())
    }
}
