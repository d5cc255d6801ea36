// 本地存储边界
// 同步引擎只通过 EventStore 读写本地事件，便于在测试中替换数据库

pub mod models;
pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::spond::identifier::SpondId;

pub use models::{
    AttendanceSnapshot, EventStatus, EventType, IntegrationConfig, LocalEvent, NewLocalEvent,
    Participant, RemoteEventUpdate, RemoteLink, ResponseKind, TeamGroupMapping, TeamSubgroupSettings,
};
pub use postgres::PgEventStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_event(&self, id: i64) -> Result<Option<LocalEvent>, SyncError>;

    async fn find_event_by_remote_id(
        &self,
        remote_event_id: &SpondId,
    ) -> Result<Option<LocalEvent>, SyncError>;

    /// 时间窗口内尚未关联 Spond 的事件，按开始时间、ID 排序
    async fn find_unlinked_events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalEvent>, SyncError>;

    async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalEvent>, SyncError>;

    /// 已关联的事件；边界为空表示不限
    async fn find_linked_events(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LocalEvent>, SyncError>;

    async fn insert_event(&self, event: NewLocalEvent) -> Result<i64, SyncError>;

    async fn update_event_from_remote(
        &self,
        id: i64,
        update: RemoteEventUpdate,
    ) -> Result<(), SyncError>;

    /// 关联已有事件，不修改标题和描述
    async fn link_event(
        &self,
        id: i64,
        link: RemoteLink,
        team_ids: Vec<i64>,
        payload: serde_json::Value,
    ) -> Result<(), SyncError>;

    async fn set_remote_link(&self, id: i64, link: RemoteLink) -> Result<(), SyncError>;

    async fn clear_remote_link(&self, id: i64) -> Result<(), SyncError>;

    async fn update_attendance(
        &self,
        id: i64,
        snapshot: AttendanceSnapshot,
    ) -> Result<(), SyncError>;

    async fn upsert_participant(&self, participant: Participant) -> Result<(), SyncError>;

    async fn find_team_group_mappings(&self) -> Result<Vec<TeamGroupMapping>, SyncError>;

    async fn find_team_subgroup_settings(
        &self,
        team_id: i64,
    ) -> Result<Option<TeamSubgroupSettings>, SyncError>;

    async fn link_team_group(&self, mapping: TeamGroupMapping) -> Result<(), SyncError>;

    async fn unlink_team_group(&self, team_id: i64) -> Result<bool, SyncError>;

    async fn get_active_integration_config(&self)
    -> Result<Option<IntegrationConfig>, SyncError>;

    async fn save_integration_config(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IntegrationConfig, SyncError>;

    async fn remove_integration_config(&self) -> Result<(), SyncError>;

    async fn set_last_sync_timestamp(&self, ts: DateTime<Utc>) -> Result<(), SyncError>;
}
