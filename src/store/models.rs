use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spond::identifier::SpondId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Game,
    Practice,
    Meeting,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Game => "Game",
            EventType::Practice => "Practice",
            EventType::Meeting => "Meeting",
            EventType::Other => "Other",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Game" => Ok(EventType::Game),
            "Practice" => Ok(EventType::Practice),
            "Meeting" => Ok(EventType::Meeting),
            "Other" => Ok(EventType::Other),
            other => Err(format!("unknown event type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Planned,
    Confirmed,
    Cancelled,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Planned => "Planned",
            EventStatus::Confirmed => "Confirmed",
            EventStatus::Cancelled => "Cancelled",
            EventStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Planned" => Ok(EventStatus::Planned),
            "Confirmed" => Ok(EventStatus::Confirmed),
            "Cancelled" => Ok(EventStatus::Cancelled),
            "Completed" => Ok(EventStatus::Completed),
            other => Err(format!("unknown event status '{}'", other)),
        }
    }
}

/// 本地事件与 Spond 事件的关联
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLink {
    pub remote_event_id: SpondId,
    pub remote_group_id: Option<SpondId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSnapshot {
    pub accepted: i32,
    pub declined: i32,
    pub unanswered: i32,
    pub waiting: i32,
    pub unconfirmed: i32,
    pub estimated_attendance: i32,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalEvent {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub team_ids: Vec<i64>,
    pub venue_id: Option<i64>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub remote_link: Option<RemoteLink>,
    pub attendance: Option<AttendanceSnapshot>,
    pub remote_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalEvent {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn remote_event_id(&self) -> Option<&SpondId> {
        self.remote_link.as_ref().map(|link| &link.remote_event_id)
    }

    pub fn is_linked(&self) -> bool {
        self.remote_link.is_some()
    }
}

/// 导入时新建的本地事件
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocalEvent {
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub team_ids: Vec<i64>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub remote_link: Option<RemoteLink>,
    pub remote_payload: Option<serde_json::Value>,
}

/// 已关联事件的刷新内容。team_ids 只在本地尚未分配球队时写入
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEventUpdate {
    pub description: Option<String>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub team_ids: Vec<i64>,
    pub remote_group_id: Option<SpondId>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamGroupMapping {
    pub team_id: i64,
    pub team_name: Option<String>,
    pub group_id: SpondId,
    pub parent_group_id: Option<SpondId>,
    pub is_subgroup: bool,
    pub linked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSubgroupSettings {
    pub group_id: SpondId,
    pub parent_group_id: Option<SpondId>,
    pub is_subgroup: bool,
}

impl From<&TeamGroupMapping> for TeamSubgroupSettings {
    fn from(mapping: &TeamGroupMapping) -> Self {
        Self {
            group_id: mapping.group_id.clone(),
            parent_group_id: mapping.parent_group_id.clone(),
            is_subgroup: mapping.is_subgroup,
        }
    }
}

#[derive(Clone)]
pub struct IntegrationConfig {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub active: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
}

// 不在日志里输出密码
impl fmt::Debug for IntegrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationConfig")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"***")
            .field("active", &self.active)
            .field("last_sync_at", &self.last_sync_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Accepted,
    Declined,
    Unanswered,
    Waiting,
    Unconfirmed,
}

impl ResponseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::Accepted => "accepted",
            ResponseKind::Declined => "declined",
            ResponseKind::Unanswered => "unanswered",
            ResponseKind::Waiting => "waiting",
            ResponseKind::Unconfirmed => "unconfirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub event_id: i64,
    pub member_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub response: ResponseKind,
}
