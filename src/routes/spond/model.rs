use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::spond::identifier::SpondId;
use crate::store::TeamGroupMapping;
use crate::sync::SyncKind;

pub fn parse_spond_id(raw: &str, field: &str) -> Result<SpondId, SyncError> {
    SpondId::parse(raw)
        .ok_or_else(|| SyncError::Validation(format!("{} is not a valid Spond id", field)))
}

pub fn parse_optional_id(raw: Option<&str>, field: &str) -> Result<Option<SpondId>, SyncError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| parse_spond_id(s, field))
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub configured: bool,
    pub username: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub session_active: bool,
    pub linked_teams: Vec<TeamGroupMapping>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connected: bool,
    pub username: String,
    pub group_count: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LinkedTeam {
    pub team_id: i64,
    pub team_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubGroupView {
    pub id: String,
    pub name: Option<String>,
    pub linked_team: Option<LinkedTeam>,
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub member_count: usize,
    pub linked_team: Option<LinkedTeam>,
    pub sub_groups: Vec<SubGroupView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub group_id: Option<String>,
    pub days_ahead: Option<i64>,
    pub days_behind: Option<i64>,
    pub max: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub sync_type: SyncKind,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub days_ahead: Option<i64>,
    #[serde(default)]
    pub days_behind: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateRangeRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LinkTeamRequest {
    pub team_id: i64,
    pub group_id: String,
    #[serde(default)]
    pub parent_group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnlinkTeamRequest {
    pub team_id: i64,
}

#[derive(Debug, Serialize)]
pub struct TeamUnlinkResponse {
    pub team_id: i64,
    pub unlinked: bool,
}

#[derive(Debug, Serialize)]
pub struct EventUnlinkResponse {
    pub event_id: i64,
    pub remote_event_id: SpondId,
}

fn default_future_only() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AttendanceBatchRequest {
    #[serde(default = "default_future_only")]
    pub future_only: bool,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Default for AttendanceBatchRequest {
    fn default() -> Self {
        Self {
            future_only: true,
            start: None,
            end: None,
        }
    }
}
