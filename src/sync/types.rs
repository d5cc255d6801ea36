use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::spond::identifier::SpondId;
use crate::store::LocalEvent;

/// 批量中单条失败的记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItemError {
    pub item: String,
    pub message: String,
}

/// 一次同步的结果
///
/// `success = false` 只表示整批没有跑起来（登录失败、拉取失败等），
/// 单条失败记录在 `errors` 里
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub imported: u32,
    pub updated: u32,
    pub linked: u32,
    pub exported: u32,
    pub attendance_synced: u32,
    pub errors: Vec<SyncItemError>,
}

impl SyncResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(err: &SyncError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn push_error(&mut self, item: impl Into<String>, err: &SyncError) {
        let item = item.into();
        tracing::warn!("Sync item {} failed: {}", item, err);
        self.errors.push(SyncItemError {
            item,
            message: err.to_string(),
        });
    }

    /// 合并另一阶段的计数和错误
    pub fn absorb(&mut self, other: SyncResult) {
        self.imported += other.imported;
        self.updated += other.updated;
        self.linked += other.linked;
        self.exported += other.exported;
        self.attendance_synced += other.attendance_synced;
        self.errors.extend(other.errors);
        if !other.success {
            self.success = false;
            self.message = other.message.or(self.message.take());
        }
    }
}

/// 匹配引擎对一条远端事件的决定
#[derive(Debug, Clone, PartialEq)]
pub enum MatchAction {
    Update(LocalEvent),
    Link(LocalEvent),
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportOutcome {
    pub local_event_id: i64,
    pub remote_event_id: SpondId,
    pub remote_group_id: SpondId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportCandidate {
    pub event_id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_event_id: Option<SpondId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExportCandidate {
    pub fn new(event: &LocalEvent) -> Self {
        Self {
            event_id: event.id,
            title: event.title.clone(),
            start_time: event.start_time,
            remote_event_id: event.remote_event_id().cloned(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// 批量导出前的分类，只读
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportValidation {
    pub ready: Vec<ExportCandidate>,
    pub already_exported: Vec<ExportCandidate>,
    pub conflicting: Vec<ExportCandidate>,
    pub not_exportable: Vec<ExportCandidate>,
    pub errors: Vec<SyncItemError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceCounts {
    pub accepted: i32,
    pub declined: i32,
    pub unanswered: i32,
    pub waiting: i32,
    pub unconfirmed: i32,
    pub estimated_attendance: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceEventResult {
    pub event_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<AttendanceCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceBatchResult {
    pub total: u32,
    pub synced: u32,
    pub failed: u32,
    pub results: Vec<AttendanceEventResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceScope {
    FutureOnly,
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
