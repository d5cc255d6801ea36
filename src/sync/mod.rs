// Spond 双向同步：匹配、导入、导出、报名统计

pub mod attendance;
pub mod export;
pub mod import;
pub mod location;
pub mod matcher;
pub mod types;

#[cfg(test)]
mod fake;
#[cfg(test)]
mod import_tests;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::spond::client::RemoteApi;
use crate::store::EventStore;

pub use attendance::{sync_attendance, sync_attendance_batch};
pub use export::{export_event, export_events, unlink_event, update_exported_event, validate_export};
pub use import::{IMPORT_BATCH_CAP, ImportOptions, import_events};
pub use types::{
    AttendanceBatchResult, AttendanceCounts, AttendanceScope, ExportOutcome, ExportValidation,
    MatchAction, SyncItemError, SyncResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Full,
    Import,
    Export,
    Attendance,
}

/// 按类型执行一次同步
///
/// full 依次执行导入、导出未来事件、同步未来事件的报名
pub async fn run_sync(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    kind: SyncKind,
    options: &ImportOptions,
    now: DateTime<Utc>,
) -> SyncResult {
    tracing::info!("Starting Spond {:?} sync", kind);
    match kind {
        SyncKind::Import => import_events(client, store, options, now).await,
        SyncKind::Export => export_upcoming(client, store, options, now).await,
        SyncKind::Attendance => attendance_upcoming(client, store, now).await,
        SyncKind::Full => {
            let mut result = import_events(client, store, options, now).await;
            // 导入阶段失败说明连不上 Spond，后续阶段没有意义
            if !result.success {
                return result;
            }
            result.absorb(export_upcoming(client, store, options, now).await);
            result.absorb(attendance_upcoming(client, store, now).await);
            if result.success {
                result.message = Some(format!(
                    "Imported {}, updated {}, linked {}, exported {}, attendance synced for {} events",
                    result.imported,
                    result.updated,
                    result.linked,
                    result.exported,
                    result.attendance_synced
                ));
            }
            result
        }
    }
}

async fn export_upcoming(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    options: &ImportOptions,
    now: DateTime<Utc>,
) -> SyncResult {
    export_events(client, store, now, now + Duration::days(options.days_ahead)).await
}

async fn attendance_upcoming(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    now: DateTime<Utc>,
) -> SyncResult {
    match sync_attendance_batch(client, store, AttendanceScope::FutureOnly, now).await {
        Ok(batch) => {
            let mut result = SyncResult::ok();
            result.attendance_synced = batch.synced;
            for item in batch.results.into_iter().filter(|r| !r.success) {
                result.errors.push(SyncItemError {
                    item: format!("event #{}", item.event_id),
                    message: item.error.unwrap_or_default(),
                });
            }
            result.message = Some(format!(
                "Attendance synced for {} of {} events",
                batch.synced, batch.total
            ));
            result
        }
        Err(e) => {
            tracing::error!("Attendance sync failed: {}", e);
            SyncResult::failed(&e)
        }
    }
}
