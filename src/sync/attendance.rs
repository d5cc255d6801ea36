use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::spond::client::RemoteApi;
use crate::spond::identifier::SpondId;
use crate::spond::models::{EventResponses, RemoteMember};
use crate::store::{AttendanceSnapshot, EventStore, LocalEvent, Participant, ResponseKind};
use crate::sync::types::{
    AttendanceBatchResult, AttendanceCounts, AttendanceEventResult, AttendanceScope,
};

impl AttendanceCounts {
    /// 候补名单也计入预计到场人数
    pub fn from_responses(responses: &EventResponses) -> Self {
        let accepted = responses.accepted_ids.len() as i32;
        let waiting = responses.waitinglist_ids.len() as i32;
        Self {
            accepted,
            declined: responses.declined_ids.len() as i32,
            unanswered: responses.unanswered_ids.len() as i32,
            waiting,
            unconfirmed: responses.unconfirmed_ids.len() as i32,
            estimated_attendance: accepted + waiting,
        }
    }

    pub fn snapshot(&self, synced_at: DateTime<Utc>) -> AttendanceSnapshot {
        AttendanceSnapshot {
            accepted: self.accepted,
            declined: self.declined,
            unanswered: self.unanswered,
            waiting: self.waiting,
            unconfirmed: self.unconfirmed,
            estimated_attendance: self.estimated_attendance,
            last_synced_at: synced_at,
        }
    }
}

/// 群组成员名单，一次同步内最多向 Spond 拉取一次
#[derive(Default)]
struct RosterCache {
    groups: Option<HashMap<SpondId, Vec<RemoteMember>>>,
}

impl RosterCache {
    async fn members(&mut self, client: &dyn RemoteApi, group_id: &SpondId) -> Vec<RemoteMember> {
        if self.groups.is_none() {
            let groups = match client.get_groups().await {
                Ok(groups) => groups
                    .into_iter()
                    .filter_map(|g| SpondId::parse(&g.id).map(|id| (id, g.members)))
                    .collect(),
                Err(e) => {
                    // 名单只用于补全姓名，失败不影响计数
                    tracing::warn!("Failed to load Spond group rosters: {}", e);
                    HashMap::new()
                }
            };
            self.groups = Some(groups);
        }

        self.groups
            .as_ref()
            .and_then(|groups| groups.get(group_id))
            .cloned()
            .unwrap_or_default()
    }
}

fn responders(responses: &EventResponses) -> impl Iterator<Item = (&String, ResponseKind)> {
    [
        (&responses.accepted_ids, ResponseKind::Accepted),
        (&responses.declined_ids, ResponseKind::Declined),
        (&responses.unanswered_ids, ResponseKind::Unanswered),
        (&responses.waitinglist_ids, ResponseKind::Waiting),
        (&responses.unconfirmed_ids, ResponseKind::Unconfirmed),
    ]
    .into_iter()
    .flat_map(|(ids, kind)| ids.iter().map(move |id| (id, kind)))
}

async fn sync_event(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    event: &LocalEvent,
    rosters: &mut RosterCache,
    now: DateTime<Utc>,
) -> Result<AttendanceCounts, SyncError> {
    let link = event
        .remote_link
        .as_ref()
        .ok_or_else(|| SyncError::Validation("not linked".into()))?;

    let attendance = client.get_event_attendance(&link.remote_event_id).await?;
    let counts = AttendanceCounts::from_responses(&attendance.responses);

    let mut directory: HashMap<String, RemoteMember> = attendance
        .members
        .iter()
        .map(|m| (m.id.clone(), m.clone()))
        .collect();

    let missing = responders(&attendance.responses).any(|(id, _)| !directory.contains_key(id));
    let group_id = attendance
        .group_id
        .as_deref()
        .and_then(SpondId::parse)
        .or_else(|| link.remote_group_id.clone());
    if let (true, Some(group_id)) = (missing, group_id) {
        for member in rosters.members(client, &group_id).await {
            directory.entry(member.id.clone()).or_insert(member);
        }
    }

    for (member_id, response) in responders(&attendance.responses) {
        let member = directory.get(member_id);
        store
            .upsert_participant(Participant {
                event_id: event.id,
                member_id: member_id.clone(),
                name: member.and_then(RemoteMember::full_name),
                email: member.and_then(|m| m.email.clone()),
                response,
            })
            .await?;
    }

    store.update_attendance(event.id, counts.snapshot(now)).await?;
    tracing::debug!(
        "Attendance for event {}: {} accepted, {} waiting",
        event.id,
        counts.accepted,
        counts.waiting
    );
    Ok(counts)
}

/// 同步单个已关联事件的报名情况
pub async fn sync_attendance(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    local_event_id: i64,
    now: DateTime<Utc>,
) -> Result<AttendanceCounts, SyncError> {
    let event = store
        .find_event(local_event_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("event {}", local_event_id)))?;

    let mut rosters = RosterCache::default();
    sync_event(client, store, &event, &mut rosters, now).await
}

/// 批量同步范围内所有已关联事件，单个失败不影响其余
pub async fn sync_attendance_batch(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    scope: AttendanceScope,
    now: DateTime<Utc>,
) -> Result<AttendanceBatchResult, SyncError> {
    let (start, end) = match scope {
        AttendanceScope::FutureOnly => (Some(now), None),
        AttendanceScope::Window { start, end } => (Some(start), Some(end)),
    };
    let events = store.find_linked_events(start, end).await?;

    let mut rosters = RosterCache::default();
    let mut batch = AttendanceBatchResult {
        total: events.len() as u32,
        ..Default::default()
    };

    for event in &events {
        match sync_event(client, store, event, &mut rosters, now).await {
            Ok(counts) => {
                batch.synced += 1;
                batch.results.push(AttendanceEventResult {
                    event_id: event.id,
                    success: true,
                    counts: Some(counts),
                    error: None,
                });
            }
            Err(e) => {
                tracing::warn!("Attendance sync failed for event {}: {}", event.id, e);
                batch.failed += 1;
                batch.results.push(AttendanceEventResult {
                    event_id: event.id,
                    success: false,
                    counts: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    tracing::info!(
        "Attendance batch finished: {} of {} events synced",
        batch.synced,
        batch.total
    );
    Ok(batch)
}
