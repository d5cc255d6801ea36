// 测试用的内存存储，行为与 PgEventStore 保持一致

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::spond::identifier::SpondId;
use crate::store::EventStore;
use crate::store::models::{
    AttendanceSnapshot, EventStatus, EventType, IntegrationConfig, LocalEvent, NewLocalEvent,
    Participant, RemoteEventUpdate, RemoteLink, TeamGroupMapping, TeamSubgroupSettings,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    events: BTreeMap<i64, LocalEvent>,
    participants: BTreeMap<(i64, String), Participant>,
    mappings: BTreeMap<i64, TeamGroupMapping>,
    integration: Option<IntegrationConfig>,
}

#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<Inner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟用户在界面上手动创建事件
    pub fn seed_event(
        &self,
        title: &str,
        start_time: DateTime<Utc>,
        team_ids: Vec<i64>,
        location_name: Option<&str>,
    ) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.events.insert(
            id,
            LocalEvent {
                id,
                title: title.to_string(),
                description: None,
                event_type: EventType::Other,
                status: EventStatus::Planned,
                start_time,
                end_time: None,
                team_ids,
                venue_id: None,
                location_name: location_name.map(str::to_string),
                latitude: None,
                longitude: None,
                remote_link: None,
                attendance: None,
                remote_payload: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        id
    }

    pub fn modify_event(&self, id: i64, f: impl FnOnce(&mut LocalEvent)) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(event) = inner.events.get_mut(&id) {
            f(event);
        }
    }

    pub fn event(&self, id: i64) -> Option<LocalEvent> {
        self.inner.lock().unwrap().events.get(&id).cloned()
    }

    pub fn events(&self) -> Vec<LocalEvent> {
        self.inner.lock().unwrap().events.values().cloned().collect()
    }

    pub fn participants(&self, event_id: i64) -> Vec<Participant> {
        self.inner
            .lock()
            .unwrap()
            .participants
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect()
    }

    fn ensure_unlinked_elsewhere(inner: &Inner, id: Option<i64>, remote: &SpondId) -> Result<(), SyncError> {
        let taken = inner
            .events
            .values()
            .any(|e| Some(e.id) != id && e.remote_event_id() == Some(remote));
        if taken {
            return Err(SyncError::Conflict(format!(
                "{}: already linked to another event",
                remote
            )));
        }
        Ok(())
    }
}

fn sorted(mut events: Vec<LocalEvent>) -> Vec<LocalEvent> {
    events.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
    events
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn find_event(&self, id: i64) -> Result<Option<LocalEvent>, SyncError> {
        Ok(self.event(id))
    }

    async fn find_event_by_remote_id(
        &self,
        remote_event_id: &SpondId,
    ) -> Result<Option<LocalEvent>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .events
            .values()
            .find(|e| e.remote_event_id() == Some(remote_event_id))
            .cloned())
    }

    async fn find_unlinked_events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(sorted(
            inner
                .events
                .values()
                .filter(|e| e.remote_link.is_none() && e.start_time >= start && e.start_time <= end)
                .cloned()
                .collect(),
        ))
    }

    async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(sorted(
            inner
                .events
                .values()
                .filter(|e| e.start_time >= start && e.start_time <= end)
                .cloned()
                .collect(),
        ))
    }

    async fn find_linked_events(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(sorted(
            inner
                .events
                .values()
                .filter(|e| e.remote_link.is_some())
                .filter(|e| start.is_none_or(|s| e.start_time >= s))
                .filter(|e| end.is_none_or(|t| e.start_time <= t))
                .cloned()
                .collect(),
        ))
    }

    async fn insert_event(&self, event: NewLocalEvent) -> Result<i64, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(link) = &event.remote_link {
            Self::ensure_unlinked_elsewhere(&inner, None, &link.remote_event_id)?;
        }
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        inner.events.insert(
            id,
            LocalEvent {
                id,
                title: event.title,
                description: event.description,
                event_type: event.event_type,
                status: event.status,
                start_time: event.start_time,
                end_time: event.end_time,
                team_ids: event.team_ids,
                venue_id: None,
                location_name: event.location_name,
                latitude: event.latitude,
                longitude: event.longitude,
                remote_link: event.remote_link,
                attendance: None,
                remote_payload: event.remote_payload,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_event_from_remote(
        &self,
        id: i64,
        update: RemoteEventUpdate,
    ) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner
            .events
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("event {}", id)))?;

        if update.description.is_some() {
            event.description = update.description;
        }
        event.event_type = update.event_type;
        event.status = update.status;
        event.start_time = update.start_time;
        event.end_time = update.end_time;
        if event.team_ids.is_empty() {
            event.team_ids = update.team_ids;
        }
        if let Some(link) = event.remote_link.as_mut() {
            if link.remote_group_id.is_none() {
                link.remote_group_id = update.remote_group_id;
            }
        }
        event.remote_payload = Some(update.payload);
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn link_event(
        &self,
        id: i64,
        link: RemoteLink,
        team_ids: Vec<i64>,
        payload: serde_json::Value,
    ) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_unlinked_elsewhere(&inner, Some(id), &link.remote_event_id)?;
        let event = match inner.events.get_mut(&id) {
            Some(event) if event.remote_link.is_none() => event,
            _ => {
                return Err(SyncError::Conflict(format!(
                    "event {} is missing or already linked",
                    id
                )));
            }
        };

        event.remote_link = Some(link);
        if event.team_ids.is_empty() {
            event.team_ids = team_ids;
        }
        event.remote_payload = Some(payload);
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn set_remote_link(&self, id: i64, link: RemoteLink) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        Self::ensure_unlinked_elsewhere(&inner, Some(id), &link.remote_event_id)?;
        let event = inner
            .events
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("event {}", id)))?;
        event.remote_link = Some(link);
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_remote_link(&self, id: i64) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let event = inner
            .events
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound(format!("event {}", id)))?;
        event.remote_link = None;
        event.updated_at = Utc::now();
        Ok(())
    }

    async fn update_attendance(
        &self,
        id: i64,
        snapshot: AttendanceSnapshot,
    ) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(event) = inner.events.get_mut(&id) {
            event.attendance = Some(snapshot);
        }
        Ok(())
    }

    async fn upsert_participant(&self, participant: Participant) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().unwrap();
        inner.participants.insert(
            (participant.event_id, participant.member_id.clone()),
            participant,
        );
        Ok(())
    }

    async fn find_team_group_mappings(&self) -> Result<Vec<TeamGroupMapping>, SyncError> {
        Ok(self.inner.lock().unwrap().mappings.values().cloned().collect())
    }

    async fn find_team_subgroup_settings(
        &self,
        team_id: i64,
    ) -> Result<Option<TeamSubgroupSettings>, SyncError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.mappings.get(&team_id).map(TeamSubgroupSettings::from))
    }

    async fn link_team_group(&self, mut mapping: TeamGroupMapping) -> Result<(), SyncError> {
        mapping.linked_at = Some(Utc::now());
        self.inner
            .lock()
            .unwrap()
            .mappings
            .insert(mapping.team_id, mapping);
        Ok(())
    }

    async fn unlink_team_group(&self, team_id: i64) -> Result<bool, SyncError> {
        Ok(self.inner.lock().unwrap().mappings.remove(&team_id).is_some())
    }

    async fn get_active_integration_config(
        &self,
    ) -> Result<Option<IntegrationConfig>, SyncError> {
        Ok(self.inner.lock().unwrap().integration.clone())
    }

    async fn save_integration_config(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IntegrationConfig, SyncError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.integration.as_ref().map_or(1, |c| c.id + 1);
        let config = IntegrationConfig {
            id,
            username: username.to_string(),
            password: password.to_string(),
            active: true,
            last_sync_at: None,
        };
        inner.integration = Some(config.clone());
        Ok(config)
    }

    async fn remove_integration_config(&self) -> Result<(), SyncError> {
        self.inner.lock().unwrap().integration = None;
        Ok(())
    }

    async fn set_last_sync_timestamp(&self, ts: DateTime<Utc>) -> Result<(), SyncError> {
        if let Some(config) = self.inner.lock().unwrap().integration.as_mut() {
            config.last_sync_at = Some(ts);
        }
        Ok(())
    }
}
