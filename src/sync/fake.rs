//! 测试用的 Spond 替身，按脚本返回数据并记录调用

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::error::SyncError;
use crate::spond::client::RemoteApi;
use crate::spond::identifier::SpondId;
use crate::spond::models::{
    EventAttendance, EventBatch, EventFilter, EventPayload, RemoteEvent, RemoteGroup,
};
use crate::store::TeamGroupMapping;

pub const GROUP: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";
pub const SUBGROUP: &str = "CCCCCCCCCCCCCCCCCCCCCCCCCCCCCCCC";

pub fn remote_id(n: u32) -> String {
    format!("{:032X}", 0xA000 + n)
}

pub fn spond_id(raw: &str) -> SpondId {
    SpondId::parse(raw).unwrap()
}

pub fn team_mapping(team_id: i64, group: &str, parent: Option<&str>) -> TeamGroupMapping {
    TeamGroupMapping {
        team_id,
        team_name: Some(format!("Team {}", team_id)),
        group_id: spond_id(group),
        parent_group_id: parent.map(spond_id),
        is_subgroup: parent.is_some(),
        linked_at: None,
    }
}

/// 构造一条远端事件，extra 中的字段覆盖默认值
pub fn remote_event(id: &str, heading: &str, start: &str, extra: serde_json::Value) -> RemoteEvent {
    let mut value = json!({
        "id": id,
        "heading": heading,
        "startTimestamp": start,
        "recipients": {"group": {"id": GROUP}},
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}

#[derive(Default)]
pub struct FakeRemote {
    pub events: Mutex<Vec<RemoteEvent>>,
    pub groups: Mutex<Vec<RemoteGroup>>,
    pub created: Mutex<Vec<EventPayload>>,
    pub updated: Mutex<Vec<(SpondId, EventPayload)>>,
    pub last_filter: Mutex<Option<EventFilter>>,
    pub fail_fetch: Mutex<bool>,
    pub fail_lookups: Mutex<bool>,
    pub group_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeRemote {
    pub fn with_events(events: Vec<RemoteEvent>) -> Self {
        let fake = Self::default();
        *fake.events.lock().unwrap() = events;
        fake
    }

    pub fn created(&self) -> Vec<EventPayload> {
        self.created.lock().unwrap().clone()
    }

    fn find(&self, id: &SpondId) -> Option<RemoteEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| SpondId::parse(&e.id).as_ref() == Some(id))
            .cloned()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn get_groups(&self) -> Result<Vec<RemoteGroup>, SyncError> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn get_events(&self, filter: &EventFilter) -> Result<EventBatch, SyncError> {
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        if *self.fail_fetch.lock().unwrap() {
            return Err(SyncError::Auth("invalid credentials".into()));
        }
        Ok(EventBatch::from(self.events.lock().unwrap().clone()))
    }

    async fn get_event(&self, id: &SpondId) -> Result<RemoteEvent, SyncError> {
        if *self.fail_lookups.lock().unwrap() {
            return Err(SyncError::protocol(Some(500), "internal error"));
        }
        self.find(id)
            .ok_or_else(|| SyncError::protocol(Some(404), "spond not found"))
    }

    async fn get_event_attendance(&self, id: &SpondId) -> Result<EventAttendance, SyncError> {
        Ok(self.get_event(id).await?.attendance())
    }

    async fn create_event(&self, payload: &EventPayload) -> Result<RemoteEvent, SyncError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) as u32;
        self.created.lock().unwrap().push(payload.clone());
        let created = remote_event(
            &format!("{:032X}", 0xE000 + n),
            &payload.heading,
            &payload.start_timestamp,
            json!({}),
        );
        self.events.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        id: &SpondId,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, SyncError> {
        let existing = self.get_event(id).await?;
        self.updated
            .lock()
            .unwrap()
            .push((id.clone(), payload.clone()));
        Ok(existing)
    }

    async fn delete_event(&self, id: &SpondId) -> Result<(), SyncError> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| SpondId::parse(&e.id).as_ref() != Some(id));
        if events.len() == before {
            return Err(SyncError::protocol(Some(404), "spond not found"));
        }
        Ok(())
    }
}
