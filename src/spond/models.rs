use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::spond::identifier::SpondId;

// 未指定上限时的保守默认值
pub const DEFAULT_EVENT_CAP: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMember {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl RemoteMember {
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubGroup {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<RemoteMember>,
    #[serde(default)]
    pub sub_groups: Vec<RemoteSubGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl RemoteLocation {
    /// 场地名和地址拼成一段文本，用于模糊匹配
    pub fn text(&self) -> Option<String> {
        let text = [self.feature.as_deref(), self.address.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        (!text.is_empty()).then_some(text)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_none() && self.coordinates().is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientGroup {
    pub id: String,
    #[serde(default)]
    pub sub_groups: Vec<RemoteSubGroup>,
    #[serde(default)]
    pub members: Vec<RemoteMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipients {
    #[serde(default)]
    pub group: Option<RecipientGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponses {
    #[serde(default)]
    pub accepted_ids: Vec<String>,
    #[serde(default)]
    pub declined_ids: Vec<String>,
    #[serde(default)]
    pub unanswered_ids: Vec<String>,
    #[serde(default)]
    pub waitinglist_ids: Vec<String>,
    #[serde(default)]
    pub unconfirmed_ids: Vec<String>,
}

/// Spond 上的事件。时间戳保留原始字符串，逐条解析，单条数据损坏不影响整批
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub start_timestamp: Option<String>,
    #[serde(default)]
    pub end_timestamp: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub location: Option<RemoteLocation>,
    #[serde(default)]
    pub recipients: Option<Recipients>,
    #[serde(default)]
    pub responses: Option<EventResponses>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn event_label(heading: &str, id: &str) -> String {
    let heading = if heading.trim().is_empty() {
        "(untitled)"
    } else {
        heading.trim()
    };
    let id = if id.is_empty() { "no id" } else { id };
    format!("{} ({})", heading, id)
}

impl RemoteEvent {
    pub fn label(&self) -> String {
        event_label(&self.heading, &self.id)
    }

    pub fn spond_id(&self) -> Result<SpondId, SyncError> {
        SpondId::parse(&self.id)
            .ok_or_else(|| SyncError::Validation(format!("invalid Spond event id '{}'", self.id)))
    }

    pub fn start(&self) -> Result<DateTime<Utc>, SyncError> {
        let raw = self
            .start_timestamp
            .as_deref()
            .ok_or_else(|| SyncError::Validation("missing start timestamp".into()))?;
        parse_timestamp(raw)
            .ok_or_else(|| SyncError::Validation(format!("unparseable start timestamp '{}'", raw)))
    }

    pub fn end(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        match self.end_timestamp.as_deref() {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw).map(Some).ok_or_else(|| {
                SyncError::Validation(format!("unparseable end timestamp '{}'", raw))
            }),
        }
    }

    pub fn group_id(&self) -> Option<SpondId> {
        self.recipient_group()
            .and_then(|group| SpondId::parse(&group.id))
    }

    pub fn subgroup_ids(&self) -> Vec<SpondId> {
        self.recipient_group()
            .map(|group| {
                group
                    .sub_groups
                    .iter()
                    .filter_map(|sub| SpondId::parse(&sub.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn recipient_group(&self) -> Option<&RecipientGroup> {
        self.recipients.as_ref().and_then(|r| r.group.as_ref())
    }

    pub fn location_text(&self) -> Option<String> {
        self.location.as_ref().and_then(RemoteLocation::text)
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.location.as_ref().and_then(RemoteLocation::coordinates)
    }

    pub fn has_location(&self) -> bool {
        self.location.as_ref().is_some_and(|loc| !loc.is_empty())
    }

    pub fn attendance(&self) -> EventAttendance {
        let group = self.recipient_group();
        EventAttendance {
            event_id: self.id.clone(),
            group_id: group.map(|g| g.id.clone()),
            responses: self.responses.clone().unwrap_or_default(),
            members: group.map(|g| g.members.clone()).unwrap_or_default(),
        }
    }
}

/// 无法解析的远端事件，只留下能认出的标签和原因
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedEvent {
    pub label: String,
    pub reason: String,
}

impl MalformedEvent {
    fn from_value(value: &serde_json::Value, err: &serde_json::Error) -> Self {
        let id = match value.get("id") {
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let heading = value
            .get("heading")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        Self {
            label: event_label(heading, &id),
            reason: format!("malformed event: {}", err),
        }
    }
}

/// 一次拉取的结果：整体是列表，逐条解码
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventBatch {
    pub events: Vec<RemoteEvent>,
    pub malformed: Vec<MalformedEvent>,
}

impl EventBatch {
    pub fn from_values(values: Vec<serde_json::Value>) -> Self {
        let mut batch = Self::default();
        for value in values {
            match serde_json::from_value::<RemoteEvent>(value.clone()) {
                Ok(event) => batch.events.push(event),
                Err(e) => batch.malformed.push(MalformedEvent::from_value(&value, &e)),
            }
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.malformed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<RemoteEvent>> for EventBatch {
    fn from(events: Vec<RemoteEvent>) -> Self {
        Self {
            events,
            malformed: Vec::new(),
        }
    }
}

/// 某个事件的报名名单
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventAttendance {
    pub event_id: String,
    pub group_id: Option<String>,
    pub responses: EventResponses,
    pub members: Vec<RemoteMember>,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub group_id: Option<SpondId>,
    pub min_start: Option<DateTime<Utc>>,
    pub max_start: Option<DateTime<Utc>>,
    pub max: Option<u32>,
}

impl EventFilter {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("max", self.max.unwrap_or(DEFAULT_EVENT_CAP).to_string()),
            ("order", "asc".to_string()),
            ("includeHidden", "false".to_string()),
        ];
        if let Some(group_id) = &self.group_id {
            pairs.push(("groupId", group_id.to_string()));
        }
        if let Some(min_start) = &self.min_start {
            pairs.push(("minStartTimestamp", format_timestamp(min_start)));
        }
        if let Some(max_start) = &self.max_start {
            pairs.push(("maxStartTimestamp", format_timestamp(max_start)));
        }
        pairs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubGroupRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadGroup {
    pub id: String,
    pub sub_groups: Vec<SubGroupRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadRecipients {
    pub group: PayloadGroup,
}

/// 创建或更新 Spond 事件的请求体
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub heading: String,
    pub description: String,
    pub start_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub spond_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<RemoteLocation>,
    pub recipients: PayloadRecipients,
}

impl EventPayload {
    pub fn recipient_id(&self) -> &str {
        &self.recipients.group.id
    }

    pub fn subgroup_ids(&self) -> Vec<&str> {
        self.recipients
            .group
            .sub_groups
            .iter()
            .map(|s| s.id.as_str())
            .collect()
    }
}
