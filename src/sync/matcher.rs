use chrono::{DateTime, Duration, Utc};

use crate::error::SyncError;
use crate::spond::models::RemoteEvent;
use crate::store::{EventStatus, EventStore, EventType};
use crate::sync::location::{LocationRef, locations_match};
use crate::sync::types::MatchAction;

/// 开始时间相差在此范围内的未关联事件才会成为候选
pub const MATCH_WINDOW_MINUTES: i64 = 15;

const PRACTICE_KEYWORDS: &[&str] = &["practice", "training", "trening"];
const GAME_KEYWORDS: &[&str] = &["game", "match", "kamp"];
const MEETING_KEYWORDS: &[&str] = &["meeting", "møte"];

/// 决定一条远端事件如何落到本地
///
/// 已关联的更新；时间窗口内第一个地点兼容的未关联事件被关联；否则新建。
/// 候选按开始时间、ID 排序，先到先得
pub async fn decide(store: &dyn EventStore, remote: &RemoteEvent) -> Result<MatchAction, SyncError> {
    let remote_id = remote.spond_id()?;
    if let Some(existing) = store.find_event_by_remote_id(&remote_id).await? {
        return Ok(MatchAction::Update(existing));
    }

    let start = remote.start()?;
    let window = Duration::minutes(MATCH_WINDOW_MINUTES);
    let candidates = store
        .find_unlinked_events_in_window(start - window, start + window)
        .await?;

    let remote_text = remote.location_text();
    let remote_location = LocationRef {
        text: remote_text.as_deref(),
        coordinates: remote.coordinates(),
    };

    let chosen = candidates.into_iter().find(|candidate| {
        let local_location = LocationRef {
            text: candidate.location_name.as_deref(),
            coordinates: candidate.coordinates(),
        };
        locations_match(local_location, remote_location)
    });

    Ok(match chosen {
        Some(candidate) => MatchAction::Link(candidate),
        None => MatchAction::Create,
    })
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn type_from_text(text: &str) -> Option<EventType> {
    let text = text.to_lowercase();
    if contains_any(&text, PRACTICE_KEYWORDS) {
        Some(EventType::Practice)
    } else if contains_any(&text, GAME_KEYWORDS) {
        Some(EventType::Game)
    } else if contains_any(&text, MEETING_KEYWORDS) {
        Some(EventType::Meeting)
    } else {
        None
    }
}

/// 先看标题关键词，再看远端类型标签，都没有则为 Other
pub fn infer_event_type(heading: &str, type_tag: Option<&str>) -> EventType {
    type_from_text(heading)
        .or_else(|| type_tag.and_then(type_from_text))
        .unwrap_or(EventType::Other)
}

pub fn derive_status(cancelled: bool, start: DateTime<Utc>, now: DateTime<Utc>) -> EventStatus {
    if cancelled {
        EventStatus::Cancelled
    } else if start < now {
        EventStatus::Completed
    } else if start - now <= Duration::hours(24) {
        EventStatus::Confirmed
    } else {
        EventStatus::Planned
    }
}
