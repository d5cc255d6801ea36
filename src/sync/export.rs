use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::spond::client::RemoteApi;
use crate::spond::identifier::SpondId;
use crate::spond::models::{
    EventPayload, PayloadGroup, PayloadRecipients, RemoteLocation, SubGroupRef, format_timestamp,
};
use crate::store::{EventStore, LocalEvent, RemoteLink, TeamSubgroupSettings};
use crate::sync::types::{ExportCandidate, ExportOutcome, ExportValidation, SyncItemError, SyncResult};

const SPOND_EVENT_TYPE: &str = "EVENT";

/// 导出时的收件人：主群组加可选的子群组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients {
    pub group_id: SpondId,
    pub subgroup_ids: Vec<SpondId>,
}

impl TryFrom<TeamSubgroupSettings> for Recipients {
    type Error = SyncError;

    // Spond 不接受子群组作为主收件人，需要挂到父群组下
    fn try_from(settings: TeamSubgroupSettings) -> Result<Self, Self::Error> {
        if !settings.is_subgroup {
            return Ok(Recipients {
                group_id: settings.group_id,
                subgroup_ids: Vec::new(),
            });
        }
        let parent = settings.parent_group_id.ok_or_else(|| {
            SyncError::Validation(format!(
                "subgroup {} has no parent group configured",
                settings.group_id
            ))
        })?;
        Ok(Recipients {
            group_id: parent,
            subgroup_ids: vec![settings.group_id],
        })
    }
}

pub fn local_label(event: &LocalEvent) -> String {
    format!("{} (#{})", event.title, event.id)
}

async fn resolve_recipients(
    store: &dyn EventStore,
    event: &LocalEvent,
    target_group_id: Option<&SpondId>,
) -> Result<Recipients, SyncError> {
    if let Some(target) = target_group_id {
        // 目标若是已登记的子群组，同样改为父群组加子群组
        let mappings = store.find_team_group_mappings().await?;
        let settings = mappings
            .iter()
            .find(|m| &m.group_id == target)
            .map(TeamSubgroupSettings::from)
            .unwrap_or_else(|| TeamSubgroupSettings {
                group_id: target.clone(),
                parent_group_id: None,
                is_subgroup: false,
            });
        return Recipients::try_from(settings);
    }

    for team_id in &event.team_ids {
        if let Some(settings) = store.find_team_subgroup_settings(*team_id).await? {
            return Recipients::try_from(settings);
        }
    }

    Err(SyncError::Validation(format!(
        "event {} has no team linked to a Spond group",
        event.id
    )))
}

pub fn build_payload(event: &LocalEvent, recipients: &Recipients) -> EventPayload {
    let location = RemoteLocation {
        feature: event.location_name.clone(),
        address: None,
        latitude: event.latitude,
        longitude: event.longitude,
    };

    EventPayload {
        heading: event.title.clone(),
        description: event.description.clone().unwrap_or_default(),
        start_timestamp: format_timestamp(&event.start_time),
        end_timestamp: event.end_time.as_ref().map(format_timestamp),
        event_type: SPOND_EVENT_TYPE.to_string(),
        spond_type: SPOND_EVENT_TYPE.to_string(),
        location: (!location.is_empty()).then_some(location),
        recipients: PayloadRecipients {
            group: PayloadGroup {
                id: recipients.group_id.to_string(),
                sub_groups: recipients
                    .subgroup_ids
                    .iter()
                    .map(|id| SubGroupRef { id: id.to_string() })
                    .collect(),
            },
        },
    }
}

async fn load_event(store: &dyn EventStore, id: i64) -> Result<LocalEvent, SyncError> {
    store
        .find_event(id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("event {}", id)))
}

/// 把一个尚未关联的本地事件推送到 Spond
pub async fn export_event(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    local_event_id: i64,
    target_group_id: Option<&SpondId>,
) -> Result<ExportOutcome, SyncError> {
    let event = load_event(store, local_event_id).await?;
    if let Some(remote_id) = event.remote_event_id() {
        return Err(SyncError::Conflict(format!(
            "event {} is already exported as {}",
            event.id, remote_id
        )));
    }

    let recipients = resolve_recipients(store, &event, target_group_id).await?;
    let payload = build_payload(&event, &recipients);
    let created = client.create_event(&payload).await?;
    let remote_event_id = SpondId::parse(&created.id).ok_or_else(|| {
        SyncError::protocol(None, format!("created event has invalid id '{}'", created.id))
    })?;

    store
        .set_remote_link(
            event.id,
            RemoteLink {
                remote_event_id: remote_event_id.clone(),
                remote_group_id: Some(recipients.group_id.clone()),
            },
        )
        .await?;

    tracing::info!(
        "Exported event {} to Spond as {} (group {})",
        event.id,
        remote_event_id,
        recipients.group_id
    );
    Ok(ExportOutcome {
        local_event_id: event.id,
        remote_event_id,
        remote_group_id: recipients.group_id,
    })
}

/// 已关联事件的再次推送，走 Spond 的更新接口
pub async fn update_exported_event(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    local_event_id: i64,
) -> Result<ExportOutcome, SyncError> {
    let event = load_event(store, local_event_id).await?;
    let link = event
        .remote_link
        .clone()
        .ok_or_else(|| SyncError::Validation("not linked".into()))?;

    // 球队映射被删掉时沿用关联里记录的群组
    let recipients = match (
        resolve_recipients(store, &event, None).await,
        &link.remote_group_id,
    ) {
        (Ok(recipients), _) => recipients,
        (Err(SyncError::Validation(_)), Some(group_id)) => Recipients {
            group_id: group_id.clone(),
            subgroup_ids: Vec::new(),
        },
        (Err(e), _) => return Err(e),
    };

    let payload = build_payload(&event, &recipients);
    match client.update_event(&link.remote_event_id, &payload).await {
        Ok(_) => {}
        Err(e) if e.is_remote_not_found() => {
            return Err(SyncError::Conflict(format!(
                "remote event {} no longer exists, unlink event {} before exporting again",
                link.remote_event_id, event.id
            )));
        }
        Err(e) => return Err(e),
    }

    tracing::info!("Pushed changes of event {} to {}", event.id, link.remote_event_id);
    Ok(ExportOutcome {
        local_event_id: event.id,
        remote_event_id: link.remote_event_id,
        remote_group_id: recipients.group_id,
    })
}

/// 批量导出前的只读检查
pub async fn validate_export(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ExportValidation, SyncError> {
    let events = store.find_events_in_range(start, end).await?;
    let exportable_teams: HashSet<i64> = store
        .find_team_group_mappings()
        .await?
        .into_iter()
        .filter(|m| !m.is_subgroup || m.parent_group_id.is_some())
        .map(|m| m.team_id)
        .collect();

    let mut validation = ExportValidation::default();
    for event in &events {
        let candidate = ExportCandidate::new(event);
        match event.remote_event_id() {
            Some(remote_id) => match client.get_event(remote_id).await {
                Ok(_) => validation.already_exported.push(candidate),
                Err(e) if e.is_remote_not_found() => validation
                    .conflicting
                    .push(candidate.with_reason("remote event no longer exists")),
                Err(e) => {
                    tracing::warn!("Could not verify {} on Spond: {}", local_label(event), e);
                    validation.errors.push(SyncItemError {
                        item: local_label(event),
                        message: e.to_string(),
                    });
                }
            },
            None if event.team_ids.is_empty() => validation
                .not_exportable
                .push(candidate.with_reason("no team assigned")),
            None if event.team_ids.iter().any(|t| exportable_teams.contains(t)) => {
                validation.ready.push(candidate)
            }
            None => validation
                .not_exportable
                .push(candidate.with_reason("no team is linked to a Spond group")),
        }
    }

    tracing::info!(
        "Export check: {} ready, {} exported, {} conflicting, {} not exportable",
        validation.ready.len(),
        validation.already_exported.len(),
        validation.conflicting.len(),
        validation.not_exportable.len()
    );
    Ok(validation)
}

/// 导出区间内所有可导出的事件
pub async fn export_events(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SyncResult {
    let validation = match validate_export(client, store, start, end).await {
        Ok(validation) => validation,
        Err(e) => {
            tracing::error!("Export check failed: {}", e);
            return SyncResult::failed(&e);
        }
    };

    let mut result = SyncResult::ok();
    result.errors = validation.errors;
    for candidate in &validation.ready {
        match export_event(client, store, candidate.event_id, None).await {
            Ok(_) => result.exported += 1,
            Err(e) => result.push_error(format!("{} (#{})", candidate.title, candidate.event_id), &e),
        }
    }

    result.message = Some(format!(
        "Exported {} of {} ready events",
        result.exported,
        validation.ready.len()
    ));
    result
}

/// 清除失效的关联，之后可以重新导出
pub async fn unlink_event(store: &dyn EventStore, local_event_id: i64) -> Result<SpondId, SyncError> {
    let event = load_event(store, local_event_id).await?;
    let remote_id = event
        .remote_event_id()
        .cloned()
        .ok_or_else(|| SyncError::Validation("not linked".into()))?;

    store.clear_remote_link(event.id).await?;
    tracing::info!("Unlinked event {} from {}", event.id, remote_id);
    Ok(remote_id)
}
