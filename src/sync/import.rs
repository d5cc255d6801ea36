use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::Config;
use crate::error::SyncError;
use crate::spond::client::RemoteApi;
use crate::spond::identifier::SpondId;
use crate::spond::models::{EventFilter, RemoteEvent};
use crate::store::{EventStore, NewLocalEvent, RemoteEventUpdate, RemoteLink, TeamGroupMapping};
use crate::sync::matcher::{decide, derive_status, infer_event_type};
use crate::sync::types::{MatchAction, SyncResult};

/// 单次导入最多拉取的远端事件数
pub const IMPORT_BATCH_CAP: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOptions {
    pub group_id: Option<SpondId>,
    pub days_ahead: i64,
    pub days_behind: i64,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            group_id: None,
            days_ahead: 90,
            days_behind: 30,
        }
    }
}

impl ImportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            group_id: None,
            days_ahead: config.sync_days_ahead,
            days_behind: config.sync_days_behind,
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now - Duration::days(self.days_behind),
            now + Duration::days(self.days_ahead),
        )
    }
}

/// 球队与 Spond 群组的对照表，每次导入只构建一次
///
/// 事件指向的子群组优先于父群组
#[derive(Debug, Default)]
pub struct TeamLookup {
    by_group: HashMap<SpondId, Vec<i64>>,
    by_subgroup: HashMap<SpondId, Vec<i64>>,
}

impl TeamLookup {
    pub fn new(mappings: &[TeamGroupMapping]) -> Self {
        let mut lookup = Self::default();
        for mapping in mappings {
            let index = if mapping.is_subgroup {
                &mut lookup.by_subgroup
            } else {
                &mut lookup.by_group
            };
            index
                .entry(mapping.group_id.clone())
                .or_default()
                .push(mapping.team_id);
        }
        lookup
    }

    pub fn teams_for(&self, remote: &RemoteEvent) -> Vec<i64> {
        let mut teams: Vec<i64> = remote
            .subgroup_ids()
            .iter()
            .filter_map(|id| self.by_subgroup.get(id))
            .flatten()
            .copied()
            .collect();

        if teams.is_empty() {
            if let Some(group_id) = remote.group_id() {
                teams = self.by_group.get(&group_id).cloned().unwrap_or_default();
            }
        }

        teams.sort_unstable();
        teams.dedup();
        teams
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportOutcome {
    Imported,
    Updated,
    Linked,
}

async fn apply(
    store: &dyn EventStore,
    lookup: &TeamLookup,
    remote: &RemoteEvent,
    now: DateTime<Utc>,
) -> Result<ImportOutcome, SyncError> {
    let action = decide(store, remote).await?;
    let remote_event_id = remote.spond_id()?;
    let start = remote.start()?;
    let end = remote.end()?;
    let payload = serde_json::to_value(remote)?;
    let teams = lookup.teams_for(remote);

    match action {
        MatchAction::Update(existing) => {
            tracing::debug!("Updating event {} from {}", existing.id, remote.label());
            store
                .update_event_from_remote(
                    existing.id,
                    RemoteEventUpdate {
                        description: remote.description.clone(),
                        event_type: infer_event_type(&remote.heading, remote.event_type.as_deref()),
                        status: derive_status(remote.cancelled, start, now),
                        start_time: start,
                        end_time: end,
                        team_ids: teams,
                        remote_group_id: remote.group_id(),
                        payload,
                    },
                )
                .await?;
            Ok(ImportOutcome::Updated)
        }
        MatchAction::Link(candidate) => {
            tracing::debug!("Linking event {} to {}", candidate.id, remote.label());
            // 只挂上关联，标题和描述保持用户输入
            store
                .link_event(
                    candidate.id,
                    RemoteLink {
                        remote_event_id,
                        remote_group_id: remote.group_id(),
                    },
                    teams,
                    payload,
                )
                .await?;
            Ok(ImportOutcome::Linked)
        }
        MatchAction::Create => {
            tracing::debug!("Creating local event from {}", remote.label());
            let (latitude, longitude) = remote.coordinates().unzip();
            store
                .insert_event(NewLocalEvent {
                    title: remote.heading.trim().to_string(),
                    description: remote.description.clone(),
                    event_type: infer_event_type(&remote.heading, remote.event_type.as_deref()),
                    status: derive_status(remote.cancelled, start, now),
                    start_time: start,
                    end_time: end,
                    team_ids: teams,
                    location_name: remote.location_text(),
                    latitude,
                    longitude,
                    remote_link: Some(RemoteLink {
                        remote_event_id,
                        remote_group_id: remote.group_id(),
                    }),
                    remote_payload: Some(payload),
                })
                .await?;
            Ok(ImportOutcome::Imported)
        }
    }
}

/// 从 Spond 导入时间窗口内的事件
///
/// 单条失败记入 errors 后继续；只有准备阶段或批量拉取失败才返回 success = false
pub async fn import_events(
    client: &dyn RemoteApi,
    store: &dyn EventStore,
    options: &ImportOptions,
    now: DateTime<Utc>,
) -> SyncResult {
    let mappings = match store.find_team_group_mappings().await {
        Ok(mappings) => mappings,
        Err(e) => {
            tracing::error!("Failed to load team mappings: {}", e);
            return SyncResult::failed(&e);
        }
    };
    let lookup = TeamLookup::new(&mappings);

    let (min_start, max_start) = options.window(now);
    let filter = EventFilter {
        group_id: options.group_id.clone(),
        min_start: Some(min_start),
        max_start: Some(max_start),
        max: Some(IMPORT_BATCH_CAP),
    };

    let batch = match client.get_events(&filter).await {
        Ok(batch) => batch,
        Err(e) => {
            tracing::error!("Failed to fetch Spond events: {}", e);
            return SyncResult::failed(&e);
        }
    };

    let mut result = SyncResult::ok();
    for malformed in &batch.malformed {
        result.push_error(
            malformed.label.clone(),
            &SyncError::Validation(malformed.reason.clone()),
        );
    }
    for remote in &batch.events {
        match apply(store, &lookup, remote, now).await {
            Ok(ImportOutcome::Imported) => result.imported += 1,
            Ok(ImportOutcome::Updated) => result.updated += 1,
            Ok(ImportOutcome::Linked) => result.linked += 1,
            Err(e) => result.push_error(remote.label(), &e),
        }
    }

    if let Err(e) = store.set_last_sync_timestamp(now).await {
        result.push_error("last sync timestamp", &e);
    }

    tracing::info!(
        "Spond import finished: {} fetched, {} imported, {} updated, {} linked, {} failed",
        batch.len(),
        result.imported,
        result.updated,
        result.linked,
        result.errors.len()
    );
    result.message = Some(format!(
        "Imported {}, updated {}, linked {} of {} events",
        result.imported,
        result.updated,
        result.linked,
        batch.len()
    ));
    result
}
