use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, Query, State},
};
use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::{
    AppState,
    error::SyncError,
    spond::{
        RemoteApi, SpondClient, SpondId,
        models::{EventBatch, EventFilter},
    },
    store::{IntegrationConfig, TeamGroupMapping},
    sync::{
        self, AttendanceBatchResult, AttendanceCounts, AttendanceScope, ExportOutcome,
        ExportValidation, ImportOptions, SyncResult,
    },
    utils::{ApiResponse, Claims, success_to_api_response},
};

use super::model::{
    AttendanceBatchRequest, ConfigureRequest, ConnectionResponse, DateRangeRequest,
    EventUnlinkResponse, EventsQuery, ExportRequest, GroupView, LinkTeamRequest, LinkedTeam,
    StatusResponse, SubGroupView, SyncRequest, TeamUnlinkResponse, UnlinkTeamRequest,
    parse_optional_id, parse_spond_id,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, SyncError>;

// 允许不带请求体
fn optional_body<T: DeserializeOwned>(body: &Bytes) -> Result<Option<T>, SyncError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| SyncError::Validation(format!("invalid request body: {}", e)))
}

async fn active_integration(state: &AppState) -> Result<IntegrationConfig, SyncError> {
    state
        .store
        .get_active_integration_config()
        .await?
        .ok_or(SyncError::NotConfigured)
}

async fn session_client(state: &AppState) -> Result<Arc<SpondClient>, SyncError> {
    state
        .session
        .client(state.store.as_ref(), &state.config)
        .await
}

fn import_options(
    state: &AppState,
    group_id: Option<&str>,
    days_ahead: Option<i64>,
    days_behind: Option<i64>,
) -> Result<ImportOptions, SyncError> {
    let defaults = ImportOptions::from_config(&state.config);
    let options = ImportOptions {
        group_id: parse_optional_id(group_id, "group_id")?,
        days_ahead: days_ahead.unwrap_or(defaults.days_ahead),
        days_behind: days_behind.unwrap_or(defaults.days_behind),
    };
    if options.days_ahead < 0 || options.days_behind < 0 {
        return Err(SyncError::Validation(
            "days_ahead and days_behind must not be negative".into(),
        ));
    }
    Ok(options)
}

async fn build_status(state: &AppState) -> Result<StatusResponse, SyncError> {
    let integration = state.store.get_active_integration_config().await?;
    let linked_teams = state.store.find_team_group_mappings().await?;
    Ok(StatusResponse {
        configured: integration.is_some(),
        username: integration.as_ref().map(|c| c.username.clone()),
        last_sync_at: integration.and_then(|c| c.last_sync_at),
        session_active: state.session.is_active().await,
        linked_teams,
    })
}

pub async fn status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    Ok(success_to_api_response(build_status(&state).await?))
}

/// 先用新凭据登录一次，成功后才保存
pub async fn configure(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConfigureRequest>,
) -> ApiResult<StatusResponse> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(SyncError::Validation(
            "username and password are required".into(),
        ));
    }

    let client = SpondClient::new(
        &state.config.spond_api_base,
        username,
        &req.password,
        state.config.spond_timeout(),
    )?;
    client.login().await?;

    state
        .store
        .save_integration_config(username, &req.password)
        .await?;
    state.session.clear().await;
    tracing::info!("Spond integration configured for {} by {}", username, claims.sub);

    Ok(success_to_api_response(build_status(&state).await?))
}

pub async fn remove_configuration(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusResponse> {
    state.store.remove_integration_config().await?;
    state.session.clear().await;
    tracing::info!("Spond integration removed by {}", claims.sub);

    Ok(success_to_api_response(build_status(&state).await?))
}

/// 带凭据时测试这组凭据，否则测试已保存的配置
pub async fn test_connection(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ConnectionResponse> {
    let client = match optional_body::<ConfigureRequest>(&body)? {
        Some(req) => Arc::new(SpondClient::new(
            &state.config.spond_api_base,
            req.username.trim(),
            &req.password,
            state.config.spond_timeout(),
        )?),
        None => session_client(&state).await?,
    };

    client.login().await?;
    let groups = client.get_groups().await?;

    Ok(success_to_api_response(ConnectionResponse {
        connected: true,
        username: client.username().to_string(),
        group_count: groups.len(),
    }))
}

pub async fn list_groups(State(state): State<AppState>) -> ApiResult<Vec<GroupView>> {
    let client = session_client(&state).await?;
    let groups = client.get_groups().await?;
    let mappings = state.store.find_team_group_mappings().await?;

    let by_group: HashMap<&SpondId, &TeamGroupMapping> =
        mappings.iter().map(|m| (&m.group_id, m)).collect();
    let linked = |raw: &str| {
        SpondId::parse(raw)
            .and_then(|id| by_group.get(&id).copied())
            .map(|m| LinkedTeam {
                team_id: m.team_id,
                team_name: m.team_name.clone(),
            })
    };

    let views = groups
        .iter()
        .map(|group| GroupView {
            id: group.id.clone(),
            name: group.name.clone(),
            member_count: group.members.len(),
            linked_team: linked(group.id.as_str()),
            sub_groups: group
                .sub_groups
                .iter()
                .map(|sub| SubGroupView {
                    id: sub.id.clone(),
                    name: sub.name.clone(),
                    linked_team: linked(sub.id.as_str()),
                })
                .collect(),
        })
        .collect();

    Ok(success_to_api_response(views))
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<EventBatch> {
    let options = import_options(
        &state,
        query.group_id.as_deref(),
        query.days_ahead,
        query.days_behind.or(Some(0)),
    )?;
    let (min_start, max_start) = options.window(Utc::now());

    let client = session_client(&state).await?;
    let events = client
        .get_events(&EventFilter {
            group_id: options.group_id,
            min_start: Some(min_start),
            max_start: Some(max_start),
            max: query.max,
        })
        .await?;

    Ok(success_to_api_response(events))
}

pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<SyncResult> {
    let integration = active_integration(&state).await?;
    let options = import_options(
        &state,
        req.group_id.as_deref(),
        req.days_ahead,
        req.days_behind,
    )?;
    let client = session_client(&state).await?;
    let store = state.store.clone();

    let result = state
        .sync_lock
        .run(integration.id, async move {
            sync::run_sync(
                client.as_ref(),
                store.as_ref(),
                req.sync_type,
                &options,
                Utc::now(),
            )
            .await
        })
        .await?;

    Ok(success_to_api_response(result))
}

pub async fn export_one(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    body: Bytes,
) -> ApiResult<ExportOutcome> {
    let req: ExportRequest = optional_body(&body)?.unwrap_or_default();
    let target = parse_optional_id(req.group_id.as_deref(), "group_id")?;
    let integration = active_integration(&state).await?;
    let client = session_client(&state).await?;
    let store = state.store.clone();

    let outcome = state
        .sync_lock
        .run(integration.id, async move {
            sync::export_event(client.as_ref(), store.as_ref(), event_id, target.as_ref()).await
        })
        .await??;

    Ok(success_to_api_response(outcome))
}

pub async fn update_one(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<ExportOutcome> {
    let integration = active_integration(&state).await?;
    let client = session_client(&state).await?;
    let store = state.store.clone();

    let outcome = state
        .sync_lock
        .run(integration.id, async move {
            sync::update_exported_event(client.as_ref(), store.as_ref(), event_id).await
        })
        .await??;

    Ok(success_to_api_response(outcome))
}

pub async fn unlink_one(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<EventUnlinkResponse> {
    let remote_event_id = sync::unlink_event(state.store.as_ref(), event_id).await?;
    Ok(success_to_api_response(EventUnlinkResponse {
        event_id,
        remote_event_id,
    }))
}

pub async fn validate_export(
    State(state): State<AppState>,
    Json(req): Json<DateRangeRequest>,
) -> ApiResult<ExportValidation> {
    if req.end < req.start {
        return Err(SyncError::Validation("end must not be before start".into()));
    }
    let client = session_client(&state).await?;
    let validation =
        sync::validate_export(client.as_ref(), state.store.as_ref(), req.start, req.end).await?;
    Ok(success_to_api_response(validation))
}

pub async fn link_team(
    State(state): State<AppState>,
    Json(req): Json<LinkTeamRequest>,
) -> ApiResult<TeamGroupMapping> {
    let group_id = parse_spond_id(&req.group_id, "group_id")?;
    let parent_group_id = parse_optional_id(req.parent_group_id.as_deref(), "parent_group_id")?;
    if parent_group_id.as_ref() == Some(&group_id) {
        return Err(SyncError::Validation(
            "a group cannot be its own parent".into(),
        ));
    }

    let mapping = TeamGroupMapping {
        team_id: req.team_id,
        team_name: None,
        is_subgroup: parent_group_id.is_some(),
        group_id,
        parent_group_id,
        linked_at: None,
    };
    state.store.link_team_group(mapping.clone()).await?;
    tracing::info!(
        "Team {} linked to Spond group {}",
        mapping.team_id,
        mapping.group_id
    );

    Ok(success_to_api_response(mapping))
}

pub async fn unlink_team(
    State(state): State<AppState>,
    Json(req): Json<UnlinkTeamRequest>,
) -> ApiResult<TeamUnlinkResponse> {
    if !state.store.unlink_team_group(req.team_id).await? {
        return Err(SyncError::NotFound(format!(
            "team {} is not linked to a Spond group",
            req.team_id
        )));
    }
    tracing::info!("Team {} unlinked from Spond", req.team_id);

    Ok(success_to_api_response(TeamUnlinkResponse {
        team_id: req.team_id,
        unlinked: true,
    }))
}

pub async fn attendance_one(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<AttendanceCounts> {
    let integration = active_integration(&state).await?;
    let client = session_client(&state).await?;
    let store = state.store.clone();

    let counts = state
        .sync_lock
        .run(integration.id, async move {
            sync::sync_attendance(client.as_ref(), store.as_ref(), event_id, Utc::now()).await
        })
        .await??;

    Ok(success_to_api_response(counts))
}

pub async fn attendance_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<AttendanceBatchResult> {
    let req: AttendanceBatchRequest = optional_body(&body)?.unwrap_or_default();
    let scope = match (req.start, req.end) {
        (Some(start), Some(end)) if end >= start => AttendanceScope::Window { start, end },
        (Some(_), Some(_)) => {
            return Err(SyncError::Validation("end must not be before start".into()));
        }
        _ if req.future_only => AttendanceScope::FutureOnly,
        _ => {
            return Err(SyncError::Validation(
                "start and end are required unless future_only is set".into(),
            ));
        }
    };

    let integration = active_integration(&state).await?;
    let client = session_client(&state).await?;
    let store = state.store.clone();
    let now = Utc::now();

    let batch = state
        .sync_lock
        .run(integration.id, async move {
            sync::sync_attendance_batch(client.as_ref(), store.as_ref(), scope, now).await
        })
        .await??;

    Ok(success_to_api_response(batch))
}
