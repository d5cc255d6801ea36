use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::SyncError;
use crate::spond::identifier::SpondId;
use crate::store::EventStore;
use crate::store::models::{
    AttendanceSnapshot, EventStatus, EventType, IntegrationConfig, LocalEvent, NewLocalEvent,
    Participant, RemoteEventUpdate, RemoteLink, TeamGroupMapping, TeamSubgroupSettings,
};

const EVENT_COLUMNS: &str = r#"
    id, title, description, event_type, status, start_time, end_time, team_ids,
    venue_id, location_name, latitude, longitude, spond_event_id, spond_group_id,
    spond_payload, attendance_accepted, attendance_declined, attendance_unanswered,
    attendance_waiting, attendance_unconfirmed, estimated_attendance,
    attendance_synced_at, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct EventRow {
    id: i64,
    title: String,
    description: Option<String>,
    event_type: String,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    team_ids: Vec<i64>,
    venue_id: Option<i64>,
    location_name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    spond_event_id: Option<String>,
    spond_group_id: Option<String>,
    spond_payload: Option<serde_json::Value>,
    attendance_accepted: Option<i32>,
    attendance_declined: Option<i32>,
    attendance_unanswered: Option<i32>,
    attendance_waiting: Option<i32>,
    attendance_unconfirmed: Option<i32>,
    estimated_attendance: Option<i32>,
    attendance_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for LocalEvent {
    fn from(row: EventRow) -> Self {
        let event_type = row.event_type.parse().unwrap_or_else(|e| {
            tracing::warn!("Event {}: {}, treating as Other", row.id, e);
            EventType::Other
        });
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!("Event {}: {}, treating as Planned", row.id, e);
            EventStatus::Planned
        });

        let remote_link = row
            .spond_event_id
            .as_deref()
            .and_then(SpondId::parse)
            .map(|remote_event_id| RemoteLink {
                remote_event_id,
                remote_group_id: row.spond_group_id.as_deref().and_then(SpondId::parse),
            });

        let attendance = row.attendance_synced_at.map(|last_synced_at| AttendanceSnapshot {
            accepted: row.attendance_accepted.unwrap_or(0),
            declined: row.attendance_declined.unwrap_or(0),
            unanswered: row.attendance_unanswered.unwrap_or(0),
            waiting: row.attendance_waiting.unwrap_or(0),
            unconfirmed: row.attendance_unconfirmed.unwrap_or(0),
            estimated_attendance: row.estimated_attendance.unwrap_or(0),
            last_synced_at,
        });

        LocalEvent {
            id: row.id,
            title: row.title,
            description: row.description,
            event_type,
            status,
            start_time: row.start_time,
            end_time: row.end_time,
            team_ids: row.team_ids,
            venue_id: row.venue_id,
            location_name: row.location_name,
            latitude: row.latitude,
            longitude: row.longitude,
            remote_link,
            attendance,
            remote_payload: row.spond_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MappingRow {
    team_id: i64,
    team_name: Option<String>,
    spond_group_id: String,
    parent_group_id: Option<String>,
    is_subgroup: bool,
    linked_at: DateTime<Utc>,
}

impl MappingRow {
    fn into_mapping(self) -> Option<TeamGroupMapping> {
        let Some(group_id) = SpondId::parse(&self.spond_group_id) else {
            tracing::warn!(
                "Team {} has malformed Spond group id '{}', ignoring mapping",
                self.team_id,
                self.spond_group_id
            );
            return None;
        };
        Some(TeamGroupMapping {
            team_id: self.team_id,
            team_name: self.team_name,
            group_id,
            parent_group_id: self.parent_group_id.as_deref().and_then(SpondId::parse),
            is_subgroup: self.is_subgroup,
            linked_at: Some(self.linked_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct IntegrationRow {
    id: i64,
    username: String,
    password: String,
    active: bool,
    last_sync_at: Option<DateTime<Utc>>,
}

impl From<IntegrationRow> for IntegrationConfig {
    fn from(row: IntegrationRow) -> Self {
        IntegrationConfig {
            id: row.id,
            username: row.username,
            password: row.password,
            active: row.active,
            last_sync_at: row.last_sync_at,
        }
    }
}

// 唯一索引冲突说明该 Spond 事件已关联到别的本地事件
fn map_unique_violation(err: sqlx::Error, context: &str) -> SyncError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return SyncError::Conflict(format!("{}: already linked to another event", context));
        }
    }
    SyncError::Database(err)
}

// 外键冲突说明球队不存在
fn map_missing_team(err: sqlx::Error, team_id: i64) -> SyncError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23503") {
            return SyncError::NotFound(format!("team {}", team_id));
        }
    }
    SyncError::Database(err)
}

fn opt_id(id: &Option<SpondId>) -> Option<String> {
    id.as_ref().map(|id| id.to_string())
}

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_events(
        &self,
        filter: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        let sql = format!(
            "SELECT {} FROM events WHERE {} ORDER BY start_time, id",
            EVENT_COLUMNS, filter
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(LocalEvent::from).collect())
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn find_event(&self, id: i64) -> Result<Option<LocalEvent>, SyncError> {
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(LocalEvent::from))
    }

    async fn find_event_by_remote_id(
        &self,
        remote_event_id: &SpondId,
    ) -> Result<Option<LocalEvent>, SyncError> {
        let sql = format!(
            "SELECT {} FROM events WHERE spond_event_id = $1",
            EVENT_COLUMNS
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(remote_event_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(LocalEvent::from))
    }

    async fn find_unlinked_events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        self.fetch_events(
            "spond_event_id IS NULL AND start_time BETWEEN $1 AND $2",
            Some(start),
            Some(end),
        )
        .await
    }

    async fn find_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        self.fetch_events("start_time BETWEEN $1 AND $2", Some(start), Some(end))
            .await
    }

    async fn find_linked_events(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LocalEvent>, SyncError> {
        self.fetch_events(
            r#"spond_event_id IS NOT NULL
               AND ($1::timestamptz IS NULL OR start_time >= $1)
               AND ($2::timestamptz IS NULL OR start_time <= $2)"#,
            start,
            end,
        )
        .await
    }

    async fn insert_event(&self, event: NewLocalEvent) -> Result<i64, SyncError> {
        let context = event.title.clone();
        let (spond_event_id, spond_group_id) = match &event.remote_link {
            Some(link) => (
                Some(link.remote_event_id.to_string()),
                opt_id(&link.remote_group_id),
            ),
            None => (None, None),
        };

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (
                title, description, event_type, status, start_time, end_time, team_ids,
                location_name, latitude, longitude, spond_event_id, spond_group_id,
                spond_payload, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())
            RETURNING id
            "#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_type.as_str())
        .bind(event.status.as_str())
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.team_ids)
        .bind(&event.location_name)
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(spond_event_id)
        .bind(spond_group_id)
        .bind(&event.remote_payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &context))?;

        Ok(id)
    }

    async fn update_event_from_remote(
        &self,
        id: i64,
        update: RemoteEventUpdate,
    ) -> Result<(), SyncError> {
        // 球队只在为空时补上，已分配的不覆盖
        let result = sqlx::query(
            r#"
            UPDATE events
            SET description = COALESCE($2, description),
                event_type = $3,
                status = $4,
                start_time = $5,
                end_time = $6,
                team_ids = CASE WHEN cardinality(team_ids) = 0 THEN $7 ELSE team_ids END,
                spond_group_id = COALESCE(spond_group_id, $8),
                spond_payload = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.description)
        .bind(update.event_type.as_str())
        .bind(update.status.as_str())
        .bind(update.start_time)
        .bind(update.end_time)
        .bind(&update.team_ids)
        .bind(opt_id(&update.remote_group_id))
        .bind(&update.payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("event {}", id)));
        }
        Ok(())
    }

    async fn link_event(
        &self,
        id: i64,
        link: RemoteLink,
        team_ids: Vec<i64>,
        payload: serde_json::Value,
    ) -> Result<(), SyncError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET spond_event_id = $2,
                spond_group_id = $3,
                team_ids = CASE WHEN cardinality(team_ids) = 0 THEN $4 ELSE team_ids END,
                spond_payload = $5,
                updated_at = NOW()
            WHERE id = $1 AND spond_event_id IS NULL
            "#,
        )
        .bind(id)
        .bind(link.remote_event_id.as_str())
        .bind(opt_id(&link.remote_group_id))
        .bind(&team_ids)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, link.remote_event_id.as_str()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Conflict(format!(
                "event {} is missing or already linked",
                id
            )));
        }
        Ok(())
    }

    async fn set_remote_link(&self, id: i64, link: RemoteLink) -> Result<(), SyncError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET spond_event_id = $2, spond_group_id = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(link.remote_event_id.as_str())
        .bind(opt_id(&link.remote_group_id))
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, link.remote_event_id.as_str()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("event {}", id)));
        }
        Ok(())
    }

    async fn clear_remote_link(&self, id: i64) -> Result<(), SyncError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET spond_event_id = NULL, spond_group_id = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::NotFound(format!("event {}", id)));
        }
        Ok(())
    }

    async fn update_attendance(
        &self,
        id: i64,
        snapshot: AttendanceSnapshot,
    ) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            UPDATE events
            SET attendance_accepted = $2,
                attendance_declined = $3,
                attendance_unanswered = $4,
                attendance_waiting = $5,
                attendance_unconfirmed = $6,
                estimated_attendance = $7,
                attendance_synced_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(snapshot.accepted)
        .bind(snapshot.declined)
        .bind(snapshot.unanswered)
        .bind(snapshot.waiting)
        .bind(snapshot.unconfirmed)
        .bind(snapshot.estimated_attendance)
        .bind(snapshot.last_synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_participant(&self, participant: Participant) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO spond_event_participants (
                event_id, spond_member_id, name, email, response, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (event_id, spond_member_id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email,
                response = EXCLUDED.response,
                updated_at = NOW()
            "#,
        )
        .bind(participant.event_id)
        .bind(&participant.member_id)
        .bind(&participant.name)
        .bind(&participant.email)
        .bind(participant.response.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_team_group_mappings(&self) -> Result<Vec<TeamGroupMapping>, SyncError> {
        let rows = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT m.team_id, t.name AS team_name, m.spond_group_id, m.parent_group_id,
                   m.is_subgroup, m.linked_at
            FROM spond_team_groups m
            LEFT JOIN teams t ON t.id = m.team_id
            ORDER BY m.team_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(MappingRow::into_mapping).collect())
    }

    async fn find_team_subgroup_settings(
        &self,
        team_id: i64,
    ) -> Result<Option<TeamSubgroupSettings>, SyncError> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT m.team_id, t.name AS team_name, m.spond_group_id, m.parent_group_id,
                   m.is_subgroup, m.linked_at
            FROM spond_team_groups m
            LEFT JOIN teams t ON t.id = m.team_id
            WHERE m.team_id = $1
            "#,
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .and_then(MappingRow::into_mapping)
            .map(|mapping| TeamSubgroupSettings::from(&mapping)))
    }

    async fn link_team_group(&self, mapping: TeamGroupMapping) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO spond_team_groups (team_id, spond_group_id, parent_group_id, is_subgroup, linked_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (team_id) DO UPDATE
            SET spond_group_id = EXCLUDED.spond_group_id,
                parent_group_id = EXCLUDED.parent_group_id,
                is_subgroup = EXCLUDED.is_subgroup,
                linked_at = NOW()
            "#,
        )
        .bind(mapping.team_id)
        .bind(mapping.group_id.as_str())
        .bind(opt_id(&mapping.parent_group_id))
        .bind(mapping.is_subgroup)
        .execute(&self.pool)
        .await
        .map_err(|e| map_missing_team(e, mapping.team_id))?;
        Ok(())
    }

    async fn unlink_team_group(&self, team_id: i64) -> Result<bool, SyncError> {
        let result = sqlx::query("DELETE FROM spond_team_groups WHERE team_id = $1")
            .bind(team_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_active_integration_config(
        &self,
    ) -> Result<Option<IntegrationConfig>, SyncError> {
        let row = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, username, password, active, last_sync_at
            FROM spond_integration
            WHERE active
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(IntegrationConfig::from))
    }

    async fn save_integration_config(
        &self,
        username: &str,
        password: &str,
    ) -> Result<IntegrationConfig, SyncError> {
        // 同一时间只保留一份有效配置
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE spond_integration SET active = FALSE, updated_at = NOW() WHERE active")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, IntegrationRow>(
            r#"
            INSERT INTO spond_integration (username, password, active, created_at, updated_at)
            VALUES ($1, $2, TRUE, NOW(), NOW())
            RETURNING id, username, password, active, last_sync_at
            "#,
        )
        .bind(username)
        .bind(password)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn remove_integration_config(&self) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM spond_integration")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_sync_timestamp(&self, ts: DateTime<Utc>) -> Result<(), SyncError> {
        sqlx::query(
            "UPDATE spond_integration SET last_sync_at = $1, updated_at = NOW() WHERE active",
        )
        .bind(ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
