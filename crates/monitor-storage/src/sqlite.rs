use std::sync::Mutex;

use chrono::{DateTime, Utc};
use monitor_core::{
    CommentDraft, CommentId, ConnectionId, Cursor, Monitor, MonitorEventId, MonitorEventRecord,
    MonitorId, MonitorStatus, OrganizationId, ProviderConfig, QueueId, Result, TaskDraft, TaskId,
    TaskStatus,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::init_db;
use crate::ports::{EncryptedConnection, MonitorUpdate, Storage};
use async_trait::async_trait;
use monitor_core::MonitorError;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Seeds a connection row. Production code populates this table via
    /// whatever admin API owns connection onboarding; tests use this directly.
    pub fn insert_connection(&self, conn: &EncryptedConnection) -> Result<()> {
        let guard = self.conn.lock().unwrap();
        let scopes_json = serde_json::to_string(&conn.scopes)?;
        guard
            .execute(
                "INSERT INTO connections
                    (id, access_token_ciphertext, refresh_token_ciphertext, provider_user_id, scopes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    conn.id.as_str(),
                    conn.access_token_ciphertext,
                    conn.refresh_token_ciphertext,
                    conn.provider_user_id,
                    scopes_json,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// Seeds a monitor row. Production code populates this table via
    /// whatever admin API owns monitor CRUD; tests use this directly.
    pub fn insert_monitor(&self, m: &Monitor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let cursor_json = m.poll_cursor.as_ref().map(serde_json::to_string).transpose()?;
        let input_data_json = serde_json::to_string(&m.input_data_template)?;
        conn.execute(
            "INSERT INTO monitors
                (id, organization_id, connection_id, provider_config, queue_id, project_id,
                 playbook_id, poll_interval_seconds, poll_cursor, status, last_polled_at,
                 last_event_at, last_error, events_detected, tasks_created,
                 input_data_template, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                m.id.as_str(),
                m.organization_id.as_str(),
                m.connection_id.as_str(),
                serde_json::to_string(&m.provider_config)?,
                m.queue_id.as_ref().map(|q| q.as_str()),
                m.project_id.as_ref().map(|p| p.as_str()),
                m.playbook_id.as_ref().map(|p| p.as_str()),
                m.poll_interval_seconds,
                cursor_json,
                m.status.to_string(),
                opt_to_rfc3339(m.last_polled_at),
                opt_to_rfc3339(m.last_event_at),
                m.last_error,
                m.events_detected as i64,
                m.tasks_created as i64,
                input_data_json,
                opt_to_rfc3339(m.deleted_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: rusqlite::Error) -> MonitorError {
    MonitorError::StorageFatal(e.to_string())
}

fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_to_rfc3339(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(to_rfc3339)
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MonitorError::StorageFatal(format!("bad timestamp {}: {}", s, e)))
}

fn parse_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    match s {
        Some(s) => Ok(Some(parse_dt(&s)?)),
        None => Ok(None),
    }
}

struct RawMonitorRow {
    id: String,
    organization_id: String,
    connection_id: String,
    provider_config_json: String,
    queue_id: Option<String>,
    project_id: Option<String>,
    playbook_id: Option<String>,
    poll_interval_seconds: u32,
    cursor_json: Option<String>,
    status: String,
    last_polled_at: Option<String>,
    last_event_at: Option<String>,
    last_error: Option<String>,
    events_detected: u64,
    tasks_created: u64,
    input_data_json: String,
    deleted_at: Option<String>,
}

fn build_monitor(raw: RawMonitorRow) -> Result<Monitor> {
    let provider_config: ProviderConfig = serde_json::from_str(&raw.provider_config_json)?;
    let poll_cursor: Option<Cursor> = match raw.cursor_json {
        Some(s) => Some(serde_json::from_str(&s)?),
        None => None,
    };
    let input_data_template: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&raw.input_data_json)?;
    let status: MonitorStatus = raw
        .status
        .parse()
        .map_err(|e: String| MonitorError::StorageFatal(e))?;

    Ok(Monitor {
        id: MonitorId::from(raw.id),
        organization_id: OrganizationId::from(raw.organization_id),
        connection_id: raw.connection_id.into(),
        provider_config,
        queue_id: raw.queue_id.map(QueueId::from),
        project_id: raw.project_id.map(Into::into),
        playbook_id: raw.playbook_id.map(Into::into),
        poll_interval_seconds: raw.poll_interval_seconds,
        poll_cursor,
        status,
        last_polled_at: parse_opt_dt(raw.last_polled_at)?,
        last_event_at: parse_opt_dt(raw.last_event_at)?,
        last_error: raw.last_error,
        events_detected: raw.events_detected,
        tasks_created: raw.tasks_created,
        input_data_template,
        deleted_at: parse_opt_dt(raw.deleted_at)?,
    })
}

impl SqliteStorage {
    fn active_monitors(&self, org: Option<&OrganizationId>) -> Result<Vec<Monitor>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT * FROM monitors WHERE status = 'active' AND deleted_at IS NULL
                 AND (:org IS NULL OR organization_id = :org)",
            )
            .map_err(db_err)?;
        let org_param: Option<&str> = org.map(|o| o.as_str());
        let rows = stmt
            .query_map(rusqlite::named_params! { ":org": org_param }, raw_monitor_row)
            .map_err(db_err)?;

        let mut monitors = Vec::new();
        for row in rows {
            monitors.push(build_monitor(row.map_err(db_err)?)?);
        }
        Ok(monitors)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn find_monitor(
        &self,
        id: &MonitorId,
        org: Option<&OrganizationId>,
    ) -> Result<Option<Monitor>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT * FROM monitors WHERE id = ?1 AND deleted_at IS NULL",
                params![id.as_str()],
                raw_monitor_row,
            )
            .optional()
            .map_err(db_err)?;
        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(None),
        };
        if let Some(org) = org {
            if raw.organization_id != org.as_str() {
                return Ok(None);
            }
        }
        Ok(Some(build_monitor(raw)?))
    }

    async fn find_connection(&self, id: &ConnectionId) -> Result<Option<EncryptedConnection>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, access_token_ciphertext, refresh_token_ciphertext, provider_user_id, scopes
             FROM connections WHERE id = ?1",
            params![id.as_str()],
            |row| {
                let scopes_json: String = row.get(4)?;
                Ok(EncryptedConnection {
                    id: ConnectionId::from(row.get::<_, String>(0)?),
                    access_token_ciphertext: row.get(1)?,
                    refresh_token_ciphertext: row.get(2)?,
                    provider_user_id: row.get(3)?,
                    scopes: serde_json::from_str(&scopes_json).unwrap_or_default(),
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn find_due_monitors(
        &self,
        now: DateTime<Utc>,
        org: Option<&OrganizationId>,
    ) -> Result<Vec<Monitor>> {
        let active = self.active_monitors(org)?;
        Ok(active.into_iter().filter(|m| m.is_due(now)).collect())
    }

    async fn list_active_monitors(&self, org: Option<&OrganizationId>) -> Result<Vec<Monitor>> {
        self.active_monitors(org)
    }

    async fn update_monitor(&self, id: &MonitorId, update: MonitorUpdate) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let cursor_json = update
            .cursor
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        if update.cursor.is_some() {
            conn.execute(
                "UPDATE monitors SET
                    last_polled_at = COALESCE(?1, last_polled_at),
                    poll_cursor = ?2,
                    status = ?3,
                    last_error = ?4,
                    last_event_at = COALESCE(?5, last_event_at),
                    events_detected = events_detected + ?6,
                    tasks_created = tasks_created + ?7
                 WHERE id = ?8",
                params![
                    opt_to_rfc3339(update.last_polled_at),
                    cursor_json,
                    update.status.to_string(),
                    update.last_error,
                    opt_to_rfc3339(update.last_event_at),
                    update.events_detected_delta as i64,
                    update.tasks_created_delta as i64,
                    id.as_str(),
                ],
            )
            .map_err(db_err)?;
        } else {
            conn.execute(
                "UPDATE monitors SET
                    last_polled_at = COALESCE(?1, last_polled_at),
                    status = ?2,
                    last_error = ?3,
                    last_event_at = COALESCE(?4, last_event_at),
                    events_detected = events_detected + ?5,
                    tasks_created = tasks_created + ?6
                 WHERE id = ?7",
                params![
                    opt_to_rfc3339(update.last_polled_at),
                    update.status.to_string(),
                    update.last_error,
                    opt_to_rfc3339(update.last_event_at),
                    update.events_detected_delta as i64,
                    update.tasks_created_delta as i64,
                    id.as_str(),
                ],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn lookup_event(
        &self,
        monitor_id: &MonitorId,
        provider_event_id: &str,
    ) -> Result<Option<MonitorEventRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM monitor_events WHERE monitor_id = ?1 AND provider_event_id = ?2",
            params![monitor_id.as_str(), provider_event_id],
            event_from_row,
        )
        .optional()
        .map_err(db_err)?
        .transpose()
    }

    async fn insert_event(&self, event: MonitorEventRecord) -> Result<MonitorEventId> {
        let conn = self.conn.lock().unwrap();
        let event_data_json = serde_json::to_string(&event.event_data)?;
        let context_data_json = serde_json::to_string(&event.context_data)?;
        let res = conn.execute(
            "INSERT INTO monitor_events
                (id, monitor_id, provider_event_id, event_type, event_data, context_data,
                 provider_timestamp, processed, task_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.id.as_str(),
                event.monitor_id.as_str(),
                event.provider_event_id,
                event.event_type,
                event_data_json,
                context_data_json,
                to_rfc3339(event.provider_timestamp),
                event.processed as i64,
                event.task_id.as_ref().map(|t| t.as_str()),
                to_rfc3339(event.created_at),
            ],
        );
        match res {
            Ok(_) => Ok(event.id),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(MonitorError::DuplicateEvent)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn mark_event_processed(&self, id: &MonitorEventId, task_id: Option<TaskId>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE monitor_events SET processed = 1, task_id = ?1 WHERE id = ?2",
            params![task_id.as_ref().map(|t| t.as_str()), id.as_str()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_task(&self, task: TaskDraft) -> Result<TaskId> {
        let conn = self.conn.lock().unwrap();
        let id = TaskId::new();
        let input_data_json = serde_json::to_string(&task.input_data)?;
        conn.execute(
            "INSERT INTO tasks
                (id, organization_id, title, description, queue_id, project_id, status,
                 priority, source_monitor_id, source_playbook_id, source_url, input_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id.as_str(),
                task.organization_id.as_str(),
                task.title,
                task.description,
                task.queue_id.as_str(),
                task.project_id.as_ref().map(|p| p.as_str()),
                task.status.to_string(),
                task.priority as i64,
                task.source_monitor_id.as_str(),
                task.source_playbook_id.as_ref().map(|p| p.as_str()),
                task.source_url,
                input_data_json,
                to_rfc3339(Utc::now()),
            ],
        )
        .map_err(db_err)?;
        Ok(id)
    }

    async fn find_task(&self, org: &OrganizationId, source_url: &str) -> Result<Option<TaskId>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id FROM tasks WHERE organization_id = ?1 AND source_url = ?2",
            params![org.as_str(), source_url],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(db_err)
        .map(|opt| opt.map(TaskId::from))
    }

    async fn find_inbox_queue(&self, org: &OrganizationId) -> Result<Option<QueueId>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id FROM queues WHERE organization_id = ?1 AND system_type = 'inbox' LIMIT 1",
            params![org.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(db_err)
        .map(|opt| opt.map(QueueId::from))
    }

    async fn insert_comment(&self, comment: CommentDraft) -> Result<CommentId> {
        let conn = self.conn.lock().unwrap();
        let id = CommentId::new();
        conn.execute(
            "INSERT INTO comments (id, task_id, user_id, user_name, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_str(),
                comment.task_id.as_str(),
                comment.user_id,
                comment.user_name,
                comment.content,
                to_rfc3339(Utc::now()),
            ],
        )
        .map_err(db_err)?;
        Ok(id)
    }
}

fn raw_monitor_row(row: &Row) -> rusqlite::Result<RawMonitorRow> {
    Ok(RawMonitorRow {
        id: row.get("id")?,
        organization_id: row.get("organization_id")?,
        connection_id: row.get("connection_id")?,
        provider_config_json: row.get("provider_config")?,
        queue_id: row.get("queue_id")?,
        project_id: row.get("project_id")?,
        playbook_id: row.get("playbook_id")?,
        poll_interval_seconds: row.get("poll_interval_seconds")?,
        cursor_json: row.get("poll_cursor")?,
        status: row.get("status")?,
        last_polled_at: row.get("last_polled_at")?,
        last_event_at: row.get("last_event_at")?,
        last_error: row.get("last_error")?,
        events_detected: row.get("events_detected")?,
        tasks_created: row.get("tasks_created")?,
        input_data_json: row.get("input_data_template")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn event_from_row(row: &Row) -> rusqlite::Result<Result<MonitorEventRecord>> {
    let id: String = row.get("id")?;
    let monitor_id: String = row.get("monitor_id")?;
    let provider_event_id: String = row.get("provider_event_id")?;
    let event_type: String = row.get("event_type")?;
    let event_data_json: String = row.get("event_data")?;
    let context_data_json: String = row.get("context_data")?;
    let provider_timestamp: String = row.get("provider_timestamp")?;
    let processed: i64 = row.get("processed")?;
    let task_id: Option<String> = row.get("task_id")?;
    let created_at: String = row.get("created_at")?;

    let built = (|| -> Result<MonitorEventRecord> {
        Ok(MonitorEventRecord {
            id: MonitorEventId::from(id),
            monitor_id: MonitorId::from(monitor_id),
            provider_event_id,
            event_type,
            event_data: serde_json::from_str(&event_data_json)?,
            context_data: serde_json::from_str(&context_data_json)?,
            provider_timestamp: parse_dt(&provider_timestamp)?,
            processed: processed != 0,
            task_id: task_id.map(TaskId::from),
            created_at: parse_dt(&created_at)?,
        })
    })();
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::{ContextData, EventData, ProviderConfig};

    fn sample_monitor(status: MonitorStatus) -> Monitor {
        Monitor {
            id: MonitorId::new(),
            organization_id: OrganizationId::new(),
            connection_id: monitor_core::ConnectionId::new(),
            provider_config: ProviderConfig::Slack {
                channel_ids: vec!["C1".into()],
                workspace_wide: false,
                tagged_user_ids: vec![],
                keywords: vec![],
                context_messages: 0,
                my_mentions: false,
            },
            queue_id: None,
            project_id: None,
            playbook_id: None,
            poll_interval_seconds: 60,
            poll_cursor: None,
            status,
            last_polled_at: None,
            last_event_at: None,
            last_error: None,
            events_detected: 0,
            tasks_created: 0,
            input_data_template: serde_json::Map::new(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn find_due_monitors_skips_paused() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let active = sample_monitor(MonitorStatus::Active);
        let paused = sample_monitor(MonitorStatus::Paused);
        store.insert_monitor(&active).unwrap();
        store.insert_monitor(&paused).unwrap();

        let due = store.find_due_monitors(Utc::now(), None).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, active.id);
    }

    #[tokio::test]
    async fn insert_event_rejects_duplicate() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let monitor_id = MonitorId::new();
        let record = MonitorEventRecord {
            id: MonitorEventId::new(),
            monitor_id: monitor_id.clone(),
            provider_event_id: "evt-1".into(),
            event_type: "message".into(),
            event_data: EventData::default(),
            context_data: ContextData::default(),
            provider_timestamp: Utc::now(),
            processed: false,
            task_id: None,
            created_at: Utc::now(),
        };
        store.insert_event(record.clone()).await.unwrap();

        let mut dup = record;
        dup.id = MonitorEventId::new();
        let err = store.insert_event(dup).await.unwrap_err();
        assert!(matches!(err, MonitorError::DuplicateEvent));
    }

    #[tokio::test]
    async fn lookup_event_finds_inserted_row() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let monitor_id = MonitorId::new();
        let record = MonitorEventRecord {
            id: MonitorEventId::new(),
            monitor_id: monitor_id.clone(),
            provider_event_id: "evt-7".into(),
            event_type: "email".into(),
            event_data: EventData::default(),
            context_data: ContextData::default(),
            provider_timestamp: Utc::now(),
            processed: false,
            task_id: None,
            created_at: Utc::now(),
        };
        store.insert_event(record).await.unwrap();

        let found = store
            .lookup_event(&monitor_id, "evt-7")
            .await
            .unwrap();
        assert!(found.is_some());
        assert!(store
            .lookup_event(&monitor_id, "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn insert_and_find_task_by_source_url() {
        let store = SqliteStorage::open_in_memory().unwrap();
        let org = OrganizationId::new();
        let task = TaskDraft {
            organization_id: org.clone(),
            title: "title".into(),
            description: "desc".into(),
            queue_id: QueueId::new(),
            project_id: None,
            status: TaskStatus::Queued,
            priority: monitor_core::DEFAULT_TASK_PRIORITY,
            source_monitor_id: MonitorId::new(),
            source_playbook_id: None,
            source_url: Some("https://example.com/msg/1".into()),
            input_data: serde_json::Map::new(),
        };
        let task_id = store.insert_task(task).await.unwrap();

        let found = store
            .find_task(&org, "https://example.com/msg/1")
            .await
            .unwrap();
        assert_eq!(found, Some(task_id));
    }
}
