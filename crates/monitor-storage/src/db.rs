use monitor_core::{MonitorError, Result};
use rusqlite::Connection;

pub fn init_db(conn: &Connection) -> Result<()> {
    create_connections_table(conn)?;
    create_monitors_table(conn)?;
    create_monitor_events_table(conn)?;
    create_queues_table(conn)?;
    create_tasks_table(conn)?;
    create_comments_table(conn)?;
    Ok(())
}

fn create_connections_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS connections (
            id TEXT PRIMARY KEY,
            access_token_ciphertext TEXT NOT NULL,
            refresh_token_ciphertext TEXT,
            provider_user_id TEXT,
            scopes TEXT NOT NULL DEFAULT '[]'
        ) STRICT;",
    )
    .map_err(db_err)
}

fn create_monitors_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            connection_id TEXT NOT NULL,
            provider_config TEXT NOT NULL,
            queue_id TEXT,
            project_id TEXT,
            playbook_id TEXT,
            poll_interval_seconds INTEGER NOT NULL,
            poll_cursor TEXT,
            status TEXT NOT NULL,
            last_polled_at TEXT,
            last_event_at TEXT,
            last_error TEXT,
            events_detected INTEGER NOT NULL DEFAULT 0,
            tasks_created INTEGER NOT NULL DEFAULT 0,
            input_data_template TEXT NOT NULL DEFAULT '{}',
            deleted_at TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_monitors_due
            ON monitors(status, last_polled_at);
        CREATE INDEX IF NOT EXISTS idx_monitors_org
            ON monitors(organization_id);",
    )
    .map_err(db_err)
}

fn create_monitor_events_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS monitor_events (
            id TEXT PRIMARY KEY,
            monitor_id TEXT NOT NULL,
            provider_event_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            event_data TEXT NOT NULL,
            context_data TEXT NOT NULL,
            provider_timestamp TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            task_id TEXT,
            created_at TEXT NOT NULL
        ) STRICT;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_monitor_events_dedup
            ON monitor_events(monitor_id, provider_event_id);",
    )
    .map_err(db_err)
}

fn create_queues_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS queues (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            is_system INTEGER NOT NULL DEFAULT 0,
            system_type TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_queues_org_system
            ON queues(organization_id, system_type);",
    )
    .map_err(db_err)
}

fn create_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            organization_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            queue_id TEXT NOT NULL,
            project_id TEXT,
            status TEXT NOT NULL,
            priority INTEGER NOT NULL,
            source_monitor_id TEXT,
            source_playbook_id TEXT,
            source_url TEXT,
            input_data TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_tasks_org_source_url
            ON tasks(organization_id, source_url);",
    )
    .map_err(db_err)
}

fn create_comments_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_comments_task
            ON comments(task_id);",
    )
    .map_err(db_err)
}

fn db_err(e: rusqlite::Error) -> MonitorError {
    MonitorError::StorageFatal(e.to_string())
}
