use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{NewScheduledCommand, ScheduledCommand};

#[derive(Error, Debug)]
pub enum CommandStoreError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Connection Error")]
    Connection(#[from] diesel::ConnectionError),
    #[error("Query Error")]
    Query(#[from] diesel::result::Error),
}

/// Persistence seam for scheduled commands. The dispatcher only ever
/// uses the read-due / mark-executed pair and assumes nothing
/// stronger than read-then-separately-write, so `mark_executed` is
/// conditional: it only flips a record that is still pending, and
/// reports whether it did.
#[async_trait::async_trait]
pub trait CommandStore: Send + Sync {
    async fn create(
        &self,
        command: NewScheduledCommand,
    ) -> Result<ScheduledCommand, CommandStoreError>;

    /// All commands with `executed = false` and `scheduled_time <=
    /// now`, due-time ordered
    async fn due_unexecuted(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduledCommand>, CommandStoreError>;

    /// Returns false when the command was already executed (or never
    /// existed), true when this call flipped it
    async fn mark_executed(&self, command_id: i32) -> Result<bool, CommandStoreError>;
}

/// Sqlite-backed [`CommandStore`]. A single connection guarded by an
/// async mutex is plenty here: the only writers are the scheduling
/// surface and the one dispatcher task
pub struct SqliteCommandStore {
    conn: Mutex<SqliteConnection>,
}

impl SqliteCommandStore {
    pub fn new(database_url: &str) -> Result<Self, CommandStoreError> {
        let mut conn = SqliteConnection::establish(database_url)?;

        diesel::sql_query(
            "CREATE TABLE IF NOT EXISTS scheduled_commands (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                greenhouse_id TEXT NOT NULL,
                field_index INTEGER NOT NULL,
                device TEXT NOT NULL,
                action TEXT NOT NULL,
                scheduled_time TIMESTAMP NOT NULL,
                executed BOOLEAN NOT NULL DEFAULT 0
            )",
        )
        .execute(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait::async_trait]
impl CommandStore for SqliteCommandStore {
    async fn create(
        &self,
        command: NewScheduledCommand,
    ) -> Result<ScheduledCommand, CommandStoreError> {
        use crate::schema::scheduled_commands;

        let mut conn = self.conn.lock().await;
        let created = diesel::insert_into(scheduled_commands::table)
            .values(&command)
            .returning(ScheduledCommand::as_returning())
            .get_result(&mut *conn)?;
        Ok(created)
    }

    async fn due_unexecuted(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduledCommand>, CommandStoreError> {
        use crate::schema::scheduled_commands::dsl::*;

        let mut conn = self.conn.lock().await;
        let due = scheduled_commands
            .filter(executed.eq(false))
            .filter(scheduled_time.le(now))
            .order(scheduled_time.asc())
            .select(ScheduledCommand::as_select())
            .load(&mut *conn)?;
        Ok(due)
    }

    async fn mark_executed(&self, command_id: i32) -> Result<bool, CommandStoreError> {
        use crate::schema::scheduled_commands::dsl::*;

        let mut conn = self.conn.lock().await;
        let updated = diesel::update(
            scheduled_commands
                .filter(id.eq(command_id))
                .filter(executed.eq(false)),
        )
        .set(executed.eq(true))
        .execute(&mut *conn)?;
        Ok(updated > 0)
    }
}

/// In-memory [`CommandStore`] used by the test harnesses; behaves
/// like the sqlite store for due selection and the conditional
/// executed flip
#[derive(Default)]
pub struct InMemoryCommandStore {
    inner: std::sync::Mutex<MemStore>,
}

#[derive(Default)]
struct MemStore {
    next_id: i32,
    commands: Vec<ScheduledCommand>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CommandStore for InMemoryCommandStore {
    async fn create(
        &self,
        command: NewScheduledCommand,
    ) -> Result<ScheduledCommand, CommandStoreError> {
        let mut inner = self.inner.lock().expect("command store lock poisoned");
        inner.next_id += 1;
        let created = ScheduledCommand {
            id: inner.next_id,
            greenhouse_id: command.greenhouse_id,
            field_index: command.field_index,
            device: command.device,
            action: command.action,
            scheduled_time: command.scheduled_time,
            executed: command.executed,
        };
        inner.commands.push(created.clone());
        Ok(created)
    }

    async fn due_unexecuted(
        &self,
        now: NaiveDateTime,
    ) -> Result<Vec<ScheduledCommand>, CommandStoreError> {
        let inner = self.inner.lock().expect("command store lock poisoned");
        let mut due = inner
            .commands
            .iter()
            .filter(|c| !c.executed && c.scheduled_time <= now)
            .cloned()
            .collect::<Vec<_>>();
        due.sort_by_key(|c| c.scheduled_time);
        Ok(due)
    }

    async fn mark_executed(&self, command_id: i32) -> Result<bool, CommandStoreError> {
        let mut inner = self.inner.lock().expect("command store lock poisoned");
        if let Some(command) = inner
            .commands
            .iter_mut()
            .find(|c| c.id == command_id && !c.executed)
        {
            command.executed = true;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
