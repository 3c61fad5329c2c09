use crate::domain::models::{Cycle, CycleStatus, Session, SessionStatus, SessionType, Task};
use crate::infrastructure::error::{AppError, StorageError};
use crate::infrastructure::storage::open_connection;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};

const TASK_COLUMNS: &str =
    "id, user_id, title, description, completed, total_cycle, total_session, created_at, updated_at";
const CYCLE_COLUMNS: &str =
    "id, user_id, task_id, status, completed_sessions, started_at, ended_at";
const SESSION_COLUMNS: &str =
    "id, user_id, task_id, cycle_id, type, status, duration, started_at, ended_at";

/// Entry point to the session record store. Every mutation runs through
/// [`SqliteRepository::transaction`], which hands the closure a [`StoreTx`];
/// the `StoreTx` methods are the only code path that writes task, cycle, or
/// session rows.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db_path: PathBuf,
}

impl SqliteRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Runs `operation` inside one immediate transaction. Immediate mode
    /// takes the write lock before the first read, so two concurrent
    /// transitions for the same task serialize: the loser re-reads the
    /// winner's committed state instead of acting on a stale snapshot.
    pub fn transaction<T>(
        &self,
        operation: impl FnOnce(&StoreTx<'_>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut connection = open_connection(&self.db_path)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let value = operation(&StoreTx { tx: &tx })?;
        tx.commit().map_err(StorageError::from)?;
        Ok(value)
    }

    /// Read-only variant; deferred transaction, no write lock.
    pub fn read<T>(
        &self,
        operation: impl FnOnce(&StoreTx<'_>) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut connection = open_connection(&self.db_path)?;
        let tx = connection.transaction().map_err(StorageError::from)?;
        operation(&StoreTx { tx: &tx })
    }
}

pub struct StoreTx<'conn> {
    tx: &'conn Transaction<'conn>,
}

impl StoreTx<'_> {
    pub fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO tasks (id, user_id, title, description, completed, total_cycle, total_session, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                task.id,
                task.user_id,
                task.title,
                task.description,
                task.completed,
                task.total_cycle,
                task.total_session,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_task(&self, task_id: &str) -> Result<Option<Task>, StorageError> {
        let task = self
            .tx
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![task_id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    pub fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>, StorageError> {
        let mut statement = self.tx.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let tasks = statement
            .query_map(params![user_id], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn update_task(&self, task: &Task) -> Result<(), StorageError> {
        self.tx.execute(
            "UPDATE tasks
             SET title = ?2,
                 description = ?3,
                 completed = ?4,
                 total_cycle = ?5,
                 total_session = ?6,
                 updated_at = ?7
             WHERE id = ?1",
            params![
                task.id,
                task.title,
                task.description,
                task.completed,
                task.total_cycle,
                task.total_session,
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_task(&self, task_id: &str) -> Result<bool, StorageError> {
        let affected = self
            .tx
            .execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(affected > 0)
    }

    pub fn insert_cycle(&self, cycle: &Cycle) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO task_cycles (id, user_id, task_id, status, completed_sessions, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                cycle.id,
                cycle.user_id,
                cycle.task_id,
                cycle.status.as_str(),
                cycle.completed_sessions,
                cycle.started_at.map(|value| value.to_rfc3339()),
                cycle.ended_at.map(|value| value.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn find_active_cycle(&self, task_id: &str) -> Result<Option<Cycle>, StorageError> {
        let cycle = self
            .tx
            .query_row(
                &format!(
                    "SELECT {CYCLE_COLUMNS} FROM task_cycles
                     WHERE task_id = ?1 AND status = 'active'"
                ),
                params![task_id],
                row_to_cycle,
            )
            .optional()?;
        Ok(cycle)
    }

    pub fn update_cycle(&self, cycle: &Cycle) -> Result<(), StorageError> {
        self.tx.execute(
            "UPDATE task_cycles
             SET status = ?2,
                 completed_sessions = ?3,
                 started_at = ?4,
                 ended_at = ?5
             WHERE id = ?1",
            params![
                cycle.id,
                cycle.status.as_str(),
                cycle.completed_sessions,
                cycle.started_at.map(|value| value.to_rfc3339()),
                cycle.ended_at.map(|value| value.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn count_cycles(&self, task_id: &str) -> Result<u32, StorageError> {
        let count: u32 = self.tx.query_row(
            "SELECT COUNT(*) FROM task_cycles WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO task_sessions (id, user_id, task_id, cycle_id, type, status, duration, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                session.user_id,
                session.task_id,
                session.cycle_id,
                session.session_type.as_str(),
                session.status.as_str(),
                session.duration,
                session.started_at.map(|value| value.to_rfc3339()),
                session.ended_at.map(|value| value.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// The engine's one lookup: the task's running session if any exists,
    /// otherwise the most recent session. Paused sessions carry a NULL
    /// `started_at`, so recency falls back to `ended_at` and then insertion
    /// order rather than ordering by `started_at` alone.
    pub fn find_running_or_latest(&self, task_id: &str) -> Result<Option<Session>, StorageError> {
        let session = self
            .tx
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM task_sessions
                     WHERE task_id = ?1
                     ORDER BY (status = 'running') DESC,
                              COALESCE(ended_at, started_at) DESC,
                              rowid DESC
                     LIMIT 1"
                ),
                params![task_id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn update_session(&self, session: &Session) -> Result<(), StorageError> {
        self.tx.execute(
            "UPDATE task_sessions
             SET status = ?2,
                 duration = ?3,
                 started_at = ?4,
                 ended_at = ?5
             WHERE id = ?1",
            params![
                session.id,
                session.status.as_str(),
                session.duration,
                session.started_at.map(|value| value.to_rfc3339()),
                session.ended_at.map(|value| value.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn count_sessions(&self, task_id: &str) -> Result<u32, StorageError> {
        let count: u32 = self.tx.query_row(
            "SELECT COUNT(*) FROM task_sessions WHERE task_id = ?1",
            params![task_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Completed work sessions for a user whose `ended_at` falls inside the
    /// window, oldest first. Feeds the focus summary.
    pub fn completed_work_sessions(
        &self,
        user_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<Session>, StorageError> {
        let mut statement = self.tx.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM task_sessions
             WHERE user_id = ?1
               AND type = 'work'
               AND status = 'completed'
               AND ended_at >= ?2
               AND ended_at <= ?3
             ORDER BY ended_at ASC"
        ))?;
        let sessions = statement
            .query_map(
                params![
                    user_id,
                    window_start.to_rfc3339(),
                    window_end.to_rfc3339()
                ],
                row_to_session,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        completed: row.get("completed")?,
        total_cycle: row.get("total_cycle")?,
        total_session: row.get("total_session")?,
        created_at: parse_datetime(row.get::<_, String>("created_at")?)?,
        updated_at: parse_datetime(row.get::<_, String>("updated_at")?)?,
    })
}

fn row_to_cycle(row: &Row<'_>) -> rusqlite::Result<Cycle> {
    let status: String = row.get("status")?;
    Ok(Cycle {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        task_id: row.get("task_id")?,
        status: CycleStatus::parse(&status).map_err(text_conversion_failure)?,
        completed_sessions: row.get("completed_sessions")?,
        started_at: parse_optional_datetime(row.get("started_at")?)?,
        ended_at: parse_optional_datetime(row.get("ended_at")?)?,
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let session_type: String = row.get("type")?;
    let status: String = row.get("status")?;
    Ok(Session {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        task_id: row.get("task_id")?,
        cycle_id: row.get("cycle_id")?,
        session_type: SessionType::parse(&session_type).map_err(text_conversion_failure)?,
        status: SessionStatus::parse(&status).map_err(text_conversion_failure)?,
        duration: row.get("duration")?,
        started_at: parse_optional_datetime(row.get("started_at")?)?,
        ended_at: parse_optional_datetime(row.get("ended_at")?)?,
    })
}

fn parse_datetime(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| text_conversion_failure(format!("invalid timestamp '{raw}': {error}")))
}

fn parse_optional_datetime(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(parse_datetime).transpose()
}

fn text_conversion_failure(message: impl Into<String>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, message.into().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDb {
        dir: PathBuf,
        repository: SqliteRepository,
    }

    impl TempDb {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "pomotrack-repo-tests-{}-{sequence}",
                std::process::id()
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let db_path = dir.join("pomotrack.sqlite");
            initialize_database(&db_path).expect("initialize database");
            Self {
                dir,
                repository: SqliteRepository::new(db_path),
            }
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            user_id: "usr-1".to_string(),
            title: "Write the parser".to_string(),
            description: None,
            completed: false,
            total_cycle: 0,
            total_session: 0,
            created_at: fixed_time("2026-03-02T08:00:00Z"),
            updated_at: fixed_time("2026-03-02T08:00:00Z"),
        }
    }

    fn sample_cycle(id: &str, task_id: &str) -> Cycle {
        Cycle {
            id: id.to_string(),
            user_id: "usr-1".to_string(),
            task_id: task_id.to_string(),
            status: CycleStatus::Active,
            completed_sessions: 0,
            started_at: Some(fixed_time("2026-03-02T08:00:00Z")),
            ended_at: None,
        }
    }

    fn sample_session(id: &str, task_id: &str, cycle_id: &str, status: SessionStatus) -> Session {
        Session {
            id: id.to_string(),
            user_id: "usr-1".to_string(),
            task_id: task_id.to_string(),
            cycle_id: Some(cycle_id.to_string()),
            session_type: SessionType::Work,
            status,
            duration: 0,
            started_at: match status {
                SessionStatus::Running => Some(fixed_time("2026-03-02T09:00:00Z")),
                _ => None,
            },
            ended_at: match status {
                SessionStatus::Running => None,
                _ => Some(fixed_time("2026-03-02T09:30:00Z")),
            },
        }
    }

    #[test]
    fn task_insert_find_roundtrip() {
        let db = TempDb::new();
        let task = sample_task("tsk-1");
        db.repository
            .transaction(|store| {
                store.insert_task(&task)?;
                Ok(())
            })
            .expect("insert task");

        let found = db
            .repository
            .read(|store| Ok(store.find_task("tsk-1")?))
            .expect("find task");
        assert_eq!(found, Some(task));
    }

    #[test]
    fn running_session_wins_over_more_recent_paused_one() {
        let db = TempDb::new();
        db.repository
            .transaction(|store| {
                store.insert_task(&sample_task("tsk-1"))?;
                store.insert_cycle(&sample_cycle("cyc-1", "tsk-1"))?;
                let mut paused = sample_session("ses-1", "tsk-1", "cyc-1", SessionStatus::Paused);
                paused.ended_at = Some(fixed_time("2026-03-02T11:00:00Z"));
                store.insert_session(&paused)?;
                store.insert_session(&sample_session(
                    "ses-2",
                    "tsk-1",
                    "cyc-1",
                    SessionStatus::Running,
                ))?;
                Ok(())
            })
            .expect("seed sessions");

        let latest = db
            .repository
            .read(|store| Ok(store.find_running_or_latest("tsk-1")?))
            .expect("query latest")
            .expect("session exists");
        assert_eq!(latest.id, "ses-2");
        assert_eq!(latest.status, SessionStatus::Running);
    }

    #[test]
    fn second_running_session_for_task_hits_unique_index() {
        let db = TempDb::new();
        let result = db.repository.transaction(|store| {
            store.insert_task(&sample_task("tsk-1"))?;
            store.insert_cycle(&sample_cycle("cyc-1", "tsk-1"))?;
            store.insert_session(&sample_session(
                "ses-1",
                "tsk-1",
                "cyc-1",
                SessionStatus::Running,
            ))?;
            store.insert_session(&sample_session(
                "ses-2",
                "tsk-1",
                "cyc-1",
                SessionStatus::Running,
            ))?;
            Ok(())
        });

        match result {
            Err(AppError::Storage(StorageError::DuplicateKey(_))) => {}
            other => panic!("expected duplicate key error, got {other:?}"),
        }
    }

    #[test]
    fn orphan_session_insert_hits_foreign_key() {
        let db = TempDb::new();
        let result = db.repository.transaction(|store| {
            store.insert_session(&sample_session(
                "ses-1",
                "tsk-missing",
                "cyc-missing",
                SessionStatus::Running,
            ))?;
            Ok(())
        });

        match result {
            Err(AppError::Storage(StorageError::ForeignKey(_))) => {}
            other => panic!("expected foreign key error, got {other:?}"),
        }
    }

    #[test]
    fn deleting_a_task_cascades_to_cycles_and_sessions() {
        let db = TempDb::new();
        db.repository
            .transaction(|store| {
                store.insert_task(&sample_task("tsk-1"))?;
                store.insert_cycle(&sample_cycle("cyc-1", "tsk-1"))?;
                store.insert_session(&sample_session(
                    "ses-1",
                    "tsk-1",
                    "cyc-1",
                    SessionStatus::Completed,
                ))?;
                Ok(())
            })
            .expect("seed rows");

        let deleted = db
            .repository
            .transaction(|store| Ok(store.delete_task("tsk-1")?))
            .expect("delete task");
        assert!(deleted);

        let (cycles, sessions) = db
            .repository
            .read(|store| Ok((store.count_cycles("tsk-1")?, store.count_sessions("tsk-1")?)))
            .expect("count leftovers");
        assert_eq!(cycles, 0);
        assert_eq!(sessions, 0);
    }

    #[test]
    fn completed_work_sessions_filters_by_window_and_type() {
        let db = TempDb::new();
        db.repository
            .transaction(|store| {
                store.insert_task(&sample_task("tsk-1"))?;
                store.insert_cycle(&sample_cycle("cyc-1", "tsk-1"))?;

                let mut inside = sample_session("ses-1", "tsk-1", "cyc-1", SessionStatus::Completed);
                inside.duration = 1500;
                inside.ended_at = Some(fixed_time("2026-03-02T10:00:00Z"));
                store.insert_session(&inside)?;

                let mut outside =
                    sample_session("ses-2", "tsk-1", "cyc-1", SessionStatus::Completed);
                outside.ended_at = Some(fixed_time("2026-03-09T10:00:00Z"));
                store.insert_session(&outside)?;

                let mut break_session =
                    sample_session("ses-3", "tsk-1", "cyc-1", SessionStatus::Completed);
                break_session.session_type = SessionType::ShortBreak;
                break_session.ended_at = Some(fixed_time("2026-03-02T10:30:00Z"));
                store.insert_session(&break_session)?;
                Ok(())
            })
            .expect("seed sessions");

        let sessions = db
            .repository
            .read(|store| {
                Ok(store.completed_work_sessions(
                    "usr-1",
                    fixed_time("2026-03-01T00:00:00Z"),
                    fixed_time("2026-03-03T00:00:00Z"),
                )?)
            })
            .expect("query summary window");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "ses-1");
        assert_eq!(sessions[0].duration, 1500);
    }
}
