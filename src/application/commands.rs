use crate::application::bootstrap::bootstrap_workspace;
use crate::application::cycle_tracker;
use crate::application::next_id;
use crate::application::timer_engine::{SessionSnapshot, TimerEngine};
use crate::domain::cadence;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::models::{Cycle, Session, SessionType, Task};
use crate::infrastructure::config::load_timer_config;
use crate::infrastructure::error::AppError;
use crate::infrastructure::repository::SqliteRepository;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    clock: Arc<dyn Clock>,
    repository: Arc<SqliteRepository>,
    engine: TimerEngine,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, AppError> {
        Self::with_clock(workspace_root, Arc::new(SystemClock))
    }

    pub fn with_clock(workspace_root: PathBuf, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let timer_config = load_timer_config(&config_dir)?;
        let repository = Arc::new(SqliteRepository::new(&bootstrap.database_path));
        let engine = TimerEngine::new(Arc::clone(&repository), Arc::clone(&clock), timer_config);

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            clock,
            repository,
            engine,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn engine(&self) -> &TimerEngine {
        &self.engine
    }

    pub fn command_error(&self, command: &str, error: &AppError) -> String {
        self.log_error(command, &detailed_message(error));
        error.public_message()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": self.clock.now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

/// Full error text for the log; storage errors include the driver cause
/// that the public message deliberately omits.
fn detailed_message(error: &AppError) -> String {
    match error {
        AppError::Storage(storage) => format!("{storage}: {}", storage.cause()),
        other => other.to_string(),
    }
}

/// The `{success, code, message, data}` envelope the UI/HTTP shell
/// serializes for every command.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Wraps a command result into the envelope, logging failures on the way.
pub fn respond<T: Serialize>(
    state: &AppState,
    command: &str,
    success_message: &str,
    result: Result<T, AppError>,
) -> CommandResponse<T> {
    match result {
        Ok(data) => CommandResponse {
            success: true,
            code: "OK".to_string(),
            message: success_message.to_string(),
            data: Some(data),
        },
        Err(error) => CommandResponse {
            success: false,
            code: error.code().to_string(),
            message: state.command_error(command, &error),
            data: None,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOverviewResponse {
    pub task: Task,
    pub cycle: Option<Cycle>,
    pub session: Option<SessionSnapshot>,
    /// Session type the UI should offer next. For a running or paused
    /// session this is the type already on the clock.
    pub next_session_type: SessionType,
    pub next_duration_seconds: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteSessionResponse {
    pub session: Session,
    pub task: Option<Task>,
    pub cycle: Option<Cycle>,
    pub cycle_rolled: bool,
    pub next_session_type: SessionType,
    pub next_duration_seconds: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyFocus {
    pub date: String,
    pub completed_sessions: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusSummaryResponse {
    pub start: String,
    pub end: String,
    pub completed_count: u32,
    pub total_focus_minutes: u64,
    pub daily: Vec<DailyFocus>,
}

pub fn create_task_impl(
    state: &AppState,
    user_id: String,
    title: String,
    description: Option<String>,
) -> Result<Task, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("user_id must not be empty"));
    }
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let now = state.clock.now();
    let task = Task {
        id: next_id("tsk"),
        user_id: user_id.to_string(),
        title: title.to_string(),
        description: description
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        completed: false,
        total_cycle: 0,
        total_session: 0,
        created_at: now,
        updated_at: now,
    };

    state.repository.transaction(|store| {
        store.insert_task(&task)?;
        cycle_tracker::ensure_active_cycle(store, &task, now)?;
        Ok(())
    })?;

    state.log_info("create_task", &format!("created task_id={}", task.id));
    Ok(task)
}

pub fn list_tasks_impl(state: &AppState, user_id: String) -> Result<Vec<Task>, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::validation("user_id must not be empty"));
    }
    state.repository.read(|store| Ok(store.list_tasks(user_id)?))
}

pub fn get_task_overview_impl(
    state: &AppState,
    task_id: String,
) -> Result<TaskOverviewResponse, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }

    let now = state.clock.now();
    let config = state.engine.config().clone();
    state.repository.read(|store| {
        let task = store
            .find_task(task_id)?
            .ok_or_else(|| AppError::not_found(format!("task {task_id}")))?;
        let cycle = store.find_active_cycle(task_id)?;
        let latest = store.find_running_or_latest(task_id)?;

        let next_session_type = suggested_next_type(latest.as_ref(), cycle.as_ref());
        let session = latest.map(|session| {
            let total_seconds = config.duration_seconds(session.session_type);
            let remaining_seconds = session.remaining_at(now, total_seconds);
            SessionSnapshot {
                session,
                total_seconds,
                remaining_seconds,
            }
        });

        Ok(TaskOverviewResponse {
            task,
            cycle,
            session,
            next_session_type,
            next_duration_seconds: config.duration_seconds(next_session_type),
        })
    })
}

pub fn update_task_impl(
    state: &AppState,
    task_id: String,
    title: Option<String>,
    description: Option<String>,
    completed: Option<bool>,
) -> Result<Task, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }

    let now = state.clock.now();
    let updated = state.repository.transaction(|store| {
        let mut task = store
            .find_task(task_id)?
            .ok_or_else(|| AppError::not_found(format!("task {task_id}")))?;

        if let Some(title) = &title {
            let title = title.trim();
            if title.is_empty() {
                return Err(AppError::validation("title must not be empty"));
            }
            task.title = title.to_string();
        }

        if let Some(description) = &description {
            let description = description.trim();
            task.description = if description.is_empty() {
                None
            } else {
                Some(description.to_string())
            };
        }

        if let Some(completed) = completed {
            task.completed = completed;
        }

        task.updated_at = now;
        store.update_task(&task)?;
        Ok(task)
    })?;

    state.log_info("update_task", &format!("updated task_id={task_id}"));
    Ok(updated)
}

pub fn delete_task_impl(state: &AppState, task_id: String) -> Result<bool, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }

    let removed = state
        .repository
        .transaction(|store| Ok(store.delete_task(task_id)?))?;
    if removed {
        state.log_info("delete_task", &format!("deleted task_id={task_id}"));
    }
    Ok(removed)
}

pub fn start_session_impl(
    state: &AppState,
    task_id: String,
    session_type: Option<String>,
) -> Result<SessionSnapshot, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }
    let session_type = match session_type.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => SessionType::parse(raw).map_err(AppError::Validation)?,
        None => SessionType::Work,
    };

    let snapshot = state.engine.start(task_id, session_type)?;
    state.log_info(
        "start_session",
        &format!(
            "started session_id={} task_id={task_id} type={}",
            snapshot.session.id,
            snapshot.session.session_type.as_str()
        ),
    );
    Ok(snapshot)
}

pub fn pause_session_impl(state: &AppState, task_id: String) -> Result<SessionSnapshot, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }

    let snapshot = state.engine.pause(task_id)?;
    state.log_info(
        "pause_session",
        &format!(
            "paused session_id={} task_id={task_id} banked={}s",
            snapshot.session.id, snapshot.session.duration
        ),
    );
    Ok(snapshot)
}

pub fn complete_session_impl(
    state: &AppState,
    task_id: String,
) -> Result<CompleteSessionResponse, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }

    let outcome = state.engine.complete(task_id)?;
    state.log_info(
        "complete_session",
        &format!(
            "completed session_id={} task_id={task_id} duration={}s rolled={}",
            outcome.session.id,
            outcome.session.duration,
            outcome
                .advance
                .as_ref()
                .map(|advance| advance.rolled_over)
                .unwrap_or(false)
        ),
    );

    let next_duration_seconds = state
        .engine
        .config()
        .duration_seconds(outcome.next_session_type);
    let cycle_rolled = outcome
        .advance
        .as_ref()
        .map(|advance| advance.rolled_over)
        .unwrap_or(false);
    let (task, cycle) = match outcome.advance {
        Some(advance) => (
            Some(advance.task),
            advance.next_cycle.or(Some(advance.cycle)),
        ),
        None => (None, None),
    };

    Ok(CompleteSessionResponse {
        session: outcome.session,
        task,
        cycle,
        cycle_rolled,
        next_session_type: outcome.next_session_type,
        next_duration_seconds,
    })
}

pub fn cancel_session_impl(state: &AppState, task_id: String) -> Result<SessionSnapshot, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }

    let snapshot = state.engine.cancel(task_id)?;
    state.log_info(
        "cancel_session",
        &format!(
            "cancelled session_id={} task_id={task_id}",
            snapshot.session.id
        ),
    );
    Ok(snapshot)
}

pub fn get_timer_state_impl(
    state: &AppState,
    task_id: String,
) -> Result<Option<SessionSnapshot>, AppError> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(AppError::validation("task_id must not be empty"));
    }
    state.engine.snapshot(task_id)
}

pub fn get_focus_summary_impl(
    state: &AppState,
    user_id: String,
    start: Option<String>,
    end: Option<String>,
) -> Result<FocusSummaryResponse, AppError> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::validation("user_id must not be empty"));
    }

    let now = state.clock.now();
    let start = match start {
        Some(raw) => parse_rfc3339_input(&raw, "start")?,
        None => now - Duration::days(7),
    };
    let end = match end {
        Some(raw) => parse_rfc3339_input(&raw, "end")?,
        None => now,
    };
    if end <= start {
        return Err(AppError::validation("end must be greater than start"));
    }

    let sessions = state
        .repository
        .read(|store| Ok(store.completed_work_sessions(&user_id, start, end)?))?;

    let completed_count = sessions.len() as u32;
    let total_focus_minutes = sessions
        .iter()
        .map(|session| u64::from(session.duration) / 60)
        .sum();

    let mut daily: Vec<DailyFocus> = Vec::new();
    for session in &sessions {
        let Some(ended_at) = session.ended_at else {
            continue;
        };
        let date = ended_at.date_naive().to_string();
        match daily.last_mut() {
            Some(bucket) if bucket.date == date => bucket.completed_sessions += 1,
            _ => daily.push(DailyFocus {
                date,
                completed_sessions: 1,
            }),
        }
    }

    Ok(FocusSummaryResponse {
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
        completed_count,
        total_focus_minutes,
        daily,
    })
}

/// Next timer to offer, from persisted state alone: after a rollover the
/// fresh active cycle has zero completed sessions, which is what earns the
/// long break.
fn suggested_next_type(latest: Option<&Session>, cycle: Option<&Cycle>) -> SessionType {
    use crate::domain::models::SessionStatus;

    let Some(session) = latest else {
        return SessionType::Work;
    };
    match session.status {
        SessionStatus::Running | SessionStatus::Paused => session.session_type,
        SessionStatus::Cancelled => SessionType::Work,
        SessionStatus::Completed => {
            let rolled = cycle
                .map(|cycle| cycle.completed_sessions == 0)
                .unwrap_or(false);
            cadence::next_session_type(session.session_type, rolled)
        }
    }
}

fn parse_rfc3339_input(value: &str, field_name: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| AppError::validation(format!("{field_name} must be RFC 3339: {error}")))
}
