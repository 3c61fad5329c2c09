use crate::application::cycle_tracker::{self, CycleAdvance};
use crate::application::next_id;
use crate::domain::cadence;
use crate::domain::clock::Clock;
use crate::domain::models::{Session, SessionStatus, SessionType};
use crate::infrastructure::config::TimerConfig;
use crate::infrastructure::error::AppError;
use crate::infrastructure::repository::SqliteRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Single source of truth for elapsed time and for the session transitions.
///
/// Every transition re-reads the task's current session inside one
/// immediate transaction before mutating, so racing calls serialize and
/// the loser fails on the committed post-state; nothing here trusts a
/// client-held countdown.
pub struct TimerEngine {
    repository: Arc<SqliteRepository>,
    clock: Arc<dyn Clock>,
    config: TimerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub session: Session,
    /// Cycle advancement; `None` when a break session completed.
    pub advance: Option<CycleAdvance>,
    pub next_session_type: SessionType,
}

impl TimerEngine {
    pub fn new(
        repository: Arc<SqliteRepository>,
        clock: Arc<dyn Clock>,
        config: TimerConfig,
    ) -> Self {
        Self {
            repository,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// Starts a session for the task: resumes the paused one if present
    /// (banked duration untouched), otherwise creates a fresh session on
    /// the task's active cycle. `session_type` applies to fresh sessions
    /// only; a paused session resumes as its own type.
    pub fn start(
        &self,
        task_id: &str,
        session_type: SessionType,
    ) -> Result<SessionSnapshot, AppError> {
        let now = self.clock.now();
        self.repository.transaction(|store| {
            let task = store
                .find_task(task_id)?
                .ok_or_else(|| AppError::not_found(format!("task {task_id}")))?;

            match store.find_running_or_latest(task_id)? {
                Some(session) if session.is_running() => Err(AppError::Conflict(format!(
                    "a session is already running for task {task_id}; pause or complete it first"
                ))),
                Some(mut session) if session.status == SessionStatus::Paused => {
                    session.status = SessionStatus::Running;
                    session.started_at = Some(now);
                    session.ended_at = None;
                    store.update_session(&session)?;
                    Ok(self.snapshot_of(session, now))
                }
                _ => {
                    let cycle = cycle_tracker::ensure_active_cycle(store, &task, now)?;
                    let session = Session {
                        id: next_id("ses"),
                        user_id: task.user_id.clone(),
                        task_id: task.id.clone(),
                        cycle_id: Some(cycle.id),
                        session_type,
                        status: SessionStatus::Running,
                        duration: 0,
                        started_at: Some(now),
                        ended_at: None,
                    };
                    store.insert_session(&session)?;
                    Ok(self.snapshot_of(session, now))
                }
            }
        })
    }

    /// Banks the elapsed whole seconds of the running interval and parks
    /// the session. Pausing a session that is not running fails; a second
    /// pause in quick succession is an error, not a no-op.
    pub fn pause(&self, task_id: &str) -> Result<SessionSnapshot, AppError> {
        let now = self.clock.now();
        self.repository.transaction(|store| {
            let mut session = store
                .find_running_or_latest(task_id)?
                .ok_or_else(|| AppError::not_found(format!("no session for task {task_id}")))?;

            match session.status {
                SessionStatus::Running => {
                    let banked = session.live_elapsed_at(now);
                    session.duration = session.duration.saturating_add(banked);
                    session.status = SessionStatus::Paused;
                    session.started_at = None;
                    session.ended_at = Some(now);
                    store.update_session(&session)?;
                    Ok(self.snapshot_of(session, now))
                }
                SessionStatus::Paused => Err(AppError::InvalidState(
                    "session is already paused".to_string(),
                )),
                status => Err(AppError::InvalidState(format!(
                    "cannot pause a {} session",
                    status.as_str()
                ))),
            }
        })
    }

    /// Completes the running session, banking its elapsed time, and for
    /// work sessions advances the cycle counters in the same transaction —
    /// a crash can never leave a completed session next to a stale cycle.
    /// A paused session must be resumed before it can complete.
    pub fn complete(&self, task_id: &str) -> Result<CompletionOutcome, AppError> {
        let now = self.clock.now();
        self.repository.transaction(|store| {
            let mut session = store
                .find_running_or_latest(task_id)?
                .ok_or_else(|| AppError::not_found(format!("no session for task {task_id}")))?;

            match session.status {
                SessionStatus::Running => {
                    let banked = session.live_elapsed_at(now);
                    session.duration = session.duration.saturating_add(banked);
                    session.status = SessionStatus::Completed;
                    session.started_at = None;
                    session.ended_at = Some(now);
                    store.update_session(&session)?;

                    let advance = match session.session_type {
                        SessionType::Work => Some(cycle_tracker::advance_on_work_completion(
                            store,
                            now,
                            task_id,
                            self.config.sessions_per_cycle,
                        )?),
                        _ => None,
                    };
                    let rolled_over = advance
                        .as_ref()
                        .map(|advance| advance.rolled_over)
                        .unwrap_or(false);
                    let next_session_type =
                        cadence::next_session_type(session.session_type, rolled_over);

                    Ok(CompletionOutcome {
                        session,
                        advance,
                        next_session_type,
                    })
                }
                SessionStatus::Paused => Err(AppError::InvalidState(
                    "session is paused; resume it before completing".to_string(),
                )),
                status => Err(AppError::InvalidState(format!(
                    "cannot complete a {} session",
                    status.as_str()
                ))),
            }
        })
    }

    /// Abandons the current session without touching cycle counters.
    /// Elapsed time of a running interval is still banked so history
    /// reflects the time actually spent.
    pub fn cancel(&self, task_id: &str) -> Result<SessionSnapshot, AppError> {
        let now = self.clock.now();
        self.repository.transaction(|store| {
            let mut session = store
                .find_running_or_latest(task_id)?
                .ok_or_else(|| AppError::not_found(format!("no session for task {task_id}")))?;

            match session.status {
                SessionStatus::Running | SessionStatus::Paused => {
                    let banked = session.live_elapsed_at(now);
                    session.duration = session.duration.saturating_add(banked);
                    session.status = SessionStatus::Cancelled;
                    session.started_at = None;
                    session.ended_at = Some(now);
                    store.update_session(&session)?;
                    Ok(self.snapshot_of(session, now))
                }
                status => Err(AppError::InvalidState(format!(
                    "cannot cancel a {} session",
                    status.as_str()
                ))),
            }
        })
    }

    /// Pure query for the remaining seconds of `session` against
    /// `total_duration`. Never negative, no mutation; the 1 Hz UI poll
    /// calls this (or [`TimerEngine::snapshot`]) freely.
    pub fn remaining(&self, session: &Session, total_duration: u32) -> u32 {
        session.remaining_at(self.clock.now(), total_duration)
    }

    /// Read-only projection of the task's latest session with its live
    /// remaining time; `None` when the task has never run a session.
    pub fn snapshot(&self, task_id: &str) -> Result<Option<SessionSnapshot>, AppError> {
        let now = self.clock.now();
        let session = self
            .repository
            .read(|store| Ok(store.find_running_or_latest(task_id)?))?;
        Ok(session.map(|session| self.snapshot_of(session, now)))
    }

    fn snapshot_of(&self, session: Session, now: DateTime<Utc>) -> SessionSnapshot {
        let total_seconds = self.config.duration_seconds(session.session_type);
        let remaining_seconds = session.remaining_at(now, total_seconds);
        SessionSnapshot {
            session,
            total_seconds,
            remaining_seconds,
        }
    }
}
