use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Work,
    ShortBreak,
    LongBreak,
}

impl SessionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::ShortBreak => "short_break",
            Self::LongBreak => "long_break",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "work" => Ok(Self::Work),
            "short_break" => Ok(Self::ShortBreak),
            "long_break" => Ok(Self::LongBreak),
            other => Err(format!("unknown session type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Active,
    Completed,
    Abandoned,
}

impl CycleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown cycle status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub total_cycle: u32,
    pub total_session: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.user_id, "task.user_id")?;
        validate_non_empty(&self.title, "task.title")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cycle {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub status: CycleStatus,
    pub completed_sessions: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Cycle {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "cycle.id")?;
        validate_non_empty(&self.user_id, "cycle.user_id")?;
        validate_non_empty(&self.task_id, "cycle.task_id")?;
        if let (Some(started_at), Some(ended_at)) = (self.started_at, self.ended_at) {
            if ended_at < started_at {
                return Err("cycle.ended_at must be >= cycle.started_at".to_string());
            }
        }
        Ok(())
    }
}

/// One timed interval. `duration` holds whole seconds already banked before
/// the current running interval; `started_at` is set only while running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub cycle_id: Option<String>,
    #[serde(rename = "type")]
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub duration: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        validate_non_empty(&self.user_id, "session.user_id")?;
        validate_non_empty(&self.task_id, "session.task_id")?;
        match (self.status, self.started_at) {
            (SessionStatus::Running, None) => {
                Err("session.started_at is required while running".to_string())
            }
            (SessionStatus::Running, Some(_)) => Ok(()),
            (_, Some(_)) => {
                Err("session.started_at must be null unless running".to_string())
            }
            (_, None) => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Whole seconds of the current running interval at `now`. Zero when
    /// not running, and clamped to zero if `now` sits before `started_at`
    /// (client clock drift must never produce negative elapsed time).
    pub fn live_elapsed_at(&self, now: DateTime<Utc>) -> u32 {
        let Some(started_at) = self.started_at else {
            return 0;
        };
        if !self.is_running() {
            return 0;
        }
        let millis = (now - started_at).num_milliseconds().max(0);
        u32::try_from(millis / 1000).unwrap_or(u32::MAX)
    }

    /// Banked duration plus the live running interval, floored to seconds.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u32 {
        self.duration.saturating_add(self.live_elapsed_at(now))
    }

    /// Remaining seconds against `total_duration`. Never negative, no side
    /// effects; safe for a 1 Hz display poll.
    pub fn remaining_at(&self, now: DateTime<Utc>, total_duration: u32) -> u32 {
        total_duration.saturating_sub(self.elapsed_at(now))
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
