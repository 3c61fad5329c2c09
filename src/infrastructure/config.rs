use crate::domain::models::SessionType;
use crate::infrastructure::error::AppError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const TIMER_JSON: &str = "timer.json";
const SUPPORTED_SCHEMA: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub schema: u8,
    pub focus_seconds: u32,
    pub short_break_seconds: u32,
    pub long_break_seconds: u32,
    pub sessions_per_cycle: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            schema: SUPPORTED_SCHEMA,
            focus_seconds: 25 * 60,
            short_break_seconds: 5 * 60,
            long_break_seconds: 30 * 60,
            sessions_per_cycle: 4,
        }
    }
}

impl TimerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.schema != SUPPORTED_SCHEMA {
            return Err(format!("unsupported schema {} in {TIMER_JSON}", self.schema));
        }
        if self.focus_seconds == 0 {
            return Err("timer.focusSeconds must be > 0".to_string());
        }
        if self.short_break_seconds == 0 {
            return Err("timer.shortBreakSeconds must be > 0".to_string());
        }
        if self.long_break_seconds == 0 {
            return Err("timer.longBreakSeconds must be > 0".to_string());
        }
        if self.sessions_per_cycle == 0 {
            return Err("timer.sessionsPerCycle must be > 0".to_string());
        }
        Ok(())
    }

    pub fn duration_seconds(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::Work => self.focus_seconds,
            SessionType::ShortBreak => self.short_break_seconds,
            SessionType::LongBreak => self.long_break_seconds,
        }
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), AppError> {
    let path = config_dir.join(TIMER_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&TimerConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_timer_config(config_dir: &Path) -> Result<TimerConfig, AppError> {
    let path = config_dir.join(TIMER_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: TimerConfig = serde_json::from_str(&raw)?;
    parsed
        .validate()
        .map_err(|message| AppError::validation(format!("{}: {message}", path.display())))?;
    Ok(parsed)
}
