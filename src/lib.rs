//! PomoTrack session engine: the authoritative server-side state machine
//! for Pomodoro tasks, cycles, and timed sessions. The UI/HTTP shell wraps
//! the `*_impl` command functions and renders its own 1 Hz countdown from
//! the snapshots these commands return; persisted state always wins.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{
    cancel_session_impl, complete_session_impl, create_task_impl, delete_task_impl,
    get_focus_summary_impl, get_task_overview_impl, get_timer_state_impl, list_tasks_impl,
    pause_session_impl, respond, start_session_impl, update_task_impl, AppState, CommandResponse,
    CompleteSessionResponse, FocusSummaryResponse, TaskOverviewResponse,
};
pub use application::cycle_tracker::CycleAdvance;
pub use application::timer_engine::{SessionSnapshot, TimerEngine};
pub use domain::clock::{Clock, ManualClock, SystemClock};
pub use domain::models::{Cycle, CycleStatus, Session, SessionStatus, SessionType, Task};
pub use infrastructure::config::TimerConfig;
pub use infrastructure::error::{AppError, StorageError};
pub use infrastructure::repository::SqliteRepository;
