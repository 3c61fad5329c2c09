use crate::application::next_id;
use crate::domain::models::{Cycle, CycleStatus, Task};
use crate::infrastructure::error::AppError;
use crate::infrastructure::repository::StoreTx;
use chrono::{DateTime, Utc};

/// Outcome of advancing the cycle counters after a completed work session.
#[derive(Debug, Clone)]
pub struct CycleAdvance {
    /// Task with `total_session` (and possibly `total_cycle`) incremented.
    pub task: Task,
    /// The cycle the session counted toward. Frozen with its pre-completion
    /// `completed_sessions` when the cycle rolled over.
    pub cycle: Cycle,
    /// Fresh active cycle, present only when the cycle rolled over.
    pub next_cycle: Option<Cycle>,
    pub rolled_over: bool,
}

/// Applies the sessions-per-cycle rule inside the caller's transaction:
/// always bumps `total_session`; on the final session of a cycle, freezes
/// the cycle, bumps `total_cycle`, and opens a new active cycle.
///
/// A task with no active cycle is an invalid steady-state (hand-repaired
/// data); the tracker self-heals by creating one rather than failing.
pub fn advance_on_work_completion(
    store: &StoreTx<'_>,
    now: DateTime<Utc>,
    task_id: &str,
    sessions_per_cycle: u32,
) -> Result<CycleAdvance, AppError> {
    let mut task = store
        .find_task(task_id)?
        .ok_or_else(|| AppError::not_found(format!("task {task_id}")))?;

    let mut cycle = ensure_active_cycle(store, &task, now)?;

    task.total_session = task.total_session.saturating_add(1);
    let rolled_over = cycle.completed_sessions.saturating_add(1) >= sessions_per_cycle;

    let next_cycle = if rolled_over {
        cycle.status = CycleStatus::Completed;
        cycle.ended_at = Some(now);
        store.update_cycle(&cycle)?;

        task.total_cycle = task.total_cycle.saturating_add(1);
        let fresh = new_active_cycle(&task, now);
        store.insert_cycle(&fresh)?;
        Some(fresh)
    } else {
        cycle.completed_sessions += 1;
        store.update_cycle(&cycle)?;
        None
    };

    task.updated_at = now;
    store.update_task(&task)?;

    Ok(CycleAdvance {
        task,
        cycle,
        next_cycle,
        rolled_over,
    })
}

/// The task's active cycle, created on the spot when missing.
pub fn ensure_active_cycle(
    store: &StoreTx<'_>,
    task: &Task,
    now: DateTime<Utc>,
) -> Result<Cycle, AppError> {
    match store.find_active_cycle(&task.id)? {
        Some(cycle) => Ok(cycle),
        None => {
            let cycle = new_active_cycle(task, now);
            store.insert_cycle(&cycle)?;
            Ok(cycle)
        }
    }
}

fn new_active_cycle(task: &Task, now: DateTime<Utc>) -> Cycle {
    Cycle {
        id: next_id("cyc"),
        user_id: task.user_id.clone(),
        task_id: task.id.clone(),
        status: CycleStatus::Active,
        completed_sessions: 0,
        started_at: Some(now),
        ended_at: None,
    }
}
