//! Break-session sequencing. This is presentation-level guidance for the
//! next timer the UI should offer; only the persisted session rows are
//! authoritative for accounting.

use crate::domain::models::SessionType;

/// Session type to offer after `completed` finishes. A work session is
/// followed by a short break, or a long break when its cycle just rolled
/// over; any break is followed by work.
pub fn next_session_type(completed: SessionType, cycle_rolled: bool) -> SessionType {
    match completed {
        SessionType::Work if cycle_rolled => SessionType::LongBreak,
        SessionType::Work => SessionType::ShortBreak,
        SessionType::ShortBreak | SessionType::LongBreak => SessionType::Work,
    }
}

/// `MM:SS` countdown text for the UI.
pub fn format_clock(total_seconds: u32) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}
