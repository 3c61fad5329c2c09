pub mod cadence;
pub mod clock;
pub mod models;
