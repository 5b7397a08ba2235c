//! Task executor module
//!
//! Handles the task execution lifecycle:
//! - Decoding task envelopes and dispatching them by type
//! - Tracking execution state
//! - Summarizing results as reports

mod runner;
mod state;

pub use runner::*;
pub use state::*;
