//! Terminal display utilities for CLI output.
//!
//! Provides styled tables and progress bars.

pub mod progress;
pub mod tables;

pub use progress::{create_progress_bar, create_spinner};
pub use tables::{TableBuilder, create_matches_table, create_stats_table};
