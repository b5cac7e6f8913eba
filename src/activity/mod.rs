//! Activity statistics for the gesture agent.
//!
//! Counts what the agent has seen and done so the user can inspect it
//! with the `status` command.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, ActivityLog, ActivityStats,
    SharedActivityLog,
};
