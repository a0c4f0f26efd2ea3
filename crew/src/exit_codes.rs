//! Stable exit codes for crew CLI commands.

/// Command succeeded (a run may still have artifacts below the quality gate).
pub const OK: i32 = 0;
/// The workflow or another runtime operation failed.
pub const FAILED: i32 = 1;
/// Configuration was unreadable, invalid, or missing required credentials.
pub const CONFIG: i32 = 2;
