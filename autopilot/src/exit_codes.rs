//! Stable exit codes for autopilot CLI commands.

/// Command succeeded, or the run stopped normally.
pub const OK: i32 = 0;
/// Invalid config, workflow or environment, or the run failed.
pub const INVALID: i32 = 1;
/// The run stopped because it reached `max_iterations`.
pub const LIMIT: i32 = 2;
/// Another run is already active.
pub const BUSY: i32 = 3;
