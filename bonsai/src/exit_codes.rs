//! Stable exit codes for bonsai CLI commands.

/// Checks passed, or the command had nothing to gate.
pub const OK: i32 = 0;
/// A report should fail, the gate loop gave up, or the command errored.
pub const FAILED: i32 = 1;
