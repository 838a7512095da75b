//! Stable exit codes for fixloop CLI commands.

/// Loop reached success, the artifact was accepted, or the command completed.
pub const OK: i32 = 0;
/// Loop stopped without success, or a candidate was rejected.
pub const FAILED: i32 = 1;
/// Invalid input, configuration, or an infrastructure failure.
pub const INVALID: i32 = 2;
/// Run was cancelled by the operator (Ctrl-C).
pub const INTERRUPTED: i32 = 130;
