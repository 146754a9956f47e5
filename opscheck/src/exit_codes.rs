//! Stable exit codes for opscheck CLI commands.

/// Every critical check passed (warnings and non-critical failures allowed).
pub const OK: i32 = 0;
/// At least one check marked `critical` failed.
pub const CRITICAL_FAILED: i32 = 1;
/// The command could not run: invalid config, checklist, arguments or I/O error.
pub const INVALID: i32 = 2;
