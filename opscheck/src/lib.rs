//! Operational verification toolkit for the RUR2 compliance platform.
//!
//! Every command follows the same shape: enumerate a fixed list of checks,
//! run each one, collect a [`core::record::ResultRecord`] per check, print a
//! report and derive the process exit code from the aggregate.
//!
//! - **[`core`]**: Pure, deterministic logic (records, tallies, matching,
//!   naming conventions, flag resolution). No I/O.
//! - **[`io`]**: Side-effecting adapters (processes, HTTP, database,
//!   filesystem, config, report output).
//!
//! Orchestration modules ([`verify`], [`flags`], [`users`], [`lint`],
//! [`storage`], [`suite`]) coordinate core logic with I/O to implement CLI
//! commands.

pub mod core;
pub mod exit_codes;
pub mod flags;
pub mod io;
pub mod lint;
pub mod logging;
pub mod storage;
pub mod suite;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod users;
pub mod verify;
