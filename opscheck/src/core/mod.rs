//! Deterministic, pure logic shared by every opscheck command.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod flags;
pub mod matcher;
pub mod naming;
pub mod record;
pub mod tally;
