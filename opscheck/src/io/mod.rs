//! I/O adapters for opscheck commands.

pub mod checklist;
pub mod config;
pub mod db;
pub mod flag_service;
pub mod http;
pub mod process;
pub mod report;
pub mod results;
