//! Result records produced by checks.
//!
//! A record exists for the lifetime of one command run. Records are appended
//! in check order and consumed once by the report.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tri-state outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Outcome of one executed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
    /// A failed critical record makes the whole run fail.
    pub critical: bool,
}

impl ResultRecord {
    pub fn new(name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            name: name.into(),
            status,
            detail: None,
            duration_ms: 0,
            critical: true,
        }
    }

    pub fn pass(name: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass)
    }

    pub fn warn(name: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn)
    }

    pub fn fail(name: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.detail = if detail.is_empty() { None } else { Some(detail) };
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn is_critical_failure(&self) -> bool {
        self.critical && self.status == CheckStatus::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_default_to_critical() {
        let record = ResultRecord::fail("db reachable");
        assert!(record.critical);
        assert!(record.is_critical_failure());
    }

    #[test]
    fn non_critical_failure_is_not_critical_failure() {
        let record = ResultRecord::fail("optional").critical(false);
        assert!(!record.is_critical_failure());
    }

    #[test]
    fn empty_detail_is_dropped() {
        let record = ResultRecord::pass("x").with_detail("");
        assert_eq!(record.detail, None);
    }

    #[test]
    fn serializes_status_lowercase_with_duration_ms() {
        let record = ResultRecord::warn("slow")
            .with_duration(Duration::from_millis(1500))
            .with_detail("took a while");
        let json = serde_json::to_value(&record).expect("json");
        assert_eq!(json["status"], "warn");
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["detail"], "took a while");
    }
}
