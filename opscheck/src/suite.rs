//! Sequential test-suite phases for `opscheck suite`.

use std::path::Path;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::core::record::ResultRecord;
use crate::io::config::SuitePhase;
use crate::io::process::{CommandLimits, run_command};

/// Phases selected for a run: all of them, or only `quick` ones.
pub fn select_phases(phases: &[SuitePhase], quick: bool) -> Vec<&SuitePhase> {
    phases.iter().filter(|phase| !quick || phase.quick).collect()
}

/// Run `phases` in order, stopping after the first failure.
///
/// Phases after a failure never start and get no record.
#[instrument(skip_all, fields(phases = phases.len()))]
pub fn run_suite(phases: &[&SuitePhase], root: &Path, limits: CommandLimits) -> Vec<ResultRecord> {
    let mut records = Vec::with_capacity(phases.len());
    for phase in phases {
        info!(phase = %phase.name, "phase started");
        let started = Instant::now();
        let record = run_phase(phase, root, limits).with_duration(started.elapsed());
        let failed = record.is_critical_failure();
        records.push(record);
        if failed {
            let skipped = phases.len() - records.len();
            warn!(phase = %phase.name, skipped, "phase failed, stopping suite");
            break;
        }
    }
    records
}

fn run_phase(phase: &SuitePhase, root: &Path, limits: CommandLimits) -> ResultRecord {
    let output = match run_command(&phase.command, root, limits) {
        Ok(output) => output,
        Err(err) => return ResultRecord::fail(&phase.name).with_detail(format!("{err:#}")),
    };
    if output.timed_out {
        return ResultRecord::fail(&phase.name)
            .with_detail(format!("timed out after {}s", limits.timeout.as_secs()));
    }
    match output.exit_code() {
        Some(0) => ResultRecord::pass(&phase.name).with_detail(output.tail_line().unwrap_or_default()),
        code => {
            let code = code.map_or_else(|| "signal".to_string(), |code| code.to_string());
            let tail = output.tail_line().unwrap_or_default();
            ResultRecord::fail(&phase.name)
                .with_detail(format!("exit {code} {tail}").trim_end().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::CheckStatus;

    fn phase(name: &str, script: &str, quick: bool) -> SuitePhase {
        SuitePhase {
            name: name.to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            quick,
        }
    }

    #[test]
    fn stops_at_first_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let phases = vec![
            phase("unit", "echo '12 passed'", false),
            phase("integration", "echo '1 failed' >&2; exit 1", false),
            phase("e2e", "echo never", false),
        ];
        let selected = select_phases(&phases, false);
        let records = run_suite(&selected, temp.path(), CommandLimits::default());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, CheckStatus::Pass);
        assert_eq!(records[0].detail.as_deref(), Some("12 passed"));
        assert_eq!(records[1].status, CheckStatus::Fail);
        assert_eq!(records[1].detail.as_deref(), Some("exit 1 1 failed"));
    }

    #[test]
    fn quick_selects_quick_phases() {
        let phases = vec![
            phase("unit with coverage", "true", false),
            phase("quick unit", "true", true),
        ];
        let selected = select_phases(&phases, true);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "quick unit");
        assert_eq!(select_phases(&phases, false).len(), 2);
    }

    #[test]
    fn missing_program_fails_phase() {
        let temp = tempfile::tempdir().expect("tempdir");
        let phases = vec![SuitePhase {
            name: "missing".to_string(),
            command: vec!["definitely-not-a-real-program-opscheck".to_string()],
            quick: false,
        }];
        let selected = select_phases(&phases, false);
        let records = run_suite(&selected, temp.path(), CommandLimits::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, CheckStatus::Fail);
    }
}
