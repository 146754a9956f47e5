//! Human-readable terminal report.

use std::io::Write;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::core::record::{CheckStatus, ResultRecord};
use crate::core::tally::{RateRounding, Tally};

/// Write the report: a header, exactly one line per record, then the summary.
pub fn write_report<W: Write>(
    out: &mut W,
    title: &str,
    records: &[ResultRecord],
    rounding: RateRounding,
) -> Result<()> {
    writeln!(out, "{}", title.bold()).context("write report header")?;
    writeln!(out).context("write report header")?;

    for record in records {
        writeln!(out, "{}", record_line(record)).context("write report line")?;
    }

    let tally = Tally::from_records(records);
    writeln!(out).context("write report summary")?;
    writeln!(out, "{}", summary_line(&tally, rounding)).context("write report summary")?;
    if tally.critical_failed > 0 {
        writeln!(
            out,
            "{}",
            format!("{} critical check(s) failed", tally.critical_failed)
                .red()
                .bold()
        )
        .context("write report summary")?;
    }
    Ok(())
}

pub fn print_report(title: &str, records: &[ResultRecord], rounding: RateRounding) -> Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    write_report(&mut lock, title, records, rounding)
}

fn record_line(record: &ResultRecord) -> String {
    let glyph = match record.status {
        CheckStatus::Pass => "✓".green(),
        CheckStatus::Warn => "⚠".yellow(),
        CheckStatus::Fail if record.critical => "✗".red(),
        CheckStatus::Fail => "✗".magenta(),
    };
    let mut line = format!(
        "  {} {} {}",
        glyph,
        one_line(&record.name).bold(),
        format!("({}ms)", record.duration_ms).dimmed()
    );
    if !record.critical && record.status == CheckStatus::Fail {
        line.push_str(&format!(" {}", "[non-critical]".dimmed()));
    }
    if let Some(detail) = &record.detail {
        line.push_str(&format!(": {}", one_line(detail)));
    }
    line
}

/// Collapse whitespace runs, newlines included, so a record stays on one line.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn summary_line(tally: &Tally, rounding: RateRounding) -> String {
    let rate = tally.success_rate(rounding);
    let headline = format!("{}/{} passed ({}%)", tally.passed, tally.total, rate);
    let headline = if tally.failed == 0 {
        headline.green().bold()
    } else {
        headline.yellow().bold()
    };
    format!(
        "{} {} warned, {} failed",
        headline, tally.warned, tally.failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(records: &[ResultRecord]) -> String {
        let mut buf = Vec::new();
        write_report(&mut buf, "Phase 3", records, RateRounding::Floor).expect("write");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn one_line_per_record() {
        let records = vec![
            ResultRecord::pass("a"),
            ResultRecord::warn("b").with_detail("line one\nline two"),
            ResultRecord::fail("c").critical(false),
        ];
        let text = render(&records);
        let record_lines = text.lines().filter(|line| line.starts_with("  ")).count();
        assert_eq!(record_lines, records.len());
        assert!(text.contains("line one line two"));
    }

    #[test]
    fn multi_line_names_stay_on_one_line() {
        let records = vec![ResultRecord::pass("a\nb"), ResultRecord::fail("c\r\nd")];
        let text = render(&records);
        assert_eq!(text.lines().count(), 2 + records.len() + 3);
        assert!(text.contains("a b"));
        assert!(text.contains("c d"));
    }

    #[test]
    fn summary_uses_rounding_rule() {
        let records = vec![
            ResultRecord::pass("a"),
            ResultRecord::pass("b"),
            ResultRecord::fail("c").critical(false),
        ];
        let text = render(&records);
        assert!(text.contains("2/3 passed (66%)"));
        assert!(!text.contains("critical check(s) failed"));
    }

    #[test]
    fn critical_failures_are_called_out() {
        let text = render(&[ResultRecord::fail("db")]);
        assert!(text.contains("1 critical check(s) failed"));
    }
}
