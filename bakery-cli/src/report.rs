//! Plain-text rendering of ledger results for the terminal.

use std::fmt::Write as _;

use bakery_ledger::{
    BreakKind, CascadeError, CascadeReport, CascadeRequest, ChainReport, SalesmanDay, SeedSource,
};

pub fn cascade_line(report: &CascadeReport) -> String {
    let seed = match report.seed_source {
        SeedSource::AnchorRecord => "anchor record".to_string(),
        SeedSource::EarlierRecord(date) => format!("record of {date}"),
        SeedSource::Empty => "no earlier record".to_string(),
    };
    let closing = report
        .closing_due
        .map(|due| due.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "cascade {}@{}: seed {} from {}, {} records rewritten ({} changed), closing due {}",
        report.salesman, report.anchor, report.seed, seed, report.updated, report.changed, closing
    )
}

pub fn cascade_failure_line(request: &CascadeRequest, err: &CascadeError) -> String {
    let mut line = format!("cascade {request} FAILED: {err}");
    if err.is_partial() {
        let _ = write!(
            line,
            " ({} records already rewritten; re-run `bakery recalc --salesman {} --date {}`)",
            err.records_updated(),
            request.salesman,
            request.anchor
        );
    }
    line
}

/// One row per salesman. `*` marks a prevDue filled from an earlier record,
/// `-` a salesman with no record on the day.
pub fn summary_table(days: &[SalesmanDay]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:<16} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "SALESMAN", "NAME", "PREV DUE", "SALES", "TOTAL DUE", "DEPOSIT", "CURR DUE"
    );
    for day in days {
        let marker = if !day.has_record {
            "-"
        } else if day.repaired {
            "*"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "{:<12} {:<16} {:>10} {:>10} {:>10} {:>10} {:>10}{}",
            day.salesman_id.as_str(),
            day.name.as_deref().unwrap_or(""),
            day.balances.prev_due.to_string(),
            day.balances.total_amount.to_string(),
            day.balances.total_due.to_string(),
            day.deposit.to_string(),
            day.balances.curr_due.to_string(),
            marker
        );
    }
    out
}

pub fn chain_report(report: &ChainReport) -> String {
    let mut out = String::new();
    if report.is_clean() {
        let _ = writeln!(
            out,
            "{}: {} records, chain consistent",
            report.salesman, report.checked
        );
        return out;
    }
    let _ = writeln!(
        out,
        "{}: {} records, {} breaks",
        report.salesman,
        report.checked,
        report.breaks.len()
    );
    for entry in &report.breaks {
        match &entry.kind {
            BreakKind::CarriedDue { expected, stored } => {
                let _ = writeln!(
                    out,
                    "  {} prevDue {} but previous currDue is {}",
                    entry.date, stored, expected
                );
            }
            BreakKind::Arithmetic { expected, stored } => {
                let _ = writeln!(
                    out,
                    "  {} stored total/totalDue/currDue {}/{}/{} but sales imply {}/{}/{}",
                    entry.date,
                    stored.total_amount,
                    stored.total_due,
                    stored.curr_due,
                    expected.total_amount,
                    expected.total_due,
                    expected.curr_due
                );
            }
        }
    }
    if let Some(anchor) = report.repair_anchor() {
        let _ = writeln!(out, "  repair anchor: {anchor}");
    }
    out
}
