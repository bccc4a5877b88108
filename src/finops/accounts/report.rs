//! Tabulated summaries printed by the CLI.

use tabled::Tabled;
use tabled::settings::Style;

use crate::finops::accounts::model::{ApplyOutcome, ApplyReport};
use crate::finops::accounts::workflow::PlanSummary;

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Outcome")]
    outcome: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
}

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "CloudHealth ID")]
    ch_id: String,
    #[tabled(rename = "AWS ID")]
    aws_id: String,
    #[tabled(rename = "New name")]
    new_name: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Result")]
    result: String,
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    tabled::Table::new(rows).with(Style::rounded()).to_string()
}

/// Counts of the reconciliation that produced a plan.
pub fn plan_summary(summary: &PlanSummary) -> String {
    render(vec![
        CountRow {
            outcome: "planned changes",
            count: summary.planned,
        },
        CountRow {
            outcome: "already correct",
            count: summary.already_correct,
        },
        CountRow {
            outcome: "unmatched AWS accounts",
            count: summary.unmatched_aws,
        },
        CountRow {
            outcome: "unmatched CloudHealth accounts",
            count: summary.unmatched_cloudhealth,
        },
        CountRow {
            outcome: "rejected rows",
            count: summary.rejected_rows,
        },
    ])
}

/// Counts by outcome of an apply run.
pub fn apply_summary(report: &ApplyReport) -> String {
    let counts = report.counts();
    let applied = if report.dry_run {
        "would apply (dry run)"
    } else {
        "applied"
    };
    render(vec![
        CountRow {
            outcome: applied,
            count: counts.applied,
        },
        CountRow {
            outcome: "skipped: already correct",
            count: counts.already_correct,
        },
        CountRow {
            outcome: "skipped: stale",
            count: counts.stale,
        },
        CountRow {
            outcome: "skipped: cancelled",
            count: counts.cancelled,
        },
        CountRow {
            outcome: "failed",
            count: counts.failed,
        },
    ])
}

/// Per-item detail of every result that was not applied.
pub fn exceptions(report: &ApplyReport) -> Option<String> {
    let rows: Vec<ItemRow> = report
        .results
        .iter()
        .filter(|result| result.outcome != ApplyOutcome::Applied)
        .map(|result| ItemRow {
            ch_id: result.item.ch_id.clone(),
            aws_id: result.item.aws_id.clone(),
            new_name: result.item.new_name.clone(),
            attempts: result.attempts,
            result: result.outcome.to_string(),
        })
        .collect();
    (!rows.is_empty()).then(|| render(rows))
}
