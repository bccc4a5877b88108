use std::path::Path;

use tracing::{info, instrument, warn};

use crate::finops::accounts::apply::{ApplyEngine, Sleeper};
use crate::finops::accounts::aws;
use crate::finops::accounts::cloudhealth::CloudHealthApi;
use crate::finops::accounts::config::NamePolicy;
use crate::finops::accounts::error::Result;
use crate::finops::accounts::io::datasets::{self, Loaded};
use crate::finops::accounts::io::table::{self, Table};
use crate::finops::accounts::matcher::match_accounts;
use crate::finops::accounts::model::{
    ApplyReport, AwsAccountRecord, CloudHealthAccountRecord, Plan,
};
use crate::finops::accounts::plan::build_plan;
use crate::finops::accounts::store;

/// Counts describing how a plan came about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub planned: usize,
    pub already_correct: usize,
    pub unmatched_aws: usize,
    pub unmatched_cloudhealth: usize,
    pub rejected_rows: usize,
}

/// Matches the loaded datasets and builds the plan.
pub fn reconcile(
    aws: &Loaded<AwsAccountRecord>,
    cloudhealth: &Loaded<CloudHealthAccountRecord>,
    policy: &NamePolicy,
) -> Result<(Plan, PlanSummary)> {
    let report = match_accounts(&aws.records, &cloudhealth.records);

    for record in &report.unmatched_aws {
        info!(aws_id = %record.aws_id, name = %record.name, "AWS account not found in CloudHealth");
    }
    for record in &report.unmatched_cloudhealth {
        warn!(ch_id = %record.ch_id, name = %record.name, "CloudHealth account not found in AWS");
    }

    let plan = build_plan(report.needing_change(), policy)?;
    let summary = PlanSummary {
        planned: plan.len(),
        already_correct: report.already_correct(),
        unmatched_aws: report.unmatched_aws.len(),
        unmatched_cloudhealth: report.unmatched_cloudhealth.len(),
        rejected_rows: aws.warnings.len() + cloudhealth.warnings.len(),
    };
    Ok((plan, summary))
}

/// Loads both datasets, reconciles them, and writes the plan to `output`.
#[instrument(
    level = "info",
    skip_all,
    fields(aws = %aws_path.display(), cloudhealth = %cloudhealth_path.display(), output = %output.display())
)]
pub fn generate_plan(
    aws_path: &Path,
    cloudhealth_path: &Path,
    output: &Path,
    policy: &NamePolicy,
) -> Result<PlanSummary> {
    let aws = datasets::load_aws_file(aws_path)?;
    let cloudhealth = datasets::load_cloudhealth_file(cloudhealth_path)?;
    info!(
        aws_accounts = aws.records.len(),
        cloudhealth_accounts = cloudhealth.records.len(),
        "datasets loaded"
    );

    let (plan, summary) = reconcile(&aws, &cloudhealth, policy)?;
    store::save(&plan, output)?;
    info!(items = plan.len(), "plan written");
    Ok(summary)
}

/// Loads the plan at `plan_path` and replays it through `engine`.
#[instrument(level = "info", skip_all, fields(plan = %plan_path.display(), dry_run = dry_run))]
pub fn apply_plan<C: CloudHealthApi, S: Sleeper>(
    plan_path: &Path,
    engine: &ApplyEngine<C, S>,
    dry_run: bool,
) -> Result<ApplyReport> {
    let plan = store::load(plan_path)?;
    info!(items = plan.len(), "plan loaded");
    Ok(engine.apply(&plan, dry_run))
}

/// Exports the AWS organization's accounts as the AWS dataset.
#[instrument(level = "info", skip_all, fields(output = %output.display(), profile = ?profile))]
pub fn fetch_aws(profile: Option<&str>, output: &Path) -> Result<usize> {
    let records = aws::fetch_accounts(profile)?;
    write_dataset(output, &datasets::aws_table(&records))?;
    Ok(records.len())
}

/// Exports CloudHealth's account list as the CloudHealth dataset.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub fn fetch_cloudhealth<C: CloudHealthApi>(client: &C, output: &Path) -> Result<usize> {
    let records = client.list_accounts()?;
    info!(count = records.len(), "retrieved CloudHealth accounts");
    write_dataset(output, &datasets::cloudhealth_table(&records))?;
    Ok(records.len())
}

/// Writes next to `output` first so a failed export never replaces a good one.
fn write_dataset(output: &Path, dataset: &Table) -> Result<()> {
    let directory = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let suffix = output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let staging = tempfile::Builder::new()
        .suffix(&suffix)
        .tempfile_in(directory)?;
    table::write_table(staging.path(), dataset)?;
    staging.persist(output).map_err(|err| err.error)?;
    Ok(())
}
