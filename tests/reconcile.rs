use std::collections::BTreeMap;
use std::fs;

use finops_account_manager::ToolError;
use finops_account_manager::config::NamePolicy;
use finops_account_manager::io::datasets::{self, Loaded};
use finops_account_manager::io::table::Table;
use finops_account_manager::matcher::match_accounts;
use finops_account_manager::model::{AwsAccountRecord, CloudHealthAccountRecord, PlanItem};
use finops_account_manager::plan::build_plan;
use finops_account_manager::{store, workflow};
use tempfile::tempdir;

fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
    Table {
        columns: columns.iter().map(|column| column.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect(),
    }
}

fn aws(aws_id: &str, name: &str, ou_path: &[&str]) -> AwsAccountRecord {
    AwsAccountRecord {
        aws_id: aws_id.into(),
        name: name.into(),
        ou_path: ou_path.iter().map(|segment| segment.to_string()).collect(),
    }
}

fn cloudhealth(ch_id: &str, name: &str, tags: &[(&str, &str)]) -> CloudHealthAccountRecord {
    CloudHealthAccountRecord {
        ch_id: ch_id.into(),
        name: name.into(),
        tags: tags
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}

#[test]
fn bare_numeric_name_produces_rename_item() {
    let aws_rows = datasets::load_aws(&table(
        &["aws_id", "name", "ou_level_1", "ou_level_2"],
        &[&["123456789012", "core-prod", "Platform", "Core"]],
    ))
    .expect("AWS rows parsed");
    let ch_rows = datasets::load_cloudhealth(&table(
        &["ch_id", "name"],
        &[&["998877", "123456789012"]],
    ))
    .expect("CloudHealth rows parsed");

    let report = match_accounts(&aws_rows.records, &ch_rows.records);
    let plan = build_plan(&report.matched, &NamePolicy::default()).expect("plan built");

    assert_eq!(
        plan.items,
        vec![PlanItem {
            aws_id: "123456789012".into(),
            ch_id: "998877".into(),
            old_name: "123456789012".into(),
            new_name: "core-prod".into(),
            tags: BTreeMap::from([
                ("ou-level-1".to_string(), "Platform".to_string()),
                ("ou-level-2".to_string(), "Core".to_string()),
            ]),
        }]
    );
}

#[test]
fn already_renamed_account_is_matched_but_not_planned() {
    let aws_records = vec![aws("123456789012", "core-prod", &["Platform", "Core"])];
    let ch_records = vec![cloudhealth(
        "998877",
        "core-prod",
        &[("aws-account-id", "123456789012")],
    )];

    let report = match_accounts(&aws_records, &ch_records);
    let plan = build_plan(&report.matched, &NamePolicy::default()).expect("plan built");

    assert_eq!(report.matched.len(), 1);
    assert_eq!(report.already_correct(), 1);
    assert!(report.unmatched_aws.is_empty());
    assert!(report.unmatched_cloudhealth.is_empty());
    assert!(plan.is_empty());
}

#[test]
fn tag_fallback_prefers_lexically_first_key() {
    let aws_records = vec![
        aws("111111111111", "first", &[]),
        aws("222222222222", "second", &[]),
    ];
    let ch_records = vec![cloudhealth(
        "7",
        "old display name",
        &[
            ("zz-account", "222222222222"),
            ("account", "111111111111"),
            ("cost-center", "12345"),
        ],
    )];

    let report = match_accounts(&aws_records, &ch_records);

    assert_eq!(report.matched.len(), 1);
    assert_eq!(report.matched[0].aws.aws_id, "111111111111");
    assert_eq!(report.unmatched_aws, vec![aws_records[1].clone()]);
}

#[test]
fn matched_order_follows_aws_dataset_and_unmatched_are_reported() {
    let aws_records = vec![
        aws("333333333333", "third", &[]),
        aws("111111111111", "first", &[]),
        aws("444444444444", "not-onboarded", &[]),
        aws("222222222222", "second", &[]),
    ];
    let ch_records = vec![
        cloudhealth("a", "111111111111", &[]),
        cloudhealth("b", "222222222222", &[]),
        cloudhealth("c", "333333333333", &[]),
        cloudhealth("d", "decommissioned", &[]),
    ];

    let report = match_accounts(&aws_records, &ch_records);
    let order: Vec<&str> = report
        .matched
        .iter()
        .map(|pair| pair.cloudhealth.ch_id.as_str())
        .collect();

    assert_eq!(order, vec!["c", "a", "b"]);
    assert_eq!(report.unmatched_aws, vec![aws_records[2].clone()]);
    assert_eq!(report.unmatched_cloudhealth, vec![ch_records[3].clone()]);
}

#[test]
fn second_cloudhealth_record_for_same_account_stays_unmatched() {
    let aws_records = vec![aws("111111111111", "first", &[])];
    let ch_records = vec![
        cloudhealth("a", "111111111111", &[]),
        cloudhealth("b", "legacy", &[("aws", "111111111111")]),
    ];

    let report = match_accounts(&aws_records, &ch_records);

    assert_eq!(report.matched.len(), 1);
    assert_eq!(report.matched[0].cloudhealth.ch_id, "a");
    assert_eq!(report.unmatched_cloudhealth, vec![ch_records[1].clone()]);
}

#[test]
fn rows_without_key_are_reported_not_dropped() {
    let loaded = datasets::load_aws(&table(
        &["aws_id", "name", "ou_level_2", "ou_level_1"],
        &[
            &["123456789012", "core-prod", "Core", "Platform"],
            &["", "orphan", "", ""],
            &["12345", "short-id", "", ""],
        ],
    ))
    .expect("AWS rows parsed");

    assert_eq!(loaded.records.len(), 1);
    assert_eq!(loaded.records[0].ou_path, vec!["Platform", "Core"]);
    let rows: Vec<usize> = loaded.warnings.iter().map(|warning| warning.row).collect();
    assert_eq!(rows, vec![2, 3]);
}

#[test]
fn duplicate_primary_key_is_a_load_error() {
    let err = datasets::load_cloudhealth(&table(
        &["ch_id", "name", "tag:env"],
        &[&["1", "a", "prod"], &["2", "b", ""], &["1", "c", ""]],
    ))
    .expect_err("duplicate ch_id rejected");

    match err {
        ToolError::DuplicateKey {
            key,
            first_row,
            row,
            ..
        } => {
            assert_eq!(key, "1");
            assert_eq!(first_row, 1);
            assert_eq!(row, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_key_column_is_a_load_error() {
    let err = datasets::load_aws(&table(&["account_id", "name"], &[&["123456789012", "x"]]))
        .expect_err("missing aws_id column");
    assert!(matches!(err, ToolError::MissingColumn { column: "aws_id", .. }));
}

#[test]
fn empty_or_oversized_new_name_fails_validation() {
    let ch_records = vec![cloudhealth("1", "123456789012", &[])];
    let policy = NamePolicy { max_name_length: 5 };

    for name in ["", "far-too-long"] {
        let aws_records = vec![aws("123456789012", name, &[])];
        let report = match_accounts(&aws_records, &ch_records);
        let err = build_plan(&report.matched, &policy).expect_err("invalid name rejected");
        assert!(matches!(err, ToolError::Validation { .. }), "{err}");
    }
}

#[test]
fn reconcile_summary_counts_every_category() {
    let aws_loaded = Loaded {
        records: vec![
            aws("111111111111", "first", &["Root"]),
            aws("222222222222", "second", &[]),
            aws("333333333333", "third", &[]),
        ],
        warnings: vec![],
    };
    let ch_loaded = Loaded {
        records: vec![
            cloudhealth("a", "111111111111", &[]),
            cloudhealth("b", "second", &[("id", "222222222222")]),
            cloudhealth("c", "stray", &[]),
        ],
        warnings: vec![],
    };

    let (plan, summary) =
        workflow::reconcile(&aws_loaded, &ch_loaded, &NamePolicy::default()).expect("reconciled");

    assert_eq!(plan.len(), 1);
    assert_eq!(summary.planned, 1);
    assert_eq!(summary.already_correct, 1);
    assert_eq!(summary.unmatched_aws, 1);
    assert_eq!(summary.unmatched_cloudhealth, 1);
}

#[test]
fn identical_inputs_produce_byte_identical_plans() {
    let temp_dir = tempdir().expect("temporary directory");
    let aws_path = temp_dir.path().join("aws.csv");
    let ch_path = temp_dir.path().join("cloudhealth.csv");
    fs::write(
        &aws_path,
        "aws_id,name,ou_level_1,ou_level_2\n\
         123456789012,core-prod,Platform,Core\n\
         210987654321,data-dev,Data,\n\
         555555555555,new-account,Sandbox,\n",
    )
    .expect("AWS dataset written");
    fs::write(
        &ch_path,
        "ch_id,name,tag:env,tag:aws-id\n\
         998877,123456789012,prod,\n\
         998878,Data Dev (old),dev,210987654321\n\
         998879,999999999999,,\n",
    )
    .expect("CloudHealth dataset written");

    let first = temp_dir.path().join("first.json");
    let second = temp_dir.path().join("second.json");
    let policy = NamePolicy::default();
    let summary =
        workflow::generate_plan(&aws_path, &ch_path, &first, &policy).expect("first plan");
    workflow::generate_plan(&aws_path, &ch_path, &second, &policy).expect("second plan");

    assert_eq!(
        fs::read(&first).expect("first read"),
        fs::read(&second).expect("second read")
    );
    assert_eq!(summary.planned, 2);
    assert_eq!(summary.unmatched_aws, 1);
    assert_eq!(summary.unmatched_cloudhealth, 1);

    let plan = store::load(&first).expect("plan loaded");
    assert_eq!(plan.items[1].old_name, "Data Dev (old)");
    assert_eq!(plan.items[1].new_name, "data-dev");
    assert_eq!(
        plan.items[1].tags,
        BTreeMap::from([("ou-level-1".to_string(), "Data".to_string())])
    );
}

#[test]
fn failed_load_writes_no_plan() {
    let temp_dir = tempdir().expect("temporary directory");
    let aws_path = temp_dir.path().join("aws.csv");
    let ch_path = temp_dir.path().join("cloudhealth.csv");
    fs::write(&aws_path, "aws_id,name\n123456789012,a\n123456789012,b\n").expect("written");
    fs::write(&ch_path, "ch_id,name\n1,123456789012\n").expect("written");

    let output = temp_dir.path().join("plan.json");
    let err = workflow::generate_plan(&aws_path, &ch_path, &output, &NamePolicy::default())
        .expect_err("duplicate AWS id rejected");

    assert!(matches!(err, ToolError::DuplicateKey { .. }));
    assert!(!output.exists());
}
