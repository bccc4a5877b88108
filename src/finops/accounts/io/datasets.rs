use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use tracing::{debug, warn};

use crate::finops::accounts::error::{Result, ToolError};
use crate::finops::accounts::io::table::{self, Table};
use crate::finops::accounts::model::{
    AwsAccountRecord, CloudHealthAccountRecord, Tags, is_aws_account_id,
};

pub const AWS_ID_COLUMN: &str = "aws_id";
pub const CH_ID_COLUMN: &str = "ch_id";
pub const NAME_COLUMN: &str = "name";
/// Prefix of the AWS dataset's OU columns, followed by the 1-based depth.
pub const OU_COLUMN_PREFIX: &str = "ou_level_";
/// Prefix of the CloudHealth dataset's tag columns, followed by the tag key.
pub const TAG_COLUMN_PREFIX: &str = "tag:";

const AWS_DATASET: &str = "AWS";
const CLOUDHEALTH_DATASET: &str = "CloudHealth";

/// A row the loader refused, identified by its 1-based data-row index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWarning {
    pub row: usize,
    pub message: String,
}

impl fmt::Display for RowWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

/// Records accepted from a dataset, in input order, plus every rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub warnings: Vec<RowWarning>,
}

/// Reads and parses the AWS dataset at `path`.
pub fn load_aws_file(path: &Path) -> Result<Loaded<AwsAccountRecord>> {
    let table = table::read_table(path)?;
    load_aws(&table)
}

/// Reads and parses the CloudHealth dataset at `path`.
pub fn load_cloudhealth_file(path: &Path) -> Result<Loaded<CloudHealthAccountRecord>> {
    let table = table::read_table(path)?;
    load_cloudhealth(&table)
}

/// Parses AWS rows (`aws_id,name,ou_level_1,...`) into typed records.
pub fn load_aws(table: &Table) -> Result<Loaded<AwsAccountRecord>> {
    let id_idx = require_column(table, AWS_DATASET, AWS_ID_COLUMN)?;
    let name_idx = table.column_index(NAME_COLUMN);

    let mut ou_columns: Vec<(usize, usize)> = table
        .columns
        .iter()
        .enumerate()
        .filter_map(|(idx, column)| {
            let level = column.strip_prefix(OU_COLUMN_PREFIX)?.parse::<usize>().ok()?;
            Some((level, idx))
        })
        .collect();
    ou_columns.sort();

    let mut keys = KeyRegistry::new(AWS_DATASET);
    let mut records = Vec::with_capacity(table.rows.len());
    let mut warnings = Vec::new();

    for (offset, row) in table.rows.iter().enumerate() {
        let row_number = offset + 1;
        let aws_id = cell(row, Some(id_idx));
        if aws_id.is_empty() {
            warnings.push(reject(AWS_DATASET, row_number, "missing aws_id"));
            continue;
        }
        if !is_aws_account_id(aws_id) {
            warnings.push(reject(
                AWS_DATASET,
                row_number,
                &format!("aws_id '{aws_id}' is not a 12-digit account id"),
            ));
            continue;
        }
        keys.claim(aws_id, row_number)?;

        let ou_path = ou_columns
            .iter()
            .map(|(_, idx)| cell(row, Some(*idx)))
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        records.push(AwsAccountRecord {
            aws_id: aws_id.to_string(),
            name: cell(row, name_idx).to_string(),
            ou_path,
        });
    }

    debug!(
        accepted = records.len(),
        rejected = warnings.len(),
        "loaded AWS dataset"
    );
    Ok(Loaded { records, warnings })
}

/// Parses CloudHealth rows (`ch_id,name,tag:<key>,...`) into typed records.
pub fn load_cloudhealth(table: &Table) -> Result<Loaded<CloudHealthAccountRecord>> {
    let id_idx = require_column(table, CLOUDHEALTH_DATASET, CH_ID_COLUMN)?;
    let name_idx = table.column_index(NAME_COLUMN);

    let tag_columns: Vec<(&str, usize)> = table
        .columns
        .iter()
        .enumerate()
        .filter_map(|(idx, column)| {
            let key = column.strip_prefix(TAG_COLUMN_PREFIX)?;
            (!key.is_empty()).then_some((key, idx))
        })
        .collect();

    let mut keys = KeyRegistry::new(CLOUDHEALTH_DATASET);
    let mut records = Vec::with_capacity(table.rows.len());
    let mut warnings = Vec::new();

    for (offset, row) in table.rows.iter().enumerate() {
        let row_number = offset + 1;
        let ch_id = cell(row, Some(id_idx));
        if ch_id.is_empty() {
            warnings.push(reject(CLOUDHEALTH_DATASET, row_number, "missing ch_id"));
            continue;
        }
        keys.claim(ch_id, row_number)?;

        let tags: Tags = tag_columns
            .iter()
            .filter_map(|(key, idx)| {
                let value = cell(row, Some(*idx));
                (!value.is_empty()).then(|| (key.to_string(), value.to_string()))
            })
            .collect();

        records.push(CloudHealthAccountRecord {
            ch_id: ch_id.to_string(),
            name: cell(row, name_idx).to_string(),
            tags,
        });
    }

    debug!(
        accepted = records.len(),
        rejected = warnings.len(),
        "loaded CloudHealth dataset"
    );
    Ok(Loaded { records, warnings })
}

/// Builds the AWS dataset table exported by `fetch-aws`.
pub fn aws_table(records: &[AwsAccountRecord]) -> Table {
    let depth = records
        .iter()
        .map(|record| record.ou_path.len())
        .max()
        .unwrap_or(0);

    let mut columns = vec![AWS_ID_COLUMN.to_string(), NAME_COLUMN.to_string()];
    columns.extend((1..=depth).map(|level| format!("{OU_COLUMN_PREFIX}{level}")));

    let mut table = Table::new(columns);
    for record in records {
        let mut row = vec![record.aws_id.clone(), record.name.clone()];
        row.extend(record.ou_path.iter().cloned());
        row.resize(depth + 2, String::new());
        table.push_row(row);
    }
    table
}

/// Builds the CloudHealth dataset table exported by `fetch-cloudhealth`.
/// Tag columns are the sorted union of every record's tag keys.
pub fn cloudhealth_table(records: &[CloudHealthAccountRecord]) -> Table {
    let tag_keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|record| record.tags.keys().map(String::as_str))
        .collect();

    let mut columns = vec![CH_ID_COLUMN.to_string(), NAME_COLUMN.to_string()];
    columns.extend(tag_keys.iter().map(|key| format!("{TAG_COLUMN_PREFIX}{key}")));

    let mut table = Table::new(columns);
    for record in records {
        let mut row = vec![record.ch_id.clone(), record.name.clone()];
        row.extend(
            tag_keys
                .iter()
                .map(|key| record.tags.get(*key).cloned().unwrap_or_default()),
        );
        table.push_row(row);
    }
    table
}

struct KeyRegistry {
    dataset: &'static str,
    seen: HashMap<String, usize>,
}

impl KeyRegistry {
    fn new(dataset: &'static str) -> Self {
        Self {
            dataset,
            seen: HashMap::new(),
        }
    }

    fn claim(&mut self, key: &str, row: usize) -> Result<()> {
        if let Some(first_row) = self.seen.get(key) {
            return Err(ToolError::DuplicateKey {
                dataset: self.dataset,
                key: key.to_string(),
                first_row: *first_row,
                row,
            });
        }
        self.seen.insert(key.to_string(), row);
        Ok(())
    }
}

fn require_column(table: &Table, dataset: &'static str, column: &'static str) -> Result<usize> {
    table
        .column_index(column)
        .ok_or(ToolError::MissingColumn { dataset, column })
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|idx| row.get(idx))
        .map(|value| value.trim())
        .unwrap_or_default()
}

fn reject(dataset: &str, row: usize, message: &str) -> RowWarning {
    warn!(dataset, row, message, "rejected dataset row");
    RowWarning {
        row,
        message: message.to_string(),
    }
}
