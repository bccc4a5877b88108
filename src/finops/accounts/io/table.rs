use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::Workbook;

use crate::finops::accounts::error::{Result, ToolError};

/// Name of the worksheet written by [`write_table`] for spreadsheet exports.
pub const DATASET_SHEET: &str = "Accounts";

/// Header plus data rows of a tabular dataset. Every row is padded or
/// truncated to the header width when read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Position of the named column in the header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// On-disk representation of a dataset, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Xlsx,
}

/// Detects the dataset format from the path. Anything that is not a
/// spreadsheet is treated as CSV.
pub fn detect_format(path: &Path) -> TableFormat {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("xlsx") => TableFormat::Xlsx,
        _ => TableFormat::Csv,
    }
}

/// Reads a dataset from disk.
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    match detect_format(path) {
        TableFormat::Csv => read_csv(path),
        TableFormat::Xlsx => read_xlsx(path),
    }
}

/// Writes a dataset to disk in the format implied by its extension.
pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    match detect_format(path) {
        TableFormat::Csv => write_csv(path, table),
        TableFormat::Xlsx => write_xlsx(path, table),
    }
}

fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(columns);
    for record in reader.records() {
        let record = record?;
        let row = record.iter().map(str::to_string).collect();
        table.push_row(fit_row(row, table.columns.len()));
    }
    Ok(table)
}

fn read_xlsx(path: &Path) -> Result<Table> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ToolError::UnsupportedFormat(format!("{} has no worksheets", path.display())))?;
    let range = workbook
        .worksheet_range(&sheet)
        .ok_or_else(|| ToolError::UnsupportedFormat(format!("missing sheet '{sheet}'")))??;

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|cell| cell_to_string(Some(cell))).collect(),
        None => return Ok(Table::default()),
    };

    let mut table = Table::new(columns);
    for row in rows {
        let cells: Vec<String> = row.iter().map(|cell| cell_to_string(Some(cell))).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        table.push_row(fit_row(cells, table.columns.len()));
    }
    Ok(table)
}

fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(path: &Path, table: &Table) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(DATASET_SHEET)?;

    for (col_idx, header) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col_idx as u16, header)?;
    }

    // Account ids are written as strings so spreadsheets keep leading zeros.
    for (row_idx, row) in table.rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            worksheet.write_string((row_idx + 1) as u32, col_idx as u16, cell)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn fit_row(mut row: Vec<String>, width: usize) -> Vec<String> {
    row.resize(width, String::new());
    row
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.trim().to_string(),
        Some(DataType::Float(value)) if value.fract() == 0.0 => format!("{value:.0}"),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
