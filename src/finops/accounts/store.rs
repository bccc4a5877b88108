use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::finops::accounts::error::{Result, ToolError};
use crate::finops::accounts::model::{Plan, PlanItem};

/// Layout version written into every plan document.
pub const PLAN_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct PlanDocumentRef<'a> {
    version: u32,
    items: &'a [PlanItem],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanDocument {
    version: u32,
    items: Vec<PlanItem>,
}

/// Serialises the plan into its on-disk JSON document.
pub fn to_json(plan: &Plan) -> Result<String> {
    let document = PlanDocumentRef {
        version: PLAN_FORMAT_VERSION,
        items: &plan.items,
    };
    let mut json = serde_json::to_string_pretty(&document)?;
    json.push('\n');
    Ok(json)
}

/// Parses a plan document. `origin` names the source in error messages.
pub fn from_json(source: &str, origin: &str) -> Result<Plan> {
    let corrupt = |reason: String| ToolError::CorruptPlan {
        path: origin.to_string(),
        reason,
    };
    let document: PlanDocument =
        serde_json::from_str(source).map_err(|err| corrupt(err.to_string()))?;
    if document.version != PLAN_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported plan version {}, expected {PLAN_FORMAT_VERSION}",
            document.version
        )));
    }
    Ok(Plan::new(document.items))
}

/// Writes the plan to `path` and returns the path as the handle for [`load`].
///
/// The document is written to a temporary file next to the destination and
/// renamed over it, so readers never observe a partially written plan.
pub fn save(plan: &Plan, path: &Path) -> Result<PathBuf> {
    let json = to_json(plan)?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staging = NamedTempFile::new_in(directory)?;
    staging.write_all(json.as_bytes())?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|err| err.error)?;
    debug!(path = %path.display(), items = plan.len(), "plan saved");
    Ok(path.to_path_buf())
}

/// Reads a plan previously written by [`save`].
pub fn load(path: &Path) -> Result<Plan> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let source = fs::read_to_string(path)?;
    from_json(&source, &path.display().to_string())
}
