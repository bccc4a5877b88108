use crate::finops::accounts::config::NamePolicy;
use crate::finops::accounts::error::{Result, ToolError};
use crate::finops::accounts::model::{MatchedPair, Plan, PlanItem, Tags};

/// Prefix of the tag keys carrying the OU path, followed by the 1-based depth.
pub const OU_TAG_PREFIX: &str = "ou-level-";

/// Flattens an OU path into `ou-level-N` tags.
pub fn ou_tags(ou_path: &[String]) -> Tags {
    ou_path
        .iter()
        .enumerate()
        .map(|(depth, segment)| (format!("{OU_TAG_PREFIX}{}", depth + 1), segment.clone()))
        .collect()
}

/// Builds the plan for the given pairs, preserving their order. Pairs whose
/// CloudHealth name already equals the AWS name produce no item.
pub fn build_plan<'a>(
    pairs: impl IntoIterator<Item = &'a MatchedPair>,
    policy: &NamePolicy,
) -> Result<Plan> {
    let mut items = Vec::new();
    for pair in pairs.into_iter().filter(|pair| pair.needs_change()) {
        if let Some(reason) = policy.check(&pair.aws.name) {
            return Err(ToolError::Validation {
                ch_id: pair.cloudhealth.ch_id.clone(),
                reason,
            });
        }
        items.push(PlanItem {
            aws_id: pair.aws.aws_id.clone(),
            ch_id: pair.cloudhealth.ch_id.clone(),
            old_name: pair.cloudhealth.name.clone(),
            new_name: pair.aws.name.clone(),
            tags: ou_tags(&pair.aws.ou_path),
        });
    }
    Ok(Plan::new(items))
}
