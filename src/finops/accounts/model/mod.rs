use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Twelve-digit AWS account identifier kept as text so leading zeros survive.
pub type AwsAccountId = String;

/// Opaque CloudHealth record identifier.
pub type CloudHealthId = String;

/// Key/value tags attached to a CloudHealth account. Ordered so that every
/// serialisation of the same mapping is identical.
pub type Tags = BTreeMap<String, String>;

/// Returns true when `value` has the shape of an AWS account identifier.
pub fn is_aws_account_id(value: &str) -> bool {
    value.len() == 12 && value.bytes().all(|byte| byte.is_ascii_digit())
}

/// One account of the AWS organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsAccountRecord {
    pub aws_id: AwsAccountId,
    pub name: String,
    /// Organizational units from the root towards the account.
    pub ou_path: Vec<String>,
}

/// One AWS account as registered in CloudHealth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudHealthAccountRecord {
    pub ch_id: CloudHealthId,
    pub name: String,
    pub tags: Tags,
}

impl CloudHealthAccountRecord {
    /// Identifier used to join against the AWS dataset.
    ///
    /// A record that was never renamed still carries the AWS account id as
    /// its name. Partially migrated records are recognised through the first
    /// tag, in key order, whose value looks like an account id.
    pub fn effective_aws_id(&self) -> Option<&str> {
        if is_aws_account_id(&self.name) {
            return Some(&self.name);
        }
        self.tags
            .values()
            .map(String::as_str)
            .find(|value| is_aws_account_id(value))
    }
}

/// An AWS account joined to its CloudHealth counterpart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub aws: AwsAccountRecord,
    pub cloudhealth: CloudHealthAccountRecord,
}

impl MatchedPair {
    /// A pair needs a plan item unless CloudHealth already shows the AWS name.
    pub fn needs_change(&self) -> bool {
        self.cloudhealth.name != self.aws.name
    }
}

/// One proposed rename-and-tag change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanItem {
    pub aws_id: AwsAccountId,
    pub ch_id: CloudHealthId,
    /// CloudHealth name observed when the plan was generated.
    pub old_name: String,
    pub new_name: String,
    #[serde(deserialize_with = "unique_tags")]
    pub tags: Tags,
}

/// Reads a tag object, rejecting a key that appears twice instead of letting
/// the last value win.
fn unique_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tags, D::Error> {
    struct UniqueTags;

    impl<'de> Visitor<'de> for UniqueTags {
        type Value = Tags;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an object of string tags")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Tags, A::Error> {
            let mut tags = Tags::new();
            while let Some((key, value)) = map.next_entry::<String, String>()? {
                if tags.contains_key(&key) {
                    return Err(de::Error::custom(format!("duplicate tag key `{key}`")));
                }
                tags.insert(key, value);
            }
            Ok(tags)
        }
    }

    deserializer.deserialize_map(UniqueTags)
}

/// Ordered list of changes handed from the plan phase to the apply phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn new(items: Vec<PlanItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Why an item was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// CloudHealth already holds the target name and tags.
    AlreadyCorrect,
    /// CloudHealth's name changed after the plan was generated.
    Stale { observed_name: String },
    /// The run was cancelled before the item was reached.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyCorrect => write!(f, "already-correct"),
            SkipReason::Stale { observed_name } => write!(f, "stale (now '{observed_name}')"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal state of one plan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Skipped(SkipReason),
    Applied,
    Failed(String),
}

/// Per-item result of an apply run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    pub item: PlanItem,
    pub outcome: ApplyOutcome,
    /// CloudHealth calls issued for the item, retries included.
    pub attempts: u32,
    /// Set when the run was a rehearsal and no mutating call was made.
    pub dry_run: bool,
}

impl ApplyResult {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ApplyOutcome::Failed(_))
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOutcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            ApplyOutcome::Applied => write!(f, "applied"),
            ApplyOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome counts of an apply run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub applied: usize,
    pub already_correct: usize,
    pub stale: usize,
    pub cancelled: usize,
    pub failed: usize,
}

/// Full ordered result of an apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub results: Vec<ApplyResult>,
    pub dry_run: bool,
}

impl ApplyReport {
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for result in &self.results {
            match &result.outcome {
                ApplyOutcome::Applied => counts.applied += 1,
                ApplyOutcome::Skipped(SkipReason::AlreadyCorrect) => counts.already_correct += 1,
                ApplyOutcome::Skipped(SkipReason::Stale { .. }) => counts.stale += 1,
                ApplyOutcome::Skipped(SkipReason::Cancelled) => counts.cancelled += 1,
                ApplyOutcome::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    /// A run is unsuccessful iff at least one item failed.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(ApplyResult::is_failed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ApplyResult> {
        self.results.iter().filter(|result| result.is_failed())
    }
}
