//! Joins the AWS inventory to the CloudHealth inventory on AWS account id.

use std::collections::HashMap;

use tracing::warn;

use crate::finops::accounts::model::{AwsAccountRecord, CloudHealthAccountRecord, MatchedPair};

/// Result of joining the two inventories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Pairs in AWS dataset order.
    pub matched: Vec<MatchedPair>,
    /// AWS accounts CloudHealth does not know about yet.
    pub unmatched_aws: Vec<AwsAccountRecord>,
    /// CloudHealth accounts with no AWS counterpart, in CloudHealth order.
    pub unmatched_cloudhealth: Vec<CloudHealthAccountRecord>,
}

impl MatchReport {
    /// Pairs that need a plan item.
    pub fn needing_change(&self) -> impl Iterator<Item = &MatchedPair> {
        self.matched.iter().filter(|pair| pair.needs_change())
    }

    /// Number of pairs CloudHealth already names correctly.
    pub fn already_correct(&self) -> usize {
        self.matched.iter().filter(|pair| !pair.needs_change()).count()
    }
}

/// Matches every AWS account to at most one CloudHealth account.
///
/// The CloudHealth side is indexed by [`CloudHealthAccountRecord::effective_aws_id`].
/// When several CloudHealth records resolve to the same account id, the first
/// one in CloudHealth order wins and the rest are reported as unmatched.
pub fn match_accounts(
    aws: &[AwsAccountRecord],
    cloudhealth: &[CloudHealthAccountRecord],
) -> MatchReport {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(cloudhealth.len());
    for (position, record) in cloudhealth.iter().enumerate() {
        let Some(aws_id) = record.effective_aws_id() else {
            continue;
        };
        if let Some(first) = index.get(aws_id) {
            warn!(
                aws_id,
                ch_id = %record.ch_id,
                kept = %cloudhealth[*first].ch_id,
                "multiple CloudHealth accounts resolve to the same AWS account"
            );
            continue;
        }
        index.insert(aws_id, position);
    }

    let mut claimed = vec![false; cloudhealth.len()];
    let mut report = MatchReport::default();
    for record in aws {
        match index.get(record.aws_id.as_str()) {
            Some(&position) => {
                claimed[position] = true;
                report.matched.push(MatchedPair {
                    aws: record.clone(),
                    cloudhealth: cloudhealth[position].clone(),
                });
            }
            None => report.unmatched_aws.push(record.clone()),
        }
    }

    report.unmatched_cloudhealth = cloudhealth
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(record, _)| record.clone())
        .collect();

    report
}
