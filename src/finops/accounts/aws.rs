//! AWS Organizations enumeration backing the `fetch-aws` command.

use std::collections::HashMap;

use aws_config::BehaviorVersion;
use aws_sdk_organizations::Client;
use aws_sdk_organizations::error::DisplayErrorContext;
use aws_sdk_organizations::types::ParentType;
use tracing::{debug, info};

use crate::finops::accounts::error::{Result, ToolError};
use crate::finops::accounts::model::AwsAccountRecord;

/// Lists every account of the organization together with its OU path.
///
/// Credentials come from the default provider chain, optionally pinned to a
/// named profile.
pub fn fetch_accounts(profile: Option<&str>) -> Result<Vec<AwsAccountRecord>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(list_organization_accounts(profile))
}

async fn list_organization_accounts(profile: Option<&str>) -> Result<Vec<AwsAccountRecord>> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    let config = loader.load().await;
    let client = Client::new(&config);
    let mut resolver = OuResolver::new(&client);

    let mut records = Vec::new();
    let mut pages = client.list_accounts().into_paginator().send();
    while let Some(page) = pages.next().await {
        let page = page.map_err(aws_error)?;
        for account in page.accounts() {
            let Some(aws_id) = account.id() else {
                continue;
            };
            let ou_path = resolver.ou_path(aws_id).await?;
            debug!(aws_id, depth = ou_path.len(), "resolved account OU path");
            records.push(AwsAccountRecord {
                aws_id: aws_id.to_string(),
                name: account.name().unwrap_or_default().to_string(),
                ou_path,
            });
        }
    }

    info!(count = records.len(), "retrieved AWS accounts");
    Ok(records)
}

/// Walks account parents up to the root, caching OU lookups across accounts.
struct OuResolver<'a> {
    client: &'a Client,
    parents: HashMap<String, Option<String>>,
    names: HashMap<String, String>,
}

impl<'a> OuResolver<'a> {
    fn new(client: &'a Client) -> Self {
        Self {
            client,
            parents: HashMap::new(),
            names: HashMap::new(),
        }
    }

    async fn ou_path(&mut self, account_id: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = account_id.to_string();
        while let Some(parent) = self.parent_ou(&current).await? {
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();

        let mut path = Vec::with_capacity(chain.len());
        for ou_id in &chain {
            path.push(self.ou_name(ou_id).await?);
        }
        Ok(path)
    }

    /// Parent OU of `child_id`, or `None` when the parent is the root.
    async fn parent_ou(&mut self, child_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.parents.get(child_id) {
            return Ok(cached.clone());
        }
        let response = self
            .client
            .list_parents()
            .child_id(child_id)
            .send()
            .await
            .map_err(aws_error)?;
        let parent = response.parents().first().and_then(|parent| {
            match parent.r#type() {
                Some(ParentType::OrganizationalUnit) => parent.id().map(str::to_string),
                _ => None,
            }
        });
        self.parents.insert(child_id.to_string(), parent.clone());
        Ok(parent)
    }

    async fn ou_name(&mut self, ou_id: &str) -> Result<String> {
        if let Some(name) = self.names.get(ou_id) {
            return Ok(name.clone());
        }
        let response = self
            .client
            .describe_organizational_unit()
            .organizational_unit_id(ou_id)
            .send()
            .await
            .map_err(aws_error)?;
        let name = response
            .organizational_unit()
            .and_then(|ou| ou.name())
            .unwrap_or(ou_id)
            .to_string();
        self.names.insert(ou_id.to_string(), name.clone());
        Ok(name)
    }
}

fn aws_error<E: std::error::Error + 'static>(err: E) -> ToolError {
    ToolError::Aws(DisplayErrorContext(&err).to_string())
}
