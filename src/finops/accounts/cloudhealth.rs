//! CloudHealth `aws_accounts` API: the narrow interface the apply engine and
//! the fetch command need, plus its HTTP implementation.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::RETRY_AFTER;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::finops::accounts::config::ClientConfig;
use crate::finops::accounts::model::{CloudHealthAccountRecord, Tags};

const ACCOUNTS_PATH: &str = "/v1/aws_accounts";

/// Tag under which a listed account's `aws_account_number` is exported, so the
/// account can still be matched after its name stops being the account id.
pub const AWS_ACCOUNT_NUMBER_TAG: &str = "aws_account_number";

/// Failure of a single CloudHealth call, split by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Network trouble, rate limiting, or a 5xx answer.
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        /// Server-provided wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// The request was rejected and will be rejected again.
    #[error("request rejected: {message}")]
    Permanent {
        status: Option<u16>,
        message: String,
    },
}

impl ApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        ApiError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ApiError::Permanent {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }

    /// Classifies a non-success HTTP status.
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> Self {
        let message = if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", body.trim())
        };
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            ApiError::Transient {
                message,
                retry_after,
            }
        } else {
            ApiError::Permanent {
                status: Some(status.as_u16()),
                message,
            }
        }
    }
}

/// Operations of the CloudHealth account API used by this tool.
pub trait CloudHealthApi {
    /// Lists every AWS account registered in CloudHealth.
    fn list_accounts(&self) -> Result<Vec<CloudHealthAccountRecord>, ApiError>;

    /// Reads the current state of one account.
    fn get_account(&self, ch_id: &str) -> Result<CloudHealthAccountRecord, ApiError>;

    /// Replaces the account's name and complete tag set.
    fn update_account(&self, ch_id: &str, name: &str, tags: &Tags) -> Result<(), ApiError>;
}

impl<T: CloudHealthApi + ?Sized> CloudHealthApi for &T {
    fn list_accounts(&self) -> Result<Vec<CloudHealthAccountRecord>, ApiError> {
        (**self).list_accounts()
    }

    fn get_account(&self, ch_id: &str) -> Result<CloudHealthAccountRecord, ApiError> {
        (**self).get_account(ch_id)
    }

    fn update_account(&self, ch_id: &str, name: &str, tags: &Tags) -> Result<(), ApiError> {
        (**self).update_account(ch_id, name, tags)
    }
}

/// Blocking HTTP client for the CloudHealth API.
#[derive(Debug, Clone)]
pub struct CloudHealthClient {
    http: Client,
    config: ClientConfig,
}

impl CloudHealthClient {
    pub fn new(config: ClientConfig) -> crate::Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn accounts_url(&self) -> Result<Url, ApiError> {
        let url = format!("{}{ACCOUNTS_PATH}", self.config.base_url);
        Url::parse(&url).map_err(|err| ApiError::permanent(format!("invalid URL {url}: {err}")))
    }

    /// URL of one account; the id is percent-encoded as a single path segment.
    fn account_url(&self, ch_id: &str) -> Result<Url, ApiError> {
        let mut url = self.accounts_url()?;
        let base_url = &self.config.base_url;
        url.path_segments_mut()
            .map_err(|()| ApiError::permanent(format!("base URL {base_url} cannot hold a path")))?
            .pop_if_empty()
            .push(ch_id);
        Ok(url)
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("api_key", self.config.api_key.as_str())]);
        match &self.config.client_api_id {
            Some(client_api_id) => request.query(&[("client_api_id", client_api_id.as_str())]),
            None => request,
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authenticated(request)
            .send()
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().unwrap_or_default();
        Err(ApiError::from_status(status, &body, retry_after))
    }
}

impl CloudHealthApi for CloudHealthClient {
    fn list_accounts(&self) -> Result<Vec<CloudHealthAccountRecord>, ApiError> {
        let response = self.send(self.http.get(self.accounts_url()?))?;
        let body: Value = response.json().map_err(decode_error)?;

        let mut accounts = Vec::new();
        for entry in account_entries(body)? {
            let Some(mut account) = parse_account(&entry) else {
                warn!(entry = %entry, "skipping CloudHealth account without a usable id");
                continue;
            };
            if let Some(number) = aws_account_number(&entry) {
                account
                    .tags
                    .entry(AWS_ACCOUNT_NUMBER_TAG.to_string())
                    .or_insert(number);
            }
            accounts.push(account);
        }
        debug!(count = accounts.len(), "listed CloudHealth accounts");
        Ok(accounts)
    }

    fn get_account(&self, ch_id: &str) -> Result<CloudHealthAccountRecord, ApiError> {
        let response = self.send(self.http.get(self.account_url(ch_id)?))?;
        let body: Value = response.json().map_err(decode_error)?;
        parse_account(&body).ok_or_else(|| {
            ApiError::permanent(format!("account {ch_id} response is missing an id"))
        })
    }

    fn update_account(&self, ch_id: &str, name: &str, tags: &Tags) -> Result<(), ApiError> {
        let payload = UpdatePayload {
            name,
            tags: tags
                .iter()
                .map(|(key, value)| TagPayload { key, value })
                .collect(),
        };
        self.send(self.http.put(self.account_url(ch_id)?).json(&payload))?;
        Ok(())
    }
}

#[derive(Serialize)]
struct UpdatePayload<'a> {
    name: &'a str,
    tags: Vec<TagPayload<'a>>,
}

#[derive(Serialize)]
struct TagPayload<'a> {
    key: &'a str,
    value: &'a str,
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ApiError::transient(err.to_string())
    } else {
        ApiError::permanent(err.to_string())
    }
}

fn decode_error(err: reqwest::Error) -> ApiError {
    ApiError::permanent(format!("unreadable response body: {err}"))
}

/// Unwraps the account list from either a bare array or an envelope object.
/// Any other shape is an error so a fetch never exports an empty dataset for
/// a reply it did not understand.
fn account_entries(body: Value) -> Result<Vec<Value>, ApiError> {
    let unexpected = |body: &Value| {
        ApiError::permanent(format!("unexpected JSON structure in account list: {body}"))
    };
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut object) => {
            for key in ["aws_accounts", "data"] {
                if let Some(Value::Array(items)) = object.remove(key) {
                    return Ok(items);
                }
            }
            let fallback = object.iter().find_map(|(_, value)| match value {
                Value::Array(items) => Some(items.clone()),
                _ => None,
            });
            fallback.ok_or_else(|| unexpected(&Value::Object(object)))
        }
        other => Err(unexpected(&other)),
    }
}

/// The AWS account id CloudHealth keeps for a listed account, when present.
fn aws_account_number(entry: &Value) -> Option<String> {
    let number = match entry.get("aws_account_number")? {
        Value::String(number) => number.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!number.is_empty()).then_some(number)
}

fn parse_account(entry: &Value) -> Option<CloudHealthAccountRecord> {
    let ch_id = match entry.get("id")? {
        Value::String(id) if !id.trim().is_empty() => id.trim().to_string(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };
    let name = match entry.get("name") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let tags = entry
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(parse_tag).collect())
        .unwrap_or_default();
    Some(CloudHealthAccountRecord { ch_id, name, tags })
}

fn parse_tag(tag: &Value) -> Option<(String, String)> {
    let key = tag.get("key")?.as_str()?;
    let value = match tag.get("value")? {
        Value::String(value) => value.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Some((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> CloudHealthClient {
        CloudHealthClient::new(ClientConfig::new("key").with_base_url(base_url))
            .expect("client built")
    }

    #[test]
    fn account_ids_are_encoded_as_one_path_segment() {
        let url = client("http://localhost:8080")
            .account_url("a/b?c#d")
            .expect("url built");
        assert_eq!(url.as_str(), "http://localhost:8080/v1/aws_accounts/a%2Fb%3Fc%23d");
    }

    #[test]
    fn non_list_replies_are_rejected() {
        for body in [
            serde_json::json!({"error": "maintenance"}),
            serde_json::json!("accounts"),
            serde_json::json!(null),
        ] {
            let err = account_entries(body).expect_err("not an account list");
            assert!(!err.is_transient(), "{err}");
        }
    }
}
