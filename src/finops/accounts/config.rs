use std::time::Duration;

/// Public CloudHealth API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://chapi.cloudhealthtech.com";

/// Per-call timeout applied to every CloudHealth request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest account name CloudHealth accepts for an AWS account record.
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

/// Connection settings for the CloudHealth API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    /// Tenant selector for partner accounts; omitted from requests when unset.
    pub client_api_id: Option<String>,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            client_api_id: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client_api_id(mut self, client_api_id: Option<String>) -> Self {
        self.client_api_id = client_api_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Bounded exponential backoff applied to transient CloudHealth failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per call, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Rules a proposed CloudHealth account name must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamePolicy {
    pub max_name_length: usize,
}

impl Default for NamePolicy {
    fn default() -> Self {
        Self {
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

impl NamePolicy {
    /// Returns the reason the name is rejected, if any.
    pub fn check(&self, name: &str) -> Option<String> {
        if name.trim().is_empty() {
            return Some("name is empty".to_string());
        }
        if let Some(ch) = name.chars().find(|ch| ch.is_control()) {
            return Some(format!("name contains non-printable character {ch:?}"));
        }
        let length = name.chars().count();
        if length > self.max_name_length {
            return Some(format!(
                "name is {length} characters long, limit is {}",
                self.max_name_length
            ));
        }
        None
    }
}
