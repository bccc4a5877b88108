//! Replays a [`Plan`] against CloudHealth.
//!
//! Items are processed one at a time in plan order. Each item reads the live
//! account first: an account already in the target state is skipped, an
//! account whose name no longer matches the plan is skipped as stale, and
//! only the rest receive a full-state update. A failing item never stops the
//! run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::finops::accounts::cloudhealth::{ApiError, CloudHealthApi};
use crate::finops::accounts::config::RetryPolicy;
use crate::finops::accounts::model::{
    ApplyOutcome, ApplyReport, ApplyResult, Plan, PlanItem, SkipReason,
};

/// Waits between retry attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Cooperative stop signal checked between items and between retries.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Applies plans through a [`CloudHealthApi`].
#[derive(Debug)]
pub struct ApplyEngine<C, S = ThreadSleeper> {
    client: C,
    retry: RetryPolicy,
    sleeper: S,
    cancellation: CancellationFlag,
}

impl<C: CloudHealthApi> ApplyEngine<C> {
    pub fn new(client: C, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            sleeper: ThreadSleeper,
            cancellation: CancellationFlag::new(),
        }
    }
}

impl<C: CloudHealthApi, S: Sleeper> ApplyEngine<C, S> {
    /// Replaces the sleeper used for backoff waits.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> ApplyEngine<C, T> {
        ApplyEngine {
            client: self.client,
            retry: self.retry,
            sleeper,
            cancellation: self.cancellation,
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Processes every plan item in order and returns one result per item.
    #[instrument(level = "info", skip_all, fields(items = plan.len(), dry_run = dry_run))]
    pub fn apply(&self, plan: &Plan, dry_run: bool) -> ApplyReport {
        let mut results = Vec::with_capacity(plan.len());
        for item in &plan.items {
            if self.cancellation.is_cancelled() {
                results.push(ApplyResult {
                    item: item.clone(),
                    outcome: ApplyOutcome::Skipped(SkipReason::Cancelled),
                    attempts: 0,
                    dry_run,
                });
                continue;
            }
            results.push(self.apply_item(item, dry_run));
        }
        ApplyReport { results, dry_run }
    }

    fn apply_item(&self, item: &PlanItem, dry_run: bool) -> ApplyResult {
        let mut attempts = 0;
        let outcome = self.resolve_item(item, dry_run, &mut attempts);
        match &outcome {
            ApplyOutcome::Applied if dry_run => info!(
                ch_id = %item.ch_id,
                old_name = %item.old_name,
                new_name = %item.new_name,
                tags = ?item.tags,
                dry_run = true,
                "would update CloudHealth account"
            ),
            ApplyOutcome::Applied => info!(
                ch_id = %item.ch_id,
                new_name = %item.new_name,
                attempts,
                "updated CloudHealth account"
            ),
            ApplyOutcome::Skipped(SkipReason::Stale { observed_name }) => warn!(
                ch_id = %item.ch_id,
                expected = %item.old_name,
                observed = %observed_name,
                "CloudHealth account changed since the plan was generated; skipping"
            ),
            ApplyOutcome::Skipped(reason) => {
                debug!(ch_id = %item.ch_id, %reason, "skipping CloudHealth account")
            }
            ApplyOutcome::Failed(reason) => warn!(
                ch_id = %item.ch_id,
                attempts,
                %reason,
                "failed to update CloudHealth account"
            ),
        }
        ApplyResult {
            item: item.clone(),
            outcome,
            attempts,
            dry_run,
        }
    }

    fn resolve_item(&self, item: &PlanItem, dry_run: bool, attempts: &mut u32) -> ApplyOutcome {
        let live = match self.with_retry(attempts, || self.client.get_account(&item.ch_id)) {
            Ok(live) => live,
            Err(err) => return ApplyOutcome::Failed(format!("reading current state: {err}")),
        };

        if live.name == item.new_name && live.tags == item.tags {
            return ApplyOutcome::Skipped(SkipReason::AlreadyCorrect);
        }
        if live.name != item.old_name {
            return ApplyOutcome::Skipped(SkipReason::Stale {
                observed_name: live.name,
            });
        }
        if dry_run {
            return ApplyOutcome::Applied;
        }

        match self.with_retry(attempts, || {
            self.client
                .update_account(&item.ch_id, &item.new_name, &item.tags)
        }) {
            Ok(()) => ApplyOutcome::Applied,
            Err(err) => ApplyOutcome::Failed(err.to_string()),
        }
    }

    /// Runs `call` until it succeeds, fails permanently, exhausts the retry
    /// budget, or the run is cancelled. Every call increments `attempts`.
    fn with_retry<T>(
        &self,
        attempts: &mut u32,
        mut call: impl FnMut() -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            *attempts += 1;
            let err = match call() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_transient()
                || attempt >= self.retry.max_attempts
                || self.cancellation.is_cancelled()
            {
                return Err(err);
            }
            let wait = match &err {
                ApiError::Transient {
                    retry_after: Some(wait),
                    ..
                } => (*wait).min(self.retry.max_backoff),
                _ => self.retry.backoff_for(attempt),
            };
            debug!(attempt, wait_ms = wait.as_millis() as u64, error = %err, "retrying CloudHealth call");
            self.sleeper.sleep(wait);
        }
    }
}
