// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry logic with exponential backoff for HTTP requests.

use std::time::Duration;
use tracing::warn;

/// Backoff policy: the first try plus up to `max_retries` more, waiting
/// `base_delay * backoff_factor^i` (capped at `max_delay`) after failed try `i`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_secs(30),
			backoff_factor: 2.0,
			jitter: false,
		}
	}
}

impl RetryConfig {
	/// Total number of tries, including the first one.
	pub fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}

	/// Sum of all backoff sleeps when every try fails (jitter disabled).
	pub fn total_backoff(&self) -> Duration {
		(0..self.max_retries)
			.map(|attempt| delay_without_jitter(self, attempt))
			.sum()
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		// Anything that is not a malformed request is worth another try.
		!self.is_builder()
	}
}

fn delay_without_jitter(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential_delay = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	Duration::from_secs_f64(exponential_delay.min(cfg.max_delay.as_secs_f64()))
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let delay = delay_without_jitter(cfg, attempt);

	if cfg.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
	} else {
		delay
	}
}

/// Runs `f` until it succeeds, returns a non-retryable error, or the retry
/// budget is spent. The last error is returned on exhaustion.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Debug,
{
	let max_attempts = cfg.max_attempts();
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(
							error = ?err,
							attempt = attempt,
							"non-retryable error encountered"
					);
					return Err(err);
				}

				if attempt >= max_attempts {
					warn!(
							error = ?err,
							attempt = attempt,
							max_attempts = max_attempts,
							"max retry attempts exhausted"
					);
					return Err(err);
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
						error = ?err,
						attempt = attempt,
						max_attempts = max_attempts,
						delay_ms = delay.as_millis(),
						"retrying after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}
