// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Signed HTTP delivery of events to the collector.

use std::time::Duration;

use async_trait::async_trait;
use error_explorer_common_http::{retry, RetryConfig};
use error_explorer_core::ErrorEvent;
use error_explorer_signature::Signer;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

use crate::error::{ConfigError, TransportError};
use crate::options::Options;
use crate::queue::EventSender;

/// Posts serialized events to the collector.
///
/// Each event is serialized once; those exact bytes are signed (when a signer
/// is configured) and sent on every attempt. Attempts are retried with
/// exponential backoff; the transport keeps no state between calls.
#[derive(Debug, Clone)]
pub struct Transport {
	client: Client,
	url: Url,
	signer: Option<Signer>,
	retry: RetryConfig,
}

impl Transport {
	pub fn new(url: Url, signer: Option<Signer>, retry: RetryConfig, timeout: Duration) -> Result<Self, ConfigError> {
		let client = error_explorer_common_http::builder()
			.timeout(timeout)
			.build()
			.map_err(ConfigError::HttpClient)?;

		Ok(Self {
			client,
			url,
			signer,
			retry,
		})
	}

	/// Resolves the endpoint and signer from options.
	pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
		let url = options.resolve_endpoint()?;
		let signer = match &options.hmac_secret {
			Some(secret) if !secret.is_empty() => Some(Signer::from_name(secret.clone(), &options.hmac_algorithm)?),
			_ => None,
		};
		Self::new(url, signer, options.retry_config(), options.request_timeout())
	}

	pub fn url(&self) -> &Url {
		&self.url
	}

	pub fn is_signing(&self) -> bool {
		self.signer.is_some()
	}

	/// Delivers one event, retrying failed attempts.
	pub async fn deliver(&self, event: &ErrorEvent) -> Result<(), TransportError> {
		let body = event.to_json_bytes()?;

		let client = &self.client;
		let url = &self.url;
		let signer = self.signer.as_ref();
		let body = body.as_slice();

		retry(&self.retry, move || async move {
			let mut request = client
				.post(url.clone())
				.header(CONTENT_TYPE, "application/json")
				.body(body.to_vec());

			if let Some(signer) = signer {
				let headers = signer.build_headers(body, None);
				for (name, value) in headers.pairs() {
					request = request.header(name, value);
				}
			}

			let response = request.send().await?;
			let status = response.status();
			if status.is_success() {
				Ok(())
			} else {
				Err(TransportError::Status {
					status: status.as_u16(),
				})
			}
		})
		.await
	}
}

#[async_trait]
impl EventSender for Transport {
	async fn send(&self, event: &ErrorEvent) -> bool {
		match self.deliver(event).await {
			Ok(()) => {
				debug!(event_id = %event.event_id, "event delivered");
				true
			}
			Err(e) => {
				debug!(event_id = %event.event_id, error = %e, "event delivery failed");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use error_explorer_signature::SigningAlgorithm;

	#[test]
	fn from_options_resolves_token_url() {
		let options = Options::builder()
			.token("ee_abc")
			.endpoint("http://error-explorer.localhost/api/v1/webhook")
			.build();
		let transport = Transport::from_options(&options).unwrap();
		assert!(transport.url().as_str().contains("ee_abc"));
		assert!(!transport.is_signing());
	}

	#[test]
	fn from_options_builds_signer() {
		let options = Options::builder().token("ee_abc").hmac("key", "sha384").build();
		let transport = Transport::from_options(&options).unwrap();
		assert_eq!(transport.signer.as_ref().unwrap().algorithm(), SigningAlgorithm::Sha384);
	}

	#[test]
	fn from_options_rejects_unknown_algorithm() {
		let options = Options::builder().token("ee_abc").hmac("key", "md5").build();
		assert!(matches!(
			Transport::from_options(&options),
			Err(ConfigError::Signature(_))
		));
	}

	#[test]
	fn from_options_requires_credentials() {
		assert!(matches!(
			Transport::from_options(&Options::default()),
			Err(ConfigError::MissingCredentials)
		));
	}
}
