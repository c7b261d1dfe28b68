// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SDK options.
//!
//! Options can be built in code ([`Options::builder`]), deserialized from TOML
//! ([`Options::from_toml_str`], [`Options::from_file`]) or read from the
//! environment ([`Options::from_env`]). Every field has a default; only a token
//! or DSN is required, and that is checked at init.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use error_explorer_common_http::RetryConfig;
use error_explorer_common_secret::{load_env, load_secret_env, SecretString};
use error_explorer_core::ErrorEvent;
use reqwest::Url;
use serde::Deserialize;

use crate::error::ConfigError;

/// Base URL the project token is appended to.
pub const DEFAULT_ENDPOINT: &str = "https://error-explorer.com/api/v1/webhook";
pub const DEFAULT_ENVIRONMENT: &str = "production";
pub const DEFAULT_MAX_BREADCRUMBS: usize = 50;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type BeforeSendFn = dyn Fn(ErrorEvent) -> Result<Option<ErrorEvent>, BoxError> + Send + Sync;

/// Hook run on every event before it is scrubbed and delivered.
///
/// Return `Ok(Some(event))` to send (possibly modified), `Ok(None)` to drop it.
/// An `Err` or a panic inside the hook sends the original event unchanged.
#[derive(Clone)]
pub struct BeforeSend(Arc<BeforeSendFn>);

impl BeforeSend {
	pub fn new<F>(f: F) -> Self
	where
		F: Fn(ErrorEvent) -> Result<Option<ErrorEvent>, BoxError> + Send + Sync + 'static,
	{
		Self(Arc::new(f))
	}

	pub(crate) fn call(&self, event: ErrorEvent) -> Result<Option<ErrorEvent>, BoxError> {
		(self.0)(event)
	}
}

impl fmt::Debug for BeforeSend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("BeforeSend(..)")
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitOptions {
	pub max_requests: usize,
	pub window_ms: u64,
}

impl Default for RateLimitOptions {
	fn default() -> Self {
		Self {
			max_requests: 10,
			window_ms: 60_000,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoCaptureOptions {
	/// Install a panic hook at init.
	pub panics: bool,
}

impl Default for AutoCaptureOptions {
	fn default() -> Self {
		Self { panics: true }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
	pub token: Option<SecretString>,
	/// Full endpoint URL; takes precedence over `token`.
	pub dsn: Option<SecretString>,
	pub endpoint: String,
	pub project: Option<String>,
	pub server_name: Option<String>,
	pub environment: String,
	pub release: Option<String>,
	/// Additional attempts after the first failed delivery.
	pub max_retries: u32,
	pub retry_base_delay_ms: u64,
	pub request_timeout_ms: u64,
	pub max_breadcrumbs: usize,
	/// Extra sensitive field names, added to the scrubber defaults.
	pub scrub_fields: Vec<String>,
	pub hmac_secret: Option<SecretString>,
	pub hmac_algorithm: String,
	pub rate_limit: RateLimitOptions,
	/// Queue events whose delivery failed instead of dropping them.
	pub offline_queue: bool,
	pub debug: bool,
	/// Send user email and IP address.
	pub send_default_pii: bool,
	pub auto_capture: AutoCaptureOptions,
	#[serde(skip)]
	pub before_send: Option<BeforeSend>,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			token: None,
			dsn: None,
			endpoint: DEFAULT_ENDPOINT.to_string(),
			project: None,
			server_name: None,
			environment: DEFAULT_ENVIRONMENT.to_string(),
			release: None,
			max_retries: 3,
			retry_base_delay_ms: 100,
			request_timeout_ms: 5_000,
			max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
			scrub_fields: Vec::new(),
			hmac_secret: None,
			hmac_algorithm: "sha256".to_string(),
			rate_limit: RateLimitOptions::default(),
			offline_queue: true,
			debug: false,
			send_default_pii: false,
			auto_capture: AutoCaptureOptions::default(),
			before_send: None,
		}
	}
}

impl Options {
	pub fn builder() -> OptionsBuilder {
		OptionsBuilder::new()
	}

	pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(s)?)
	}

	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&content)
	}

	/// Reads `ERROR_EXPLORER_*` variables over the defaults. The token, DSN and
	/// HMAC secret also honor the `*_FILE` variants; an unreadable secret file
	/// is an [`ErrorExplorerError::SecretEnv`](crate::ErrorExplorerError::SecretEnv).
	pub fn from_env() -> crate::Result<Self> {
		let mut options = Self {
			token: load_secret_env("ERROR_EXPLORER_TOKEN")?,
			dsn: load_secret_env("ERROR_EXPLORER_DSN")?,
			hmac_secret: load_secret_env("ERROR_EXPLORER_HMAC_SECRET")?,
			release: load_env("ERROR_EXPLORER_RELEASE"),
			..Self::default()
		};
		if let Some(endpoint) = load_env("ERROR_EXPLORER_ENDPOINT") {
			options.endpoint = endpoint;
		}
		if let Some(environment) = load_env("ERROR_EXPLORER_ENVIRONMENT") {
			options.environment = environment;
		}
		if let Some(debug) = load_env("ERROR_EXPLORER_DEBUG") {
			options.debug = matches!(debug.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
		}
		Ok(options)
	}

	/// Delivery URL: the DSN when set, otherwise `{endpoint}/{token}`.
	pub fn resolve_endpoint(&self) -> Result<Url, ConfigError> {
		let raw = match (&self.dsn, &self.token) {
			(Some(dsn), _) if !dsn.expose().trim().is_empty() => dsn.expose().trim().to_string(),
			(_, Some(token)) if !token.expose().trim().is_empty() => format!(
				"{}/{}",
				self.endpoint.trim().trim_end_matches('/'),
				token.expose().trim().trim_matches('/')
			),
			_ => return Err(ConfigError::MissingCredentials),
		};

		let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidEndpoint { reason: e.to_string() })?;
		match url.scheme() {
			"http" | "https" => Ok(url),
			scheme => Err(ConfigError::InvalidEndpoint {
				reason: format!("unsupported scheme {scheme}"),
			}),
		}
	}

	pub fn retry_config(&self) -> RetryConfig {
		RetryConfig {
			max_retries: self.max_retries,
			base_delay: Duration::from_millis(self.retry_base_delay_ms),
			..RetryConfig::default()
		}
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}
}

/// Builder for [`Options`].
#[derive(Debug, Default)]
pub struct OptionsBuilder {
	options: Options,
}

impl OptionsBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Project token, appended to the endpoint.
	///
	/// Example: `ee_e513876a065d...`
	pub fn token(mut self, token: impl Into<SecretString>) -> Self {
		self.options.token = Some(token.into());
		self
	}

	/// Full endpoint URL, used as-is.
	pub fn dsn(mut self, dsn: impl Into<SecretString>) -> Self {
		self.options.dsn = Some(dsn.into());
		self
	}

	pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.options.endpoint = endpoint.into();
		self
	}

	pub fn project(mut self, project: impl Into<String>) -> Self {
		self.options.project = Some(project.into());
		self
	}

	pub fn server_name(mut self, name: impl Into<String>) -> Self {
		self.options.server_name = Some(name.into());
		self
	}

	/// Example: `production`, `staging`, `development`
	pub fn environment(mut self, environment: impl Into<String>) -> Self {
		self.options.environment = environment.into();
		self
	}

	/// Example: `1.2.3` or a git commit SHA
	pub fn release(mut self, release: impl Into<String>) -> Self {
		self.options.release = Some(release.into());
		self
	}

	pub fn max_retries(mut self, max_retries: u32) -> Self {
		self.options.max_retries = max_retries;
		self
	}

	pub fn retry_base_delay(mut self, delay: Duration) -> Self {
		self.options.retry_base_delay_ms = delay.as_millis() as u64;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.options.request_timeout_ms = timeout.as_millis() as u64;
		self
	}

	pub fn max_breadcrumbs(mut self, max: usize) -> Self {
		self.options.max_breadcrumbs = max;
		self
	}

	pub fn scrub_fields<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.options.scrub_fields.extend(fields.into_iter().map(Into::into));
		self
	}

	/// Enables request signing.
	pub fn hmac(mut self, secret: impl Into<SecretString>, algorithm: impl Into<String>) -> Self {
		self.options.hmac_secret = Some(secret.into());
		self.options.hmac_algorithm = algorithm.into();
		self
	}

	pub fn rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
		self.options.rate_limit = RateLimitOptions {
			max_requests,
			window_ms: window.as_millis() as u64,
		};
		self
	}

	pub fn offline_queue(mut self, enabled: bool) -> Self {
		self.options.offline_queue = enabled;
		self
	}

	pub fn debug(mut self, debug: bool) -> Self {
		self.options.debug = debug;
		self
	}

	pub fn send_default_pii(mut self, enabled: bool) -> Self {
		self.options.send_default_pii = enabled;
		self
	}

	pub fn capture_panics(mut self, enabled: bool) -> Self {
		self.options.auto_capture.panics = enabled;
		self
	}

	pub fn before_send<F>(mut self, hook: F) -> Self
	where
		F: Fn(ErrorEvent) -> Result<Option<ErrorEvent>, BoxError> + Send + Sync + 'static,
	{
		self.options.before_send = Some(BeforeSend::new(hook));
		self
	}

	pub fn build(self) -> Options {
		self.options
	}
}
