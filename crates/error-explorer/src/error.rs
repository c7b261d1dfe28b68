// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Error Explorer SDK.
//!
//! Only configuration problems surface as errors to the host. Delivery
//! failures are retried, queued or dropped inside the pipeline, and filter-hook
//! failures are swallowed (the event proceeds unmodified).

use error_explorer_common_http::RetryableError;
use error_explorer_common_secret::SecretEnvError;
use error_explorer_core::CoreError;
use error_explorer_signature::SignatureError;
use thiserror::Error;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, ErrorExplorerError>;

/// Errors returned to the host application.
#[derive(Debug, Error)]
pub enum ErrorExplorerError {
	#[error("configuration error: {0}")]
	Configuration(#[from] ConfigError),

	/// A `*_FILE` secret variable could not be read by
	/// [`Options::from_env`](crate::Options::from_env).
	#[error(transparent)]
	SecretEnv(#[from] SecretEnvError),
}

/// Invalid or incomplete [`Options`](crate::Options). Fatal at init; nothing is
/// partially initialized.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("a project token or a DSN is required")]
	MissingCredentials,

	/// The endpoint URL could not be used. The URL itself is not included
	/// because it may embed the token.
	#[error("invalid endpoint: {reason}")]
	InvalidEndpoint { reason: String },

	#[error(transparent)]
	Signature(#[from] SignatureError),

	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[source] reqwest::Error),

	#[error("failed to read options file {path}: {source}")]
	Read {
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse options: {0}")]
	Parse(#[from] toml::de::Error),
}

/// A failed delivery attempt.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("request failed: {0}")]
	Request(#[from] reqwest::Error),

	#[error("collector responded with status {status}")]
	Status { status: u16 },

	#[error("failed to serialize event: {0}")]
	Serialization(#[from] CoreError),
}

impl RetryableError for TransportError {
	fn is_retryable(&self) -> bool {
		match self {
			TransportError::Request(e) => e.is_retryable(),
			// Any non-2xx answer counts as a failed attempt.
			TransportError::Status { .. } => true,
			TransportError::Serialization(_) => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_errors_are_retryable() {
		assert!(TransportError::Status { status: 500 }.is_retryable());
		assert!(TransportError::Status { status: 401 }.is_retryable());
	}

	#[test]
	fn unsupported_algorithm_maps_into_config_error() {
		let err: ErrorExplorerError = ConfigError::from(SignatureError::UnsupportedAlgorithm("md5".into())).into();
		assert!(err.to_string().contains("md5"));
	}

	#[test]
	fn invalid_endpoint_message_has_reason_only() {
		let err = ConfigError::InvalidEndpoint {
			reason: "unsupported scheme ftp".into(),
		};
		assert_eq!(err.to_string(), "invalid endpoint: unsupported scheme ftp");
	}
}
