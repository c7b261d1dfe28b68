// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Environment variable helpers for SDK credentials and settings.
//!
//! Secrets follow the `VAR` / `VAR_FILE` convention used by Docker and
//! Kubernetes secret mounts.

use std::path::PathBuf;
use std::{env, fs};

use thiserror::Error;

use crate::Secret;

/// Errors that can occur when loading secrets from environment variables.
#[derive(Debug, Error)]
pub enum SecretEnvError {
	/// Failed to read the secret file.
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The secret file path was empty.
	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// Load a secret using the `VAR` / `VAR_FILE` convention.
///
/// # Precedence
///
/// 1. If `{var}_FILE` is set, read the secret from that file path
/// 2. Otherwise, if `{var}` is set, use its value directly
/// 3. Otherwise, return `Ok(None)`
///
/// A single trailing newline is stripped from file contents; everything else
/// is preserved. Values are returned as found, so an empty token is left for
/// the caller to reject.
///
/// ```no_run
/// use error_explorer_common_secret::load_secret_env;
///
/// // ERROR_EXPLORER_TOKEN_FILE=/run/secrets/ee_token wins over
/// // ERROR_EXPLORER_TOKEN=ee_xxx when both are set.
/// if let Some(token) = load_secret_env("ERROR_EXPLORER_TOKEN")? {
///     println!("token configured: {token}"); // prints "[REDACTED]"
/// }
/// # Ok::<(), error_explorer_common_secret::SecretEnvError>(())
/// ```
pub fn load_secret_env(var: &str) -> Result<Option<Secret<String>>, SecretEnvError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = env::var(&file_var) {
		if path_str.is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|e| SecretEnvError::Io {
			path: path.clone(),
			source: e,
		})?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(Secret::new(secret)));
	}

	if let Ok(value) = env::var(var) {
		return Ok(Some(Secret::new(value)));
	}

	Ok(None)
}

/// Loads a plain (non-secret) setting, treating empty values as unset.
pub fn load_env(var: &str) -> Option<String> {
	env::var(var).ok().filter(|value| !value.is_empty())
}
