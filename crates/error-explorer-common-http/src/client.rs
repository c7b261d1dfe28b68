// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Name the SDK reports in the User-Agent and in event payloads.
pub const SDK_NAME: &str = "error-explorer-rust";

/// Creates a new HTTP client builder with the standard SDK User-Agent header.
///
/// # Example
/// ```ignore
/// let client = error_explorer_common_http::builder()
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Returns the standard SDK User-Agent string.
///
/// Format: `error-explorer-rust/{version}`
pub fn user_agent() -> String {
	format!("{SDK_NAME}/{}", env!("CARGO_PKG_VERSION"))
}
