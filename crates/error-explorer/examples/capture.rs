// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: capture errors and messages with the Error Explorer SDK.
//!
//! Run with:
//!   ERROR_EXPLORER_TOKEN=ee_xxx cargo run --example capture -p error-explorer

use std::time::Duration;

use error_explorer::{
	Breadcrumb, BreadcrumbLevel, CaptureContext, ErrorExplorer, Options, Severity, UserContext,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let mut options = Options::from_env()?;
	options.release = Some("0.1.0-example".to_string());
	options.server_name = Some("example-server".to_string());
	options.debug = true;

	let explorer = ErrorExplorer::new();
	explorer.init(options)?;

	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer())
		.with(explorer.tracing_layer())
		.init();

	explorer.set_user(UserContext {
		id: Some("user_example_123".to_string()),
		username: Some("example_user".to_string()),
		..Default::default()
	});
	explorer.set_tag("example", "true");

	explorer.add_breadcrumb(Breadcrumb::new("Application started").with_category("startup"));
	explorer.add_breadcrumb(
		Breadcrumb::new("GET /api/data?token=abc123 failed")
			.with_category("http")
			.with_level(BreadcrumbLevel::Warning),
	);
	tracing::info!(target: "example", step = 3, "loading configuration");

	let id = explorer
		.capture_message("Example message from error-explorer", Severity::Warning)
		.await;
	println!("captured message: {id}");

	let err = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml not found");
	let id = explorer
		.capture_error_with(
			&err,
			CaptureContext::new()
				.extra("path", "/etc/example/config.toml")
				.extra("password", "never-sent"),
		)
		.await;
	println!("captured error: {id}");

	tracing::error!(target: "example", attempts = 3, "giving up on upstream");

	let drained = explorer.close(Duration::from_secs(5)).await;
	println!("closed, all events delivered: {drained}");
	Ok(())
}
