// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic capture across runtime shutdown. Kept in its own binary because the
//! panic hook is process-wide.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use error_explorer::{ErrorExplorer, Options};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn panic_that_escapes_a_runtime_is_delivered_on_flush() {
	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(1)
		.enable_all()
		.build()
		.unwrap();
	let server = runtime.block_on(async {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/api/v1/webhook/ee_abc"))
			.respond_with(ResponseTemplate::new(200))
			.mount(&server)
			.await;
		server
	});

	let client = ErrorExplorer::new();
	client
		.init(
			Options::builder()
				.endpoint(format!("{}/api/v1/webhook", server.uri()))
				.token("ee_abc")
				.environment("test")
				.max_retries(0)
				.capture_panics(true)
				.build(),
		)
		.unwrap();

	// The hook runs inside this runtime, which is torn down before its
	// delivery task is ever polled.
	let crashing = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.unwrap();
	let result = panic::catch_unwind(AssertUnwindSafe(|| {
		crashing.block_on(async { panic!("fatal crash in main") })
	}));
	assert!(result.is_err());
	drop(crashing);
	assert_eq!(client.queue_len(), 1);

	runtime.block_on(async move {
		assert!(client.flush(TIMEOUT).await);
		assert_eq!(client.queue_len(), 0);

		let requests = server.received_requests().await.unwrap();
		assert_eq!(requests.len(), 1);
		let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
		assert!(body["message"].as_str().unwrap().starts_with("fatal crash in main at "));
		assert_eq!(body["severity"], "fatal");
		assert_eq!(body["exception_class"], "panic");

		assert!(client.close(TIMEOUT).await);
	});
}
