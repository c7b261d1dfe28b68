// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-initialization pipeline state and the stages every event passes
//! through: build, filter, scrub, admission, send or queue.

use std::cell::Cell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use error_explorer_common_http::SDK_NAME;
use error_explorer_core::{ErrorEvent, EventId, Frame, SdkInfo, Severity};
use error_explorer_scrub::Scrubber;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::backtrace::{culprit, parse_stack_text};
use crate::breadcrumbs::BreadcrumbRing;
use crate::capture::{CaptureSink, CaptureSource, CapturedError};
use crate::limiter::RateLimiter;
use crate::options::Options;
use crate::queue::{DeliveryQueue, EventSender};
use crate::scope::{CaptureContext, Scope};

thread_local! {
	static PROCESSING: Cell<bool> = const { Cell::new(false) };
}

/// True while the current thread is inside the pipeline. Capture sources use
/// this to ignore panics and log events raised by the SDK itself.
pub(crate) fn is_processing() -> bool {
	PROCESSING.with(Cell::get)
}

struct ProcessingGuard {
	previous: bool,
}

impl ProcessingGuard {
	fn enter() -> Self {
		Self {
			previous: PROCESSING.with(|p| p.replace(true)),
		}
	}
}

impl Drop for ProcessingGuard {
	fn drop(&mut self) {
		let previous = self.previous;
		PROCESSING.with(|p| p.set(previous));
	}
}

/// Where an event ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
	Sent,
	Queued,
	Dropped,
}

/// Raw material for an event, before scope and context are merged in.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventInput {
	pub message: String,
	pub exception_class: Option<String>,
	pub frames: Vec<Frame>,
	pub stack_trace: Option<String>,
	pub severity: Severity,
	pub extra: Map<String, Value>,
}

impl From<CapturedError> for EventInput {
	fn from(captured: CapturedError) -> Self {
		let frames = captured
			.stack_text
			.as_deref()
			.map(parse_stack_text)
			.unwrap_or_default();
		Self {
			message: captured.message,
			exception_class: Some(captured.error_name).filter(|name| !name.is_empty()),
			frames,
			stack_trace: captured.stack_text,
			severity: captured.severity,
			extra: Map::new(),
		}
	}
}

pub(crate) struct Pipeline {
	pub(crate) options: Options,
	sdk: SdkInfo,
	pub(crate) breadcrumbs: BreadcrumbRing,
	pub(crate) scope: RwLock<Scope>,
	scrubber: Scrubber,
	limiter: RateLimiter,
	pub(crate) queue: Arc<DeliveryQueue>,
	sender: Arc<dyn EventSender>,
	sources: Mutex<Vec<Arc<dyn CaptureSource>>>,
	in_flight: Arc<InFlightTracker>,
}

impl Pipeline {
	pub(crate) fn new(options: Options, sender: Arc<dyn EventSender>) -> Self {
		let mut scrubber = Scrubber::new();
		scrubber.add_fields(&options.scrub_fields);

		Self {
			sdk: SdkInfo {
				name: SDK_NAME.to_string(),
				version: env!("CARGO_PKG_VERSION").to_string(),
			},
			breadcrumbs: BreadcrumbRing::new(options.max_breadcrumbs),
			scope: RwLock::new(Scope::default()),
			scrubber,
			limiter: RateLimiter::new(
				options.rate_limit.max_requests,
				Duration::from_millis(options.rate_limit.window_ms),
			),
			queue: Arc::new(DeliveryQueue::new(Arc::clone(&sender))),
			sender,
			sources: Mutex::new(Vec::new()),
			in_flight: Arc::new(InFlightTracker::default()),
			options,
		}
	}

	/// Builds, filters and scrubs an event. `None` means the `before_send`
	/// hook dropped it.
	pub(crate) fn process(&self, input: EventInput, ctx: CaptureContext) -> Option<ErrorEvent> {
		let _guard = ProcessingGuard::enter();
		let event = self.build(input, ctx);
		let mut event = self.before_send(event)?;
		self.scrub(&mut event);
		Some(event)
	}

	/// Runs the whole pipeline and waits for the delivery outcome.
	pub(crate) async fn capture(&self, input: EventInput, ctx: CaptureContext) -> EventId {
		match self.process(input, ctx) {
			Some(event) => {
				let event_id = event.event_id.clone();
				self.dispatch(event).await;
				event_id
			}
			None => EventId::empty(),
		}
	}

	/// Runs the synchronous stages on the calling thread and delivers in the
	/// background. Without a Tokio runtime the event is queued for the next
	/// flush. If the runtime shuts down before the background delivery
	/// settles, the event is queued as well.
	pub(crate) fn capture_detached(self: &Arc<Self>, input: EventInput, ctx: CaptureContext) -> EventId {
		let Some(event) = self.process(input, ctx) else {
			return EventId::empty();
		};
		let event_id = event.event_id.clone();
		let pending = PendingDelivery::new(self, event);

		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				let pipeline = Arc::clone(self);
				handle.spawn(async move {
					pipeline.deliver(pending).await;
				});
			}
			Err(_) => {
				debug!(event_id = %event_id, "no async runtime on this thread, queueing event");
				pending.requeue();
			}
		}
		event_id
	}

	/// Admission check, connectivity check, then send. Failed sends are queued
	/// when the offline queue is enabled. The event is tracked from the moment
	/// this is called, so dropping the returned future queues it.
	pub(crate) fn dispatch(&self, event: ErrorEvent) -> impl Future<Output = Delivery> + Send + '_ {
		self.deliver(PendingDelivery::new(self, event))
	}

	async fn deliver(&self, pending: PendingDelivery) -> Delivery {
		let Some(event) = pending.event.as_ref() else {
			return Delivery::Dropped;
		};
		let event_id = event.event_id.clone();

		if !self.limiter.is_allowed() {
			debug!(event_id = %event_id, "rate limit reached, queueing event");
			pending.requeue();
			return Delivery::Queued;
		}

		if !self.queue.is_online() {
			debug!(event_id = %event_id, "offline, queueing event");
			pending.requeue();
			return Delivery::Queued;
		}

		if self.sender.send(event).await {
			pending.settle();
			return Delivery::Sent;
		}

		if self.options.offline_queue {
			pending.requeue();
			return Delivery::Queued;
		}

		pending.settle();
		if self.options.debug {
			warn!(event_id = %event_id, "delivery failed and offline queue is disabled, event dropped");
		} else {
			debug!(event_id = %event_id, "delivery failed and offline queue is disabled, event dropped");
		}
		Delivery::Dropped
	}

	/// Waits for in-flight deliveries, then flushes the queue. `true` when
	/// everything finished within `timeout` and the queue is empty.
	pub(crate) async fn flush(&self, timeout: Duration) -> bool {
		let deadline = tokio::time::Instant::now() + timeout;

		if tokio::time::timeout(timeout, self.in_flight.wait_idle()).await.is_err() {
			warn!(
				timeout_ms = timeout.as_millis() as u64,
				"timed out waiting for in-flight deliveries"
			);
			return false;
		}

		let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
		match self.queue.flush_with_timeout(remaining).await {
			Some(outcome) => outcome.is_drained(),
			None => false,
		}
	}

	pub(crate) fn add_source(&self, source: Arc<dyn CaptureSource>) {
		self.sources.lock().push(source);
	}

	pub(crate) fn start_sources(self: &Arc<Self>) {
		let sources = self.sources.lock().clone();
		for source in sources {
			debug!(source = source.name(), "starting capture source");
			source.start(CaptureSink::new(self));
		}
	}

	pub(crate) fn stop_sources(&self) {
		let sources = std::mem::take(&mut *self.sources.lock());
		for source in sources {
			debug!(source = source.name(), "stopping capture source");
			source.stop();
		}
	}

	fn build(&self, input: EventInput, ctx: CaptureContext) -> ErrorEvent {
		let mut event = ErrorEvent::new(input.message, self.sdk.clone());
		event.exception_class = input.exception_class;
		event.severity = input.severity;
		event.stack_trace = input.stack_trace;
		if let Some(frame) = culprit(&input.frames) {
			event.file = frame.file.clone();
			event.line = frame.line;
		}
		event.frames = input.frames;
		event.extra = input.extra;

		event.environment = self.options.environment.clone();
		event.release = self.options.release.clone();
		event.project = self.options.project.clone();
		event.server_name = self.options.server_name.clone();

		self.scope.read().apply(&mut event, ctx);
		event.breadcrumbs = self.breadcrumbs.get_all();

		if !self.options.send_default_pii {
			if let Some(user) = event.user.as_mut() {
				user.strip_pii();
			}
		}

		event
	}

	fn before_send(&self, event: ErrorEvent) -> Option<ErrorEvent> {
		let Some(hook) = &self.options.before_send else {
			return Some(event);
		};

		let original = event.clone();
		match catch_unwind(AssertUnwindSafe(|| hook.call(event))) {
			Ok(Ok(Some(event))) => Some(event),
			Ok(Ok(None)) => {
				debug!(event_id = %original.event_id, "event dropped by before_send");
				None
			}
			Ok(Err(e)) => {
				warn!(event_id = %original.event_id, error = %e, "before_send failed, sending the original event");
				Some(original)
			}
			Err(_) => {
				warn!(event_id = %original.event_id, "before_send panicked, sending the original event");
				Some(original)
			}
		}
	}

	fn scrub(&self, event: &mut ErrorEvent) {
		let scrubber = &self.scrubber;

		scrubber.scrub_string_in_place(&mut event.message);
		scrubber.scrub_map(&mut event.extra);
		scrubber.scrub_map(&mut event.contexts);
		scrubber.scrub_string_pairs(event.tags.iter_mut());

		if let Some(user) = event.user.as_mut() {
			scrubber.scrub_map(&mut user.data);
		}

		if let Some(request) = event.request.as_mut() {
			if let Some(url) = request.url.as_mut() {
				scrubber.scrub_string_in_place(url);
			}
			if let Some(query) = request.query_string.as_mut() {
				// Bare query strings have no leading `?`.
				let mut prefixed = format!("?{query}");
				scrubber.scrub_string_in_place(&mut prefixed);
				*query = prefixed.split_off(1);
			}
			scrubber.scrub_string_pairs(request.headers.iter_mut());
			if let Some(data) = request.data.as_mut() {
				scrubber.scrub_in_place(data);
			}
		}

		for crumb in &mut event.breadcrumbs {
			if let Some(message) = crumb.message.as_mut() {
				scrubber.scrub_string_in_place(message);
			}
			scrubber.scrub_map(&mut crumb.data);
		}
	}
}

/// An event owned by one delivery attempt, counted as in flight until it is
/// settled or requeued. Dropping it unsettled, as happens when a runtime
/// cancels the delivery task, puts the event back in the queue.
struct PendingDelivery {
	queue: Arc<DeliveryQueue>,
	event: Option<ErrorEvent>,
	_in_flight: InFlight,
}

impl PendingDelivery {
	fn new(pipeline: &Pipeline, event: ErrorEvent) -> Self {
		Self {
			queue: Arc::clone(&pipeline.queue),
			event: Some(event),
			_in_flight: pipeline.in_flight.enter(),
		}
	}

	fn requeue(mut self) {
		if let Some(event) = self.event.take() {
			self.queue.enqueue(event);
		}
	}

	fn settle(mut self) {
		self.event = None;
	}
}

impl Drop for PendingDelivery {
	fn drop(&mut self) {
		if let Some(event) = self.event.take() {
			debug!(event_id = %event.event_id, "delivery interrupted, queueing event");
			self.queue.enqueue(event);
		}
	}
}

#[derive(Default)]
struct InFlightTracker {
	count: AtomicUsize,
	idle: Notify,
}

impl InFlightTracker {
	fn enter(self: &Arc<Self>) -> InFlight {
		self.count.fetch_add(1, Ordering::SeqCst);
		InFlight(Arc::clone(self))
	}

	async fn wait_idle(&self) {
		loop {
			let notified = self.idle.notified();
			if self.count.load(Ordering::SeqCst) == 0 {
				return;
			}
			notified.await;
		}
	}
}

/// Counts one delivery as in flight until dropped.
struct InFlight(Arc<InFlightTracker>);

impl Drop for InFlight {
	fn drop(&mut self) {
		if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
			self.0.idle.notify_waiters();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use error_explorer_core::{Breadcrumb, RequestContext, UserContext};
	use serde_json::json;
	use std::sync::atomic::AtomicBool;

	#[derive(Default)]
	struct MockSender {
		fail: AtomicBool,
		sent: Mutex<Vec<ErrorEvent>>,
	}

	#[async_trait]
	impl EventSender for MockSender {
		async fn send(&self, event: &ErrorEvent) -> bool {
			if self.fail.load(Ordering::SeqCst) {
				return false;
			}
			self.sent.lock().push(event.clone());
			true
		}
	}

	fn setup(options: Options) -> (Arc<Pipeline>, Arc<MockSender>) {
		let sender = Arc::new(MockSender::default());
		(Arc::new(Pipeline::new(options, sender.clone())), sender)
	}

	fn input(message: &str) -> EventInput {
		EventInput {
			message: message.to_string(),
			exception_class: Some("IoError".to_string()),
			..EventInput::default()
		}
	}

	#[tokio::test]
	async fn event_carries_options_scope_and_breadcrumbs() {
		let options = Options::builder()
			.environment("staging")
			.release("1.2.3")
			.project("shop")
			.build();
		let (pipeline, sender) = setup(options);
		pipeline.breadcrumbs.add(Breadcrumb::new("step 1"));
		pipeline.scope.write().tags.insert("region".into(), "eu".into());

		let id = pipeline.capture(input("boom"), CaptureContext::new()).await;
		assert!(!id.is_empty());

		let sent = sender.sent.lock();
		let event = &sent[0];
		assert_eq!(event.event_id, id);
		assert_eq!(event.environment, "staging");
		assert_eq!(event.release.as_deref(), Some("1.2.3"));
		assert_eq!(event.project.as_deref(), Some("shop"));
		assert_eq!(event.tags["region"], "eu");
		assert_eq!(event.breadcrumbs[0].message.as_deref(), Some("step 1"));
		assert_eq!(event.sdk.name, "error-explorer-rust");
		assert_eq!(event.exception_class.as_deref(), Some("IoError"));
	}

	#[tokio::test]
	async fn breadcrumbs_are_snapshotted() {
		let (pipeline, _sender) = setup(Options::default());
		pipeline.breadcrumbs.add(Breadcrumb::new("before"));
		let event = pipeline.process(input("x"), CaptureContext::new()).unwrap();
		pipeline.breadcrumbs.add(Breadcrumb::new("after"));
		assert_eq!(event.breadcrumbs.len(), 1);
	}

	#[tokio::test]
	async fn pii_is_stripped_by_default() {
		let (pipeline, _sender) = setup(Options::default());
		let user = UserContext {
			id: Some("42".into()),
			email: Some("a@b.c".into()),
			ip_address: Some("10.0.0.1".into()),
			..UserContext::default()
		};
		let event = pipeline
			.process(input("x"), CaptureContext::new().user(user.clone()))
			.unwrap();
		let stripped = event.user.unwrap();
		assert_eq!(stripped.id.as_deref(), Some("42"));
		assert!(stripped.email.is_none());
		assert!(stripped.ip_address.is_none());

		let (pipeline, _sender) = setup(Options::builder().send_default_pii(true).build());
		let event = pipeline.process(input("x"), CaptureContext::new().user(user)).unwrap();
		assert_eq!(event.user.unwrap().email.as_deref(), Some("a@b.c"));
	}

	#[tokio::test]
	async fn hook_can_mutate_or_veto() {
		let options = Options::builder()
			.before_send(|mut event| {
				if event.message.contains("ignore") {
					return Ok(None);
				}
				event.tags.insert("hooked".into(), "yes".into());
				Ok(Some(event))
			})
			.build();
		let (pipeline, sender) = setup(options);

		assert!(pipeline.capture(input("please ignore"), CaptureContext::new()).await.is_empty());
		assert!(!pipeline.capture(input("keep"), CaptureContext::new()).await.is_empty());

		let sent = sender.sent.lock();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].tags["hooked"], "yes");
	}

	#[tokio::test]
	async fn failing_or_panicking_hook_fails_open() {
		let options = Options::builder()
			.before_send(|event| {
				if event.message == "panic" {
					panic!("hook bug");
				}
				Err("hook error".into())
			})
			.build();
		let (pipeline, sender) = setup(options);

		pipeline.capture(input("error"), CaptureContext::new()).await;
		pipeline.capture(input("panic"), CaptureContext::new()).await;

		let messages: Vec<String> = sender.sent.lock().iter().map(|e| e.message.clone()).collect();
		assert_eq!(messages, vec!["error", "panic"]);
	}

	#[tokio::test]
	async fn scrubs_every_payload_section() {
		let (pipeline, _sender) = setup(Options::builder().scrub_fields(["session"]).build());
		pipeline
			.breadcrumbs
			.add(Breadcrumb::new("GET /a?token=abc").with_data("password", "p"));

		let ctx = CaptureContext::new()
			.tag("api_key", "k")
			.extra("session_id", "s")
			.extra("note", "Bearer abc")
			.request(RequestContext {
				url: Some("https://x.io/cb?secret=1".into()),
				query_string: Some("token=abc&page=2".into()),
				headers: [("Authorization".to_string(), "Bearer z".to_string())].into(),
				data: Some(json!({ "card_number": "4111111111111111" })),
				..RequestContext::default()
			});
		let event = pipeline
			.process(input("failed for card 4111 1111 1111 1111"), ctx)
			.unwrap();

		assert_eq!(event.message, "failed for card [FILTERED]");
		assert_eq!(event.tags["api_key"], "[FILTERED]");
		assert_eq!(event.extra["session_id"], "[FILTERED]");
		assert_eq!(event.extra["note"], "Bearer [FILTERED]");

		let request = event.request.unwrap();
		assert_eq!(request.url.as_deref(), Some("https://x.io/cb?secret=[FILTERED]"));
		assert_eq!(request.query_string.as_deref(), Some("token=[FILTERED]&page=2"));
		assert_eq!(request.headers["Authorization"], "[FILTERED]");
		assert_eq!(request.data.unwrap()["card_number"], "[FILTERED]");

		let crumb = &event.breadcrumbs[0];
		assert_eq!(crumb.message.as_deref(), Some("GET /a?token=[FILTERED]"));
		assert_eq!(crumb.data["password"], "[FILTERED]");
	}

	#[tokio::test]
	async fn rate_limited_events_are_queued() {
		let (pipeline, sender) = setup(Options::builder().rate_limit(1, Duration::from_secs(60)).build());
		let first = pipeline.process(input("a"), CaptureContext::new()).unwrap();
		let second = pipeline.process(input("b"), CaptureContext::new()).unwrap();

		assert_eq!(pipeline.dispatch(first).await, Delivery::Sent);
		assert_eq!(pipeline.dispatch(second).await, Delivery::Queued);
		assert_eq!(pipeline.queue.len(), 1);
		assert_eq!(sender.sent.lock().len(), 1);
	}

	#[tokio::test]
	async fn offline_events_are_queued_then_flushed() {
		let (pipeline, sender) = setup(Options::default());
		pipeline.queue.set_online(false).await;
		let event = pipeline.process(input("a"), CaptureContext::new()).unwrap();
		assert_eq!(pipeline.dispatch(event).await, Delivery::Queued);
		assert!(sender.sent.lock().is_empty());

		let outcome = pipeline.queue.set_online(true).await.unwrap();
		assert_eq!(outcome.sent, 1);
	}

	#[tokio::test]
	async fn failed_send_is_queued_or_dropped() {
		let (pipeline, sender) = setup(Options::default());
		sender.fail.store(true, Ordering::SeqCst);
		let event = pipeline.process(input("a"), CaptureContext::new()).unwrap();
		assert_eq!(pipeline.dispatch(event).await, Delivery::Queued);

		let (pipeline, sender) = setup(Options::builder().offline_queue(false).build());
		sender.fail.store(true, Ordering::SeqCst);
		let event = pipeline.process(input("a"), CaptureContext::new()).unwrap();
		assert_eq!(pipeline.dispatch(event).await, Delivery::Dropped);
		assert!(pipeline.queue.is_empty());
	}

	#[tokio::test]
	async fn flush_waits_for_detached_deliveries() {
		let (pipeline, sender) = setup(Options::default());
		let id = pipeline.capture_detached(input("bg"), CaptureContext::new());
		assert!(!id.is_empty());
		assert!(pipeline.flush(Duration::from_secs(5)).await);
		assert_eq!(sender.sent.lock().len(), 1);
	}

	#[test]
	fn detached_capture_without_runtime_is_queued() {
		let (pipeline, sender) = setup(Options::default());
		let id = pipeline.capture_detached(input("no runtime"), CaptureContext::new());
		assert!(!id.is_empty());
		assert_eq!(pipeline.queue.len(), 1);
		assert!(sender.sent.lock().is_empty());
	}

	#[test]
	fn detached_delivery_cancelled_by_runtime_shutdown_is_queued() {
		let (pipeline, sender) = setup(Options::default());
		let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
		let id = runtime.block_on(async { pipeline.capture_detached(input("shutdown"), CaptureContext::new()) });
		drop(runtime);

		assert!(sender.sent.lock().is_empty());
		let entries = pipeline.queue.entries();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].event.event_id, id);
	}

	#[tokio::test]
	async fn cancelled_dispatch_leaves_event_queued() {
		let (pipeline, sender) = setup(Options::default());
		let event = pipeline.process(input("cancelled"), CaptureContext::new()).unwrap();
		let dispatch = pipeline.dispatch(event);
		drop(dispatch);

		assert!(sender.sent.lock().is_empty());
		assert_eq!(pipeline.queue.len(), 1);
		assert!(pipeline.flush(Duration::from_secs(5)).await);
		assert_eq!(sender.sent.lock().len(), 1);
	}

	#[test]
	fn captured_error_stack_text_supplies_location() {
		let captured = CapturedError::new("ParseError", "bad input")
			.with_stack_text("0: my_app::parse\n at src/parse.rs:10:3\n1: std::rt::lang_start");
		let (pipeline, _sender) = setup(Options::default());
		let event = pipeline.process(captured.into(), CaptureContext::new()).unwrap();
		assert_eq!(event.file.as_deref(), Some("src/parse.rs"));
		assert_eq!(event.line, Some(10));
		assert_eq!(event.frames.len(), 2);
		assert!(event.stack_trace.is_some());
	}

	#[test]
	fn processing_flag_is_scoped() {
		assert!(!is_processing());
		{
			let _guard = ProcessingGuard::enter();
			assert!(is_processing());
		}
		assert!(!is_processing());
	}
}
