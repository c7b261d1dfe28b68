// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The client applications hold on to.

use std::sync::Arc;
use std::time::Duration;

use error_explorer_core::{Breadcrumb, EventId, Severity, UserContext};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::backtrace::capture_frames;
use crate::capture::{CaptureSource, CapturedError};
use crate::error::Result;
use crate::layer::ErrorExplorerLayer;
use crate::options::Options;
use crate::panic_hook::PanicCaptureSource;
use crate::pipeline::{EventInput, Pipeline};
use crate::queue::{EventSender, FlushOutcome};
use crate::scope::{CaptureContext, Scope, ScopeGuard};
use crate::transport::Transport;

/// Error Explorer client.
///
/// Cheap to clone; clones share state. Every method is safe to call before
/// [`init`](Self::init) or after [`close`](Self::close): captures return an
/// empty [`EventId`] and scope changes are ignored.
///
/// ```no_run
/// use error_explorer::{ErrorExplorer, Options};
///
/// # async fn run() -> error_explorer::Result<()> {
/// let client = ErrorExplorer::new();
/// client.init(Options::builder().token("ee_abc").release("1.0.0").build())?;
///
/// client.set_tag("region", "eu-west-1");
/// let err = std::io::Error::other("disk full");
/// let event_id = client.capture_error(&err).await;
///
/// client.close(std::time::Duration::from_secs(2)).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ErrorExplorer {
	inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
	pipeline: RwLock<Option<Arc<Pipeline>>>,
	sources: Mutex<Vec<Arc<dyn CaptureSource>>>,
	layer: ErrorExplorerLayer,
}

impl ErrorExplorer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Validates `options`, wires the transport and starts capture sources.
	///
	/// A second call while initialized logs a warning and changes nothing.
	/// On error nothing is initialized.
	pub fn init(&self, options: Options) -> Result<()> {
		if self.is_initialized() {
			warn!("error explorer already initialized, ignoring init");
			return Ok(());
		}

		let transport = Transport::from_options(&options)?;
		info!(
			endpoint_host = transport.url().host_str().unwrap_or_default(),
			environment = %options.environment,
			signing = transport.is_signing(),
			"error explorer initialized"
		);
		self.init_with_sender(options, Arc::new(transport));
		Ok(())
	}

	pub(crate) fn init_with_sender(&self, options: Options, sender: Arc<dyn EventSender>) {
		let mut slot = self.inner.pipeline.write();
		if slot.is_some() {
			warn!("error explorer already initialized, ignoring init");
			return;
		}

		let pipeline = Arc::new(Pipeline::new(options, sender));
		if pipeline.options.auto_capture.panics {
			pipeline.add_source(Arc::new(PanicCaptureSource::new()));
		}
		pipeline.add_source(Arc::new(self.inner.layer.clone()));
		for source in self.inner.sources.lock().iter() {
			pipeline.add_source(Arc::clone(source));
		}
		pipeline.start_sources();

		*slot = Some(pipeline);
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.pipeline.read().is_some()
	}

	/// Registers a capture source. It is started at the next `init`, or right
	/// away when already initialized, and stopped at `close`.
	pub fn add_source(&self, source: Arc<dyn CaptureSource>) {
		self.inner.sources.lock().push(Arc::clone(&source));
		if let Some(pipeline) = self.pipeline() {
			pipeline.add_source(Arc::clone(&source));
			source.start(crate::capture::CaptureSink::new(&pipeline));
		}
	}

	/// A tracing layer bound to this client. Register it with a subscriber;
	/// it reports while the client is initialized.
	pub fn tracing_layer(&self) -> ErrorExplorerLayer {
		self.inner.layer.clone()
	}

	/// Captures an error value with a fresh backtrace.
	pub async fn capture_error<E>(&self, error: &E) -> EventId
	where
		E: std::error::Error + ?Sized,
	{
		self.capture_error_with(error, CaptureContext::new()).await
	}

	pub async fn capture_error_with<E>(&self, error: &E, ctx: CaptureContext) -> EventId
	where
		E: std::error::Error + ?Sized,
	{
		let Some(pipeline) = self.pipeline_or_warn() else {
			return EventId::empty();
		};

		let mut chain = Vec::new();
		let mut source = error.source();
		while let Some(cause) = source {
			chain.push(Value::String(cause.to_string()));
			source = cause.source();
		}
		let mut extra = Map::new();
		if !chain.is_empty() {
			extra.insert("error_chain".to_string(), Value::Array(chain));
		}

		let (frames, stack_text) = capture_frames();
		let input = EventInput {
			message: error.to_string(),
			exception_class: Some(std::any::type_name::<E>().to_string()),
			frames,
			stack_trace: Some(stack_text),
			severity: Severity::Error,
			extra,
		};
		pipeline.capture(input, ctx).await
	}

	/// Captures an exception described by name and message, with a fresh
	/// backtrace.
	pub async fn capture_exception(
		&self,
		name: impl Into<String>,
		message: impl Into<String>,
		ctx: CaptureContext,
	) -> EventId {
		let Some(pipeline) = self.pipeline_or_warn() else {
			return EventId::empty();
		};

		let (frames, stack_text) = capture_frames();
		let input = EventInput {
			message: message.into(),
			exception_class: Some(name.into()).filter(|name: &String| !name.is_empty()),
			frames,
			stack_trace: Some(stack_text),
			..EventInput::default()
		};
		pipeline.capture(input, ctx).await
	}

	pub async fn capture_message(&self, message: impl Into<String>, level: Severity) -> EventId {
		self.capture_message_with(message, level, CaptureContext::new()).await
	}

	/// Captures a plain message. No exception class and no frames.
	pub async fn capture_message_with(
		&self,
		message: impl Into<String>,
		level: Severity,
		ctx: CaptureContext,
	) -> EventId {
		let Some(pipeline) = self.pipeline_or_warn() else {
			return EventId::empty();
		};

		let input = EventInput {
			message: message.into(),
			severity: level,
			..EventInput::default()
		};
		pipeline.capture(input, ctx).await
	}

	/// Entry point for adapters that describe failures themselves.
	pub async fn report(&self, captured: CapturedError) -> EventId {
		let Some(pipeline) = self.pipeline_or_warn() else {
			return EventId::empty();
		};
		pipeline.capture(EventInput::from(captured), CaptureContext::new()).await
	}

	pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
		if let Some(pipeline) = self.pipeline() {
			pipeline.breadcrumbs.add(breadcrumb);
		}
	}

	pub fn clear_breadcrumbs(&self) {
		if let Some(pipeline) = self.pipeline() {
			pipeline.breadcrumbs.clear();
		}
	}

	pub fn set_user(&self, user: UserContext) {
		self.update_scope(|scope| scope.user = Some(user));
	}

	pub fn clear_user(&self) {
		self.update_scope(|scope| scope.user = None);
	}

	pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
		let (key, value) = (key.into(), value.into());
		self.update_scope(|scope| {
			scope.tags.insert(key, value);
		});
	}

	pub fn set_tags<I, K, V>(&self, tags: I)
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let tags: Vec<(String, String)> = tags.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
		self.update_scope(|scope| scope.tags.extend(tags));
	}

	pub fn remove_tag(&self, key: &str) {
		self.update_scope(|scope| {
			scope.tags.remove(key);
		});
	}

	pub fn set_extra(&self, key: impl Into<String>, value: impl Into<Value>) {
		let (key, value) = (key.into(), value.into());
		self.update_scope(|scope| {
			scope.extra.insert(key, value);
		});
	}

	/// Sets a named context such as `os` or `runtime`.
	pub fn set_context(&self, name: impl Into<String>, context: impl Into<Value>) {
		let (name, context) = (name.into(), context.into());
		self.update_scope(|scope| {
			scope.contexts.insert(name, context);
		});
	}

	/// Pushes an isolated scope. Everything set until the returned guard is
	/// dropped is discarded afterwards, including breadcrumbs.
	///
	/// ```no_run
	/// # async fn run(client: error_explorer::ErrorExplorer) {
	/// use error_explorer::{Breadcrumb, UserContext};
	///
	/// {
	///     let scope = client.push_scope();
	///     scope.set_tag("job", "nightly-export");
	///     scope.set_user(UserContext::with_id("99999"));
	///     scope.add_breadcrumb(Breadcrumb::new("export started").with_category("job"));
	///     client.capture_message("export stalled", error_explorer::Severity::Warning).await;
	/// }
	/// // "job", the user and the breadcrumb are gone again here.
	/// # }
	/// ```
	pub fn push_scope(&self) -> ScopeGuard {
		ScopeGuard::push(self.pipeline().as_ref())
	}

	/// Records connectivity. Going back online flushes the delivery queue and
	/// returns its outcome.
	pub async fn set_online(&self, online: bool) -> Option<FlushOutcome> {
		let pipeline = self.pipeline()?;
		pipeline.queue.set_online(online).await
	}

	pub fn is_online(&self) -> bool {
		self.pipeline().map_or(true, |pipeline| pipeline.queue.is_online())
	}

	/// Events waiting in the delivery queue.
	pub fn queue_len(&self) -> usize {
		self.pipeline().map_or(0, |pipeline| pipeline.queue.len())
	}

	/// Waits for in-flight deliveries and flushes the queue. `false` when the
	/// timeout elapsed or events remain queued. Sends still running at the
	/// timeout are left to finish in the background.
	pub async fn flush(&self, timeout: Duration) -> bool {
		match self.pipeline() {
			Some(pipeline) => pipeline.flush(timeout).await,
			None => true,
		}
	}

	/// Stops capture sources, flushes, and returns the client to its
	/// uninitialized state. `init` may be called again afterwards.
	pub async fn close(&self, timeout: Duration) -> bool {
		let Some(pipeline) = self.inner.pipeline.write().take() else {
			debug!("close called while not initialized");
			return true;
		};

		pipeline.stop_sources();
		let drained = pipeline.flush(timeout).await;
		let dropped = pipeline.queue.clear();
		info!(drained, dropped, "error explorer closed");
		drained
	}

	fn pipeline(&self) -> Option<Arc<Pipeline>> {
		self.inner.pipeline.read().clone()
	}

	fn pipeline_or_warn(&self) -> Option<Arc<Pipeline>> {
		let pipeline = self.pipeline();
		if pipeline.is_none() {
			warn!("capture called before init, event ignored");
		}
		pipeline
	}

	fn update_scope(&self, f: impl FnOnce(&mut Scope)) {
		if let Some(pipeline) = self.pipeline() {
			f(&mut pipeline.scope.write());
		}
	}
}

impl std::fmt::Debug for ErrorExplorer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ErrorExplorer")
			.field("initialized", &self.is_initialized())
			.field("queue_len", &self.queue_len())
			.finish()
	}
}
