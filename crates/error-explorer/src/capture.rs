// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pluggable capture sources.
//!
//! A [`CaptureSource`] watches for failures the host does not report itself
//! (panics, error-level log events) and hands them to a [`CaptureSink`]. The
//! sink is bound to one initialization of the SDK; after `close` it silently
//! discards reports.

use std::sync::{Arc, Weak};

use error_explorer_core::{Breadcrumb, EventId, Severity};

use crate::pipeline::{EventInput, Pipeline};
use crate::scope::CaptureContext;

/// A failure observed by a capture source, before it becomes an event.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedError {
	pub error_name: String,
	pub message: String,
	/// Backtrace text in the standard library's format, if one was taken.
	pub stack_text: Option<String>,
	pub severity: Severity,
}

impl CapturedError {
	pub fn new(error_name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			error_name: error_name.into(),
			message: message.into(),
			stack_text: None,
			severity: Severity::Error,
		}
	}

	pub fn with_stack_text(mut self, text: impl Into<String>) -> Self {
		self.stack_text = Some(text.into());
		self
	}

	pub fn with_severity(mut self, severity: Severity) -> Self {
		self.severity = severity;
		self
	}
}

/// Something that reports failures into the pipeline on its own.
pub trait CaptureSource: Send + Sync {
	fn name(&self) -> &'static str;

	/// Begin observing. Called once per initialization.
	fn start(&self, sink: CaptureSink);

	/// Stop observing and release any process-wide hooks.
	fn stop(&self);
}

/// Handle a capture source reports through.
#[derive(Clone)]
pub struct CaptureSink {
	pipeline: Weak<Pipeline>,
}

impl CaptureSink {
	pub(crate) fn new(pipeline: &Arc<Pipeline>) -> Self {
		Self {
			pipeline: Arc::downgrade(pipeline),
		}
	}

	/// Runs the event through the pipeline. Delivery happens in the
	/// background; the returned id is empty when the event was dropped or the
	/// SDK has been closed.
	pub fn report(&self, captured: CapturedError) -> EventId {
		self.report_with(captured, CaptureContext::new())
	}

	pub fn report_with(&self, captured: CapturedError, ctx: CaptureContext) -> EventId {
		match self.pipeline.upgrade() {
			Some(pipeline) => pipeline.capture_detached(EventInput::from(captured), ctx),
			None => EventId::empty(),
		}
	}

	pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
		if let Some(pipeline) = self.pipeline.upgrade() {
			pipeline.breadcrumbs.add(breadcrumb);
		}
	}

	/// False once the owning initialization has been closed.
	pub fn is_active(&self) -> bool {
		self.pipeline.strong_count() > 0
	}
}

impl std::fmt::Debug for CaptureSink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CaptureSink")
			.field("active", &self.is_active())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::Options;
	use crate::queue::EventSender;
	use async_trait::async_trait;
	use error_explorer_core::ErrorEvent;

	struct NullSender;

	#[async_trait]
	impl EventSender for NullSender {
		async fn send(&self, _event: &ErrorEvent) -> bool {
			true
		}
	}

	#[test]
	fn closed_sink_discards_reports() {
		let pipeline = Arc::new(Pipeline::new(Options::default(), Arc::new(NullSender)));
		let sink = CaptureSink::new(&pipeline);
		assert!(sink.is_active());

		drop(pipeline);
		assert!(!sink.is_active());
		assert!(sink.report(CapturedError::new("panic", "boom")).is_empty());
		sink.add_breadcrumb(Breadcrumb::new("ignored"));
	}

	#[test]
	fn sink_records_breadcrumbs() {
		let pipeline = Arc::new(Pipeline::new(Options::default(), Arc::new(NullSender)));
		let sink = CaptureSink::new(&pipeline);
		sink.add_breadcrumb(Breadcrumb::new("clicked"));
		assert_eq!(pipeline.breadcrumbs.len(), 1);
	}

	#[test]
	fn builder_defaults_to_error_severity() {
		let captured = CapturedError::new("TypeError", "x").with_stack_text("0: app::run");
		assert_eq!(captured.severity, Severity::Error);
		assert_eq!(captured.with_severity(Severity::Fatal).severity, Severity::Fatal);
	}
}
