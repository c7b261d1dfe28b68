// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracing layer capture source.
//!
//! `ERROR` events become error events; everything below becomes a
//! breadcrumb. Events emitted by this SDK are ignored.

use std::fmt;
use std::sync::Arc;

use error_explorer_core::{Breadcrumb, BreadcrumbLevel, BreadcrumbType, Severity};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::capture::{CaptureSink, CaptureSource, CapturedError};
use crate::pipeline::is_processing;
use crate::scope::CaptureContext;

const SDK_TARGET_PREFIX: &str = "error_explorer";

/// A tracing [`Layer`] that feeds log events into the SDK.
///
/// Obtain one from [`ErrorExplorer::tracing_layer`](crate::ErrorExplorer::tracing_layer)
/// so it is started and stopped with the client. Until then it does nothing.
#[derive(Clone, Default)]
pub struct ErrorExplorerLayer {
	sink: Arc<RwLock<Option<CaptureSink>>>,
}

impl ErrorExplorerLayer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_active(&self) -> bool {
		self.sink.read().as_ref().is_some_and(CaptureSink::is_active)
	}
}

impl CaptureSource for ErrorExplorerLayer {
	fn name(&self) -> &'static str {
		"tracing"
	}

	fn start(&self, sink: CaptureSink) {
		*self.sink.write() = Some(sink);
	}

	fn stop(&self) {
		self.sink.write().take();
	}
}

impl<S> Layer<S> for ErrorExplorerLayer
where
	S: Subscriber + for<'a> LookupSpan<'a>,
{
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let metadata = event.metadata();
		let target = metadata.target();
		if target.starts_with(SDK_TARGET_PREFIX) || is_processing() {
			return;
		}

		let guard = self.sink.read();
		let Some(sink) = guard.as_ref() else {
			return;
		};

		let mut visitor = FieldVisitor::default();
		event.record(&mut visitor);
		let message = visitor.message.unwrap_or_default();

		if *metadata.level() == Level::ERROR {
			let mut ctx = CaptureContext::new().tag("logger", target);
			ctx.extra = visitor.fields;
			sink.report_with(
				CapturedError::new("", message).with_severity(Severity::Error),
				ctx,
			);
		} else {
			let mut breadcrumb = Breadcrumb::new(message)
				.with_category(target)
				.with_kind(BreadcrumbType::Debug)
				.with_level(breadcrumb_level(metadata.level()));
			breadcrumb.data = visitor.fields;
			sink.add_breadcrumb(breadcrumb);
		}
	}
}

fn breadcrumb_level(level: &Level) -> BreadcrumbLevel {
	match *level {
		Level::WARN => BreadcrumbLevel::Warning,
		Level::INFO => BreadcrumbLevel::Info,
		Level::ERROR => BreadcrumbLevel::Error,
		_ => BreadcrumbLevel::Debug,
	}
}

#[derive(Default)]
struct FieldVisitor {
	message: Option<String>,
	fields: Map<String, Value>,
}

impl FieldVisitor {
	fn record_value(&mut self, field: &Field, value: Value) {
		self.fields.insert(field.name().to_string(), value);
	}
}

impl Visit for FieldVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		let formatted = format!("{value:?}");
		if field.name() == "message" {
			self.message = Some(formatted);
		} else {
			self.record_value(field, Value::String(formatted));
		}
	}

	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.message = Some(value.to_string());
		} else {
			self.record_value(field, Value::from(value));
		}
	}

	fn record_i64(&mut self, field: &Field, value: i64) {
		self.record_value(field, Value::from(value));
	}

	fn record_u64(&mut self, field: &Field, value: u64) {
		self.record_value(field, Value::from(value));
	}

	fn record_bool(&mut self, field: &Field, value: bool) {
		self.record_value(field, Value::from(value));
	}

	fn record_f64(&mut self, field: &Field, value: f64) {
		self.record_value(field, Value::from(value));
	}

	fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
		self.record_value(field, Value::String(value.to_string()));
	}
}
