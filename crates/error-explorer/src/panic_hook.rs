// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic hook capture source.

use std::backtrace::Backtrace;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use error_explorer_core::Severity;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::capture::{CaptureSink, CaptureSource, CapturedError};
use crate::pipeline::is_processing;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Reports panics as fatal events, then defers to the hook that was installed
/// before it.
///
/// Delivery runs on the current Tokio runtime when there is one. Otherwise the
/// event waits in the delivery queue until the next flush.
#[derive(Default)]
pub struct PanicCaptureSource {
	sink: Arc<RwLock<Option<CaptureSink>>>,
	previous: Arc<Mutex<Option<PanicHook>>>,
	installed: AtomicBool,
}

impl PanicCaptureSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_installed(&self) -> bool {
		self.installed.load(Ordering::SeqCst)
	}
}

impl CaptureSource for PanicCaptureSource {
	fn name(&self) -> &'static str {
		"panic"
	}

	fn start(&self, sink: CaptureSink) {
		*self.sink.write() = Some(sink);
		if self.installed.swap(true, Ordering::SeqCst) {
			return;
		}

		*self.previous.lock() = Some(std::panic::take_hook());

		let sink = Arc::clone(&self.sink);
		let previous = Arc::clone(&self.previous);
		std::panic::set_hook(Box::new(move |info| {
			if !is_processing() {
				if let Some(sink) = sink.read().as_ref() {
					sink.report(captured_panic(info));
				}
			}

			if let Some(hook) = previous.lock().as_ref() {
				hook(info);
			}
		}));
		debug!("panic hook installed");
	}

	/// Restores the hook that was active at `start`. A hook installed on top
	/// of this one afterwards is replaced as well.
	fn stop(&self) {
		self.sink.write().take();
		if !self.installed.swap(false, Ordering::SeqCst) {
			return;
		}

		let _ours = std::panic::take_hook();
		if let Some(previous) = self.previous.lock().take() {
			std::panic::set_hook(previous);
		}
		debug!("panic hook removed");
	}
}

fn captured_panic(info: &PanicHookInfo<'_>) -> CapturedError {
	let backtrace = Backtrace::force_capture();
	let mut message = extract_panic_message(info);
	if let Some(location) = info.location() {
		message = format!("{message} at {}:{}:{}", location.file(), location.line(), location.column());
	}

	CapturedError::new("panic", message)
		.with_stack_text(format!("{backtrace:#}"))
		.with_severity(Severity::Fatal)
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
	if let Some(s) = info.payload().downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = info.payload().downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::Options;
	use crate::pipeline::Pipeline;
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
	fn reports_panics_and_restores_previous_hook() {
		let pipeline = Arc::new(Pipeline::new(Options::default(), Arc::new(NullSender)));
		let source = PanicCaptureSource::new();
		source.start(CaptureSink::new(&pipeline));
		assert!(source.is_installed());

		let result = std::panic::catch_unwind(|| panic!("kaboom {}", 7));
		assert!(result.is_err());

		source.stop();
		assert!(!source.is_installed());

		// Without a runtime the report waits in the queue.
		let entries = pipeline.queue.entries();
		let event = &entries
			.iter()
			.find(|e| e.event.message.starts_with("kaboom 7"))
			.expect("panic was reported")
			.event;
		assert_eq!(event.exception_class.as_deref(), Some("panic"));
		assert_eq!(event.severity, Severity::Fatal);
		assert!(event.message.contains("panic_hook.rs"));
		assert!(event.stack_trace.is_some());

		// After stop, panics are no longer reported.
		let before = pipeline.queue.len();
		let _ = std::panic::catch_unwind(|| panic!("after stop"));
		assert_eq!(pipeline.queue.len(), before);
	}

	#[test]
	fn stop_without_start_is_a_no_op() {
		let source = PanicCaptureSource::new();
		source.stop();
		assert!(!source.is_installed());
	}
}
