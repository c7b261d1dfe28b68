// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace capture and parsing.
//!
//! Parses the text form of a Rust backtrace:
//!
//! ```text
//!    0: my_app::handlers::process
//!              at ./src/handlers.rs:42:9
//!    1: core::ops::function::FnOnce::call_once
//! ```
//!
//! `at file:line:col` lines attach to the frame above them.

use std::backtrace::Backtrace;

use error_explorer_core::Frame;
use rustc_demangle::demangle;

/// Capture a fresh backtrace and parse it.
pub fn capture_frames() -> (Vec<Frame>, String) {
	let text = format!("{:#}", Backtrace::force_capture());
	(parse_stack_text(&text), text)
}

/// Parse backtrace text into frames, innermost first.
pub fn parse_stack_text(text: &str) -> Vec<Frame> {
	let mut frames: Vec<Frame> = Vec::new();

	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				apply_location(frame, location);
			}
			continue;
		}

		if let Some(frame) = parse_frame_line(line) {
			frames.push(frame);
		}
	}

	frames
}

/// First in-app frame that carries a source location.
pub fn culprit(frames: &[Frame]) -> Option<&Frame> {
	frames.iter().find(|f| f.in_app && f.file.is_some())
}

fn parse_frame_line(line: &str) -> Option<Frame> {
	// Strip an "N: " frame-number prefix.
	let function_part = match line.split_once(':') {
		Some((prefix, rest)) if prefix.trim().parse::<u32>().is_ok() => rest.trim(),
		_ => line,
	};

	if function_part.is_empty() {
		return None;
	}

	// Alternate formatting drops the trailing `::h<hash>`.
	let demangled = format!("{:#}", demangle(function_part));
	let module = demangled.rfind("::").map(|idx| demangled[..idx].to_string());
	let in_app = is_in_app_frame(&demangled);

	Some(Frame {
		function: Some(demangled),
		module,
		in_app,
		..Frame::default()
	})
}

fn apply_location(frame: &mut Frame, location: &str) {
	let mut parts = location.rsplitn(3, ':');
	let last = parts.next();
	let middle = parts.next();
	let rest = parts.next();

	match (rest, middle, last) {
		(Some(file), Some(line), Some(column)) if line.parse::<u32>().is_ok() => {
			frame.file = Some(file.to_string());
			frame.line = line.parse().ok();
			frame.column = column.parse().ok();
		}
		(_, Some(file), Some(line)) if line.parse::<u32>().is_ok() => {
			let file = match rest {
				Some(prefix) => format!("{prefix}:{file}"),
				None => file.to_string(),
			};
			frame.file = Some(file);
			frame.line = line.parse().ok();
		}
		_ => frame.file = Some(location.to_string()),
	}
}

/// Whether a frame belongs to application code rather than the standard
/// library, the async runtime or this SDK.
fn is_in_app_frame(function: &str) -> bool {
	const SYSTEM_PREFIXES: &[&str] = &[
		"std::",
		"core::",
		"alloc::",
		"<std::",
		"<core::",
		"<alloc::",
		"tokio::",
		"<tokio::",
		"futures::",
		"<futures::",
		"futures_util::",
		"async_trait::",
		"tracing::",
		"<tracing::",
		"tracing_core::",
		"tracing_subscriber::",
		"<tracing_subscriber::",
		"error_explorer::",
		"<error_explorer::",
		"panic_unwind::",
		"<panic_unwind::",
		"rust_begin_unwind",
		"rust_panic",
		"__rust_",
		"_rust_",
		"__libc_",
		"_start",
	];

	const SYSTEM_CONTAINS: &[&str] = &[
		"::panic::",
		"::panicking::",
		"::rt::",
		"::sys_common::",
		"::backtrace::",
	];

	if function == "main" {
		return false;
	}

	if SYSTEM_PREFIXES.iter().any(|prefix| function.starts_with(prefix)) {
		return false;
	}

	!SYSTEM_CONTAINS.iter().any(|needle| function.contains(needle))
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:312:13
   1: my_app::handlers::process
             at ./src/handlers.rs:42:9
   2: my_app::main
             at ./src/main.rs:7:5
   3: core::ops::function::FnOnce::call_once
             at /rustc/abc/library/core/src/ops/function.rs:250:5
   4: main
   5: __libc_start_main";

	#[test]
	fn excludes_std_runtime_and_sdk() {
		assert!(!is_in_app_frame("std::panic::panic_any"));
		assert!(!is_in_app_frame("core::panicking::panic"));
		assert!(!is_in_app_frame("alloc::vec::Vec::push"));
		assert!(!is_in_app_frame("tokio::runtime::Runtime::block_on"));
		assert!(!is_in_app_frame("error_explorer::client::ErrorExplorer::capture_error"));
		assert!(!is_in_app_frame("main"));
	}

	#[test]
	fn includes_user_code() {
		assert!(is_in_app_frame("my_app::main"));
		assert!(is_in_app_frame("foo::bar::baz"));
		assert!(is_in_app_frame("mainframe::run"));
	}

	#[test]
	fn parses_frames_and_locations() {
		let frames = parse_stack_text(SAMPLE);
		assert_eq!(frames.len(), 6);

		let process = &frames[1];
		assert_eq!(process.function.as_deref(), Some("my_app::handlers::process"));
		assert_eq!(process.module.as_deref(), Some("my_app::handlers"));
		assert_eq!(process.file.as_deref(), Some("./src/handlers.rs"));
		assert_eq!(process.line, Some(42));
		assert_eq!(process.column, Some(9));
		assert!(process.in_app);

		assert!(!frames[0].in_app);
		assert_eq!(frames[4].function.as_deref(), Some("main"));
		assert!(frames[4].file.is_none());
	}

	#[test]
	fn culprit_is_first_in_app_frame_with_location() {
		let frames = parse_stack_text(SAMPLE);
		let culprit = culprit(&frames).unwrap();
		assert_eq!(culprit.file.as_deref(), Some("./src/handlers.rs"));
		assert_eq!(culprit.line, Some(42));
	}

	#[test]
	fn demangles_legacy_symbols() {
		let frames = parse_stack_text("  0: _ZN6my_app4main17h0123456789abcdefE");
		assert_eq!(frames[0].function.as_deref(), Some("my_app::main"));
		assert!(frames[0].in_app);
	}

	#[test]
	fn location_without_column() {
		let frames = parse_stack_text("0: app::run\n at src/lib.rs:10");
		assert_eq!(frames[0].file.as_deref(), Some("src/lib.rs"));
		assert_eq!(frames[0].line, Some(10));
		assert_eq!(frames[0].column, None);
	}

	#[test]
	fn orphan_location_is_ignored() {
		assert!(parse_stack_text("at src/lib.rs:1:1").is_empty());
	}

	#[test]
	fn capture_does_not_panic() {
		// Frame contents depend on build mode and debug info.
		let _ = capture_frames();
	}
}
