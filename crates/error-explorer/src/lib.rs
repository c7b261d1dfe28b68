// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error Explorer SDK for Rust applications.
//!
//! Captures errors, panics and error-level log events, enriches them with
//! breadcrumbs and scope data, scrubs sensitive values, and delivers them to
//! the Error Explorer collector over signed HTTP with retry and an offline
//! queue.
//!
//! # Quick Start
//!
//! ```ignore
//! use error_explorer::{Breadcrumb, CaptureContext, ErrorExplorer, Options, Severity};
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let explorer = ErrorExplorer::new();
//!     explorer.init(
//!         Options::builder()
//!             .token("ee_your_project_token")
//!             .release(env!("CARGO_PKG_VERSION"))
//!             .environment("production")
//!             .hmac("shared-secret", "sha256")
//!             .build(),
//!     )?;
//!
//!     // ERROR events are reported, everything else becomes a breadcrumb.
//!     tracing_subscriber::registry()
//!         .with(tracing_subscriber::fmt::layer())
//!         .with(explorer.tracing_layer())
//!         .init();
//!
//!     explorer.set_tag("server", "web-01");
//!     explorer.add_breadcrumb(Breadcrumb::new("application started"));
//!
//!     if let Err(e) = std::fs::read("/missing") {
//!         explorer
//!             .capture_error_with(&e, CaptureContext::new().extra("path", "/missing"))
//!             .await;
//!     }
//!
//!     explorer.close(std::time::Duration::from_secs(2)).await;
//!     Ok(())
//! }
//! ```
//!
//! # Pipeline
//!
//! Every capture is built (scope, call-site context, breadcrumb snapshot),
//! passed to the optional `before_send` hook, scrubbed, checked against the
//! admission limiter, then sent. Rate-limited events, events captured while
//! offline and failed sends (with `offline_queue` enabled) wait in an
//! in-memory delivery queue until the next flush.

pub mod backtrace;
pub mod breadcrumbs;
pub mod capture;
pub mod client;
pub mod clock;
pub mod error;
pub mod layer;
pub mod limiter;
pub mod options;
pub mod panic_hook;
mod pipeline;
pub mod queue;
pub mod scope;
pub mod transport;

pub use breadcrumbs::BreadcrumbRing;
pub use capture::{CaptureSink, CaptureSource, CapturedError};
pub use client::ErrorExplorer;
pub use clock::{Clock, MockClock, SystemClock};
pub use error::{ConfigError, ErrorExplorerError, Result, TransportError};
pub use layer::ErrorExplorerLayer;
pub use limiter::RateLimiter;
pub use options::{AutoCaptureOptions, BeforeSend, BoxError, Options, OptionsBuilder, RateLimitOptions};
pub use panic_hook::PanicCaptureSource;
pub use queue::{DeliveryQueue, EventSender, FlushOutcome, QueueEntry};
pub use scope::{CaptureContext, Scope, ScopeGuard};
pub use transport::Transport;

pub use error_explorer_core::{
	Breadcrumb, BreadcrumbLevel, BreadcrumbType, ErrorEvent, EventId, Frame, RequestContext, SdkInfo, Severity,
	UserContext,
};
pub use error_explorer_scrub::Scrubber;
pub use error_explorer_signature::{Signer, SigningAlgorithm};
