// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Error Explorer SDK.
//!
//! This crate provides the event model shared by the client SDK and its
//! helper crates: error events, stack frames, breadcrumbs and the user and
//! request context attached to them. The serialized form of [`ErrorEvent`] is
//! the wire format expected by the collector.

pub mod breadcrumb;
pub mod context;
pub mod error;
pub mod event;

pub use breadcrumb::{Breadcrumb, BreadcrumbLevel, BreadcrumbType};
pub use context::{RequestContext, UserContext};
pub use error::{CoreError, Result};
pub use event::{ErrorEvent, EventId, Frame, SdkInfo, Severity};
