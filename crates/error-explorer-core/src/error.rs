// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the core event model.

use thiserror::Error;

/// Errors raised while parsing core types from their string forms.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("invalid breadcrumb level: {0}")]
	InvalidBreadcrumbLevel(String),

	#[error("invalid breadcrumb type: {0}")]
	InvalidBreadcrumbType(String),

	#[error("invalid severity: {0}")]
	InvalidSeverity(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
