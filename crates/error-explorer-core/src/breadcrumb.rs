// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumb types (the trail of events leading up to an error).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A breadcrumb representing an event leading up to an error.
///
/// Every field is defaulted on deserialization; a partially filled breadcrumb
/// is still recorded. `timestamp` is filled in with the current time when the
/// breadcrumb is added to a trail without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Breadcrumb {
	#[serde(rename = "type")]
	pub kind: BreadcrumbType,
	/// "http", "navigation", "ui", "console", "auth"
	pub category: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub level: BreadcrumbLevel,
	pub data: serde_json::Map<String, serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<DateTime<Utc>>,
}

impl Default for Breadcrumb {
	fn default() -> Self {
		Self {
			kind: BreadcrumbType::Default,
			category: "default".to_string(),
			message: None,
			level: BreadcrumbLevel::Info,
			data: serde_json::Map::new(),
			timestamp: None,
		}
	}
}

impl Breadcrumb {
	/// Creates a breadcrumb with a message and otherwise default fields.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: Some(message.into()),
			..Default::default()
		}
	}

	pub fn with_category(mut self, category: impl Into<String>) -> Self {
		self.category = category.into();
		self
	}

	pub fn with_kind(mut self, kind: BreadcrumbType) -> Self {
		self.kind = kind;
		self
	}

	pub fn with_level(mut self, level: BreadcrumbLevel) -> Self {
		self.level = level;
		self
	}

	/// Adds a single entry to the breadcrumb's data map.
	pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.data.insert(key.into(), value.into());
		self
	}
}

/// Kind of activity a breadcrumb records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbType {
	#[default]
	Default,
	Debug,
	Error,
	Info,
	Navigation,
	Http,
	Query,
	User,
}

impl fmt::Display for BreadcrumbType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Default => "default",
			Self::Debug => "debug",
			Self::Error => "error",
			Self::Info => "info",
			Self::Navigation => "navigation",
			Self::Http => "http",
			Self::Query => "query",
			Self::User => "user",
		};
		f.write_str(s)
	}
}

impl FromStr for BreadcrumbType {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"default" => Ok(Self::Default),
			"debug" => Ok(Self::Debug),
			"error" => Ok(Self::Error),
			"info" => Ok(Self::Info),
			"navigation" => Ok(Self::Navigation),
			"http" => Ok(Self::Http),
			"query" => Ok(Self::Query),
			"user" => Ok(Self::User),
			_ => Err(CoreError::InvalidBreadcrumbType(s.to_string())),
		}
	}
}

/// Severity level of a breadcrumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbLevel {
	Debug,
	#[default]
	Info,
	Warning,
	Error,
}

impl fmt::Display for BreadcrumbLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
		}
	}
}

impl FromStr for BreadcrumbLevel {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warning" | "warn" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			_ => Err(CoreError::InvalidBreadcrumbLevel(s.to_string())),
		}
	}
}
