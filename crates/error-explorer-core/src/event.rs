// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error event types (the unit of delivery).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::breadcrumb::Breadcrumb;
use crate::context::{RequestContext, UserContext};
use crate::error::{CoreError, Result};

/// Identifier returned to the host for a captured event.
///
/// An empty identifier means nothing was captured (SDK not initialized, or the
/// event was vetoed by the `before_send` hook).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
	/// Generates a fresh identifier (32 lowercase hex characters).
	pub fn new() -> Self {
		Self(Uuid::new_v4().simple().to_string())
	}

	pub fn empty() -> Self {
		Self(String::new())
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Severity of a captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
	Debug,
	Info,
	Warning,
	#[default]
	Error,
	Fatal,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
			Self::Fatal => write!(f, "fatal"),
		}
	}
}

impl FromStr for Severity {
	type Err = CoreError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warning" | "warn" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			"fatal" | "critical" => Ok(Self::Fatal),
			_ => Err(CoreError::InvalidSeverity(s.to_string())),
		}
	}
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	/// Module path the function lives in
	#[serde(skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
	/// Application code vs dependency/runtime code
	pub in_app: bool,
}

/// SDK identity attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkInfo {
	pub name: String,
	pub version: String,
}

/// A fully built event, ready to be filtered, scrubbed and delivered.
///
/// `breadcrumbs` is a copy of the trail at construction time; later changes to
/// the live trail never show up here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
	pub event_id: EventId,
	pub timestamp: DateTime<Utc>,
	pub message: String,
	/// Exception class/type name; absent for plain messages
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exception_class: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub file: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	#[serde(default)]
	pub frames: Vec<Frame>,
	/// Unparsed stack text as captured
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack_trace: Option<String>,
	pub severity: Severity,
	pub environment: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub release: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub project: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub server_name: Option<String>,
	pub platform: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<UserContext>,
	#[serde(default)]
	pub tags: BTreeMap<String, String>,
	#[serde(default)]
	pub extra: serde_json::Map<String, serde_json::Value>,
	#[serde(default)]
	pub contexts: serde_json::Map<String, serde_json::Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request: Option<RequestContext>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub fingerprint: Vec<String>,
	#[serde(default)]
	pub breadcrumbs: Vec<Breadcrumb>,
	pub sdk: SdkInfo,
}

impl ErrorEvent {
	/// Creates an event carrying only a message and the SDK identity.
	pub fn new(message: impl Into<String>, sdk: SdkInfo) -> Self {
		Self {
			event_id: EventId::new(),
			timestamp: Utc::now(),
			message: message.into(),
			exception_class: None,
			file: None,
			line: None,
			frames: Vec::new(),
			stack_trace: None,
			severity: Severity::default(),
			environment: "production".to_string(),
			release: None,
			project: None,
			server_name: None,
			platform: "rust".to_string(),
			user: None,
			tags: BTreeMap::new(),
			extra: serde_json::Map::new(),
			contexts: serde_json::Map::new(),
			request: None,
			fingerprint: Vec::new(),
			breadcrumbs: Vec::new(),
			sdk,
		}
	}

	/// Serializes the event into the exact bytes sent on the wire.
	pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}
}
