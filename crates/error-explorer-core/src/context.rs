// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Context types attached to error events (user, request).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// User context at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,
	/// IP address (personally identifying, stripped unless PII is enabled)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ip_address: Option<String>,
	#[serde(skip_serializing_if = "serde_json::Map::is_empty")]
	pub data: serde_json::Map<String, serde_json::Value>,
}

impl UserContext {
	/// A user identified only by id.
	pub fn with_id(id: impl Into<String>) -> Self {
		Self {
			id: Some(id.into()),
			..Default::default()
		}
	}

	/// Removes fields that identify a person beyond an opaque id.
	pub fn strip_pii(&mut self) {
		self.email = None;
		self.ip_address = None;
	}
}

/// HTTP request context for server-side errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub headers: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub query_string: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<serde_json::Value>,
}
