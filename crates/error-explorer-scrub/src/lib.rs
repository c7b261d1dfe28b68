// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redaction of sensitive data in event payloads.
//!
//! [`Scrubber`] walks a `serde_json::Value` and applies two rules:
//!
//! - **Keys**: an object key whose lowercased form contains a sensitive field
//!   name (`password`, `token`, `authorization`, ...) has its whole value
//!   replaced with `[FILTERED]`. The replaced value is not traversed.
//! - **Values**: string leaves are run through a list of [`ScrubPattern`]s
//!   (Luhn-valid card numbers, `Bearer` tokens, sensitive query parameters),
//!   each with its own replacement template.
//!
//! Traversal stops at [`MAX_DEPTH`]; deeper arrays and objects are replaced
//! with `[MAX_DEPTH_EXCEEDED]`.
//!
//! ```
//! use error_explorer_scrub::Scrubber;
//! use serde_json::json;
//!
//! let scrubbed = Scrubber::new().scrub(&json!({
//!     "password": "x",
//!     "nested": { "token": "y", "ok": "z" }
//! }));
//! assert_eq!(scrubbed, json!({
//!     "password": "[FILTERED]",
//!     "nested": { "token": "[FILTERED]", "ok": "z" }
//! }));
//! ```

mod pattern;

use std::borrow::Cow;
use std::collections::BTreeSet;

use regex::Regex;
use serde_json::{Map, Value};

pub use pattern::{luhn_valid, ScrubPattern};

/// Replacement for redacted values.
pub const FILTERED: &str = "[FILTERED]";
/// Replacement for containers nested deeper than [`MAX_DEPTH`].
pub const MAX_DEPTH_EXCEEDED: &str = "[MAX_DEPTH_EXCEEDED]";
/// Number of container levels traversed before the placeholder is used.
pub const MAX_DEPTH: usize = 10;

/// Field-name fragments redacted by default.
pub const DEFAULT_FIELDS: &[&str] = &[
	"password",
	"passwd",
	"pwd",
	"secret",
	"token",
	"api_key",
	"apikey",
	"api-key",
	"access_key",
	"private_key",
	"auth",
	"authorization",
	"credential",
	"card",
	"card_number",
	"credit_card",
	"cc_number",
	"cvv",
	"cvc",
	"ssn",
	"social_security",
];

#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
	#[error("invalid scrub pattern: {0}")]
	InvalidPattern(#[from] regex::Error),
}

#[derive(Debug, Clone)]
pub struct Scrubber {
	fields: BTreeSet<String>,
	patterns: Vec<ScrubPattern>,
}

impl Default for Scrubber {
	fn default() -> Self {
		Self::new()
	}
}

impl Scrubber {
	/// A scrubber with the default field names and patterns.
	pub fn new() -> Self {
		Self {
			fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
			patterns: pattern::DEFAULT_PATTERNS.clone(),
		}
	}

	/// Adds field-name fragments. Names are lowercased; duplicates are ignored.
	pub fn add_fields<I, S>(&mut self, names: I) -> &mut Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.fields.extend(
			names
				.into_iter()
				.map(|n| n.as_ref().trim().to_lowercase())
				.filter(|n| !n.is_empty()),
		);
		self
	}

	/// Appends a value pattern. Existing patterns run first.
	pub fn add_pattern(&mut self, regex: Regex, replacement: impl Into<String>) -> &mut Self {
		self.patterns.push(ScrubPattern::new("custom", regex, replacement));
		self
	}

	/// Compiles and appends a value pattern.
	pub fn add_pattern_str(&mut self, pattern: &str, replacement: impl Into<String>) -> Result<&mut Self, ScrubError> {
		let regex = Regex::new(pattern)?;
		Ok(self.add_pattern(regex, replacement))
	}

	pub fn fields(&self) -> impl Iterator<Item = &str> {
		self.fields.iter().map(String::as_str)
	}

	pub fn is_sensitive_key(&self, key: &str) -> bool {
		let key = key.to_lowercase();
		self.fields.iter().any(|field| key.contains(field.as_str()))
	}

	/// Returns a scrubbed copy of `value`.
	pub fn scrub(&self, value: &Value) -> Value {
		let mut cloned = value.clone();
		self.scrub_in_place(&mut cloned);
		cloned
	}

	pub fn scrub_in_place(&self, value: &mut Value) {
		self.scrub_value(value, 0);
	}

	/// Scrubs every value of a map, applying key rules to its keys.
	pub fn scrub_map(&self, map: &mut Map<String, Value>) {
		self.scrub_object(map, 0);
	}

	/// Applies the value patterns to a single string.
	pub fn scrub_str<'a>(&self, input: &'a str) -> Cow<'a, str> {
		let mut out = Cow::Borrowed(input);
		for pattern in &self.patterns {
			let replaced = match pattern.apply(&out) {
				Cow::Owned(replaced) => Some(replaced),
				Cow::Borrowed(_) => None,
			};
			if let Some(replaced) = replaced {
				out = Cow::Owned(replaced);
			}
		}
		out
	}

	pub fn scrub_string_in_place(&self, s: &mut String) {
		if let Cow::Owned(replaced) = self.scrub_str(s) {
			*s = replaced;
		}
	}

	/// Scrubs a string map keyed by field name (tags, headers).
	pub fn scrub_string_pairs<'a, I>(&self, pairs: I)
	where
		I: IntoIterator<Item = (&'a String, &'a mut String)>,
	{
		for (key, value) in pairs {
			if self.is_sensitive_key(key) {
				*value = FILTERED.to_string();
			} else {
				self.scrub_string_in_place(value);
			}
		}
	}

	fn scrub_value(&self, value: &mut Value, depth: usize) {
		match value {
			Value::Array(_) | Value::Object(_) if depth >= MAX_DEPTH => {
				*value = Value::String(MAX_DEPTH_EXCEEDED.to_string());
			}
			Value::String(s) => self.scrub_string_in_place(s),
			Value::Array(items) => {
				for item in items {
					self.scrub_value(item, depth + 1);
				}
			}
			Value::Object(map) => self.scrub_object(map, depth),
			Value::Null | Value::Bool(_) | Value::Number(_) => {}
		}
	}

	fn scrub_object(&self, map: &mut Map<String, Value>, depth: usize) {
		for (key, value) in map.iter_mut() {
			if self.is_sensitive_key(key) {
				*value = Value::String(FILTERED.to_string());
			} else {
				self.scrub_value(value, depth + 1);
			}
		}
	}
}
