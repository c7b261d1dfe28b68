// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::FILTERED;

/// A value pattern and the template its matches are replaced with.
///
/// Templates use `regex` replacement syntax, so `${1}` keeps a capture group.
/// A pattern with a validator only replaces matches the validator accepts.
#[derive(Debug, Clone)]
pub struct ScrubPattern {
	pub id: &'static str,
	pub regex: Regex,
	pub replacement: String,
	pub validate: Option<fn(&str) -> bool>,
}

impl ScrubPattern {
	pub fn new(id: &'static str, regex: Regex, replacement: impl Into<String>) -> Self {
		Self {
			id,
			regex,
			replacement: replacement.into(),
			validate: None,
		}
	}

	pub fn with_validator(mut self, validate: fn(&str) -> bool) -> Self {
		self.validate = Some(validate);
		self
	}

	pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
		let Some(validate) = self.validate else {
			return self.regex.replace_all(input, self.replacement.as_str());
		};

		self.regex.replace_all(input, |caps: &Captures<'_>| {
			let mut out = String::new();
			if validate(&caps[0]) {
				caps.expand(&self.replacement, &mut out);
			} else {
				out.push_str(&caps[0]);
			}
			out
		})
	}
}

/// Luhn checksum over the digits of `candidate`, ignoring separators.
pub fn luhn_valid(candidate: &str) -> bool {
	let mut sum = 0;
	let mut count = 0;
	for (i, digit) in candidate.chars().rev().filter_map(|c| c.to_digit(10)).enumerate() {
		let value = if i % 2 == 1 {
			let doubled = digit * 2;
			if doubled > 9 { doubled - 9 } else { doubled }
		} else {
			digit
		};
		sum += value;
		count += 1;
	}
	count > 0 && sum % 10 == 0
}

fn compile(id: &'static str, pattern: &str, replacement: &str) -> Option<ScrubPattern> {
	Regex::new(pattern)
		.ok()
		.map(|regex| ScrubPattern::new(id, regex, replacement))
}

pub(crate) static DEFAULT_PATTERNS: Lazy<Vec<ScrubPattern>> = Lazy::new(|| {
	[
		compile("credit-card", r"\b\d(?:[ -]?\d){12,18}\b", FILTERED).map(|p| p.with_validator(luhn_valid)),
		compile(
			"bearer-token",
			r"(?i)\bBearer\s+[A-Za-z0-9\-._~+/]+=*",
			&format!("Bearer {FILTERED}"),
		),
		compile(
			"query-param",
			r"(?i)([?&](?:password|passwd|token|api_key|apikey|secret|key|auth|access_token)=)[^&\s#]+",
			&format!("${{1}}{FILTERED}"),
		),
	]
	.into_iter()
	.flatten()
	.collect()
});
