// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Global scope, pushed scopes, and per-capture context merged into every
//! event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use error_explorer_core::{Breadcrumb, ErrorEvent, RequestContext, Severity, UserContext};
use serde_json::{Map, Value};

use crate::pipeline::Pipeline;

/// Data set once and attached to every subsequent event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
	pub user: Option<UserContext>,
	pub tags: BTreeMap<String, String>,
	pub extra: Map<String, Value>,
	pub contexts: Map<String, Value>,
}

impl Scope {
	/// Merges this scope and a call-site context into `event`. On key
	/// collisions the call site wins over values already on the event, which
	/// win over this scope.
	pub fn apply(&self, event: &mut ErrorEvent, ctx: CaptureContext) {
		let mut tags = self.tags.clone();
		tags.append(&mut event.tags);
		tags.extend(ctx.tags);
		event.tags = tags;

		let mut extra = self.extra.clone();
		extra.append(&mut event.extra);
		extra.extend(ctx.extra);
		event.extra = extra;

		let mut contexts = self.contexts.clone();
		contexts.append(&mut event.contexts);
		event.contexts = contexts;

		event.user = ctx.user.or_else(|| self.user.clone());

		if let Some(level) = ctx.level {
			event.severity = level;
		}
		if ctx.request.is_some() {
			event.request = ctx.request;
		}
		if !ctx.fingerprint.is_empty() {
			event.fingerprint = ctx.fingerprint;
		}
	}
}

/// Overrides for a single capture.
///
/// ```
/// use error_explorer::CaptureContext;
/// use error_explorer::Severity;
///
/// let ctx = CaptureContext::new()
///     .tag("handler", "checkout")
///     .extra("order_id", 1234)
///     .level(Severity::Warning);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureContext {
	pub tags: BTreeMap<String, String>,
	pub extra: Map<String, Value>,
	pub user: Option<UserContext>,
	pub level: Option<Severity>,
	pub fingerprint: Vec<String>,
	pub request: Option<RequestContext>,
}

impl CaptureContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.tags.insert(key.into(), value.into());
		self
	}

	pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.extra.insert(key.into(), value.into());
		self
	}

	pub fn user(mut self, user: UserContext) -> Self {
		self.user = Some(user);
		self
	}

	pub fn level(mut self, level: Severity) -> Self {
		self.level = Some(level);
		self
	}

	pub fn fingerprint<I, S>(mut self, parts: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.fingerprint = parts.into_iter().map(Into::into).collect();
		self
	}

	pub fn request(mut self, request: RequestContext) -> Self {
		self.request = Some(request);
		self
	}
}

/// Isolated scope returned by
/// [`ErrorExplorer::push_scope`](crate::ErrorExplorer::push_scope).
///
/// Tags, user, extra and breadcrumbs set while the guard is alive, through
/// the guard or through the client, apply to every capture made in the
/// meantime. Dropping the guard restores the scope and breadcrumb trail that
/// were current when it was pushed. The scope is shared by the whole client,
/// so concurrent tasks see the pushed values too.
#[must_use = "the previous scope is restored as soon as the guard is dropped"]
pub struct ScopeGuard {
	pipeline: Weak<Pipeline>,
	saved: Option<(Scope, Vec<Breadcrumb>)>,
}

impl ScopeGuard {
	pub(crate) fn push(pipeline: Option<&Arc<Pipeline>>) -> Self {
		Self {
			saved: pipeline.map(|p| (p.scope.read().clone(), p.breadcrumbs.get_all())),
			pipeline: pipeline.map_or_else(Weak::new, Arc::downgrade),
		}
	}

	pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
		let (key, value) = (key.into(), value.into());
		self.update(|scope| {
			scope.tags.insert(key, value);
		});
	}

	pub fn set_user(&self, user: UserContext) {
		self.update(|scope| scope.user = Some(user));
	}

	pub fn set_extra(&self, key: impl Into<String>, value: impl Into<Value>) {
		let (key, value) = (key.into(), value.into());
		self.update(|scope| {
			scope.extra.insert(key, value);
		});
	}

	pub fn set_context(&self, name: impl Into<String>, context: impl Into<Value>) {
		let (name, context) = (name.into(), context.into());
		self.update(|scope| {
			scope.contexts.insert(name, context);
		});
	}

	pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) {
		if let Some(pipeline) = self.pipeline.upgrade() {
			pipeline.breadcrumbs.add(breadcrumb);
		}
	}

	fn update(&self, f: impl FnOnce(&mut Scope)) {
		if let Some(pipeline) = self.pipeline.upgrade() {
			f(&mut pipeline.scope.write());
		}
	}
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		let (Some(pipeline), Some((scope, breadcrumbs))) = (self.pipeline.upgrade(), self.saved.take()) else {
			return;
		};
		*pipeline.scope.write() = scope;
		pipeline.breadcrumbs.restore(breadcrumbs);
	}
}

impl fmt::Debug for ScopeGuard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScopeGuard")
			.field("active", &(self.pipeline.strong_count() > 0))
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use error_explorer_core::SdkInfo;
	use serde_json::json;

	fn event() -> ErrorEvent {
		ErrorEvent::new(
			"boom",
			SdkInfo {
				name: "test".into(),
				version: "0".into(),
			},
		)
	}

	fn scope() -> Scope {
		Scope {
			user: Some(UserContext::with_id("global")),
			tags: BTreeMap::from([
				("region".to_string(), "eu".to_string()),
				("tier".to_string(), "free".to_string()),
			]),
			extra: Map::from_iter([("build".to_string(), json!(42))]),
			contexts: Map::from_iter([("os".to_string(), json!({ "name": "linux" }))]),
		}
	}

	#[test]
	fn scope_only() {
		let mut event = event();
		scope().apply(&mut event, CaptureContext::new());
		assert_eq!(event.tags["region"], "eu");
		assert_eq!(event.extra["build"], json!(42));
		assert_eq!(event.contexts["os"]["name"], "linux");
		assert_eq!(event.user.unwrap().id.as_deref(), Some("global"));
		assert_eq!(event.severity, Severity::Error);
	}

	#[test]
	fn call_site_wins() {
		let mut event = event();
		let ctx = CaptureContext::new()
			.tag("tier", "pro")
			.extra("build", 43)
			.user(UserContext::with_id("local"))
			.level(Severity::Fatal)
			.fingerprint(["checkout", "timeout"]);
		scope().apply(&mut event, ctx);

		assert_eq!(event.tags["tier"], "pro");
		assert_eq!(event.tags["region"], "eu");
		assert_eq!(event.extra["build"], json!(43));
		assert_eq!(event.user.unwrap().id.as_deref(), Some("local"));
		assert_eq!(event.severity, Severity::Fatal);
		assert_eq!(event.fingerprint, vec!["checkout", "timeout"]);
	}

	#[test]
	fn event_values_sit_between_scope_and_call_site() {
		let mut event = event();
		event.extra.insert("error_chain".into(), json!(["connection reset"]));
		event.extra.insert("build".into(), json!(1));

		let mut scope = scope();
		scope.extra.insert("error_chain".into(), json!("from scope"));
		scope.apply(&mut event, CaptureContext::new().extra("build", 43));

		assert_eq!(event.extra["error_chain"], json!(["connection reset"]));
		assert_eq!(event.extra["build"], json!(43));
	}
}
