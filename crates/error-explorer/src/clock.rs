// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Time source for the admission limiter.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub trait Clock: Send + Sync + Debug {
	fn now(&self) -> Instant;
}

/// Monotonic clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Manually driven clock. Clones share the same time.
///
/// ```
/// use error_explorer::clock::{Clock, MockClock};
/// use std::time::{Duration, Instant};
///
/// let start = Instant::now();
/// let clock = MockClock::new(start);
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), start + Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
	current: Arc<Mutex<Instant>>,
}

impl MockClock {
	pub fn new(start: Instant) -> Self {
		Self {
			current: Arc::new(Mutex::new(start)),
		}
	}

	pub fn advance(&self, by: Duration) {
		*self.current.lock() += by;
	}

	pub fn set(&self, to: Instant) {
		*self.current.lock() = to;
	}
}

impl Default for MockClock {
	fn default() -> Self {
		Self::new(Instant::now())
	}
}

impl Clock for MockClock {
	fn now(&self) -> Instant {
		*self.current.lock()
	}
}
