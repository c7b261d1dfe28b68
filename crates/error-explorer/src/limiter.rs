// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sliding-window admission limiter for outbound deliveries.
//!
//! The limiter remembers the instant of every admitted request still inside
//! the trailing window. A request is admitted while fewer than `max_requests`
//! instants remain after pruning, so bursts straddling a window boundary are
//! counted in full.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};

#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
	max_requests: usize,
	window: Duration,
	admitted: Mutex<VecDeque<Instant>>,
	clock: C,
}

impl RateLimiter<SystemClock> {
	pub fn new(max_requests: usize, window: Duration) -> Self {
		Self::with_clock(max_requests, window, SystemClock)
	}
}

impl<C: Clock> RateLimiter<C> {
	pub fn with_clock(max_requests: usize, window: Duration, clock: C) -> Self {
		Self {
			max_requests,
			window,
			admitted: Mutex::new(VecDeque::with_capacity(max_requests)),
			clock,
		}
	}

	/// Admits and records one request if the window has room.
	pub fn is_allowed(&self) -> bool {
		let now = self.clock.now();
		let mut admitted = self.admitted.lock();
		self.prune(&mut admitted, now);

		if admitted.len() < self.max_requests {
			admitted.push_back(now);
			true
		} else {
			false
		}
	}

	/// Requests still admissible in the current window.
	pub fn remaining(&self) -> usize {
		let now = self.clock.now();
		let mut admitted = self.admitted.lock();
		self.prune(&mut admitted, now);
		self.max_requests.saturating_sub(admitted.len())
	}

	pub fn reset(&self) {
		self.admitted.lock().clear();
	}

	pub fn max_requests(&self) -> usize {
		self.max_requests
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	// Instants are pushed in order, so expired ones are always at the front.
	fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
		while let Some(&oldest) = admitted.front() {
			if now.saturating_duration_since(oldest) > self.window {
				admitted.pop_front();
			} else {
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::MockClock;

	fn limiter(max: usize, window_ms: u64) -> (RateLimiter<MockClock>, MockClock) {
		let clock = MockClock::default();
		(
			RateLimiter::with_clock(max, Duration::from_millis(window_ms), clock.clone()),
			clock,
		)
	}

	#[test]
	fn three_per_minute() {
		let (limiter, clock) = limiter(3, 60_000);
		assert!(limiter.is_allowed());
		assert!(limiter.is_allowed());
		assert!(limiter.is_allowed());
		assert!(!limiter.is_allowed());
		assert_eq!(limiter.remaining(), 0);

		clock.advance(Duration::from_millis(60_001));
		assert!(limiter.is_allowed());
		assert_eq!(limiter.remaining(), 2);
	}

	#[test]
	fn denied_calls_are_not_recorded() {
		let (limiter, clock) = limiter(1, 1_000);
		assert!(limiter.is_allowed());
		clock.advance(Duration::from_millis(600));
		assert!(!limiter.is_allowed());
		clock.advance(Duration::from_millis(401));
		// Only the first admission counted; the denial did not extend the window.
		assert!(limiter.is_allowed());
	}

	#[test]
	fn window_slides_instead_of_resetting() {
		let (limiter, clock) = limiter(2, 1_000);
		assert!(limiter.is_allowed());
		clock.advance(Duration::from_millis(900));
		assert!(limiter.is_allowed());
		clock.advance(Duration::from_millis(200));
		// First admission expired, second still inside the window.
		assert_eq!(limiter.remaining(), 1);
		assert!(limiter.is_allowed());
		assert!(!limiter.is_allowed());
	}

	#[test]
	fn reset_clears_history() {
		let (limiter, _clock) = limiter(2, 60_000);
		assert!(limiter.is_allowed());
		assert!(limiter.is_allowed());
		limiter.reset();
		assert_eq!(limiter.remaining(), 2);
	}

	#[test]
	fn zero_max_denies_everything() {
		let (limiter, _clock) = limiter(0, 60_000);
		assert!(!limiter.is_allowed());
		assert_eq!(limiter.remaining(), 0);
	}

	#[test]
	fn system_clock_limiter() {
		let limiter = RateLimiter::new(1, Duration::from_secs(60));
		assert!(limiter.is_allowed());
		assert!(!limiter.is_allowed());
	}
}
