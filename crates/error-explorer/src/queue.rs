// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retry and offline queue for events that could not be delivered.
//!
//! Entries stay queued until a flush delivers them or [`DeliveryQueue::clear`]
//! is called. The queue is unbounded and in-memory only: under a sustained
//! outage memory grows with every captured event, and queued events are lost
//! when the process exits. Hosts that need a bound should flush periodically
//! or clear the queue themselves.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_explorer_core::ErrorEvent;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Delivers a single event, reporting success.
#[async_trait]
pub trait EventSender: Send + Sync {
	async fn send(&self, event: &ErrorEvent) -> bool;
}

/// A queued event with its delivery metadata.
#[derive(Debug, Clone)]
pub struct QueueEntry {
	pub event: ErrorEvent,
	pub enqueued_at: DateTime<Utc>,
	/// Failed flush attempts so far
	pub attempts: u32,
}

/// Result of a single [`DeliveryQueue::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
	pub sent: usize,
	pub failed: usize,
	/// Queue length when the flush returned
	pub remaining: usize,
	/// This call waited for a flush that was already running instead of
	/// making its own pass.
	pub joined: bool,
}

impl FlushOutcome {
	pub fn is_drained(&self) -> bool {
		self.remaining == 0
	}
}

pub struct DeliveryQueue {
	entries: Mutex<VecDeque<QueueEntry>>,
	sender: Arc<dyn EventSender>,
	online: AtomicBool,
	flush_lock: tokio::sync::Mutex<()>,
}

impl DeliveryQueue {
	pub fn new(sender: Arc<dyn EventSender>) -> Self {
		Self {
			entries: Mutex::new(VecDeque::new()),
			sender,
			online: AtomicBool::new(true),
			flush_lock: tokio::sync::Mutex::new(()),
		}
	}

	pub fn enqueue(&self, event: ErrorEvent) {
		let event_id = event.event_id.clone();
		let queue_len = {
			let mut entries = self.entries.lock();
			entries.push_back(QueueEntry {
				event,
				enqueued_at: Utc::now(),
				attempts: 0,
			});
			entries.len()
		};
		debug!(event_id = %event_id, queue_len, "event queued");
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Copy of the queued entries, oldest first.
	pub fn entries(&self) -> Vec<QueueEntry> {
		self.entries.lock().iter().cloned().collect()
	}

	/// Drops every queued entry, returning how many were removed.
	pub fn clear(&self) -> usize {
		let mut entries = self.entries.lock();
		let dropped = entries.len();
		entries.clear();
		dropped
	}

	pub fn is_online(&self) -> bool {
		self.online.load(Ordering::SeqCst)
	}

	/// Records connectivity. Coming back online flushes the queue.
	pub async fn set_online(&self, online: bool) -> Option<FlushOutcome> {
		let was_online = self.online.swap(online, Ordering::SeqCst);
		if online && !was_online {
			debug!(queue_len = self.len(), "connectivity restored, flushing queue");
			Some(self.flush().await)
		} else {
			None
		}
	}

	/// Tries every entry that was queued when the flush started, in FIFO
	/// order. Delivered entries are removed; failed ones are re-appended with
	/// their attempt count raised.
	///
	/// Flushes are serialized. A call made while another flush is running waits
	/// for it to finish and returns with `joined` set, without a second pass.
	pub async fn flush(&self) -> FlushOutcome {
		let _guard = match self.flush_lock.try_lock() {
			Ok(guard) => guard,
			Err(_) => {
				debug!("flush already running, waiting for it");
				let _wait = self.flush_lock.lock().await;
				return FlushOutcome {
					remaining: self.len(),
					joined: true,
					..FlushOutcome::default()
				};
			}
		};

		let batch = self.len();
		let mut outcome = FlushOutcome::default();

		for _ in 0..batch {
			let Some(mut entry) = self.pop_front() else {
				break;
			};

			if self.sender.send(&entry.event).await {
				outcome.sent += 1;
			} else {
				entry.attempts += 1;
				outcome.failed += 1;
				debug!(
					event_id = %entry.event.event_id,
					attempts = entry.attempts,
					"delivery failed, requeued"
				);
				self.push_back(entry);
			}
		}

		outcome.remaining = self.len();
		if batch > 0 {
			debug!(
				sent = outcome.sent,
				failed = outcome.failed,
				remaining = outcome.remaining,
				"queue flushed"
			);
		}
		outcome
	}

	/// Runs [`flush`](Self::flush) on its own task and waits at most
	/// `timeout`. On timeout `None` is returned; the flush keeps running in the
	/// background and its in-flight request is not cancelled.
	pub async fn flush_with_timeout(self: &Arc<Self>, timeout: Duration) -> Option<FlushOutcome> {
		let queue = Arc::clone(self);
		let handle = tokio::spawn(async move { queue.flush().await });

		match tokio::time::timeout(timeout, handle).await {
			Ok(Ok(outcome)) => Some(outcome),
			Ok(Err(e)) => {
				warn!(error = %e, "flush task failed");
				None
			}
			Err(_) => {
				warn!(
					timeout_ms = timeout.as_millis() as u64,
					queue_len = self.len(),
					"flush timed out"
				);
				None
			}
		}
	}

	fn pop_front(&self) -> Option<QueueEntry> {
		self.entries.lock().pop_front()
	}

	fn push_back(&self, entry: QueueEntry) {
		self.entries.lock().push_back(entry);
	}
}

impl std::fmt::Debug for DeliveryQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeliveryQueue")
			.field("len", &self.len())
			.field("online", &self.is_online())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use error_explorer_core::SdkInfo;
	use std::collections::HashSet;
	use std::sync::atomic::AtomicUsize;

	#[derive(Default)]
	struct MockSender {
		failing: Mutex<HashSet<String>>,
		calls: AtomicUsize,
		delay: Option<Duration>,
		delivered: Mutex<Vec<String>>,
	}

	impl MockSender {
		fn failing(messages: &[&str]) -> Self {
			Self {
				failing: Mutex::new(messages.iter().map(|m| m.to_string()).collect()),
				..Default::default()
			}
		}

		fn slow(delay: Duration) -> Self {
			Self {
				delay: Some(delay),
				..Default::default()
			}
		}
	}

	#[async_trait]
	impl EventSender for MockSender {
		async fn send(&self, event: &ErrorEvent) -> bool {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}
			if self.failing.lock().contains(&event.message) {
				return false;
			}
			self.delivered.lock().push(event.message.clone());
			true
		}
	}

	fn event(message: &str) -> ErrorEvent {
		ErrorEvent::new(
			message,
			SdkInfo {
				name: "test".into(),
				version: "0".into(),
			},
		)
	}

	#[test]
	fn size_equals_enqueued_count() {
		let queue = DeliveryQueue::new(Arc::new(MockSender::default()));
		for i in 0..7 {
			queue.enqueue(event(&i.to_string()));
		}
		assert_eq!(queue.len(), 7);
		assert_eq!(queue.clear(), 7);
		assert!(queue.is_empty());
	}

	#[tokio::test]
	async fn flush_removes_sent_and_keeps_failed() {
		let sender = Arc::new(MockSender::failing(&["b"]));
		let queue = DeliveryQueue::new(sender.clone());
		queue.enqueue(event("a"));
		queue.enqueue(event("b"));
		queue.enqueue(event("c"));

		let outcome = queue.flush().await;
		assert_eq!(
			outcome,
			FlushOutcome {
				sent: 2,
				failed: 1,
				remaining: 1,
				joined: false
			}
		);
		assert_eq!(*sender.delivered.lock(), vec!["a".to_string(), "c".to_string()]);

		let left = queue.entries();
		assert_eq!(left[0].event.message, "b");
		assert_eq!(left[0].attempts, 1);

		sender.failing.lock().clear();
		let outcome = queue.flush().await;
		assert_eq!(outcome.sent, 1);
		assert!(outcome.is_drained());
	}

	#[tokio::test]
	async fn failed_entries_are_tried_once_per_flush() {
		let sender = Arc::new(MockSender::failing(&["x"]));
		let queue = DeliveryQueue::new(sender.clone());
		queue.enqueue(event("x"));
		queue.flush().await;
		queue.flush().await;
		assert_eq!(sender.calls.load(Ordering::SeqCst), 2);
		assert_eq!(queue.entries()[0].attempts, 2);
	}

	#[tokio::test]
	async fn concurrent_flush_joins_instead_of_duplicating() {
		let sender = Arc::new(MockSender::slow(Duration::from_millis(50)));
		let queue = Arc::new(DeliveryQueue::new(sender.clone()));
		queue.enqueue(event("a"));
		queue.enqueue(event("b"));

		let first = {
			let queue = Arc::clone(&queue);
			tokio::spawn(async move { queue.flush().await })
		};
		tokio::time::sleep(Duration::from_millis(10)).await;
		let second = queue.flush().await;
		let first = first.await.unwrap();

		assert!(!first.joined);
		assert_eq!(first.sent, 2);
		assert!(second.joined);
		assert_eq!(second.sent, 0);
		assert_eq!(second.remaining, 0);
		assert_eq!(sender.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn coming_online_triggers_flush() {
		let sender = Arc::new(MockSender::default());
		let queue = DeliveryQueue::new(sender.clone());
		assert!(queue.set_online(false).await.is_none());
		assert!(!queue.is_online());
		queue.enqueue(event("offline"));

		let outcome = queue.set_online(true).await.unwrap();
		assert_eq!(outcome.sent, 1);
		assert!(queue.is_empty());

		// Already online: no transition, no flush.
		assert!(queue.set_online(true).await.is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn flush_with_timeout_gives_up_waiting() {
		let sender = Arc::new(MockSender::slow(Duration::from_secs(10)));
		let queue = Arc::new(DeliveryQueue::new(sender));
		queue.enqueue(event("slow"));

		assert!(queue.flush_with_timeout(Duration::from_millis(100)).await.is_none());
	}

	#[tokio::test]
	async fn flush_with_timeout_returns_outcome_when_fast() {
		let queue = Arc::new(DeliveryQueue::new(Arc::new(MockSender::default())));
		queue.enqueue(event("fast"));
		let outcome = queue.flush_with_timeout(Duration::from_secs(5)).await.unwrap();
		assert_eq!(outcome.sent, 1);
	}
}
