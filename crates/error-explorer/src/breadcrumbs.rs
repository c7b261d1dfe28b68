// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded breadcrumb trail.

use std::collections::VecDeque;

use chrono::Utc;
use error_explorer_core::Breadcrumb;
use parking_lot::Mutex;

/// FIFO ring holding at most `capacity` breadcrumbs; the oldest are evicted
/// first.
#[derive(Debug)]
pub struct BreadcrumbRing {
	capacity: usize,
	entries: Mutex<VecDeque<Breadcrumb>>,
}

impl BreadcrumbRing {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			entries: Mutex::new(VecDeque::with_capacity(capacity)),
		}
	}

	/// Appends a breadcrumb, stamping it with the current time if it has none.
	pub fn add(&self, mut breadcrumb: Breadcrumb) {
		if breadcrumb.timestamp.is_none() {
			breadcrumb.timestamp = Some(Utc::now());
		}

		let mut entries = self.entries.lock();
		entries.push_back(breadcrumb);
		while entries.len() > self.capacity {
			entries.pop_front();
		}
	}

	/// Copy of the trail, oldest first.
	pub fn get_all(&self) -> Vec<Breadcrumb> {
		self.entries.lock().iter().cloned().collect()
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Replaces the trail with `breadcrumbs`, keeping the newest `capacity`.
	pub fn restore(&self, breadcrumbs: Vec<Breadcrumb>) {
		let skip = breadcrumbs.len().saturating_sub(self.capacity);
		*self.entries.lock() = breadcrumbs.into_iter().skip(skip).collect();
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}
}
