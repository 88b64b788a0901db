use std::collections::VecDeque;

use crate::config::{self, MAX_QUEUE_SIZE, MAX_RESEND_ATTEMPTS};

/// An outbound DATA packet awaiting acknowledgement.
#[derive(Clone, Debug)]
pub struct Sent {
	pub id: u32,
	pub bytes: Vec<u8>,
	pub sent_at: u32,
	pub resend_count: u32,
}

/// A packet that has been resent `MAX_RESEND_ATTEMPTS` times without an ACK.
/// The channel that owns it is considered dead.
pub struct Expired {
	pub id: u32,
}

/// Holds packets sent but not yet acknowledged, in ascending id order.
///
/// Capacity adapts over time: it grows when the queue is repeatedly found
/// full at tick time (the remote is acking slower than we're sending) and
/// shrinks back down when it isn't, bounded by [`MAX_QUEUE_SIZE`].
pub struct SendQueue {
	entries: VecDeque<Sent>,
	capacity: usize,
	full_at_last_check: bool,
}

impl SendQueue {
	pub fn new(initial_capacity: usize) -> Self {
		SendQueue {
			entries: VecDeque::new(),
			capacity: initial_capacity.clamp(1, MAX_QUEUE_SIZE),
			full_at_last_check: false,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn is_full(&self) -> bool {
		self.entries.len() >= self.capacity
	}

	pub fn push(&mut self, id: u32, bytes: Vec<u8>, sent_at: u32) {
		self.entries.push_back(Sent { id, bytes, sent_at, resend_count: 0 });
	}

	/// Removes the acknowledged entry and returns the round-trip measured
	/// from its original send time, if it was still outstanding.
	pub fn ack(&mut self, id: u32, now: u32) -> Option<f32> {
		let pos = self.entries.iter().position(|s| s.id == id)?;
		let sent = self.entries.remove(pos)?;
		Some(now.wrapping_sub(sent.sent_at) as f32 / 1000.0)
	}

	/// Returns packets whose resend timeout has elapsed, bumping their
	/// resend counter and refreshing `sent_at`. Packets that have hit
	/// [`MAX_RESEND_ATTEMPTS`] are removed and reported as [`Expired`]
	/// instead of being handed back for resend.
	pub fn due_for_resend(&mut self, now: u32, timeout_ms: f32) -> (Vec<Sent>, Vec<Expired>) {
		let mut resend = Vec::new();
		let mut expired = Vec::new();

		for entry in self.entries.iter_mut() {
			let elapsed_ms = now.wrapping_sub(entry.sent_at) as f32 / 1000.0;
			if elapsed_ms < timeout_ms {
				continue;
			}

			entry.resend_count += 1;
			if entry.resend_count > MAX_RESEND_ATTEMPTS {
				expired.push(Expired { id: entry.id });
				continue;
			}

			entry.sent_at = now;
			resend.push(entry.clone());
		}

		if !expired.is_empty() {
			let dead: std::collections::HashSet<u32> = expired.iter().map(|e| e.id).collect();
			self.entries.retain(|e| !dead.contains(&e.id));
		}

		(resend, expired)
	}

	/// Called once per [`config::ADAPT_QUEUE_TICKS`] ticks to grow or shrink
	/// capacity based on whether the queue has stayed full between checks.
	pub fn adapt(&mut self) {
		let full_now = self.is_full();

		if full_now && self.full_at_last_check {
			self.capacity = (self.capacity * 2).min(MAX_QUEUE_SIZE);
		} else if !full_now {
			self.capacity = self.capacity.saturating_sub(4).max(1);
		}

		self.full_at_last_check = full_now;
	}

	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

impl Default for SendQueue {
	fn default() -> Self {
		SendQueue::new(config::MAX_QUEUE_SIZE.min(256))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ack_removes_matching_entry_and_measures_rtt() {
		let mut queue = SendQueue::new(8);
		queue.push(1, vec![1, 2, 3], 1_000);

		let rtt = queue.ack(1, 5_000).unwrap();
		assert_eq!(rtt, 4.0);
		assert!(queue.is_empty());
	}

	#[test]
	fn ack_of_unknown_id_is_noop() {
		let mut queue = SendQueue::new(8);
		queue.push(1, vec![], 0);
		assert!(queue.ack(99, 100).is_none());
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn resend_bumps_counter_and_resets_timestamp() {
		let mut queue = SendQueue::new(8);
		queue.push(1, vec![9], 0);

		let (resend, expired) = queue.due_for_resend(100_000, 10.0);
		assert_eq!(resend.len(), 1);
		assert_eq!(resend[0].resend_count, 1);
		assert!(expired.is_empty());
	}

	#[test]
	fn resend_below_timeout_is_skipped() {
		let mut queue = SendQueue::new(8);
		queue.push(1, vec![9], 0);

		let (resend, _) = queue.due_for_resend(5, 10.0);
		assert!(resend.is_empty());
	}

	#[test]
	fn expiry_after_max_resend_attempts_removes_entry() {
		let mut queue = SendQueue::new(8);
		queue.push(1, vec![9], 0);

		let mut now = 0u32;
		let mut expired = Vec::new();
		for _ in 0..=MAX_RESEND_ATTEMPTS {
			now += 100_000;
			let (_, exp) = queue.due_for_resend(now, 1.0);
			expired.extend(exp);
		}

		assert_eq!(expired.len(), 1);
		assert!(queue.is_empty());
	}

	#[test]
	fn adapt_grows_when_repeatedly_full() {
		let mut queue = SendQueue::new(2);
		queue.push(1, vec![], 0);
		queue.push(2, vec![], 0);

		queue.adapt();
		assert_eq!(queue.capacity(), 2);
		queue.adapt();
		assert_eq!(queue.capacity(), 4);
	}

	#[test]
	fn adapt_shrinks_when_not_full() {
		let mut queue = SendQueue::new(10);
		queue.adapt();
		assert_eq!(queue.capacity(), 6);
	}
}
