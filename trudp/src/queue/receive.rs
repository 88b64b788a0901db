use std::collections::BTreeMap;

use crate::packet::Packet;

/// Buffers DATA packets that arrived ahead of the next expected id, so a
/// single dropped packet doesn't force the sender to stall until its
/// resend lands before anything after it can be delivered.
#[derive(Default)]
pub struct ReceiveQueue {
	pending: BTreeMap<u32, Packet>,
}

impl ReceiveQueue {
	pub fn new() -> Self {
		ReceiveQueue { pending: BTreeMap::new() }
	}

	pub fn len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	/// Buffers `packet` for later delivery. Returns `false` if `id` was
	/// already buffered (a duplicate retransmit arriving before its own ACK
	/// was processed).
	pub fn insert(&mut self, packet: Packet) -> bool {
		let id = packet.id;
		self.pending.insert(id, packet).is_none()
	}

	/// Pops every packet that is now contiguous with `expected`, advancing
	/// `expected` past each one delivered.
	pub fn drain_ready(&mut self, expected: &mut u32) -> Vec<Packet> {
		let mut ready = Vec::new();

		while let Some(packet) = self.pending.remove(expected) {
			*expected = expected.wrapping_add(1);
			ready.push(packet);
		}

		ready
	}

	pub fn clear(&mut self) {
		self.pending.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::packet::PacketType;

	fn packet(id: u32) -> Packet {
		Packet { kind: PacketType::Data, ch: 0, id, timestamp: 0, payload: vec![] }
	}

	#[test]
	fn drains_contiguous_run_in_order() {
		let mut queue = ReceiveQueue::new();
		queue.insert(packet(2));
		queue.insert(packet(1));
		queue.insert(packet(3));

		let mut expected = 1;
		let drained = queue.drain_ready(&mut expected);

		let ids: Vec<u32> = drained.iter().map(|p| p.id).collect();
		assert_eq!(ids, vec![1, 2, 3]);
		assert_eq!(expected, 4);
		assert!(queue.is_empty());
	}

	#[test]
	fn stops_at_a_gap() {
		let mut queue = ReceiveQueue::new();
		queue.insert(packet(1));
		queue.insert(packet(3));

		let mut expected = 1;
		let drained = queue.drain_ready(&mut expected);

		assert_eq!(drained.len(), 1);
		assert_eq!(expected, 2);
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn duplicate_insert_reports_false() {
		let mut queue = ReceiveQueue::new();
		assert!(queue.insert(packet(5)));
		assert!(!queue.insert(packet(5)));
	}
}
