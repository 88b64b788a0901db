use crate::key::ChannelKey;

/// The kinds of lifecycle and data events an endpoint publishes.
///
/// Mirrors the event set a TRUDP implementation needs to drive a higher-level
/// protocol on top of it: connection lifecycle (`Connected`/`Disconnected`),
/// reset handshaking, keepalive round trips, and data delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	/// The endpoint has finished binding and started its worker threads.
	Initialize,
	/// The endpoint has stopped and torn down its worker threads.
	Destroy,
	/// A channel delivered its first packet and is now alive.
	Connected,
	/// A channel was destroyed, by timeout, reset, or explicit close.
	Disconnected,
	/// A RESET packet was received from the remote side.
	GotReset,
	/// A RESET packet was sent to the remote side.
	SendReset,
	/// An ACK_RESET packet was received, completing a local reset.
	GotAckReset,
	/// An ACK_PING packet was received.
	GotAckPing,
	/// A PING packet was received.
	GotPing,
	/// An ACK packet was received for a previously sent DATA packet.
	GotAck,
	/// A DATA packet was received and delivered in order.
	GotData,
	/// A DATA packet was received on a channel with trudp disabled for it.
	GotDataNoTrudp,
	/// This endpoint initiated a reset of the channel's sequence state.
	ResetLocal,
}

impl EventKind {
	/// Bit position for [`crate::config::EventMask`]. Stable for the life of
	/// this enum; add new kinds at the end to keep existing masks valid.
	pub fn bit(self) -> u32 {
		1 << (self as u32)
	}
}

/// A single event delivered on an endpoint's event channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
	pub channel: ChannelKey,
	pub kind: EventKind,
	pub payload: Vec<u8>,
}

impl Event {
	pub fn new(channel: ChannelKey, kind: EventKind) -> Self {
		Event { channel, kind, payload: Vec::new() }
	}

	pub fn with_payload(channel: ChannelKey, kind: EventKind, payload: Vec<u8>) -> Self {
		Event { channel, kind, payload }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bits_are_distinct() {
		let kinds = [
			EventKind::Initialize,
			EventKind::Destroy,
			EventKind::Connected,
			EventKind::Disconnected,
			EventKind::GotReset,
			EventKind::SendReset,
			EventKind::GotAckReset,
			EventKind::GotAckPing,
			EventKind::GotPing,
			EventKind::GotAck,
			EventKind::GotData,
			EventKind::GotDataNoTrudp,
			EventKind::ResetLocal,
		];

		let mut mask = 0u32;
		for kind in kinds {
			assert_eq!(mask & kind.bit(), 0, "duplicate bit for {kind:?}");
			mask |= kind.bit();
		}
	}
}
