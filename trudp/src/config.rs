use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::event::EventKind;

/// Default retransmit timeout added on top of the measured RTT, in milliseconds.
pub const DEFAULT_RTT_MS: u64 = 30;
/// Ceiling applied to the moving-average RTT before it feeds into the retransmit budget.
pub const MAX_RTT_MS: u64 = 500;
/// Send a PING when a channel has been silent for this long.
pub const PING_AFTER_MS: u64 = 1000;
/// Destroy a channel that has not received anything for this long.
pub const DISCONNECT_AFTER_MS: u64 = 3000;
/// Destroy a channel whose oldest unacknowledged packet has been resent this many times.
pub const MAX_RESEND_ATTEMPTS: u32 = 50;
/// Largest UDP datagram the endpoint will read or encode.
pub const MAX_BUFFER_SIZE: usize = 2048;
/// Hard ceiling on a channel's adaptive send-queue capacity.
pub const MAX_QUEUE_SIZE: usize = 2048;
/// Period of the retransmit/keepalive/statistics tick.
pub const TICK: Duration = Duration::from_millis(DEFAULT_RTT_MS);

pub(crate) const ADAPT_QUEUE_TICKS: u64 = 3;

/// A bitmask selecting which [`EventKind`]s are published on the event channel.
///
/// Filtering happens at publish time so a consumer that only cares about
/// `GotData` doesn't pay for the allocation of events it will discard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventMask(u32);

impl EventMask {
	pub const ALL: EventMask = EventMask(u32::MAX);
	pub const NONE: EventMask = EventMask(0);

	pub fn only(kinds: &[EventKind]) -> Self {
		let mut mask = 0;
		for kind in kinds {
			mask |= kind.bit();
		}
		EventMask(mask)
	}

	pub fn contains(&self, kind: EventKind) -> bool {
		self.0 & kind.bit() != 0
	}
}

impl Default for EventMask {
	fn default() -> Self {
		EventMask::ALL
	}
}

/// Endpoint-wide configuration, applied at bind time and adjustable afterwards
/// through [`crate::Endpoint::set_default_queue_size`] and
/// [`crate::Endpoint::set_show_statistics`].
#[derive(Clone, Debug)]
pub struct Config {
	/// Local address to bind. Defaults to loopback; use
	/// `Ipv4Addr::UNSPECIFIED` to listen on all interfaces.
	pub bind_addr: IpAddr,
	/// UDP port to bind. `0` asks the OS for an ephemeral port.
	pub port: u16,
	/// Starting send-queue capacity for newly created channels.
	pub default_queue_size: usize,
	/// Which event kinds are forwarded to the user event channel.
	pub allow_events: EventMask,
	/// Whether the tick loop logs rolled-up statistics.
	pub show_statistics: bool,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
			port: 0,
			default_queue_size: 256,
			allow_events: EventMask::default(),
			show_statistics: false,
		}
	}
}
