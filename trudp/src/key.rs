use std::fmt;
use std::net::SocketAddr;

/// Identifies one of the 16 independent channels to a remote endpoint.
///
/// Displays as `ip:port:ch`, the form the channel table is conceptually
/// keyed by; the actual `HashMap` key is this struct rather than the
/// formatted string, since hashing the tuple directly is cheaper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelKey {
	pub remote: SocketAddr,
	pub ch: u8,
}

impl ChannelKey {
	pub fn new(remote: SocketAddr, ch: u8) -> Self {
		debug_assert!(ch < 16, "channel number must be in 0..16");
		ChannelKey { remote, ch }
	}
}

impl fmt::Display for ChannelKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}:{}", self.remote.ip(), self.remote.port(), self.ch)
	}
}
