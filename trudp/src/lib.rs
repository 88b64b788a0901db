//! A connection-oriented, reliable, ordered datagram transport over UDP.
//!
//! An [`Endpoint`] binds one UDP socket and multiplexes up to 16 independent
//! [`Channel`]s per remote address, each with its own id sequence, send and
//! receive queues, and reset handshake. See the module docs on [`channel`]
//! and [`endpoint`] for the wire protocol and concurrency model.

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod event;
pub mod key;
pub mod packet;
pub mod queue;
pub mod stats;

pub use channel::{Channel, ResetState};
pub use config::{Config, EventMask};
pub use endpoint::{Endpoint, EndpointError};
pub use event::{Event, EventKind};
pub use key::ChannelKey;
