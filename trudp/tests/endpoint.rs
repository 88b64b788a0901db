//! End-to-end tests driving two real [`Endpoint`]s over loopback UDP.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use trudp::{Config, Endpoint, EventKind};

fn local_config() -> Config {
	Config { port: 0, ..Config::default() }
}

fn recv_with_timeout(ep: &Endpoint, timeout: Duration) -> Option<trudp::Event> {
	let deadline = Instant::now() + timeout;
	loop {
		if let Some(event) = ep.try_next_event() {
			return Some(event);
		}
		if Instant::now() >= deadline {
			return None;
		}
		std::thread::sleep(Duration::from_millis(5));
	}
}

fn recv_until(ep: &Endpoint, kind: EventKind, timeout: Duration) -> Option<trudp::Event> {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if let Some(event) = recv_with_timeout(ep, Duration::from_millis(50)) {
			if event.kind == kind {
				return Some(event);
			}
		}
	}
	None
}

/// S1: a single DATA packet sent on an idle channel is delivered and the
/// sender observes GotAck.
#[test]
fn single_message_round_trip() {
	let mut server = Endpoint::bind(local_config()).unwrap();
	let mut client = Endpoint::bind(local_config()).unwrap();

	let server_addr: SocketAddr = server.local_addr();
	client.send(server_addr, 0, b"hello world".to_vec());

	let got_data = recv_until(&server, EventKind::GotData, Duration::from_secs(2));
	assert!(got_data.is_some(), "server should have received the message");

	let got_ack = recv_until(&client, EventKind::GotAck, Duration::from_secs(2));
	assert!(got_ack.is_some(), "client should have seen its send acked");

	client.close();
	server.close();
}

/// S2: several messages sent back to back on the same channel are delivered
/// in order even though the network doesn't guarantee it.
#[test]
fn ordered_delivery_under_reordering() {
	let mut server = Endpoint::bind(local_config()).unwrap();
	let mut client = Endpoint::bind(local_config()).unwrap();
	let server_addr = server.local_addr();

	for i in 0..5u8 {
		client.send(server_addr, 0, vec![i]);
	}

	let mut received = Vec::new();
	let deadline = Instant::now() + Duration::from_secs(3);
	while received.len() < 5 && Instant::now() < deadline {
		if let Some(event) = recv_with_timeout(&server, Duration::from_millis(100)) {
			if event.kind == EventKind::GotData {
				received.push(event.payload[0]);
			}
		}
	}

	assert_eq!(received, vec![0, 1, 2, 3, 4]);

	client.close();
	server.close();
}

/// S3: independent channels to the same remote don't interfere with each
/// other's sequence state.
#[test]
fn independent_channels_do_not_interleave() {
	let mut server = Endpoint::bind(local_config()).unwrap();
	let mut client = Endpoint::bind(local_config()).unwrap();
	let server_addr = server.local_addr();

	client.send(server_addr, 1, b"on channel one".to_vec());
	client.send(server_addr, 2, b"on channel two".to_vec());

	let mut seen_channels = std::collections::HashSet::new();
	let deadline = Instant::now() + Duration::from_secs(2);
	while seen_channels.len() < 2 && Instant::now() < deadline {
		if let Some(event) = recv_with_timeout(&server, Duration::from_millis(100)) {
			if event.kind == EventKind::GotData {
				seen_channels.insert(event.channel.ch);
			}
		}
	}

	assert!(seen_channels.contains(&1));
	assert!(seen_channels.contains(&2));

	client.close();
	server.close();
}

/// S4: a connect handshake on a fresh channel brings it to Connected without
/// any application data.
#[test]
fn connect_channel_establishes_without_data() {
	let mut server = Endpoint::bind(local_config()).unwrap();
	let mut client = Endpoint::bind(local_config()).unwrap();
	let server_addr = server.local_addr();

	client.connect_channel(server_addr, 3);

	let connected = recv_until(&server, EventKind::Connected, Duration::from_secs(2));
	assert!(connected.is_some());

	client.close();
	server.close();
}

/// S5: closing an endpoint stops delivering further events; the event
/// channel drains and then reports closed.
#[test]
fn close_drains_and_terminates_event_stream() {
	let mut server = Endpoint::bind(local_config()).unwrap();
	assert!(server.running());

	server.close();
	assert!(!server.running());

	// Drain whatever lifecycle events were already queued (at least
	// Initialize and Destroy); once the queue is empty and closed, recv()
	// must stop blocking and report the stream is finished.
	let mut drained = 0;
	while server.next_event().is_some() {
		drained += 1;
		assert!(drained < 100, "event stream never closed");
	}
}

/// S6: an explicit reset on a channel is observable via SendReset/GotReset
/// and the sequence state resynchronizes.
#[test]
fn explicit_reset_resynchronizes_channel() {
	let mut server = Endpoint::bind(local_config()).unwrap();
	let mut client = Endpoint::bind(local_config()).unwrap();
	let server_addr = server.local_addr();

	client.send(server_addr, 0, b"first".to_vec());
	recv_until(&server, EventKind::GotData, Duration::from_secs(2));

	client.reset_channel(server_addr, 0);
	let reset_local = recv_until(&client, EventKind::ResetLocal, Duration::from_secs(2));
	assert!(reset_local.is_some());

	let got_reset = recv_until(&server, EventKind::GotReset, Duration::from_secs(2));
	assert!(got_reset.is_some());

	client.close();
	server.close();
}
