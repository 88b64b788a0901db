//! Wire codec for the TRUDP header (see `§6 External Interfaces`).
//!
//! Layout, all multi-byte integers little-endian:
//!
//! ```text
//! byte 0:      type (0..=5)
//! byte 1:      channel (low nibble)
//! bytes 2..4:  payload length (u16)
//! bytes 4..8:  packet id (u32)
//! bytes 8..12: timestamp, microseconds (u32, wraps)
//! bytes 12..14: checksum
//! bytes 14..:  payload
//! ```

use runtime::time;

pub const HEADER_LEN: usize = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
	Data = 0,
	Ack = 1,
	Reset = 2,
	AckReset = 3,
	Ping = 4,
	AckPing = 5,
}

impl PacketType {
	fn from_u8(b: u8) -> Option<Self> {
		Some(match b {
			0 => PacketType::Data,
			1 => PacketType::Ack,
			2 => PacketType::Reset,
			3 => PacketType::AckReset,
			4 => PacketType::Ping,
			5 => PacketType::AckPing,
			_ => return None,
		})
	}
}

/// A decoded packet. Owns its payload: packets cross the reader -> event-loop
/// thread boundary over a channel, so a zero-copy view into the read buffer
/// isn't an option here the way it is in a single-threaded reactor.
#[derive(Clone, Debug)]
pub struct Packet {
	pub kind: PacketType,
	pub ch: u8,
	pub id: u32,
	pub timestamp: u32,
	pub payload: Vec<u8>,
}

impl Packet {
	/// Time elapsed since this packet's embedded timestamp was stamped, in milliseconds.
	pub fn triptime_ms(&self) -> f32 {
		time::elapsed_ms(self.timestamp)
	}
}

fn checksum(bytes: &[u8; HEADER_LEN]) -> (u8, u8) {
	let sum = bytes[..12].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
	(sum, !sum)
}

fn write_header(kind: PacketType, ch: u8, id: u32, timestamp: u32, payload_len: u16) -> [u8; HEADER_LEN] {
	let mut buf = [0u8; HEADER_LEN];

	buf[0] = kind as u8;
	buf[1] = ch & 0x0f;
	buf[2..4].copy_from_slice(&payload_len.to_le_bytes());
	buf[4..8].copy_from_slice(&id.to_le_bytes());
	buf[8..12].copy_from_slice(&timestamp.to_le_bytes());

	let (sum, comp) = checksum(&buf);
	buf[12] = sum;
	buf[13] = comp;

	buf
}

fn encode(kind: PacketType, ch: u8, id: u32, timestamp: u32, payload: &[u8]) -> Vec<u8> {
	let header = write_header(kind, ch, id, timestamp, payload.len() as u16);

	let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
	bytes.extend_from_slice(&header);
	bytes.extend_from_slice(payload);
	bytes
}

pub fn encode_data(id: u32, ch: u8, payload: &[u8]) -> Vec<u8> {
	encode(PacketType::Data, ch, id, time::now_micros(), payload)
}

/// Echoes `original`'s id and timestamp back to the sender for RTT measurement.
pub fn encode_ack(original: &Packet) -> Vec<u8> {
	encode(PacketType::Ack, original.ch, original.id, original.timestamp, &[])
}

pub fn encode_reset(id: u32, ch: u8) -> Vec<u8> {
	encode(PacketType::Reset, ch, id, time::now_micros(), &[])
}

pub fn encode_ack_reset(original: &Packet) -> Vec<u8> {
	encode(PacketType::AckReset, original.ch, original.id, original.timestamp, &[])
}

pub fn encode_ping(ch: u8, payload: &[u8]) -> Vec<u8> {
	encode(PacketType::Ping, ch, 0, time::now_micros(), payload)
}

pub fn encode_ack_ping(original: &Packet) -> Vec<u8> {
	encode(PacketType::AckPing, original.ch, original.id, original.timestamp, &original.payload)
}

/// Validates checksum and minimum length. A necessary precondition for `decode`.
pub fn check(bytes: &[u8]) -> bool {
	if bytes.len() < HEADER_LEN {
		return false;
	}

	let mut header = [0u8; HEADER_LEN];
	header.copy_from_slice(&bytes[..HEADER_LEN]);

	let (sum, comp) = checksum(&header);
	if header[12] != sum || header[13] != comp {
		return false;
	}

	if PacketType::from_u8(header[0]).is_none() {
		return false;
	}

	let len = u16::from_le_bytes([header[2], header[3]]) as usize;
	bytes.len() == HEADER_LEN + len
}

/// Decodes a packet. Callers must have already run [`check`] on `bytes`.
pub fn decode(bytes: &[u8]) -> Option<Packet> {
	if !check(bytes) {
		return None;
	}

	let kind = PacketType::from_u8(bytes[0])?;
	let ch = bytes[1] & 0x0f;
	let id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
	let timestamp = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
	let payload = bytes[HEADER_LEN..].to_vec();

	Some(Packet { kind, ch, id, timestamp, payload })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_data() {
		let bytes = encode_data(42, 3, b"hello");
		assert!(check(&bytes));

		let packet = decode(&bytes).unwrap();
		assert_eq!(packet.kind, PacketType::Data);
		assert_eq!(packet.ch, 3);
		assert_eq!(packet.id, 42);
		assert_eq!(packet.payload, b"hello");
	}

	#[test]
	fn round_trip_empty_ping() {
		let bytes = encode_ping(0, &[]);
		let packet = decode(&bytes).unwrap();
		assert_eq!(packet.kind, PacketType::Ping);
		assert!(packet.payload.is_empty());
	}

	#[test]
	fn ack_echoes_id_and_timestamp() {
		let data = decode(&encode_data(7, 1, b"x")).unwrap();
		let ack = decode(&encode_ack(&data)).unwrap();

		assert_eq!(ack.kind, PacketType::Ack);
		assert_eq!(ack.id, data.id);
		assert_eq!(ack.timestamp, data.timestamp);
		assert!(ack.payload.is_empty());
	}

	#[test]
	fn check_rejects_short_buffer() {
		assert!(!check(&[0u8; 4]));
	}

	#[test]
	fn check_rejects_corrupted_checksum() {
		let mut bytes = encode_data(1, 0, b"x");
		bytes[0] ^= 0xff;
		assert!(!check(&bytes));
	}

	#[test]
	fn check_rejects_length_mismatch() {
		let mut bytes = encode_data(1, 0, b"hello");
		bytes.truncate(bytes.len() - 1);
		assert!(!check(&bytes));
	}

	#[test]
	fn channel_number_masked_to_low_nibble() {
		let bytes = encode_data(0, 0xff, b"");
		let packet = decode(&bytes).unwrap();
		assert_eq!(packet.ch, 0x0f);
	}

	#[test]
	fn decode_requires_check_to_pass() {
		let mut bytes = encode_data(1, 0, b"x");
		bytes[12] = 0;
		bytes[13] = 0;
		assert!(decode(&bytes).is_none());
	}
}
