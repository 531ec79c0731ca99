//! Custody signaling.
//!
//! Every custody transition is reported to the source of the packet with an
//! ICMPv6 message. The message carries the IPv6 header and the first 8
//! payload bytes of the triggering packet, like an ICMPv6 error message, so
//! the sender can tell which of its packets the report is about.
//!
//! ```text
//! 0       8       16              32
//! +-------+-------+---------------+
//! | type  | code  | checksum      |
//! +-------+-------+---------------+
//! | reserved                      |
//! +-------------------------------+
//! | timestamp                     |
//! +---------------+---------------+
//! | frag offset   | payload length|
//! +-------+-------+---------------+
//! | reason| triggering header + 8 bytes of payload
//! +-------+
//! ```
use crate::constants::{
    Millis, ICMP6_HEADER_LEN, NEXT_HEADER_ICMP6, SIGNAL_BODY_LEN, SIGNAL_HOP_LIMIT,
    SIGNAL_MESSAGE_LEN, SNIPPET_LEN,
};
use crate::packet::{checksum, verify_checksum, Ipv6Packet};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use std::net::Ipv6Addr;

/// Custody event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SignalType {
    /// Packet taken into custody.
    Received = 200,
    /// Packet forwarded towards its destination.
    Forwarded = 201,
    /// Packet delivered to the local node.
    Delivered = 202,
    /// Packet deleted.
    Deleted = 203,
}

impl SignalType {
    /// Parses the ICMPv6 type field.
    pub fn from_u8(ty: u8) -> Option<Self> {
        Some(match ty {
            200 => SignalType::Received,
            201 => SignalType::Forwarded,
            202 => SignalType::Delivered,
            203 => SignalType::Deleted,
            _ => return None,
        })
    }
}

/// Reason for a custody event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum SignalCode {
    /// No further information.
    NoInfo = 0,
    /// Custody lifetime expired.
    LifetimeExpired = 1,
    /// Link is unidirectional.
    UnidirectionalLink = 2,
    /// Transmission cancelled.
    TxCancelled = 3,
    /// Custodial store is full.
    DepletedStore = 4,
    /// Destination unknown.
    NoDestination = 5,
    /// No route to the destination.
    NoRoute = 6,
    /// No open contact to the destination.
    NoContact = 7,
    /// Hop limit exceeded.
    HopLimitExceeded = 9,
    /// Traffic pared.
    TrafficPared = 10,
}

impl SignalCode {
    /// Parses the ICMPv6 code field.
    pub fn from_u8(code: u8) -> Option<Self> {
        use self::SignalCode::*;
        Some(match code {
            0 => NoInfo,
            1 => LifetimeExpired,
            2 => UnidirectionalLink,
            3 => TxCancelled,
            4 => DepletedStore,
            5 => NoDestination,
            6 => NoRoute,
            7 => NoContact,
            9 => HopLimitExceeded,
            10 => TrafficPared,
            _ => return None,
        })
    }
}

/// Copy of the leading bytes of a triggering packet.
///
/// Taking a snippet is the only place a packet's bytes are duplicated, the
/// packet itself can then be forwarded or stored.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snippet {
    bytes: [u8; SNIPPET_LEN],
    source: Ipv6Addr,
    payload_len: u16,
}

impl Snippet {
    /// Copies the header and up to 8 payload bytes, zero padded.
    pub fn of(packet: &Ipv6Packet) -> Self {
        let mut bytes = [0; SNIPPET_LEN];
        let len = packet.len().min(SNIPPET_LEN);
        bytes[..len].copy_from_slice(&packet.as_bytes()[..len]);
        Self {
            bytes,
            source: packet.src(),
            payload_len: packet.payload_len(),
        }
    }

    /// The copied bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Source of the triggering packet.
    pub fn source(&self) -> Ipv6Addr {
        self.source
    }

    /// Payload length of the triggering packet.
    pub fn payload_len(&self) -> u16 {
        self.payload_len
    }
}

/// A received signaling message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signal {
    ty: SignalType,
    code: u8,
    timestamp: u32,
    fragment_offset: u16,
    payload_len: u16,
    reason: u8,
    sender: Ipv6Addr,
    checksum_ok: bool,
    snippet: Vec<u8>,
}

impl Signal {
    /// Event type.
    pub fn ty(&self) -> SignalType {
        self.ty
    }

    /// Reason code, `None` if unknown.
    pub fn code(&self) -> Option<SignalCode> {
        SignalCode::from_u8(self.code)
    }

    /// Raw reason code.
    pub fn raw_code(&self) -> u8 {
        self.code
    }

    /// Sender's clock when the event happened.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Fragment offset.
    pub fn fragment_offset(&self) -> u16 {
        self.fragment_offset
    }

    /// Payload length of the triggering packet.
    pub fn payload_len(&self) -> u16 {
        self.payload_len
    }

    /// Detailed deletion reason.
    pub fn reason(&self) -> u8 {
        self.reason
    }

    /// Node that sent the report.
    pub fn sender(&self) -> Ipv6Addr {
        self.sender
    }

    /// Checksum matched.
    pub fn checksum_ok(&self) -> bool {
        self.checksum_ok
    }

    /// Embedded header and payload bytes of the triggering packet.
    pub fn snippet(&self) -> &[u8] {
        &self.snippet
    }
}

/// Builds a signaling packet addressed to the source of the snippet.
pub fn build(
    ty: SignalType,
    code: SignalCode,
    reason: u8,
    local: Ipv6Addr,
    snippet: &Snippet,
    now: Millis,
) -> Ipv6Packet {
    let mut message = BytesMut::with_capacity(SIGNAL_MESSAGE_LEN);
    message.put_u8(ty as u8);
    message.put_u8(code as u8);
    message.put_u16_be(0);
    message.put_u32_be(0);
    // wraps after 49 days
    message.put_u32_be(now as u32);
    message.put_u16_be(0);
    message.put_u16_be(snippet.payload_len());
    message.put_u8(reason);
    message.put_slice(snippet.bytes());

    let dst = snippet.source();
    let sum = checksum(&local, &dst, NEXT_HEADER_ICMP6, &message);
    BigEndian::write_u16(&mut message[2..4], sum);

    Ipv6Packet::new(local, dst, NEXT_HEADER_ICMP6, SIGNAL_HOP_LIMIT, &message)
}

/// Parses a signaling message, `None` if the packet isn't one.
pub fn parse(packet: &Ipv6Packet) -> Option<Signal> {
    if packet.next_header() != NEXT_HEADER_ICMP6 {
        return None;
    }
    let len = usize::from(packet.payload_len()).min(packet.payload().len());
    let message = &packet.payload()[..len];
    if message.len() < ICMP6_HEADER_LEN + SIGNAL_BODY_LEN {
        return None;
    }
    let ty = SignalType::from_u8(message[0])?;
    let body = &message[ICMP6_HEADER_LEN..];
    let snippet = &body[SIGNAL_BODY_LEN..];
    let snippet = &snippet[..snippet.len().min(SNIPPET_LEN)];

    Some(Signal {
        ty,
        code: message[1],
        timestamp: BigEndian::read_u32(&body[0..4]),
        fragment_offset: BigEndian::read_u16(&body[4..6]),
        payload_len: BigEndian::read_u16(&body[6..8]),
        reason: body[8],
        sender: packet.src(),
        checksum_ok: verify_checksum(&packet.src(), &packet.dst(), NEXT_HEADER_ICMP6, message),
        snippet: snippet.to_vec(),
    })
}
