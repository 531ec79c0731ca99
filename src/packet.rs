//! IPv6 packet buffer.
//!
//! ```text
//! 0       8       16      24      32
//! +---+-------+-----------+-------+
//! |ver| class | flow label        |
//! +---+-------+-------+-------+---+
//! | payload length| next  | hops  |
//! +---------------+-------+-------+
//! | source address (16 bytes)     |
//! +-------------------------------+
//! | destination address (16 bytes)
//! +-------------------------------+
//! ```
//!
//! A packet is move-only. There is no `Clone`; the only copy of packet bytes
//! is the snippet taken for custody signals.
use crate::constants::{IP6_HEADER_LEN, IP6_VERSION};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use failure::Fail;
use std::net::Ipv6Addr;

/// Error parsing a packet.
#[derive(Debug, Fail)]
pub enum PacketError {
    /// Buffer can't hold an IPv6 header.
    #[fail(display = "packet too short for an ipv6 header ({} bytes)", _0)]
    TooShort(usize),
    /// Version field isn't 6.
    #[fail(display = "not an ipv6 packet (version {})", _0)]
    Version(u8),
}

/// An owned IPv6 datagram.
pub struct Ipv6Packet {
    data: BytesMut,
}

impl Ipv6Packet {
    /// Parses a packet.
    pub fn parse(data: BytesMut) -> Result<Self, PacketError> {
        if data.len() < IP6_HEADER_LEN {
            return Err(PacketError::TooShort(data.len()));
        }

        let packet = Self { data };
        if packet.version() != IP6_VERSION {
            return Err(PacketError::Version(packet.version()));
        }

        Ok(packet)
    }

    /// Creates a packet with traffic class and flow label zero.
    pub fn new(
        src: Ipv6Addr,
        dst: Ipv6Addr,
        next_header: u8,
        hop_limit: u8,
        payload: &[u8],
    ) -> Self {
        debug_assert!(payload.len() <= std::u16::MAX as usize);
        let mut data = BytesMut::with_capacity(IP6_HEADER_LEN + payload.len());
        data.put_u32_be(u32::from(IP6_VERSION) << 28);
        data.put_u16_be(payload.len() as u16);
        data.put_u8(next_header);
        data.put_u8(hop_limit);
        data.put_slice(&src.octets());
        data.put_slice(&dst.octets());
        data.put_slice(payload);
        Self { data }
    }

    /// Version.
    pub fn version(&self) -> u8 {
        self.data[0] >> 4
    }

    /// Traffic class.
    pub fn traffic_class(&self) -> u8 {
        (BigEndian::read_u16(&self.data[0..2]) >> 4) as u8
    }

    /// Flow label.
    pub fn flow_label(&self) -> u32 {
        BigEndian::read_u32(&self.data[0..4]) & 0x000f_ffff
    }

    /// Payload length as stated in the header.
    pub fn payload_len(&self) -> u16 {
        BigEndian::read_u16(&self.data[4..6])
    }

    /// Next header.
    pub fn next_header(&self) -> u8 {
        self.data[6]
    }

    /// Hop limit.
    pub fn hop_limit(&self) -> u8 {
        self.data[7]
    }

    /// Source address.
    pub fn src(&self) -> Ipv6Addr {
        self.addr_at(8)
    }

    /// Destination address.
    pub fn dst(&self) -> Ipv6Addr {
        self.addr_at(24)
    }

    fn addr_at(&self, offset: usize) -> Ipv6Addr {
        let mut octets = [0; 16];
        octets.copy_from_slice(&self.data[offset..offset + 16]);
        Ipv6Addr::from(octets)
    }

    /// Bytes following the IPv6 header.
    pub fn payload(&self) -> &[u8] {
        &self.data[IP6_HEADER_LEN..]
    }

    /// The whole datagram.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length of the whole datagram in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns the underlying buffer.
    pub fn into_bytes(self) -> BytesMut {
        self.data
    }
}

impl std::fmt::Debug for Ipv6Packet {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Ipv6Packet")
            .field("src", &self.src())
            .field("dst", &self.dst())
            .field("next header", &self.next_header())
            .field("hop limit", &self.hop_limit())
            .field("payload", &self.payload().len())
            .finish()
    }
}

fn sum_words(bytes: &[u8]) -> u64 {
    bytes
        .chunks(2)
        .map(|word| match word {
            [hi, lo] => u64::from(BigEndian::read_u16(&[*hi, *lo])),
            [hi] => u64::from(*hi) << 8,
            _ => 0,
        })
        .sum()
}

/// Upper-layer checksum with the IPv6 pseudo header (RFC 8200 8.1).
///
/// `body` is the upper-layer message with its checksum field set to zero.
pub fn checksum(src: &Ipv6Addr, dst: &Ipv6Addr, next_header: u8, body: &[u8]) -> u16 {
    let len = body.len() as u32;
    let mut sum = sum_words(&src.octets())
        + sum_words(&dst.octets())
        + u64::from(len >> 16)
        + u64::from(len & 0xffff)
        + u64::from(next_header)
        + sum_words(body);
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Checks an upper-layer message whose checksum field is filled in.
pub fn verify_checksum(src: &Ipv6Addr, dst: &Ipv6Addr, next_header: u8, body: &[u8]) -> bool {
    checksum(src, dst, next_header, body) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_parse() {
        let packet = Ipv6Packet::new(addr("fd00::1"), addr("fd00::3"), 17, 64, b"payload");
        let packet = Ipv6Packet::parse(packet.into_bytes()).unwrap();
        assert_eq!(packet.version(), 6);
        assert_eq!(packet.traffic_class(), 0);
        assert_eq!(packet.flow_label(), 0);
        assert_eq!(packet.payload_len(), 7);
        assert_eq!(packet.next_header(), 17);
        assert_eq!(packet.hop_limit(), 64);
        assert_eq!(packet.src(), addr("fd00::1"));
        assert_eq!(packet.dst(), addr("fd00::3"));
        assert_eq!(packet.payload(), b"payload");
        assert_eq!(packet.len(), 47);
    }

    #[test]
    fn test_traffic_class_flow_label() {
        let mut bytes = Ipv6Packet::new(addr("::1"), addr("::2"), 59, 1, &[]).into_bytes();
        bytes[0] = 0x6a;
        bytes[1] = 0xbc;
        bytes[2] = 0xde;
        bytes[3] = 0xf0;
        let packet = Ipv6Packet::parse(bytes).unwrap();
        assert_eq!(packet.traffic_class(), 0xab);
        assert_eq!(packet.flow_label(), 0xc_def0);
    }

    #[test]
    fn test_too_short() {
        match Ipv6Packet::parse(BytesMut::from(&[0x60; 39][..])) {
            Err(PacketError::TooShort(39)) => {}
            res => panic!("unexpected {:?}", res),
        }
    }

    #[test]
    fn test_wrong_version() {
        let mut bytes = Ipv6Packet::new(addr("::1"), addr("::2"), 59, 1, &[]).into_bytes();
        bytes[0] = 0x45;
        match Ipv6Packet::parse(bytes) {
            Err(PacketError::Version(4)) => {}
            res => panic!("unexpected {:?}", res),
        }
    }

    #[test]
    fn test_checksum() {
        let src = addr("fd00::2");
        let dst = addr("fd00::1");
        // echo request, id 1, seq 1, odd length payload
        let mut body = vec![128, 0, 0, 0, 0, 1, 0, 1, b'h', b'e', b'y'];
        let sum = checksum(&src, &dst, 58, &body);
        BigEndian::write_u16(&mut body[2..4], sum);
        assert!(verify_checksum(&src, &dst, 58, &body));
        assert!(!verify_checksum(&dst, &src, 17, &body));
        body[9] ^= 0x01;
        assert!(!verify_checksum(&src, &dst, 58, &body));
    }

    #[test]
    fn test_checksum_known_value() {
        // all-zero pseudo header and an all-zero body sum to zero
        let zero = Ipv6Addr::UNSPECIFIED;
        assert_eq!(checksum(&zero, &zero, 0, &[]), 0xffff);
        assert_eq!(checksum(&zero, &zero, 0, &[0x12, 0x34]), !0x1236);
    }
}
