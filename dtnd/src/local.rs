//! Minimal local stack: answers pings.
use byteorder::{BigEndian, ByteOrder};
use dtn::constants::NEXT_HEADER_ICMP6;
use dtn::packet::checksum;
use dtn::Ipv6Packet;
use log::debug;

const ECHO_REQUEST: u8 = 128;
const ECHO_REPLY: u8 = 129;
const REPLY_HOP_LIMIT: u8 = 64;

/// Returns the reply to a packet addressed to this node, if any.
pub fn respond(packet: &Ipv6Packet) -> Option<Ipv6Packet> {
    if packet.next_header() != NEXT_HEADER_ICMP6 {
        debug!(
            "no local handler for next header {} from {}",
            packet.next_header(),
            packet.src()
        );
        return None;
    }
    let message = packet.payload();
    if message.len() < 8 || message[0] != ECHO_REQUEST || message[1] != 0 {
        return None;
    }
    let to = packet.src();
    if to.is_unspecified() || to.is_multicast() {
        return None;
    }
    let from = packet.dst();

    let mut reply = message.to_vec();
    reply[0] = ECHO_REPLY;
    BigEndian::write_u16(&mut reply[2..4], 0);
    let sum = checksum(&from, &to, NEXT_HEADER_ICMP6, &reply);
    BigEndian::write_u16(&mut reply[2..4], sum);
    debug!("echo reply to {}", to);
    Some(Ipv6Packet::new(
        from,
        to,
        NEXT_HEADER_ICMP6,
        REPLY_HOP_LIMIT,
        &reply,
    ))
}
