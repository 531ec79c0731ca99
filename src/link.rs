//! Defines the `Link` trait.
//!
//! The controller doesn't know how packets leave the node. The host hands it
//! a `Link` that can transmit a packet towards a next hop and deliver a
//! packet to the local stack.
use crate::packet::Ipv6Packet;
use failure::Fail;
use std::collections::VecDeque;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};

/// Identifies the link a packet arrived on.
pub type LinkId = u8;

/// Error handing a packet to a link.
#[derive(Debug, Fail)]
pub enum LinkError {
    /// Io error.
    #[fail(display = "{}", _0)]
    Io(std::io::Error),
    /// No link reaches the address.
    #[fail(display = "no egress link for {}", _0)]
    NoRoute(Ipv6Addr),
    /// Packet exceeds the link buffer.
    #[fail(display = "packet too large ({} bytes)", _0)]
    TooLarge(usize),
    /// The link refused the packet.
    #[fail(display = "link down")]
    Down,
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Packet sinks provided by the host.
pub trait Link {
    /// Sends a complete IPv6 packet towards `next_hop`.
    fn transmit(&mut self, packet: Ipv6Packet, next_hop: Ipv6Addr) -> Result<(), LinkError>;

    /// Hands a packet addressed to this node to the local stack.
    fn deliver_locally(&mut self, packet: Ipv6Packet, arrival: LinkId) -> Result<(), LinkError>;
}

#[derive(Default)]
struct InnerLoopback {
    transmitted: VecDeque<(Ipv6Packet, Ipv6Addr)>,
    delivered: VecDeque<(Ipv6Packet, LinkId)>,
    fail_transmit: bool,
    fail_delivery: bool,
}

/// A link that records packets instead of sending them.
///
/// Clones share the same queues, so a test can keep one handle and give the
/// other to a controller.
#[derive(Clone, Default)]
pub struct Loopback(Arc<Mutex<InnerLoopback>>);

impl Loopback {
    fn inner(&self) -> std::sync::MutexGuard<'_, InnerLoopback> {
        match self.0.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes transmissions fail.
    pub fn set_fail_transmit(&self, fail: bool) {
        self.inner().fail_transmit = fail;
    }

    /// Makes local deliveries fail.
    pub fn set_fail_delivery(&self, fail: bool) {
        self.inner().fail_delivery = fail;
    }

    /// Pops the oldest transmitted packet and its next hop.
    pub fn pop_transmitted(&self) -> Option<(Ipv6Packet, Ipv6Addr)> {
        self.inner().transmitted.pop_front()
    }

    /// Pops the oldest locally delivered packet.
    pub fn pop_delivered(&self) -> Option<(Ipv6Packet, LinkId)> {
        self.inner().delivered.pop_front()
    }

    /// Number of transmitted packets not popped yet.
    pub fn transmitted_len(&self) -> usize {
        self.inner().transmitted.len()
    }

    /// Number of delivered packets not popped yet.
    pub fn delivered_len(&self) -> usize {
        self.inner().delivered.len()
    }
}

impl Link for Loopback {
    fn transmit(&mut self, packet: Ipv6Packet, next_hop: Ipv6Addr) -> Result<(), LinkError> {
        let mut inner = self.inner();
        if inner.fail_transmit {
            return Err(LinkError::Down);
        }
        inner.transmitted.push_back((packet, next_hop));
        Ok(())
    }

    fn deliver_locally(&mut self, packet: Ipv6Packet, arrival: LinkId) -> Result<(), LinkError> {
        let mut inner = self.inner();
        if inner.fail_delivery {
            return Err(LinkError::Down);
        }
        inner.delivered.push_back((packet, arrival));
        Ok(())
    }
}
