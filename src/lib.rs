//! # DTN custody over IPv6
//! Some destinations can only be reached during scheduled contact windows,
//! for example a satellite that passes over a ground station a few times a
//! day. Plain IPv6 drops packets for such a destination while the window is
//! closed. This crate puts a custody layer in the forwarding path: packets for
//! a destination without an open window are held until one opens, and every
//! custody transition is reported to the sender of the packet.
//!
//! ## Forwarding
//! Each inbound packet is classified by the `Controller`:
//! - custody signals are consumed
//! - packets for this node go to the local stack
//! - packets for nodes without contacts are passed through
//! - packets for nodes with an open contact go to its next hop
//! - everything else is taken into custody, or dropped if the store is full
//!
//! On each tick the packets in custody for open contacts are released.
//!
//! ## Custody signals
//! Signals are ICMPv6 messages with types 200 to 203. They carry a timestamp,
//! the payload length of the triggering packet, a reason code and the first
//! 48 bytes of the triggering packet.
//!
//! ```text
//! 0      1      2             4                           8
//! +------+------+-------------+---------------------------+
//! | type | code |  checksum   |         reserved          |
//! +------+------+-------------+---------------------------+
//! |         timestamp         | frag offset | payload len |
//! +------+--------------------+-------------+-------------+
//! |reason|            snippet (48 bytes)                  |
//! +------+------------------------------------------------+
//! ```
//!
//! ## Hosts
//! The controller doesn't do any io. It is handed a `Link` that transmits and
//! delivers packets and a `Clock`. The `dtnd` crate in this repository runs it
//! on a Linux TUN device with raw sockets for egress.
#![deny(missing_docs)]
pub mod clock;
pub mod constants;
pub mod contact;
pub mod controller;
pub mod link;
pub mod packet;
pub mod signal;
pub mod storage;

pub use crate::clock::{Clock, ManualClock, MonotonicClock};
pub use crate::contact::{Contact, ContactError, ContactTable};
pub use crate::controller::{Controller, ControllerBuilder, Outcome, Stats, TickReport};
pub use crate::link::{Link, LinkError, LinkId, Loopback};
pub use crate::packet::{Ipv6Packet, PacketError};
pub use crate::signal::{Signal, SignalCode, SignalType, Snippet};
pub use crate::storage::{CustodialStore, CustodyRecord, StoreFull};
