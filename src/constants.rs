//! Constants of the DTN custody protocol.
//!
//! # Time
//! All times are milliseconds of a monotonic clock started with the process.
//! A u64 millisecond counter does not wrap for 584 million years, so window
//! arithmetic never has to deal with wrapping. The signaling timestamp on the
//! wire is only 32 bits wide and wraps after 49.7 days; it is informational
//! and never compared against contact windows.
//!
//! # Signaling message size
//!
//!   ICMP6_HEADER_LEN + SIGNAL_BODY_LEN + SNIPPET_LEN = 8 + 9 + 48 = 65
//!
//! where SNIPPET_LEN is the triggering IPv6 header plus the first 8 bytes of
//! its payload.
#![allow(missing_docs)]
pub type Millis = u64;

pub const IP6_VERSION: u8 = 6;
pub const IP6_HEADER_LEN: usize = 40;
pub const NEXT_HEADER_ICMP6: u8 = 58;

pub const ICMP6_HEADER_LEN: usize = 8;
pub const SIGNAL_BODY_LEN: usize = 9;
pub const SNIPPET_PAYLOAD_LEN: usize = 8;
pub const SNIPPET_LEN: usize = IP6_HEADER_LEN + SNIPPET_PAYLOAD_LEN;
pub const SIGNAL_MESSAGE_LEN: usize = ICMP6_HEADER_LEN + SIGNAL_BODY_LEN + SNIPPET_LEN;
pub const SIGNAL_HOP_LIMIT: u8 = 255;

pub const DEFAULT_STORE_CAPACITY: usize = 1024 * 1024;
pub const DEFAULT_DRAIN_LIMIT: usize = 1;
pub const DEFAULT_TICK_INTERVAL_MS: Millis = 1000;
