//! Custodial store.
//!
//! Holds packets for destinations without an open contact. The store is
//! bounded by the number of bytes it holds. When a packet doesn't fit it is
//! refused, older packets are never evicted to make room.
use crate::constants::Millis;
use crate::packet::Ipv6Packet;
use failure::Fail;
use log::trace;
use std::collections::VecDeque;
use std::net::Ipv6Addr;

/// Packet refused because the store has no room for it.
///
/// The packet is handed back so the caller can account for it.
#[derive(Debug, Fail)]
#[fail(
    display = "custodial store full: {} of {} bytes used, {} requested",
    used, capacity, requested
)]
pub struct StoreFull {
    packet: Ipv6Packet,
    used: usize,
    capacity: usize,
    requested: usize,
}

impl StoreFull {
    /// Returns the refused packet.
    pub fn into_packet(self) -> Ipv6Packet {
        self.packet
    }
}

/// A packet in custody.
#[derive(Debug)]
pub struct CustodyRecord {
    packet: Ipv6Packet,
    destination: Ipv6Addr,
    enqueued_at: Millis,
}

impl CustodyRecord {
    /// The stored packet.
    pub fn packet(&self) -> &Ipv6Packet {
        &self.packet
    }

    /// Destination the packet was stored for.
    pub fn destination(&self) -> Ipv6Addr {
        self.destination
    }

    /// Time the packet entered custody.
    pub fn enqueued_at(&self) -> Millis {
        self.enqueued_at
    }

    /// Takes the packet out of the record.
    pub fn into_packet(self) -> Ipv6Packet {
        self.packet
    }
}

/// Bounded packet store.
#[derive(Debug)]
pub struct CustodialStore {
    records: VecDeque<CustodyRecord>,
    capacity: usize,
    bytes_used: usize,
}

impl CustodialStore {
    /// Creates a store holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity,
            bytes_used: 0,
        }
    }

    /// Takes custody of a packet.
    pub fn store(
        &mut self,
        packet: Ipv6Packet,
        destination: Ipv6Addr,
        now: Millis,
    ) -> Result<(), StoreFull> {
        let requested = packet.len();
        if self.bytes_used + requested > self.capacity {
            return Err(StoreFull {
                packet,
                used: self.bytes_used,
                capacity: self.capacity,
                requested,
            });
        }
        self.bytes_used += requested;
        self.records.push_back(CustodyRecord {
            packet,
            destination,
            enqueued_at: now,
        });
        trace!("stored {} bytes for {}", requested, destination);
        Ok(())
    }

    /// Removes the oldest record for `destination`.
    pub fn take_for_destination(&mut self, destination: &Ipv6Addr) -> Option<CustodyRecord> {
        let index = self
            .records
            .iter()
            .position(|record| &record.destination == destination)?;
        let record = self.records.remove(index)?;
        self.bytes_used -= record.packet.len();
        Some(record)
    }

    /// Removes every record held longer than `lifetime`.
    pub fn expire(&mut self, now: Millis, lifetime: Millis) -> Vec<CustodyRecord> {
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            if now.saturating_sub(record.enqueued_at) > lifetime {
                expired.push(record);
            } else {
                kept.push_back(record);
            }
        }
        self.records = kept;
        for record in &expired {
            self.bytes_used -= record.packet.len();
        }
        expired
    }

    /// Number of records.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// Bytes held by all records.
    pub fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Maximum number of bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if nothing is in custody.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn packet(dst: &str, payload: &[u8]) -> Ipv6Packet {
        Ipv6Packet::new(addr("fd00::1"), addr(dst), 17, 64, payload)
    }

    #[test]
    fn test_store_full() {
        let a = packet("fd00::3", b"a");
        let mut store = CustodialStore::new(a.len());
        store.store(a, addr("fd00::3"), 0).unwrap();

        let err = store
            .store(packet("fd00::3", b"b"), addr("fd00::3"), 1)
            .unwrap_err();
        assert_eq!(err.into_packet().payload(), b"b");
        assert_eq!(store.count(), 1);
        assert_eq!(store.bytes_used(), store.capacity());

        let record = store.take_for_destination(&addr("fd00::3")).unwrap();
        assert_eq!(record.packet().payload(), b"a");
        assert_eq!(store.bytes_used(), 0);
    }

    #[test]
    fn test_fifo_per_destination() {
        let mut store = CustodialStore::new(1024);
        store.store(packet("fd00::3", b"1"), addr("fd00::3"), 0).unwrap();
        store.store(packet("fd00::4", b"2"), addr("fd00::4"), 1).unwrap();
        store.store(packet("fd00::3", b"3"), addr("fd00::3"), 2).unwrap();

        let first = store.take_for_destination(&addr("fd00::3")).unwrap();
        assert_eq!(first.packet().payload(), b"1");
        assert_eq!(first.enqueued_at(), 0);
        let second = store.take_for_destination(&addr("fd00::3")).unwrap();
        assert_eq!(second.packet().payload(), b"3");
        assert!(store.take_for_destination(&addr("fd00::3")).is_none());
        assert_eq!(store.count(), 1);
        assert!(store.take_for_destination(&addr("fd00::5")).is_none());
    }

    #[test]
    fn test_capacity_invariant() {
        let mut store = CustodialStore::new(200);
        for i in 0..10u8 {
            let payload = vec![i; usize::from(i) * 7];
            let _ = store.store(packet("fd00::3", &payload), addr("fd00::3"), 0);
            assert!(store.bytes_used() <= store.capacity());
            if i % 3 == 0 {
                store.take_for_destination(&addr("fd00::3"));
            }
        }
        let total: usize = std::iter::from_fn(|| store.take_for_destination(&addr("fd00::3")))
            .map(|record| record.packet().len())
            .sum();
        assert_eq!(store.bytes_used(), 0);
        assert!(total <= 200);
    }

    #[test]
    fn test_expire() {
        let mut store = CustodialStore::new(1024);
        store.store(packet("fd00::3", b"old"), addr("fd00::3"), 0).unwrap();
        store.store(packet("fd00::4", b"new"), addr("fd00::4"), 90).unwrap();

        assert!(store.expire(100, 100).is_empty());
        let expired = store.expire(101, 100);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].destination(), addr("fd00::3"));
        assert_eq!(store.count(), 1);
        assert_eq!(store.bytes_used(), packet("fd00::4", b"new").len());
    }
}
