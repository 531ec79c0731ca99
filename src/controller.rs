//! Forwarding decision engine.
//!
//! Every inbound packet ends in exactly one of these ways:
//!
//! ```text
//! +--------------------------+------------------------------+-----------+
//! | condition                | action                       | signal    |
//! +==========================+==============================+===========+
//! | not ipv6                 | drop                         | -         |
//! | custody signal           | consume                      | -         |
//! | for this node            | deliver locally              | -         |
//! | no contacts for dst      | transmit to dst              | -         |
//! | contact open             | transmit to next hop         | Forwarded |
//! | no contact, store ok     | take custody                 | Received  |
//! | no contact, store full   | drop                         | Deleted   |
//! +--------------------------+------------------------------+-----------+
//! ```
//!
//! On every tick the open contacts are walked in table order and packets in
//! custody for them are released. A packet that fails to go out after it left
//! custody is gone, it is not stored again.
use crate::clock::{Clock, MonotonicClock};
use crate::constants::{Millis, DEFAULT_DRAIN_LIMIT, DEFAULT_STORE_CAPACITY, NEXT_HEADER_ICMP6};
use crate::contact::{Contact, ContactTable};
use crate::link::{Link, LinkId};
use crate::packet::Ipv6Packet;
use crate::signal::{self, Signal, SignalCode, SignalType, Snippet};
use crate::storage::{CustodialStore, CustodyRecord};
use bytes::BytesMut;
use log::{debug, info, warn};
use std::net::Ipv6Addr;

/// Link id passed to the local stack for packets released from custody.
pub const CUSTODY_LINK: LinkId = 0;

/// What happened to an inbound packet.
#[derive(Debug)]
pub enum Outcome {
    /// Not an IPv6 packet.
    Malformed,
    /// A custody signal, consumed.
    Signal(Signal),
    /// Handed to the local stack.
    Delivered,
    /// Destination is not managed by custody, transmitted as is.
    PassedThrough,
    /// Transmitted over an open contact.
    Forwarded {
        /// Next hop of the contact.
        next_hop: Ipv6Addr,
    },
    /// Taken into custody.
    Custodied,
    /// Dropped because the store is full.
    Deleted,
}

/// Work done by a tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    /// Packets released from custody to the local stack, accepted or not.
    pub delivered: usize,
    /// Packets released from custody to a next hop, sent or not.
    pub forwarded: usize,
    /// Packets whose custody expired.
    pub expired: usize,
}

/// Counters since the controller was built.
///
/// Packets the link refused are only counted in `link_errors`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Malformed packets dropped.
    pub malformed: u64,
    /// Custody signals received.
    pub signals_received: u64,
    /// Custody signals sent.
    pub signals_sent: u64,
    /// Packets the local stack accepted on arrival.
    pub delivered: u64,
    /// Packets passed through and sent.
    pub passed_through: u64,
    /// Packets sent over an open contact on arrival.
    pub forwarded: u64,
    /// Packets taken into custody.
    pub custodied: u64,
    /// Packets dropped because the store was full.
    pub deleted: u64,
    /// Packets released from custody and accepted by the link.
    pub released: u64,
    /// Packets whose custody expired.
    pub expired: u64,
    /// Failed transmissions and local deliveries.
    pub link_errors: u64,
}

/// Builder for controllers.
#[derive(Clone, Debug)]
pub struct ControllerBuilder {
    /// Address of this node.
    local_addr: Ipv6Addr,
    /// Maximum number of bytes held in custody.
    store_capacity: usize,
    /// Initial contact table.
    contacts: Vec<Contact>,
    /// Maximum time a packet is held in custody.
    custody_lifetime: Option<Millis>,
    /// Maximum number of packets released per open contact and tick.
    drain_limit: usize,
}

impl ControllerBuilder {
    /// Creates a new `ControllerBuilder`.
    pub fn new(local_addr: Ipv6Addr) -> Self {
        Self {
            local_addr,
            store_capacity: DEFAULT_STORE_CAPACITY,
            contacts: Vec::new(),
            custody_lifetime: None,
            drain_limit: DEFAULT_DRAIN_LIMIT,
        }
    }

    /// Maximum number of bytes held in custody.
    pub fn set_store_capacity(mut self, store_capacity: usize) -> Self {
        self.store_capacity = store_capacity;
        self
    }

    /// Appends a contact to the initial contact table.
    pub fn add_contact(mut self, contact: Contact) -> Self {
        self.contacts.push(contact);
        self
    }

    /// Maximum time a packet is held in custody, `None` holds it until a
    /// contact opens.
    pub fn set_custody_lifetime(mut self, custody_lifetime: Option<Millis>) -> Self {
        self.custody_lifetime = custody_lifetime;
        self
    }

    /// Maximum number of packets released per open contact and tick, at
    /// least one.
    pub fn set_drain_limit(mut self, drain_limit: usize) -> Self {
        self.drain_limit = drain_limit.max(1);
        self
    }

    /// Builds a controller using the monotonic clock.
    pub fn build<L: Link>(&self, link: L) -> Controller<L> {
        self.build_with_clock(link, MonotonicClock::new())
    }

    /// Builds a controller with a custom clock.
    pub fn build_with_clock<L: Link, C: Clock>(&self, link: L, clock: C) -> Controller<L, C> {
        let mut contacts = ContactTable::new();
        for contact in &self.contacts {
            contacts.add_contact(contact.clone());
        }
        info!(
            "controller {} with {} contacts, {} byte store",
            self.local_addr,
            contacts.len(),
            self.store_capacity
        );
        Controller {
            local_addr: self.local_addr,
            contacts,
            store: CustodialStore::new(self.store_capacity),
            link,
            clock,
            custody_lifetime: self.custody_lifetime,
            drain_limit: self.drain_limit,
            stats: Stats::default(),
        }
    }
}

/// Forwarding decision engine.
pub struct Controller<L: Link, C: Clock = MonotonicClock> {
    local_addr: Ipv6Addr,
    contacts: ContactTable,
    store: CustodialStore,
    link: L,
    clock: C,
    custody_lifetime: Option<Millis>,
    drain_limit: usize,
    stats: Stats,
}

impl<L: Link, C: Clock> Controller<L, C> {
    /// Processes a packet received on `arrival`.
    pub fn on_inbound(&mut self, frame: BytesMut, arrival: LinkId) -> Outcome {
        let packet = match Ipv6Packet::parse(frame) {
            Ok(packet) => packet,
            Err(err) => {
                warn!("dropping packet from link {}: {}", arrival, err);
                self.stats.malformed += 1;
                return Outcome::Malformed;
            }
        };

        if packet.next_header() == NEXT_HEADER_ICMP6 {
            if let Some(signal) = signal::parse(&packet) {
                if !signal.checksum_ok() {
                    warn!("custody signal from {} has a bad checksum", signal.sender());
                }
                info!(
                    "{:?} code {} reason {} from {} at {}",
                    signal.ty(),
                    signal.raw_code(),
                    signal.reason(),
                    signal.sender(),
                    signal.timestamp()
                );
                self.stats.signals_received += 1;
                return Outcome::Signal(signal);
            }
        }

        let dst = packet.dst();
        if dst == self.local_addr {
            if self.deliver(packet, arrival) {
                self.stats.delivered += 1;
            }
            return Outcome::Delivered;
        }

        if !self.contacts.is_dtn_destination(&dst) {
            if self.transmit(packet, dst) {
                self.stats.passed_through += 1;
            }
            return Outcome::PassedThrough;
        }

        let now = self.clock.now();
        let snippet = Snippet::of(&packet);
        if let Some(next_hop) = self.contacts.active_next_hop(&dst, now) {
            debug!("contact open for {}, forwarding via {}", dst, next_hop);
            if self.transmit(packet, next_hop) {
                self.stats.forwarded += 1;
            }
            self.signal(SignalType::Forwarded, SignalCode::NoInfo, &snippet, now);
            return Outcome::Forwarded { next_hop };
        }

        match self.store.store(packet, dst, now) {
            Ok(()) => {
                debug!("no contact for {}, packet taken into custody", dst);
                self.stats.custodied += 1;
                self.signal(SignalType::Received, SignalCode::NoContact, &snippet, now);
                Outcome::Custodied
            }
            Err(full) => {
                warn!("deleting packet for {}: {}", dst, full);
                self.stats.deleted += 1;
                drop(full.into_packet());
                self.signal(SignalType::Deleted, SignalCode::DepletedStore, &snippet, now);
                Outcome::Deleted
            }
        }
    }

    /// Releases packets in custody for open contacts.
    pub fn on_tick(&mut self, now: Millis) -> TickReport {
        let mut report = TickReport::default();
        self.contacts.refresh(now);

        if let Some(lifetime) = self.custody_lifetime {
            for record in self.store.expire(now, lifetime) {
                info!(
                    "custody of packet for {} expired after {} ms",
                    record.destination(),
                    now - record.enqueued_at()
                );
                let snippet = Snippet::of(record.packet());
                drop(record);
                self.stats.expired += 1;
                report.expired += 1;
                self.signal(SignalType::Deleted, SignalCode::LifetimeExpired, &snippet, now);
            }
        }

        let open: Vec<(Ipv6Addr, Ipv6Addr)> = self
            .contacts
            .active(now)
            .map(|contact| (contact.node(), contact.next_hop()))
            .collect();
        for (node, next_hop) in open {
            for _ in 0..self.drain_limit {
                match self.store.take_for_destination(&node) {
                    Some(record) => self.release(record, next_hop, now, &mut report),
                    None => break,
                }
            }
        }

        report
    }

    fn release(
        &mut self,
        record: CustodyRecord,
        next_hop: Ipv6Addr,
        now: Millis,
        report: &mut TickReport,
    ) {
        let destination = record.destination();
        let packet = record.into_packet();
        let snippet = Snippet::of(&packet);

        let accepted = if destination == self.local_addr {
            debug!("releasing packet from custody to the local stack");
            report.delivered += 1;
            self.signal(SignalType::Delivered, SignalCode::NoInfo, &snippet, now);
            self.deliver(packet, CUSTODY_LINK)
        } else {
            debug!("releasing packet for {} via {}", destination, next_hop);
            report.forwarded += 1;
            let sent = self.transmit(packet, next_hop);
            self.signal(SignalType::Forwarded, SignalCode::NoInfo, &snippet, now);
            sent
        };
        if accepted {
            self.stats.released += 1;
        }
    }

    fn deliver(&mut self, packet: Ipv6Packet, arrival: LinkId) -> bool {
        match self.link.deliver_locally(packet, arrival) {
            Ok(()) => true,
            Err(err) => {
                warn!("local delivery failed: {}", err);
                self.stats.link_errors += 1;
                false
            }
        }
    }

    fn transmit(&mut self, packet: Ipv6Packet, next_hop: Ipv6Addr) -> bool {
        let dst = packet.dst();
        match self.link.transmit(packet, next_hop) {
            Ok(()) => true,
            Err(err) => {
                warn!("sending packet for {} via {} failed: {}", dst, next_hop, err);
                self.stats.link_errors += 1;
                false
            }
        }
    }

    fn signal(&mut self, ty: SignalType, code: SignalCode, snippet: &Snippet, now: Millis) {
        let to = snippet.source();
        if to.is_unspecified() || to.is_multicast() {
            debug!("not sending {:?} to {}", ty, to);
            return;
        }
        let packet = signal::build(ty, code, 0, self.local_addr, snippet, now);
        match self.link.transmit(packet, to) {
            Ok(()) => {
                debug!("sent {:?} code {:?} to {}", ty, code, to);
                self.stats.signals_sent += 1;
            }
            Err(err) => {
                warn!("sending {:?} to {} failed: {}", ty, to, err);
                self.stats.link_errors += 1;
            }
        }
    }

    /// Address of this node.
    pub fn local_addr(&self) -> Ipv6Addr {
        self.local_addr
    }

    /// Current time of the controller's clock.
    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    /// The contact table.
    pub fn contacts(&self) -> &ContactTable {
        &self.contacts
    }

    /// The contact table, for schedule updates.
    pub fn contacts_mut(&mut self) -> &mut ContactTable {
        &mut self.contacts
    }

    /// The custodial store.
    pub fn store(&self) -> &CustodialStore {
        &self.store
    }

    /// The custodial store, for administrative custody.
    pub fn store_mut(&mut self) -> &mut CustodialStore {
        &mut self.store
    }

    /// The link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// The link, for hosts that collect output from it.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Counters since the controller was built.
    pub fn stats(&self) -> Stats {
        self.stats
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::link::Loopback;

    fn addr(s: &str) -> Ipv6Addr {
        s.parse().unwrap()
    }

    fn local() -> Ipv6Addr {
        addr("fd00::2")
    }

    fn sender() -> Ipv6Addr {
        addr("fd00::1")
    }

    fn node() -> Ipv6Addr {
        addr("fd00::3")
    }

    fn hop() -> Ipv6Addr {
        addr("fd00::30")
    }

    fn packet(dst: Ipv6Addr, payload: &[u8]) -> Ipv6Packet {
        Ipv6Packet::new(sender(), dst, 17, 64, payload)
    }

    fn frame(dst: Ipv6Addr, payload: &[u8]) -> BytesMut {
        packet(dst, payload).into_bytes()
    }

    fn window(start: Millis, end: Millis) -> Contact {
        Contact::new(node(), hop(), start, end, true).unwrap()
    }

    fn setup(
        builder: ControllerBuilder,
        now: Millis,
    ) -> (Controller<Loopback, ManualClock>, Loopback, ManualClock) {
        let lb = Loopback::default();
        let clock = ManualClock::new(now);
        let controller = builder.build_with_clock(lb.clone(), clock.clone());
        (controller, lb, clock)
    }

    fn expect_signal(lb: &Loopback, ty: SignalType, code: SignalCode) -> Signal {
        let (packet, to) = lb.pop_transmitted().expect("no signal sent");
        assert_eq!(to, sender());
        assert_eq!(packet.dst(), sender());
        assert_eq!(packet.src(), local());
        let signal = signal::parse(&packet).expect("not a signal");
        assert_eq!(signal.ty(), ty);
        assert_eq!(signal.code(), Some(code));
        assert!(signal.checksum_ok());
        signal
    }

    #[test]
    fn test_malformed() {
        let (mut controller, lb, _) = setup(ControllerBuilder::new(local()), 0);
        let outcome = controller.on_inbound(BytesMut::from(&[0x60; 20][..]), 1);
        assert!(matches!(outcome, Outcome::Malformed));

        let mut v4 = frame(node(), b"data");
        v4[0] = 0x45;
        assert!(matches!(controller.on_inbound(v4, 1), Outcome::Malformed));

        assert_eq!(lb.transmitted_len(), 0);
        assert_eq!(lb.delivered_len(), 0);
        assert_eq!(controller.stats().malformed, 2);
    }

    #[test]
    fn test_signal_is_consumed() {
        let (mut controller, lb, _) = setup(ControllerBuilder::new(local()), 0);
        let trigger = Ipv6Packet::new(local(), node(), 17, 64, b"data");
        let report = signal::build(
            SignalType::Forwarded,
            SignalCode::NoInfo,
            0,
            addr("fd00::9"),
            &Snippet::of(&trigger),
            42,
        );
        match controller.on_inbound(report.into_bytes(), 1) {
            Outcome::Signal(signal) => {
                assert_eq!(signal.ty(), SignalType::Forwarded);
                assert_eq!(signal.sender(), addr("fd00::9"));
                assert_eq!(signal.timestamp(), 42);
            }
            outcome => panic!("unexpected {:?}", outcome),
        }
        assert_eq!(lb.transmitted_len(), 0);
        assert_eq!(lb.delivered_len(), 0);
    }

    #[test]
    fn test_other_icmp6_continues() {
        let (mut controller, lb, _) = setup(ControllerBuilder::new(local()), 0);
        let echo = Ipv6Packet::new(sender(), local(), 58, 64, &[128, 0, 0, 0, 0, 1, 0, 1]);
        let outcome = controller.on_inbound(echo.into_bytes(), 3);
        assert!(matches!(outcome, Outcome::Delivered));
        let (packet, arrival) = lb.pop_delivered().unwrap();
        assert_eq!(packet.payload()[0], 128);
        assert_eq!(arrival, 3);
    }

    #[test]
    fn test_local_delivery() {
        let builder = ControllerBuilder::new(local()).add_contact(window(0, 10));
        let (mut controller, lb, _) = setup(builder, 100);
        let outcome = controller.on_inbound(frame(local(), b"hello"), 2);
        assert!(matches!(outcome, Outcome::Delivered));
        let (packet, arrival) = lb.pop_delivered().unwrap();
        assert_eq!(packet.payload(), b"hello");
        assert_eq!(arrival, 2);
        assert_eq!(lb.transmitted_len(), 0);
    }

    #[test]
    fn test_non_dtn_destination() {
        let builder = ControllerBuilder::new(local()).add_contact(window(0, 10));
        let (mut controller, lb, _) = setup(builder, 5);
        let other = addr("fd00:23::7");
        let outcome = controller.on_inbound(frame(other, b"plain"), 1);
        assert!(matches!(outcome, Outcome::PassedThrough));

        let (packet, to) = lb.pop_transmitted().unwrap();
        assert_eq!(packet.payload(), b"plain");
        assert_eq!(to, other);
        assert_eq!(lb.transmitted_len(), 0);
        assert!(controller.store().is_empty());
        assert_eq!(controller.contacts().len(), 1);
    }

    #[test]
    fn test_active_contact() {
        let builder = ControllerBuilder::new(local()).add_contact(window(0, 10));
        let (mut controller, lb, _) = setup(builder, 5);
        match controller.on_inbound(frame(node(), b"now"), 1) {
            Outcome::Forwarded { next_hop } => assert_eq!(next_hop, hop()),
            outcome => panic!("unexpected {:?}", outcome),
        }

        let (packet, to) = lb.pop_transmitted().unwrap();
        assert_eq!(packet.payload(), b"now");
        assert_eq!(to, hop());
        let signal = expect_signal(&lb, SignalType::Forwarded, SignalCode::NoInfo);
        assert_eq!(signal.timestamp(), 5);
        assert_eq!(&signal.snippet()[40..43], b"now");
        assert!(controller.store().is_empty());
    }

    #[test]
    fn test_contact_closed_then_opens() {
        let builder = ControllerBuilder::new(local()).add_contact(window(1000, 2000));
        let (mut controller, lb, clock) = setup(builder, 0);
        let outcome = controller.on_inbound(frame(node(), b"later"), 1);
        assert!(matches!(outcome, Outcome::Custodied));
        let signal = expect_signal(&lb, SignalType::Received, SignalCode::NoContact);
        assert_eq!(signal.payload_len(), 5);
        assert_eq!(controller.store().count(), 1);
        assert_eq!(lb.transmitted_len(), 0);

        assert_eq!(controller.on_tick(500), TickReport::default());
        assert_eq!(lb.transmitted_len(), 0);

        clock.set(1500);
        let report = controller.on_tick(1500);
        assert_eq!(report.forwarded, 1);
        let (packet, to) = lb.pop_transmitted().unwrap();
        assert_eq!(packet.payload(), b"later");
        assert_eq!(to, hop());
        let signal = expect_signal(&lb, SignalType::Forwarded, SignalCode::NoInfo);
        assert_eq!(signal.timestamp(), 1500);
        assert!(controller.store().is_empty());
    }

    #[test]
    fn test_store_exhaustion() {
        let a = packet(node(), b"packet a");
        let builder = ControllerBuilder::new(local())
            .set_store_capacity(a.len())
            .add_contact(window(1000, 2000));
        let (mut controller, lb, _) = setup(builder, 0);

        assert!(matches!(
            controller.on_inbound(a.into_bytes(), 1),
            Outcome::Custodied
        ));
        expect_signal(&lb, SignalType::Received, SignalCode::NoContact);

        assert!(matches!(
            controller.on_inbound(frame(node(), b"b"), 1),
            Outcome::Deleted
        ));
        let signal = expect_signal(&lb, SignalType::Deleted, SignalCode::DepletedStore);
        assert_eq!(&signal.snippet()[40..41], b"b");
        assert_eq!(lb.transmitted_len(), 0);

        assert_eq!(controller.store().count(), 1);
        let record = controller.store_mut().take_for_destination(&node()).unwrap();
        assert_eq!(record.packet().payload(), b"packet a");
    }

    #[test]
    fn test_released_packet_is_not_requeued() {
        let builder = ControllerBuilder::new(local()).add_contact(window(100, 200));
        let (mut controller, lb, _) = setup(builder, 0);
        controller.on_inbound(frame(node(), b"lost"), 1);
        expect_signal(&lb, SignalType::Received, SignalCode::NoContact);

        lb.set_fail_transmit(true);
        let report = controller.on_tick(150);
        assert_eq!(report.forwarded, 1);
        assert!(controller.store().is_empty());
        assert_eq!(lb.transmitted_len(), 0);
        assert_eq!(controller.stats().link_errors, 2);

        lb.set_fail_transmit(false);
        assert_eq!(controller.on_tick(160), TickReport::default());
        assert_eq!(lb.transmitted_len(), 0);
    }

    #[test]
    fn test_release_to_local_stack() {
        let contact = Contact::new(local(), local(), 0, 100, true).unwrap();
        let builder = ControllerBuilder::new(local()).add_contact(contact);
        let (mut controller, lb, _) = setup(builder, 0);
        controller
            .store_mut()
            .store(packet(local(), b"mine"), local(), 0)
            .unwrap();

        let report = controller.on_tick(50);
        assert_eq!(report.delivered, 1);
        expect_signal(&lb, SignalType::Delivered, SignalCode::NoInfo);
        let (packet, arrival) = lb.pop_delivered().unwrap();
        assert_eq!(packet.payload(), b"mine");
        assert_eq!(arrival, CUSTODY_LINK);
    }

    #[test]
    fn test_failed_release_to_local_stack() {
        let contact = Contact::new(local(), local(), 0, 100, true).unwrap();
        let builder = ControllerBuilder::new(local()).add_contact(contact);
        let (mut controller, lb, _) = setup(builder, 0);
        controller
            .store_mut()
            .store(packet(local(), b"mine"), local(), 0)
            .unwrap();
        lb.set_fail_delivery(true);

        assert_eq!(controller.on_tick(50).delivered, 1);
        expect_signal(&lb, SignalType::Delivered, SignalCode::NoInfo);
        assert!(controller.store().is_empty());
        assert_eq!(lb.delivered_len(), 0);
        assert_eq!(controller.stats().released, 0);
        assert_eq!(controller.stats().link_errors, 1);
    }

    #[test]
    fn test_custody_lifetime() {
        let builder = ControllerBuilder::new(local())
            .add_contact(window(1000, 2000))
            .set_custody_lifetime(Some(100));
        let (mut controller, lb, _) = setup(builder, 0);
        controller.on_inbound(frame(node(), b"stale"), 1);
        expect_signal(&lb, SignalType::Received, SignalCode::NoContact);

        assert_eq!(controller.on_tick(100).expired, 0);
        let report = controller.on_tick(101);
        assert_eq!(report.expired, 1);
        expect_signal(&lb, SignalType::Deleted, SignalCode::LifetimeExpired);
        assert!(controller.store().is_empty());
    }

    #[test]
    fn test_drain_limit() {
        let builder = ControllerBuilder::new(local())
            .add_contact(window(100, 200))
            .set_drain_limit(2);
        let (mut controller, lb, _) = setup(builder, 0);
        for payload in &[b"1", b"2", b"3"] {
            controller.on_inbound(frame(node(), *payload), 1);
            expect_signal(&lb, SignalType::Received, SignalCode::NoContact);
        }

        assert_eq!(controller.on_tick(100).forwarded, 2);
        for expected in &[b"1", b"2"] {
            let (packet, _) = lb.pop_transmitted().unwrap();
            assert_eq!(packet.payload(), *expected);
            expect_signal(&lb, SignalType::Forwarded, SignalCode::NoInfo);
        }
        assert_eq!(controller.on_tick(101).forwarded, 1);
        assert_eq!(controller.on_tick(102).forwarded, 0);
    }

    #[test]
    fn test_first_open_contact_wins() {
        let second = Contact::new(node(), addr("fd00::31"), 0, 100, true).unwrap();
        let builder = ControllerBuilder::new(local())
            .add_contact(window(50, 100))
            .add_contact(second);
        let (mut controller, lb, clock) = setup(builder, 10);
        match controller.on_inbound(frame(node(), b"x"), 1) {
            Outcome::Forwarded { next_hop } => assert_eq!(next_hop, addr("fd00::31")),
            outcome => panic!("unexpected {:?}", outcome),
        }
        lb.pop_transmitted();
        lb.pop_transmitted();

        clock.set(60);
        match controller.on_inbound(frame(node(), b"y"), 1) {
            Outcome::Forwarded { next_hop } => assert_eq!(next_hop, hop()),
            outcome => panic!("unexpected {:?}", outcome),
        }
    }

    #[test]
    fn test_no_signal_to_unspecified_source() {
        let builder = ControllerBuilder::new(local()).add_contact(window(1000, 2000));
        let (mut controller, lb, _) = setup(builder, 0);
        let packet = Ipv6Packet::new(Ipv6Addr::UNSPECIFIED, node(), 17, 64, b"anon");
        let outcome = controller.on_inbound(packet.into_bytes(), 1);
        assert!(matches!(outcome, Outcome::Custodied));
        assert_eq!(lb.transmitted_len(), 0);
        assert_eq!(controller.stats().signals_sent, 0);
    }

    #[test]
    fn test_exactly_one_terminal_action() {
        let builder = ControllerBuilder::new(local())
            .set_store_capacity(100)
            .add_contact(window(0, 10))
            .add_contact(Contact::new(addr("fd00::4"), hop(), 500, 600, true).unwrap());
        let (mut controller, lb, clock) = setup(builder, 5);

        let cases = vec![
            (local(), 5, "delivered"),
            (addr("fd00::99"), 5, "passed"),
            (node(), 5, "forwarded"),
            (addr("fd00::4"), 5, "custodied"),
            (addr("fd00::4"), 5, "deleted"),
        ];
        for (dst, now, expected) in cases {
            clock.set(now);
            let before = (lb.delivered_len(), controller.store().count());
            let outcome = controller.on_inbound(frame(dst, &[0; 20]), 1);
            let after = (lb.delivered_len(), controller.store().count());
            let transmitted: Vec<_> = std::iter::from_fn(|| lb.pop_transmitted())
                .filter(|(packet, _)| signal::parse(packet).is_none())
                .collect();
            let actions = (after.0 - before.0) + (after.1 - before.1) + transmitted.len();
            match (&outcome, expected) {
                (Outcome::Delivered, "delivered")
                | (Outcome::PassedThrough, "passed")
                | (Outcome::Forwarded { .. }, "forwarded")
                | (Outcome::Custodied, "custodied") => assert_eq!(actions, 1),
                (Outcome::Deleted, "deleted") => assert_eq!(actions, 0),
                _ => panic!("{:?} for {}", outcome, expected),
            }
        }
        let stats = controller.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.passed_through, 1);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.custodied, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.signals_sent, 3);
    }

    #[test]
    fn test_zero_drain_limit_still_releases() {
        let builder = ControllerBuilder::new(local())
            .add_contact(window(100, 200))
            .set_drain_limit(0);
        let (mut controller, lb, _) = setup(builder, 0);
        controller.on_inbound(frame(node(), b"held"), 1);
        expect_signal(&lb, SignalType::Received, SignalCode::NoContact);

        assert_eq!(controller.on_tick(100).forwarded, 1);
        let (packet, to) = lb.pop_transmitted().unwrap();
        assert_eq!(packet.payload(), b"held");
        assert_eq!(to, hop());
        assert!(controller.store().is_empty());
        assert_eq!(controller.stats().released, 1);
    }

    #[test]
    fn test_failed_direct_transmit() {
        let builder = ControllerBuilder::new(local()).add_contact(window(0, 10));
        let (mut controller, lb, _) = setup(builder, 5);
        lb.set_fail_transmit(true);

        let outcome = controller.on_inbound(frame(addr("fd00::99"), b"plain"), 1);
        assert!(matches!(outcome, Outcome::PassedThrough));
        assert_eq!(controller.stats().link_errors, 1);

        match controller.on_inbound(frame(node(), b"now"), 1) {
            Outcome::Forwarded { next_hop } => assert_eq!(next_hop, hop()),
            outcome => panic!("unexpected {:?}", outcome),
        }
        // packet and Forwarded signal both refused
        assert_eq!(controller.stats().link_errors, 3);

        assert!(controller.store().is_empty());
        assert_eq!(lb.transmitted_len(), 0);
        let stats = controller.stats();
        assert_eq!(stats.passed_through, 0);
        assert_eq!(stats.forwarded, 0);
        assert_eq!(stats.signals_sent, 0);

        lb.set_fail_transmit(false);
        assert_eq!(controller.on_tick(6), TickReport::default());
        assert_eq!(lb.transmitted_len(), 0);
    }

    #[test]
    fn test_failed_local_delivery_on_arrival() {
        let (mut controller, lb, _) = setup(ControllerBuilder::new(local()), 0);
        lb.set_fail_delivery(true);
        let outcome = controller.on_inbound(frame(local(), b"mine"), 2);
        assert!(matches!(outcome, Outcome::Delivered));
        assert_eq!(controller.stats().delivered, 0);
        assert_eq!(controller.stats().link_errors, 1);
        assert_eq!(lb.transmitted_len(), 0);
    }
}
