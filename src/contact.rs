//! Contact table.
//!
//! A contact is a scheduled window during which a node can be reached through
//! a next hop. The table is a flat list kept in insertion order; there is no
//! contact graph. When several windows for the same node are open at the same
//! time the first one in table order is used.
//!
//! Windows are never deleted because they ended. Whether a contact is active
//! is decided when asked, against the time passed in. A node stays a DTN
//! destination for as long as it has any entry in the table.
use crate::constants::Millis;
use failure::Fail;
use log::{debug, trace};
use std::net::Ipv6Addr;

/// Error creating a contact.
#[derive(Debug, Fail)]
pub enum ContactError {
    /// The window ends before it starts.
    #[fail(display = "contact window ends at {} before it starts at {}", end, start)]
    InvalidWindow {
        /// Start of the window.
        start: Millis,
        /// End of the window.
        end: Millis,
    },
}

/// A scheduled reachability window.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contact {
    node: Ipv6Addr,
    next_hop: Ipv6Addr,
    start: Millis,
    end: Millis,
    dtn_capable: bool,
}

impl Contact {
    /// Creates a contact, `start` and `end` are inclusive.
    pub fn new(
        node: Ipv6Addr,
        next_hop: Ipv6Addr,
        start: Millis,
        end: Millis,
        dtn_capable: bool,
    ) -> Result<Self, ContactError> {
        if start > end {
            return Err(ContactError::InvalidWindow { start, end });
        }
        Ok(Self {
            node,
            next_hop,
            start,
            end,
            dtn_capable,
        })
    }

    /// Node reachable during the window.
    pub fn node(&self) -> Ipv6Addr {
        self.node
    }

    /// Next hop towards the node.
    pub fn next_hop(&self) -> Ipv6Addr {
        self.next_hop
    }

    /// Start of the window.
    pub fn start(&self) -> Millis {
        self.start
    }

    /// End of the window.
    pub fn end(&self) -> Millis {
        self.end
    }

    /// Node takes custody of packets.
    pub fn is_dtn_capable(&self) -> bool {
        self.dtn_capable
    }

    /// Window is open and the node is dtn capable.
    pub fn is_active(&self, now: Millis) -> bool {
        self.dtn_capable && self.start <= now && now <= self.end
    }

    /// Window has passed.
    pub fn is_expired(&self, now: Millis) -> bool {
        now > self.end
    }
}

/// Ordered collection of contacts.
#[derive(Clone, Debug, Default)]
pub struct ContactTable {
    contacts: Vec<Contact>,
}

impl ContactTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a contact. Overlapping or duplicate windows are kept.
    pub fn add_contact(&mut self, contact: Contact) {
        debug!(
            "contact {} via {} [{}, {}]",
            contact.node, contact.next_hop, contact.start, contact.end
        );
        self.contacts.push(contact);
    }

    /// Removes every contact for `node` and returns how many were removed.
    pub fn remove_contact(&mut self, node: &Ipv6Addr) -> usize {
        let len = self.contacts.len();
        self.contacts.retain(|contact| &contact.node != node);
        len - self.contacts.len()
    }

    /// Evaluates the table against `now`.
    ///
    /// Contacts are checked lazily so nothing is changed here.
    pub fn refresh(&mut self, now: Millis) {
        let expired = self.contacts.iter().filter(|c| c.is_expired(now)).count();
        trace!(
            "{} contacts, {} active, {} expired",
            self.contacts.len(),
            self.active(now).count(),
            expired
        );
    }

    /// Returns true if any contact, expired or not, is for `addr`.
    pub fn is_dtn_destination(&self, addr: &Ipv6Addr) -> bool {
        self.contacts.iter().any(|contact| &contact.node == addr)
    }

    /// Next hop of the first active contact for `addr`.
    pub fn active_next_hop(&self, addr: &Ipv6Addr, now: Millis) -> Option<Ipv6Addr> {
        self.active(now)
            .find(|contact| &contact.node == addr)
            .map(Contact::next_hop)
    }

    /// Returns true if a contact for `addr` is active.
    pub fn has_active_contact(&self, addr: &Ipv6Addr, now: Millis) -> bool {
        self.active_next_hop(addr, now).is_some()
    }

    /// Active contacts in table order.
    pub fn active(&self, now: Millis) -> impl Iterator<Item = &Contact> {
        self.contacts
            .iter()
            .filter(move |contact| contact.is_active(now))
    }

    /// All contacts in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter()
    }

    /// Number of contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Returns true if there are no contacts.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
