//! Raw socket egress.
//!
//! Every configured interface gets an `IPPROTO_RAW` socket bound to it. The
//! packets handed to the link already carry their IPv6 header. The interface
//! is picked by longest prefix match of the next hop against the prefixes
//! configured for it, falling back to the default interface.
//!
//! Output of the local stack is not routed. It is queued for the host to
//! write back into the TUN device.
use crate::local;
use addr::Prefix;
use dtn::{Ipv6Packet, Link, LinkError, LinkId};
use log::{debug, info, trace};
use std::collections::VecDeque;
use std::ffi::CString;
use std::io::{Error, ErrorKind, Result};
use std::net::Ipv6Addr;
use std::os::unix::io::RawFd;

/// Largest packet the link sends.
pub const MAX_PACKET_LEN: usize = 2048;

const IPV6_HDRINCL: libc::c_int = 36;

/// Longest prefix match over the configured interfaces.
#[derive(Debug, Default)]
pub struct Egress {
    routes: Vec<(Prefix, usize)>,
    default: Option<usize>,
}

impl Egress {
    /// Adds a prefix reached through interface `index`.
    pub fn add_route(&mut self, prefix: Prefix, index: usize) {
        self.routes.push((prefix, index));
    }

    /// Interface used when no prefix matches.
    pub fn set_default(&mut self, index: usize) {
        self.default = Some(index);
    }

    /// Returns the interface for `next_hop`.
    ///
    /// Among equally long prefixes the first one configured wins.
    pub fn select(&self, next_hop: &Ipv6Addr) -> Option<usize> {
        let mut best: Option<(u8, usize)> = None;
        for (prefix, index) in &self.routes {
            if !prefix.contains(next_hop) {
                continue;
            }
            match best {
                Some((len, _)) if len >= prefix.len() => {}
                _ => best = Some((prefix.len(), *index)),
            }
        }
        best.map(|(_, index)| index).or(self.default)
    }
}

struct RawSocket {
    fd: RawFd,
    interface: String,
    index: u32,
}

fn check(res: libc::c_int) -> Result<libc::c_int> {
    if res < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(res)
    }
}

impl RawSocket {
    fn open(interface: &str) -> Result<Self> {
        let name = CString::new(interface)
            .map_err(|_| Error::new(ErrorKind::InvalidInput, "interface name contains nul"))?;
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(Error::last_os_error());
        }
        let fd = check(unsafe { libc::socket(libc::AF_INET6, libc::SOCK_RAW, libc::IPPROTO_RAW) })?;
        let socket = Self {
            fd,
            interface: interface.to_string(),
            index,
        };

        let on: libc::c_int = 1;
        check(unsafe {
            libc::setsockopt(
                fd,
                libc::IPPROTO_IPV6,
                IPV6_HDRINCL,
                &on as *const libc::c_int as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        })?;
        let bytes = name.as_bytes();
        check(unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_BINDTODEVICE,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len() as libc::socklen_t,
            )
        })?;
        Ok(socket)
    }

    fn send(&self, packet: &[u8], next_hop: Ipv6Addr) -> Result<()> {
        let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sin6.sin6_addr.s6_addr = next_hop.octets();
        sin6.sin6_scope_id = self.index;
        let sent = unsafe {
            libc::sendto(
                self.fd,
                packet.as_ptr() as *const libc::c_void,
                packet.len(),
                0,
                &sin6 as *const libc::sockaddr_in6 as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(Error::last_os_error());
        }
        if sent as usize != packet.len() {
            return Err(Error::new(
                ErrorKind::WriteZero,
                format!("sent {} of {} bytes", sent, packet.len()),
            ));
        }
        Ok(())
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

/// Link sending through raw sockets and answering pings locally.
pub struct RawLink {
    sockets: Vec<RawSocket>,
    egress: Egress,
    local_output: VecDeque<Ipv6Packet>,
}

impl RawLink {
    /// Opens a socket per interface.
    ///
    /// The default interface is opened too if it has no prefixes.
    pub fn open(links: &[(String, Vec<Prefix>)], default_interface: Option<&str>) -> Result<Self> {
        let mut sockets = Vec::new();
        let mut egress = Egress::default();
        for (index, (interface, prefixes)) in links.iter().enumerate() {
            let socket = RawSocket::open(interface)?;
            info!(
                "raw socket on {} (index {}) for {:?}",
                interface, socket.index, prefixes
            );
            sockets.push(socket);
            for prefix in prefixes {
                egress.add_route(*prefix, index);
            }
        }
        if let Some(default) = default_interface {
            let index = match sockets.iter().position(|s| s.interface == default) {
                Some(index) => index,
                None => {
                    sockets.push(RawSocket::open(default)?);
                    sockets.len() - 1
                }
            };
            info!("default egress {}", default);
            egress.set_default(index);
        }
        Ok(Self {
            sockets,
            egress,
            local_output: VecDeque::new(),
        })
    }

    /// Pops the oldest packet the local stack emitted.
    pub fn pop_local_output(&mut self) -> Option<Ipv6Packet> {
        self.local_output.pop_front()
    }
}

impl Link for RawLink {
    fn transmit(&mut self, packet: Ipv6Packet, next_hop: Ipv6Addr) -> std::result::Result<(), LinkError> {
        if packet.len() > MAX_PACKET_LEN {
            return Err(LinkError::TooLarge(packet.len()));
        }
        let index = self
            .egress
            .select(&next_hop)
            .ok_or(LinkError::NoRoute(next_hop))?;
        let socket = &self.sockets[index];
        socket.send(packet.as_bytes(), next_hop)?;
        trace!(
            "sent {} bytes for {} via {} on {}",
            packet.len(),
            packet.dst(),
            next_hop,
            socket.interface
        );
        Ok(())
    }

    fn deliver_locally(&mut self, packet: Ipv6Packet, arrival: LinkId) -> std::result::Result<(), LinkError> {
        debug!("local packet from {} on link {}", packet.src(), arrival);
        if let Some(reply) = local::respond(&packet) {
            self.local_output.push_back(reply);
        }
        Ok(())
    }
}
