use addr::{AddrParseError, Prefix};
use dtn::constants::{DEFAULT_DRAIN_LIMIT, DEFAULT_STORE_CAPACITY, DEFAULT_TICK_INTERVAL_MS};
use dtn::{Contact, ContactError, ControllerBuilder};
use failure::Fail;
use serde::Deserialize;
use std::net::Ipv6Addr;
use std::path::Path;

pub const DEFAULT_LOCAL_ADDR: Ipv6Addr = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 2);
pub const DEFAULT_TUN_NAME: &str = "tun0";
pub const DEFAULT_LOG_LEVEL: u8 = 2;

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "reading config: {}", _0)]
    Io(std::io::Error),
    #[fail(display = "parsing config: {}", _0)]
    Toml(toml::de::Error),
    #[fail(display = "link prefix: {}", _0)]
    Prefix(AddrParseError),
    #[fail(display = "{}", _0)]
    Contact(ContactError),
    #[fail(display = "link {} is configured twice", _0)]
    DuplicateLink(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml(err)
    }
}

impl From<AddrParseError> for ConfigError {
    fn from(err: AddrParseError) -> Self {
        Self::Prefix(err)
    }
}

impl From<ContactError> for ConfigError {
    fn from(err: ContactError) -> Self {
        Self::Contact(err)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    pub interface: String,
    pub prefixes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContactConfig {
    pub node: Ipv6Addr,
    pub next_hop: Option<Ipv6Addr>,
    pub start_ms: u64,
    pub end_ms: u64,
    pub dtn_capable: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub loglevel: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    pub local_addr: Option<Ipv6Addr>,
    pub tun_name: Option<String>,
    pub store_capacity: Option<usize>,
    pub tick_interval_ms: Option<u64>,
    pub custody_lifetime_ms: Option<u64>,
    pub drain_limit: Option<usize>,
    pub default_interface: Option<String>,
    pub links: Option<Vec<LinkConfig>>,
    pub contacts: Option<Vec<ContactConfig>>,
    pub logging: Option<LoggingConfig>,
}

impl DaemonConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn local_addr(&self) -> Ipv6Addr {
        self.local_addr.unwrap_or(DEFAULT_LOCAL_ADDR)
    }

    pub fn tun_name(&self) -> &str {
        self.tun_name.as_deref().unwrap_or(DEFAULT_TUN_NAME)
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS)
            .max(1)
    }

    pub fn log_level(&self) -> u8 {
        self.logging
            .as_ref()
            .and_then(|cfg| cfg.loglevel)
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Interfaces with their prefixes, in config order.
    pub fn links(&self) -> Result<Vec<(String, Vec<Prefix>)>, ConfigError> {
        let mut links: Vec<(String, Vec<Prefix>)> = Vec::new();
        for link in self.links.iter().flatten() {
            if links.iter().any(|(name, _)| name == &link.interface) {
                return Err(ConfigError::DuplicateLink(link.interface.clone()));
            }
            let prefixes = link
                .prefixes
                .iter()
                .flatten()
                .map(|prefix| prefix.parse())
                .collect::<Result<Vec<Prefix>, _>>()?;
            links.push((link.interface.clone(), prefixes));
        }
        Ok(links)
    }

    pub fn contacts(&self) -> Result<Vec<Contact>, ConfigError> {
        self.contacts
            .iter()
            .flatten()
            .map(|c| -> Result<Contact, ConfigError> {
                let next_hop = c.next_hop.unwrap_or(c.node);
                let dtn_capable = c.dtn_capable.unwrap_or(true);
                Ok(Contact::new(c.node, next_hop, c.start_ms, c.end_ms, dtn_capable)?)
            })
            .collect()
    }

    pub fn controller_builder(&self) -> Result<ControllerBuilder, ConfigError> {
        let mut builder = ControllerBuilder::new(self.local_addr())
            .set_store_capacity(self.store_capacity.unwrap_or(DEFAULT_STORE_CAPACITY))
            .set_custody_lifetime(self.custody_lifetime_ms)
            .set_drain_limit(self.drain_limit.unwrap_or(DEFAULT_DRAIN_LIMIT));
        for contact in self.contacts()? {
            builder = builder.add_contact(contact);
        }
        Ok(builder)
    }
}
