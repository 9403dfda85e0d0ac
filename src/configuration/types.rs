use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;

/// Inclusive range of addresses, both ends in the same family.
#[derive(Debug, PartialEq, Clone, Deserialize)]
pub struct IpRange {
    pub start: IpAddr,
    pub end: IpAddr,
}

impl IpRange {
    pub fn contains(&self, address: &IpAddr) -> bool {
        let same_family = matches!(
            (self.start, self.end, address),
            (IpAddr::V4(_), IpAddr::V4(_), IpAddr::V4(_))
                | (IpAddr::V6(_), IpAddr::V6(_), IpAddr::V6(_))
        );
        same_family && self.start <= *address && *address <= self.end
    }

    pub fn is_well_formed(&self) -> bool {
        self.start.is_ipv4() == self.end.is_ipv4() && self.start <= self.end
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    File,
    Database,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// Ledger location for the `file` and `database` backends
    pub path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            path: None,
        }
    }
}

impl LedgerConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, LedgerBackend::Database) => PathBuf::from("plex-vpn-blocker.sqlite3"),
            (None, _) => PathBuf::from("plex-vpn-blocker.ledger"),
        }
    }
}
