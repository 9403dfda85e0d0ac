use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Connection type of a network origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Residential,
    Datacenter,
    Vpn,
    Proxy,
    Unknown,
}

impl Category {
    /// Rank used to break ties when a provider reports several categories.
    ///
    /// `vpn > proxy > datacenter > residential > unknown`
    pub fn restrictiveness(self) -> u8 {
        match self {
            Category::Vpn => 4,
            Category::Proxy => 3,
            Category::Datacenter => 2,
            Category::Residential => 1,
            Category::Unknown => 0,
        }
    }

    /// Picks the most restrictive category, `Unknown` when the input is empty.
    pub fn most_restrictive<I: IntoIterator<Item = Category>>(categories: I) -> Category {
        categories
            .into_iter()
            .max_by_key(|c| c.restrictiveness())
            .unwrap_or(Category::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Residential => "residential",
            Category::Datacenter => "datacenter",
            Category::Vpn => "vpn",
            Category::Proxy => "proxy",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "residential" => Ok(Category::Residential),
            "datacenter" => Ok(Category::Datacenter),
            "vpn" => Ok(Category::Vpn),
            "proxy" => Ok(Category::Proxy),
            "unknown" => Ok(Category::Unknown),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Result of evaluating one network address. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub address: IpAddr,
    pub category: Category,
    /// Provider confidence in `[0, 1]`
    pub confidence: f32,
    pub looked_up_at: DateTime<Utc>,
}

impl Classification {
    pub fn new(address: IpAddr, category: Category, confidence: f32) -> Self {
        Self {
            address,
            category,
            confidence: confidence.clamp(0.0, 1.0),
            looked_up_at: Utc::now(),
        }
    }
}
