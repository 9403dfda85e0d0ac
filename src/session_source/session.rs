use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One active playback reported by the media server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Media server session identifier, unique per active connection
    pub id: String,
    /// Client network address as seen from the internet
    pub address: IpAddr,
    /// Account title, or account id when the title is missing
    pub user: String,
    /// First time the session was reported
    pub started_at: DateTime<Utc>,
    pub player: Option<String>,
    pub title: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, address: IpAddr, user: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address,
            user: user.into(),
            started_at: Utc::now(),
            player: None,
            title: None,
        }
    }
}
