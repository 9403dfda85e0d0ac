//! Wire types of the Plex control plane.
//!
//! Plex answers are validated here and converted into crate types; nothing
//! past this module ever sees a raw Plex payload.

use chrono::Utc;
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;

use crate::session_source::Session;

/// Body of `GET /status/sessions`.
#[derive(Debug, Deserialize)]
pub struct SessionsEnvelope {
    #[serde(rename = "MediaContainer")]
    pub media_container: MediaContainer,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaContainer {
    #[serde(default)]
    pub size: u64,
    /// Absent altogether when nothing is playing
    #[serde(rename = "Metadata", default)]
    pub metadata: Vec<SessionMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "grandparentTitle", default)]
    pub grandparent_title: Option<String>,
    #[serde(rename = "User", default)]
    pub user: Option<PlexAccount>,
    #[serde(rename = "Player", default)]
    pub player: Option<PlexPlayer>,
    #[serde(rename = "Session", default)]
    pub session: Option<PlexSession>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlexAccount {
    /// Plex sends ids both as strings and as numbers
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
}

impl PlexAccount {
    pub fn display_name(&self) -> Option<String> {
        let title = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        match (title, &self.id) {
            (Some(title), _) => Some(title.to_string()),
            (None, Some(Value::String(id))) if !id.is_empty() => Some(id.clone()),
            (None, Some(Value::Number(id))) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlexPlayer {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "publicAddress", default)]
    pub public_address: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

impl PlexPlayer {
    /// Public address first, local address as fallback.
    pub fn client_address(&self) -> Option<IpAddr> {
        [&self.public_address, &self.address]
            .into_iter()
            .flatten()
            .find_map(|a| a.trim().parse::<IpAddr>().ok())
    }

    pub fn label(&self) -> Option<String> {
        match (&self.title, &self.product) {
            (Some(title), Some(product)) => Some(format!("{} ({})", title, product)),
            (Some(title), None) => Some(title.clone()),
            (None, Some(product)) => Some(product.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlexSession {
    #[serde(default)]
    pub id: Option<String>,
}

impl SessionMetadata {
    fn display_title(&self) -> Option<String> {
        match (&self.grandparent_title, &self.title) {
            (Some(show), Some(episode)) => Some(format!("{} - {}", show, episode)),
            (None, Some(title)) => Some(title.clone()),
            (Some(show), None) => Some(show.clone()),
            (None, None) => None,
        }
    }

    /// Validates one entry. Entries without a session id or a usable client
    /// address cannot be enforced against and are dropped.
    pub fn into_session(self) -> Option<Session> {
        let id = match self.session.as_ref().and_then(|s| s.id.clone()) {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                warn!("Skipping a session entry without a session id");
                return None;
            }
        };
        let address = match self.player.as_ref().and_then(PlexPlayer::client_address) {
            Some(address) => address,
            None => {
                warn!("Skipping session {}: no usable client address", id);
                return None;
            }
        };
        let user = self
            .user
            .as_ref()
            .and_then(PlexAccount::display_name)
            .unwrap_or_else(|| "unknown".to_string());

        Some(Session {
            title: self.display_title(),
            player: self.player.as_ref().and_then(PlexPlayer::label),
            id,
            address,
            user,
            started_at: Utc::now(),
        })
    }
}

impl SessionsEnvelope {
    pub fn into_sessions(self) -> Vec<Session> {
        self.media_container
            .metadata
            .into_iter()
            .filter_map(SessionMetadata::into_session)
            .collect()
    }
}

/// Body of a Plex webhook notification.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub event: String,
    #[serde(rename = "Account", default)]
    pub account: Option<PlexAccount>,
    #[serde(rename = "Player", default)]
    pub player: Option<PlexPlayer>,
    #[serde(rename = "Session", default)]
    pub session: Option<PlexSession>,
    #[serde(rename = "Metadata", default)]
    pub metadata: Option<WebhookMetadata>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub title: Option<String>,
}

impl WebhookPayload {
    pub const PLAYBACK_STARTED: &'static str = "media.play";

    pub fn is_playback_start(&self) -> bool {
        self.event == Self::PLAYBACK_STARTED
    }

    /// Only the public address counts here, webhooks report local players too.
    pub fn public_address(&self) -> Option<IpAddr> {
        self.player
            .as_ref()
            .and_then(|p| p.public_address.as_deref())
            .and_then(|a| a.trim().parse().ok())
    }

    pub fn session_id(&self) -> Option<String> {
        self.session
            .as_ref()
            .and_then(|s| s.id.clone())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn user(&self) -> String {
        self.account
            .as_ref()
            .and_then(PlexAccount::display_name)
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn to_session(&self, address: IpAddr, id: String) -> Session {
        Session {
            id,
            address,
            user: self.user(),
            started_at: Utc::now(),
            player: self.player.as_ref().and_then(PlexPlayer::label),
            title: self.metadata.as_ref().and_then(|m| m.title.clone()),
        }
    }
}
