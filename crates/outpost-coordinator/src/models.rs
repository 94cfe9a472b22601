//! Session data model.
//!
//! `LiveMember` and `Outpost` mirror the REST collaborator's JSON bodies.
//! Booleans missing on the wire default to `false` so partial records from
//! the transport (`user.joined`) deserialize into well-formed members.

use serde::{Deserialize, Serialize};

/// One session participant's real-time record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMember {
    pub uuid: String,
    /// Chain account identifier; the Membership Store key.
    pub address: String,
    /// Payable chain address (may differ from `address`).
    #[serde(default)]
    pub aptos_address: String,
    /// Alias of the payable address that wallets report as "primary".
    #[serde(default)]
    pub primary_aptos_address: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub is_present: bool,
    #[serde(default)]
    pub is_speaking: bool,
    #[serde(default)]
    pub is_recording: bool,
    /// Speaking-time budget in seconds. Ignored for the session creator.
    #[serde(default)]
    pub remaining_time: i64,
    /// Epoch millis of the last transition to speaking.
    #[serde(default)]
    pub last_speaked_at_timestamp: Option<i64>,
    #[serde(default)]
    pub followed_by_me: bool,
}

impl LiveMember {
    /// Payable address, or `None` when the member has none on record.
    #[must_use]
    pub fn payable_address(&self) -> Option<&str> {
        if self.aptos_address.is_empty() {
            self.primary_aptos_address
                .as_deref()
                .filter(|address| !address.is_empty())
        } else {
            Some(&self.aptos_address)
        }
    }
}

/// The session itself, owned by the REST collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpost {
    pub uuid: String,
    pub name: String,
    pub creator_user_uuid: String,
    #[serde(default)]
    pub creator_joined: bool,
    #[serde(default)]
    pub scheduled_for: Option<i64>,
}

/// REST live-data snapshot body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveData {
    #[serde(default)]
    pub members: Vec<LiveMember>,
}

/// The local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub uuid: String,
    pub address: String,
    pub aptos_address: String,
    pub primary_aptos_address: Option<String>,
    pub authenticated: bool,
}

impl LocalUser {
    /// Every payable address that belongs to the local participant.
    pub fn own_payable_addresses(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.aptos_address.as_str())
            .chain(self.primary_aptos_address.as_deref())
            .filter(|address| !address.is_empty())
    }
}
