//! Pre-configured test data fixtures.

use std::collections::HashMap;

use outpost_coordinator::config::Config;
use outpost_coordinator::models::{LiveMember, LocalUser, Outpost};

/// Session id used by the fixtures.
pub const OUTPOST_ID: &str = "outpost-1";

/// Uuid of the session creator in [`test_outpost`].
pub const CREATOR_UUID: &str = "u-creator";

/// Address that receives redirected reaction payments in [`test_config`].
pub const FALLBACK_ADDRESS: &str = "0xfa11back";

/// Builder for a [`LiveMember`].
///
/// `TestMember::new("alice")` yields uuid `u-alice`, address `0xalice` and
/// payable address `0xalice-pay`, present and silent with 60s of speaking time.
#[derive(Debug, Clone)]
pub struct TestMember {
    member: LiveMember,
}

impl TestMember {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            member: LiveMember {
                uuid: format!("u-{name}"),
                address: format!("0x{name}"),
                aptos_address: format!("0x{name}-pay"),
                primary_aptos_address: None,
                name: name.to_string(),
                image: String::new(),
                is_present: true,
                is_speaking: false,
                is_recording: false,
                remaining_time: 60,
                last_speaked_at_timestamp: None,
                followed_by_me: false,
            },
        }
    }

    /// The session creator, exempt from speaking-time limits.
    #[must_use]
    pub fn creator() -> Self {
        let mut member = Self::new("creator");
        member.member.uuid = CREATOR_UUID.to_string();
        member
    }

    #[must_use]
    pub fn speaking(mut self) -> Self {
        self.member.is_speaking = true;
        self
    }

    #[must_use]
    pub fn absent(mut self) -> Self {
        self.member.is_present = false;
        self
    }

    #[must_use]
    pub fn remaining_time(mut self, seconds: i64) -> Self {
        self.member.remaining_time = seconds;
        self
    }

    /// Drop the payable address so the member cannot receive reactions.
    #[must_use]
    pub fn unpayable(mut self) -> Self {
        self.member.aptos_address = String::new();
        self.member.primary_aptos_address = None;
        self
    }

    #[must_use]
    pub fn build(self) -> LiveMember {
        self.member
    }
}

/// The outpost behind [`OUTPOST_ID`], created by [`CREATOR_UUID`].
#[must_use]
pub fn test_outpost() -> Outpost {
    Outpost {
        uuid: OUTPOST_ID.to_string(),
        name: "Test Outpost".to_string(),
        creator_user_uuid: CREATOR_UUID.to_string(),
        creator_joined: true,
        scheduled_for: None,
    }
}

/// An authenticated local user matching `TestMember::new(name)`.
#[must_use]
pub fn test_local_user(name: &str) -> LocalUser {
    LocalUser {
        uuid: format!("u-{name}"),
        address: format!("0x{name}"),
        aptos_address: format!("0x{name}-pay"),
        primary_aptos_address: None,
        authenticated: true,
    }
}

/// Environment variables accepted by `Config::from_vars`.
#[must_use]
pub fn test_config_vars() -> HashMap<String, String> {
    HashMap::from([
        (
            "OUTPOST_API_URL".to_string(),
            "https://api.example.test".to_string(),
        ),
        (
            "OUTPOST_WS_URL".to_string(),
            "wss://ws.example.test".to_string(),
        ),
        ("OUTPOST_WS_TOKEN".to_string(), "test-token".to_string()),
        (
            "OUTPOST_FALLBACK_ADDRESS".to_string(),
            FALLBACK_ADDRESS.to_string(),
        ),
    ])
}

/// Configuration built from [`test_config_vars`].
#[must_use]
pub fn test_config() -> Config {
    Config::from_vars(&test_config_vars()).expect("test config vars are complete")
}
