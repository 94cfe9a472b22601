//! Real-time transport protocol.
//!
//! Outgoing messages are a typed envelope `{message_type, outpost_uuid, data?}`.
//! Incoming messages are tagged by `name` with a `data` payload. Reaction
//! notifications are forwarded to subscribers and never touch the store.

use serde::{Deserialize, Serialize};

use crate::models::LiveMember;

/// Kind of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Join,
    Leave,
    Like,
    Dislike,
    StartSpeaking,
    StopSpeaking,
    StartRecording,
    Cheer,
    Boo,
}

impl MessageType {
    /// Returns the wire name, also used as a bounded metrics label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageType::Join => "JOIN",
            MessageType::Leave => "LEAVE",
            MessageType::Like => "LIKE",
            MessageType::Dislike => "DISLIKE",
            MessageType::StartSpeaking => "START_SPEAKING",
            MessageType::StopSpeaking => "STOP_SPEAKING",
            MessageType::StartRecording => "START_RECORDING",
            MessageType::Cheer => "CHEER",
            MessageType::Boo => "BOO",
        }
    }
}

/// Optional payload of an outgoing message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub react_to_user_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Envelope sent over the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message_type: MessageType,
    pub outpost_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

impl OutgoingMessage {
    /// A message with no payload.
    #[must_use]
    pub fn bare(message_type: MessageType, outpost_uuid: impl Into<String>) -> Self {
        Self {
            message_type,
            outpost_uuid: outpost_uuid.into(),
            data: None,
        }
    }

    /// A free reaction (`LIKE`/`DISLIKE`) aimed at a member.
    #[must_use]
    pub fn reaction(
        message_type: MessageType,
        outpost_uuid: impl Into<String>,
        react_to_user_address: impl Into<String>,
    ) -> Self {
        Self {
            message_type,
            outpost_uuid: outpost_uuid.into(),
            data: Some(MessageData {
                react_to_user_address: Some(react_to_user_address.into()),
                ..MessageData::default()
            }),
        }
    }

    /// A paid reaction (`CHEER`/`BOO`) carrying its payment proof.
    #[must_use]
    pub fn paid_reaction(
        message_type: MessageType,
        outpost_uuid: impl Into<String>,
        react_to_user_address: impl Into<String>,
        tx_hash: impl Into<String>,
        chain_id: u64,
    ) -> Self {
        Self {
            message_type,
            outpost_uuid: outpost_uuid.into(),
            data: Some(MessageData {
                react_to_user_address: Some(react_to_user_address.into()),
                tx_hash: Some(tx_hash.into()),
                chain_id: Some(chain_id),
            }),
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Kind of an incoming reaction notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingReactionType {
    Cheer,
    Boo,
    Like,
    Dislike,
}

/// Address-only payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPayload {
    pub address: String,
}

/// `remaining_time.updated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingTimePayload {
    pub address: String,
    pub remaining_time: i64,
}

/// Reaction notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionPayload {
    /// Actor address.
    pub address: String,
    pub react_to_user_address: String,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Reaction notification forwarded to UI subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingReaction {
    pub reaction_type: IncomingReactionType,
    pub actor_address: String,
    pub target_address: String,
    pub amount: Option<f64>,
}

/// Delta pushed by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum IncomingMessage {
    #[serde(rename = "user.joined")]
    UserJoined(LiveMember),
    #[serde(rename = "user.left")]
    UserLeft(AddressPayload),
    #[serde(rename = "user.start_speaking")]
    UserStartedSpeaking(AddressPayload),
    #[serde(rename = "user.stop_speaking")]
    UserStoppedSpeaking(AddressPayload),
    #[serde(rename = "remaining_time.updated")]
    RemainingTimeUpdated(RemainingTimePayload),
    #[serde(rename = "user.time_is_up")]
    UserTimeIsUp(AddressPayload),
    #[serde(rename = "user.started_recording")]
    UserStartedRecording(AddressPayload),
    #[serde(rename = "user.cheer")]
    Cheer(ReactionPayload),
    #[serde(rename = "user.boo")]
    Boo(ReactionPayload),
    #[serde(rename = "user.like")]
    Like(ReactionPayload),
    #[serde(rename = "user.dislike")]
    Dislike(ReactionPayload),
}

impl IncomingMessage {
    /// Parse a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed frames or unknown message names.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            IncomingMessage::UserJoined(_) => "user_joined",
            IncomingMessage::UserLeft(_) => "user_left",
            IncomingMessage::UserStartedSpeaking(_) => "start_speaking",
            IncomingMessage::UserStoppedSpeaking(_) => "stop_speaking",
            IncomingMessage::RemainingTimeUpdated(_) => "remaining_time",
            IncomingMessage::UserTimeIsUp(_) => "time_is_up",
            IncomingMessage::UserStartedRecording(_) => "started_recording",
            IncomingMessage::Cheer(_) => "cheer",
            IncomingMessage::Boo(_) => "boo",
            IncomingMessage::Like(_) => "like",
            IncomingMessage::Dislike(_) => "dislike",
        }
    }

    /// The reaction notification carried by this message, if any.
    #[must_use]
    pub fn as_reaction(&self) -> Option<IncomingReaction> {
        let (reaction_type, payload) = match self {
            IncomingMessage::Cheer(p) => (IncomingReactionType::Cheer, p),
            IncomingMessage::Boo(p) => (IncomingReactionType::Boo, p),
            IncomingMessage::Like(p) => (IncomingReactionType::Like, p),
            IncomingMessage::Dislike(p) => (IncomingReactionType::Dislike, p),
            _ => return None,
        };
        Some(IncomingReaction {
            reaction_type,
            actor_address: payload.address.clone(),
            target_address: payload.react_to_user_address.clone(),
            amount: payload.amount,
        })
    }
}
