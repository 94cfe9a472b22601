//! Session actor mailbox messages and the values it hands back.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::errors::CoordinatorError;
use crate::models::{LiveMember, Outpost};
use crate::presence::WidgetEvent;
use crate::protocol::IncomingMessage;
use crate::reaction::ReactionKind;
use crate::store::SetAllReport;
use crate::time_tracker::{CountdownView, TimeDisplay};

/// Messages accepted by the `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Authoritative full replace.
    SetAll {
        members: Vec<LiveMember>,
        respond_to: oneshot::Sender<SetAllOutcome>,
    },

    UpsertSpeaking {
        address: String,
        speaking: bool,
    },

    UpsertRemainingTime {
        address: String,
        seconds: i64,
    },

    TimeIsUp {
        address: String,
    },

    /// Delta pushed by the transport.
    Incoming {
        message: IncomingMessage,
    },

    /// Event emitted by the conference widget.
    Widget {
        event: WidgetEvent,
    },

    SetOutpost {
        outpost: Outpost,
    },

    SetOutpostId {
        outpost_id: Option<String>,
    },

    /// Coordinator-initiated leave. Responds with whether a `LEAVE` went out.
    Leave {
        reason: LeaveReason,
        respond_to: oneshot::Sender<bool>,
    },

    StartRecording {
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },

    /// Claim the in-flight slot for a reaction. Responds `false` if taken.
    BeginReaction {
        target: String,
        kind: ReactionKind,
        respond_to: oneshot::Sender<bool>,
    },

    EndReaction {
        target: String,
        kind: ReactionKind,
    },
}

/// Result of a full replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetAllOutcome {
    pub report: SetAllReport,
    /// The snapshot was empty while the local participant is joined.
    pub contradicted: bool,
}

/// Why the coordinator is pulling the local participant out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The local user asked to leave.
    User,
    /// Fresh live data showed the session is gone.
    SessionEmptied,
    /// Session context is being torn down.
    Teardown,
}

impl LeaveReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::User => "user",
            LeaveReason::SessionEmptied => "session_emptied",
            LeaveReason::Teardown => "teardown",
        }
    }
}

/// Point-in-time copy of the session state.
///
/// Watchdogs and the reaction flow read this; they never see the live store.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub outpost_id: Option<String>,
    pub outpost: Option<Outpost>,
    /// Most-recently-spoken first.
    pub members: Vec<LiveMember>,
    /// In the order hands were raised.
    pub raised_hands: Vec<LiveMember>,
    pub joined: bool,
    pub revision: u64,
    pub countdowns: HashMap<String, CountdownView>,
    pub reactions_in_flight: usize,
}

impl SessionSnapshot {
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn member(&self, address: &str) -> Option<&LiveMember> {
        self.members.iter().find(|m| m.address == address)
    }

    #[must_use]
    pub fn contains_uuid(&self, uuid: &str) -> bool {
        self.members.iter().any(|m| m.uuid == uuid)
    }

    #[must_use]
    pub fn is_creator(&self, member: &LiveMember) -> bool {
        self.outpost
            .as_ref()
            .is_some_and(|o| o.creator_user_uuid == member.uuid)
    }

    /// Display value of a member's budget, interpolated to `now`.
    #[must_use]
    pub fn time_display(&self, address: &str, now: Instant) -> Option<TimeDisplay> {
        let member = self.member(address)?;
        let remaining = self
            .countdowns
            .get(address)
            .map_or(member.remaining_time, |view| view.remaining_at(now));
        Some(TimeDisplay::for_seconds(remaining, self.is_creator(member)))
    }
}
