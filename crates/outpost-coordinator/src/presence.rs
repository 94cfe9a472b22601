//! Presence & Speaking State Machine.
//!
//! Turns conference-widget events into Membership Store mutations and the
//! protocol messages / widget commands that must accompany them.
//!
//! ```text
//! Absent ──joined──▶ PresentSilent ◀──mute/unmute──▶ PresentSpeaking
//!    ▲                     │                                │
//!    └────────left─────────┴────────────────────────────────┘
//! ```
//!
//! The first `AudioMuteStatusChanged` after each local join reflects the
//! widget's initial default rather than a user action and is discarded.

use tracing::debug;

use crate::models::LiveMember;
use crate::protocol::MessageType;
use crate::store::{MembershipStore, RaisedHands, SpeakingUpdate};

/// Widget command that toggles the local microphone.
pub const WIDGET_TOGGLE_AUDIO: &str = "toggleAudio";

/// Widget command that leaves the conference.
pub const WIDGET_HANGUP: &str = "hangup";

/// Events emitted by the conference widget.
///
/// Participant ids are the members' chain addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    VideoConferenceJoined,
    VideoConferenceLeft,
    AudioMuteStatusChanged { muted: bool },
    ParticipantJoined { id: String },
    ParticipantLeft { id: String },
    RaiseHandUpdated { id: String, hand_raised: bool },
}

impl WidgetEvent {
    /// Bounded label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            WidgetEvent::VideoConferenceJoined => "conference_joined",
            WidgetEvent::VideoConferenceLeft => "conference_left",
            WidgetEvent::AudioMuteStatusChanged { .. } => "mute_changed",
            WidgetEvent::ParticipantJoined { .. } => "participant_joined",
            WidgetEvent::ParticipantLeft { .. } => "participant_left",
            WidgetEvent::RaiseHandUpdated { .. } => "raise_hand",
        }
    }
}

/// Presence state of one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberPresence {
    Absent,
    PresentSilent,
    PresentSpeaking,
}

impl MemberPresence {
    #[must_use]
    pub fn of(member: Option<&LiveMember>) -> Self {
        match member {
            Some(m) if m.is_present && m.is_speaking => MemberPresence::PresentSpeaking,
            Some(m) if m.is_present => MemberPresence::PresentSilent,
            _ => MemberPresence::Absent,
        }
    }
}

/// Side effect the session actor must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEffect {
    Send(MessageType),
    WidgetCommand(&'static str),
}

/// Mutable state a transition operates on.
pub struct PresenceContext<'a> {
    pub store: &'a mut MembershipStore,
    pub raised_hands: &'a mut RaisedHands,
    pub local_address: &'a str,
    pub now_ms: i64,
}

/// Local participant's conference state plus first-mute suppression.
#[derive(Debug)]
pub struct PresenceMachine {
    joined: bool,
    awaiting_first_mute: bool,
}

impl Default for PresenceMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            joined: false,
            awaiting_first_mute: true,
        }
    }

    #[must_use]
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Apply one widget event.
    pub fn handle(&mut self, event: WidgetEvent, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        match event {
            WidgetEvent::VideoConferenceJoined => self.on_conference_joined(ctx),
            WidgetEvent::VideoConferenceLeft => self.on_conference_left(ctx),
            WidgetEvent::AudioMuteStatusChanged { muted } => self.on_mute_changed(muted, ctx),
            WidgetEvent::ParticipantJoined { id } => Self::on_participant_joined(&id, ctx),
            WidgetEvent::ParticipantLeft { id } => Self::on_participant_left(&id, ctx),
            WidgetEvent::RaiseHandUpdated { id, hand_raised } => {
                Self::on_raise_hand(&id, hand_raised, ctx)
            }
        }
    }

    /// Leave initiated by the coordinator rather than the widget.
    ///
    /// Emits `LEAVE` and tells the widget to hang up; the widget's subsequent
    /// `VideoConferenceLeft` is then a no-op.
    pub fn force_leave(&mut self, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        let mut effects = self.on_conference_left(ctx);
        if !effects.is_empty() {
            effects.push(PresenceEffect::WidgetCommand(WIDGET_HANGUP));
        }
        effects
    }

    /// The Tracker silenced the local participant; mute the microphone too.
    #[must_use]
    pub fn on_local_silenced(&self) -> Vec<PresenceEffect> {
        if self.joined {
            vec![PresenceEffect::WidgetCommand(WIDGET_TOGGLE_AUDIO)]
        } else {
            Vec::new()
        }
    }

    fn on_conference_joined(&mut self, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        self.awaiting_first_mute = true;
        ctx.store.set_present(ctx.local_address, true);
        if self.joined {
            return Vec::new();
        }
        self.joined = true;
        vec![PresenceEffect::Send(MessageType::Join)]
    }

    fn on_conference_left(&mut self, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        if !self.joined {
            debug!(target: "oc.presence", "Ignoring leave while not joined");
            return Vec::new();
        }
        self.joined = false;
        ctx.store.set_present(ctx.local_address, false);
        ctx.raised_hands.lower(ctx.local_address);
        vec![PresenceEffect::Send(MessageType::Leave)]
    }

    fn on_mute_changed(&mut self, muted: bool, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        if self.awaiting_first_mute {
            self.awaiting_first_mute = false;
            debug!(
                target: "oc.presence",
                muted = muted,
                "Discarding initial mute status"
            );
            return Vec::new();
        }

        let speaking = !muted;
        match ctx.store.set_speaking(ctx.local_address, speaking, ctx.now_ms) {
            SpeakingUpdate::Applied | SpeakingUpdate::UnknownMember => {
                let message_type = if speaking {
                    MessageType::StartSpeaking
                } else {
                    MessageType::StopSpeaking
                };
                vec![PresenceEffect::Send(message_type)]
            }
            SpeakingUpdate::Unchanged => Vec::new(),
            SpeakingUpdate::Refused => {
                debug!(target: "oc.presence", "Unmute refused, speaking time exhausted");
                vec![PresenceEffect::WidgetCommand(WIDGET_TOGGLE_AUDIO)]
            }
        }
    }

    fn on_participant_joined(id: &str, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        ctx.store.set_present(id, true);
        Vec::new()
    }

    fn on_participant_left(id: &str, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        ctx.store.set_present(id, false);
        ctx.raised_hands.lower(id);
        Vec::new()
    }

    fn on_raise_hand(id: &str, hand_raised: bool, ctx: &mut PresenceContext<'_>) -> Vec<PresenceEffect> {
        if hand_raised {
            if let Some(member) = ctx.store.get(id) {
                ctx.raised_hands.raise(member.clone());
            }
        } else {
            ctx.raised_hands.lower(id);
        }
        Vec::new()
    }
}
