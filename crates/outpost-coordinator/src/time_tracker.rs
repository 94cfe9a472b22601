//! Time-Boxed Access Tracker.
//!
//! Every non-creator member carries a speaking budget (`remaining_time`).
//! The Tracker is the single authority resolving a conflict between an
//! exhausted budget and a speaking flag: exhausted always wins.
//!
//! The countdown is server-authoritative. [`CountdownView`] interpolates
//! between authoritative pushes for display only and never writes back.

use std::fmt;

use tokio::time::Instant;

use crate::models::LiveMember;

/// Result of applying a time rule to a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOutcome {
    /// Nothing changed.
    Unchanged,
    /// Budget updated; speaking state untouched.
    Updated,
    /// Member was speaking with an exhausted budget and has been silenced.
    Silenced,
}

/// Whether a budget is exhausted.
#[must_use]
pub const fn is_exhausted(remaining_time: i64) -> bool {
    remaining_time <= 0
}

/// Whether the member may transition to speaking.
#[must_use]
pub fn may_speak(member: &LiveMember, is_creator: bool) -> bool {
    is_creator || !is_exhausted(member.remaining_time)
}

/// Enforce the exhausted-budget rule on a member as it stands.
pub fn enforce(member: &mut LiveMember, is_creator: bool) -> TimeOutcome {
    if !is_creator && member.is_speaking && is_exhausted(member.remaining_time) {
        member.is_speaking = false;
        TimeOutcome::Silenced
    } else {
        TimeOutcome::Unchanged
    }
}

/// Apply an authoritative remaining-time update.
pub fn apply_remaining_time(member: &mut LiveMember, seconds: i64, is_creator: bool) -> TimeOutcome {
    let changed = member.remaining_time != seconds;
    member.remaining_time = seconds;
    match enforce(member, is_creator) {
        TimeOutcome::Silenced => TimeOutcome::Silenced,
        _ if changed => TimeOutcome::Updated,
        _ => TimeOutcome::Unchanged,
    }
}

/// Apply an authoritative "time's up" notification.
///
/// The creator's budget is unlimited, so the notification is ignored for them.
pub fn handle_time_is_up(member: &mut LiveMember, is_creator: bool) -> TimeOutcome {
    if is_creator {
        return TimeOutcome::Unchanged;
    }
    let clamped = member.remaining_time.min(0);
    apply_remaining_time(member, clamped, is_creator)
}

/// How a member's budget is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDisplay {
    /// Session creator: unlimited.
    Creator,
    Countdown { minutes: i64, seconds: i64 },
    TimesUp,
}

impl TimeDisplay {
    #[must_use]
    pub fn for_seconds(remaining_time: i64, is_creator: bool) -> Self {
        if is_creator {
            TimeDisplay::Creator
        } else if is_exhausted(remaining_time) {
            TimeDisplay::TimesUp
        } else {
            TimeDisplay::Countdown {
                minutes: remaining_time / 60,
                seconds: remaining_time % 60,
            }
        }
    }

    #[must_use]
    pub fn for_member(member: &LiveMember, is_creator: bool) -> Self {
        Self::for_seconds(member.remaining_time, is_creator)
    }
}

impl fmt::Display for TimeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeDisplay::Creator => write!(f, "Creator"),
            TimeDisplay::Countdown { minutes, seconds } => write!(f, "{minutes:02}:{seconds:02}"),
            TimeDisplay::TimesUp => write!(f, "Time's up"),
        }
    }
}

/// Local interpolation of a server-authoritative countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownView {
    authoritative: i64,
    received_at: Instant,
}

impl CountdownView {
    #[must_use]
    pub fn new(authoritative: i64, received_at: Instant) -> Self {
        Self {
            authoritative,
            received_at,
        }
    }

    /// Last value pushed by the server.
    #[must_use]
    pub fn authoritative(&self) -> i64 {
        self.authoritative
    }

    /// Interpolated remaining seconds at `now`, floored at zero.
    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> i64 {
        let elapsed = i64::try_from(now.saturating_duration_since(self.received_at).as_secs())
            .unwrap_or(i64::MAX);
        self.authoritative.saturating_sub(elapsed).max(0)
    }
}
