//! Membership Store and Raised-Hand Set.
//!
//! Both are keyed by chain address because transport deltas arrive keyed by
//! address. Mutations are reducer-style methods returning what changed; they
//! are only ever called from the session actor, which serializes them.
//!
//! Invariants:
//! - no entry is keyed by an empty address;
//! - a governed (non-creator) member with `remaining_time <= 0` is never
//!   speaking, see [`crate::time_tracker`].

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::warn;

use crate::models::LiveMember;
use crate::time_tracker::{self, TimeOutcome};

/// Report of a full snapshot replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetAllReport {
    pub accepted: usize,
    /// Members dropped for having an empty address.
    pub dropped: usize,
    /// Members silenced by the Tracker on the way in.
    pub silenced: usize,
}

/// Result of a speaking-state point update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingUpdate {
    Applied,
    Unchanged,
    /// The Tracker refused: budget exhausted.
    Refused,
    UnknownMember,
}

/// Canonical `address -> LiveMember` mapping for one session.
#[derive(Debug, Default)]
pub struct MembershipStore {
    members: HashMap<String, LiveMember>,
    /// Snapshot/insertion order, used as the stable tie-break when sorting.
    order: Vec<String>,
    creator_uuid: Option<String>,
    revision: u64,
}

impl MembershipStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record which member is the session creator (exempt from the Tracker).
    pub fn set_creator(&mut self, creator_uuid: Option<String>) {
        self.creator_uuid = creator_uuid;
        let creator_uuid = self.creator_uuid.clone();
        let mut silenced = false;
        for member in self.members.values_mut() {
            let is_creator = creator_uuid.as_deref() == Some(member.uuid.as_str());
            silenced |= time_tracker::enforce(member, is_creator) == TimeOutcome::Silenced;
        }
        if silenced {
            self.bump();
        }
    }

    #[must_use]
    pub fn is_creator(&self, member: &LiveMember) -> bool {
        self.creator_uuid.as_deref() == Some(member.uuid.as_str())
    }

    /// Replace the whole store with an authoritative snapshot.
    pub fn set_all(&mut self, members: Vec<LiveMember>) -> SetAllReport {
        let mut report = SetAllReport::default();
        self.members.clear();
        self.order.clear();

        for mut member in members {
            if member.address.is_empty() {
                warn!(
                    target: "oc.store",
                    uuid = %member.uuid,
                    "Dropping snapshot member with empty address"
                );
                report.dropped += 1;
                continue;
            }
            let is_creator = self.is_creator(&member);
            if time_tracker::enforce(&mut member, is_creator) == TimeOutcome::Silenced {
                report.silenced += 1;
            }
            if self.members.insert(member.address.clone(), member.clone()).is_none() {
                self.order.push(member.address);
            }
            report.accepted += 1;
        }

        self.bump();
        report
    }

    /// Insert or wholly replace one member. Returns `false` if rejected.
    pub fn upsert_member(&mut self, mut member: LiveMember) -> bool {
        if member.address.is_empty() {
            warn!(
                target: "oc.store",
                uuid = %member.uuid,
                "Rejecting member with empty address"
            );
            return false;
        }
        let is_creator = self.is_creator(&member);
        time_tracker::enforce(&mut member, is_creator);
        let address = member.address.clone();
        if self.members.insert(address.clone(), member).is_none() {
            self.order.push(address);
        }
        self.bump();
        true
    }

    /// Remove a member.
    pub fn remove(&mut self, address: &str) -> Option<LiveMember> {
        let removed = self.members.remove(address);
        if removed.is_some() {
            self.order.retain(|a| a != address);
            self.bump();
        }
        removed
    }

    /// Point update of the speaking flag.
    ///
    /// A transition to speaking stamps `last_speaked_at_timestamp` with `now_ms`.
    pub fn set_speaking(&mut self, address: &str, speaking: bool, now_ms: i64) -> SpeakingUpdate {
        let creator_uuid = self.creator_uuid.clone();
        let Some(member) = self.members.get_mut(address) else {
            return SpeakingUpdate::UnknownMember;
        };
        if member.is_speaking == speaking {
            return SpeakingUpdate::Unchanged;
        }
        let is_creator = creator_uuid.as_deref() == Some(member.uuid.as_str());
        if speaking && !time_tracker::may_speak(member, is_creator) {
            return SpeakingUpdate::Refused;
        }
        member.is_speaking = speaking;
        if speaking {
            member.last_speaked_at_timestamp = Some(now_ms);
        }
        self.bump();
        SpeakingUpdate::Applied
    }

    /// Authoritative remaining-time update. `None` for unknown members.
    pub fn set_remaining_time(&mut self, address: &str, seconds: i64) -> Option<TimeOutcome> {
        let creator_uuid = self.creator_uuid.clone();
        let member = self.members.get_mut(address)?;
        let is_creator = creator_uuid.as_deref() == Some(member.uuid.as_str());
        let outcome = time_tracker::apply_remaining_time(member, seconds, is_creator);
        if outcome != TimeOutcome::Unchanged {
            self.bump();
        }
        Some(outcome)
    }

    /// Authoritative "time's up". `None` for unknown members.
    pub fn time_is_up(&mut self, address: &str) -> Option<TimeOutcome> {
        let creator_uuid = self.creator_uuid.clone();
        let member = self.members.get_mut(address)?;
        let is_creator = creator_uuid.as_deref() == Some(member.uuid.as_str());
        let outcome = time_tracker::handle_time_is_up(member, is_creator);
        if outcome != TimeOutcome::Unchanged {
            self.bump();
        }
        Some(outcome)
    }

    /// Mark a member present or absent. Absent members stop speaking.
    pub fn set_present(&mut self, address: &str, present: bool) -> bool {
        let Some(member) = self.members.get_mut(address) else {
            return false;
        };
        let speaking = member.is_speaking && present;
        if member.is_present == present && member.is_speaking == speaking {
            return false;
        }
        member.is_present = present;
        member.is_speaking = speaking;
        self.bump();
        true
    }

    pub fn set_recording(&mut self, address: &str, recording: bool) -> bool {
        let Some(member) = self.members.get_mut(address) else {
            return false;
        };
        if member.is_recording == recording {
            return false;
        }
        member.is_recording = recording;
        self.bump();
        true
    }

    #[must_use]
    pub fn get(&self, address: &str) -> Option<&LiveMember> {
        self.members.get(address)
    }

    #[must_use]
    pub fn contains_uuid(&self, uuid: &str) -> bool {
        self.members.values().any(|m| m.uuid == uuid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in snapshot order.
    pub fn members(&self) -> impl Iterator<Item = &LiveMember> {
        self.order.iter().filter_map(|a| self.members.get(a))
    }

    /// Members ordered most-recently-spoken first; ties and never-spoken
    /// members keep snapshot order.
    #[must_use]
    pub fn sorted_by_last_spoken(&self) -> Vec<LiveMember> {
        let mut sorted: Vec<LiveMember> = self.members().cloned().collect();
        sorted.sort_by_key(|m| Reverse(m.last_speaked_at_timestamp));
        sorted
    }

    /// Monotonic change counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

/// Participants currently requesting to speak.
#[derive(Debug, Default)]
pub struct RaisedHands {
    hands: HashMap<String, LiveMember>,
    order: Vec<String>,
}

impl RaisedHands {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the hand was not already raised.
    pub fn raise(&mut self, member: LiveMember) -> bool {
        if member.address.is_empty() {
            return false;
        }
        let address = member.address.clone();
        if self.hands.insert(address.clone(), member).is_none() {
            self.order.push(address);
            true
        } else {
            false
        }
    }

    /// Returns `true` if a raised hand was removed.
    pub fn lower(&mut self, address: &str) -> bool {
        if self.hands.remove(address).is_some() {
            self.order.retain(|a| a != address);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.hands.contains_key(address)
    }

    /// Drop hands of members no longer in the store.
    pub fn retain_known(&mut self, store: &MembershipStore) {
        self.hands.retain(|address, _| store.get(address).is_some());
        self.order.retain(|address| store.get(address).is_some());
    }

    /// Raised hands in the order they were raised.
    #[must_use]
    pub fn to_vec(&self) -> Vec<LiveMember> {
        self.order
            .iter()
            .filter_map(|a| self.hands.get(a))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }
}
