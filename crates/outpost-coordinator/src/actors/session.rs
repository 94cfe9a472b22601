//! `SessionActor` - the Membership Reconciler.
//!
//! Owns the Membership Store, the Raised-Hand Set, the cached outpost and the
//! local participant's presence machine. REST snapshots, transport deltas and
//! widget events all arrive as mailbox messages, so every mutation is applied
//! in call order and a snapshot replace can never interleave with a delta.
//!
//! The actor publishes:
//! - the store revision on a `watch` channel (the rejoin watchdog re-arms on it);
//! - incoming reaction notifications on a `broadcast` channel (UI only, they
//!   never touch the store).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::messages::{LeaveReason, SessionMessage, SessionSnapshot, SetAllOutcome};
use super::metrics::MailboxMonitor;
use crate::collaborators::{ConferenceWidget, Transport};
use crate::errors::CoordinatorError;
use crate::models::{LiveMember, LocalUser, Outpost};
use crate::observability::metrics;
use crate::presence::{PresenceContext, PresenceEffect, PresenceMachine, WidgetEvent};
use crate::protocol::{IncomingMessage, IncomingReaction, MessageType, OutgoingMessage};
use crate::reaction::ReactionKind;
use crate::store::{MembershipStore, RaisedHands, SpeakingUpdate};
use crate::time_tracker::{CountdownView, TimeOutcome};

/// Default mailbox size.
pub const SESSION_CHANNEL_BUFFER: usize = 500;

/// Buffered reaction notifications per subscriber.
const REACTION_BROADCAST_BUFFER: usize = 64;

/// Handle to the `SessionActor`.
#[derive(Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
    changes: watch::Receiver<u64>,
    reactions: broadcast::Sender<IncomingReaction>,
    local_user: Arc<LocalUser>,
}

impl SessionActorHandle {
    async fn send(&self, message: SessionMessage) -> Result<(), CoordinatorError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Replace the store with an authoritative snapshot.
    pub async fn set_all(&self, members: Vec<LiveMember>) -> Result<SetAllOutcome, CoordinatorError> {
        self.request(|respond_to| SessionMessage::SetAll {
            members,
            respond_to,
        })
        .await
    }

    pub async fn upsert_speaking(
        &self,
        address: impl Into<String>,
        speaking: bool,
    ) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::UpsertSpeaking {
            address: address.into(),
            speaking,
        })
        .await
    }

    pub async fn upsert_remaining_time(
        &self,
        address: impl Into<String>,
        seconds: i64,
    ) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::UpsertRemainingTime {
            address: address.into(),
            seconds,
        })
        .await
    }

    pub async fn handle_time_is_up(&self, address: impl Into<String>) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::TimeIsUp {
            address: address.into(),
        })
        .await
    }

    /// Forward a transport delta.
    pub async fn apply_incoming(&self, message: IncomingMessage) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::Incoming { message }).await
    }

    /// Forward a widget event.
    pub async fn apply_widget_event(&self, event: WidgetEvent) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::Widget { event }).await
    }

    pub async fn set_outpost(&self, outpost: Outpost) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::SetOutpost { outpost }).await
    }

    /// Change the active session id. A different id resets the session state.
    pub async fn set_outpost_id(&self, outpost_id: Option<String>) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::SetOutpostId { outpost_id }).await
    }

    /// Pull the local participant out of the conference.
    ///
    /// Returns `true` if a `LEAVE` was sent, `false` if already out.
    pub async fn leave(&self, reason: LeaveReason) -> Result<bool, CoordinatorError> {
        self.request(|respond_to| SessionMessage::Leave { reason, respond_to })
            .await
    }

    pub async fn start_recording(&self) -> Result<(), CoordinatorError> {
        self.request(|respond_to| SessionMessage::StartRecording { respond_to })
            .await?
    }

    pub async fn get_snapshot(&self) -> Result<SessionSnapshot, CoordinatorError> {
        self.request(|respond_to| SessionMessage::GetSnapshot { respond_to })
            .await
    }

    /// Claim the in-flight slot for `(target, kind)`.
    pub async fn begin_reaction(
        &self,
        target: impl Into<String>,
        kind: ReactionKind,
    ) -> Result<bool, CoordinatorError> {
        let target = target.into();
        self.request(|respond_to| SessionMessage::BeginReaction {
            target,
            kind,
            respond_to,
        })
        .await
    }

    pub async fn end_reaction(
        &self,
        target: impl Into<String>,
        kind: ReactionKind,
    ) -> Result<(), CoordinatorError> {
        self.send(SessionMessage::EndReaction {
            target: target.into(),
            kind,
        })
        .await
    }

    /// Store revision; changes on every mutation.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.clone()
    }

    #[must_use]
    pub fn subscribe_reactions(&self) -> broadcast::Receiver<IncomingReaction> {
        self.reactions.subscribe()
    }

    #[must_use]
    pub fn local_user(&self) -> &LocalUser {
        &self.local_user
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    local_user: Arc<LocalUser>,
    outpost_id: Option<String>,
    outpost: Option<Outpost>,
    store: MembershipStore,
    raised_hands: RaisedHands,
    presence: PresenceMachine,
    countdowns: HashMap<String, CountdownView>,
    in_flight: HashSet<(String, ReactionKind)>,
    transport: Arc<dyn Transport>,
    widget: Arc<dyn ConferenceWidget>,
    changes: watch::Sender<u64>,
    reactions: broadcast::Sender<IncomingReaction>,
    mailbox: Arc<MailboxMonitor>,
}

impl SessionActor {
    /// Spawn the session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        local_user: LocalUser,
        transport: Arc<dyn Transport>,
        widget: Arc<dyn ConferenceWidget>,
        mailbox_size: usize,
        cancel_token: CancellationToken,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_size.max(1));
        let (changes_tx, changes_rx) = watch::channel(0);
        let (reactions_tx, _) = broadcast::channel(REACTION_BROADCAST_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new());
        let local_user = Arc::new(local_user);

        let actor = Self {
            receiver,
            cancel_token: cancel_token.clone(),
            local_user: Arc::clone(&local_user),
            outpost_id: None,
            outpost: None,
            store: MembershipStore::new(),
            raised_hands: RaisedHands::new(),
            presence: PresenceMachine::new(),
            countdowns: HashMap::new(),
            in_flight: HashSet::new(),
            transport,
            widget,
            changes: changes_tx,
            reactions: reactions_tx.clone(),
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            mailbox,
            changes: changes_rx,
            reactions: reactions_tx,
            local_user,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "oc.actor.session", fields(local_uuid = %self.local_user.uuid))]
    async fn run(mut self) {
        info!(target: "oc.actor.session", "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "oc.actor.session",
                        "SessionActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            let before = self.store.revision();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            if self.store.revision() != before {
                                self.publish_revision();
                            }
                        }
                        None => {
                            info!(
                                target: "oc.actor.session",
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "oc.actor.session",
            members = self.store.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::SetAll {
                members,
                respond_to,
            } => {
                let outcome = self.handle_set_all(members);
                let _ = respond_to.send(outcome);
            }

            SessionMessage::UpsertSpeaking { address, speaking } => {
                self.handle_upsert_speaking(&address, speaking);
            }

            SessionMessage::UpsertRemainingTime { address, seconds } => {
                self.handle_remaining_time(&address, seconds).await;
            }

            SessionMessage::TimeIsUp { address } => {
                self.handle_time_is_up(&address).await;
            }

            SessionMessage::Incoming { message } => {
                self.handle_incoming(message).await;
            }

            SessionMessage::Widget { event } => {
                self.handle_widget_event(event).await;
            }

            SessionMessage::SetOutpost { outpost } => {
                self.store.set_creator(Some(outpost.creator_user_uuid.clone()));
                self.outpost = Some(outpost);
            }

            SessionMessage::SetOutpostId { outpost_id } => {
                self.handle_set_outpost_id(outpost_id);
            }

            SessionMessage::Leave { reason, respond_to } => {
                let sent = self.handle_leave(reason).await;
                let _ = respond_to.send(sent);
            }

            SessionMessage::StartRecording { respond_to } => {
                let result = self.handle_start_recording().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }

            SessionMessage::BeginReaction {
                target,
                kind,
                respond_to,
            } => {
                let claimed = self.in_flight.insert((target, kind));
                let _ = respond_to.send(claimed);
            }

            SessionMessage::EndReaction { target, kind } => {
                self.in_flight.remove(&(target, kind));
            }
        }
    }

    fn handle_set_all(&mut self, members: Vec<LiveMember>) -> SetAllOutcome {
        let now = Instant::now();
        let report = self.store.set_all(members);
        self.raised_hands.retain_known(&self.store);
        self.countdowns = self
            .store
            .members()
            .map(|m| (m.address.clone(), CountdownView::new(m.remaining_time, now)))
            .collect();
        metrics::record_store_mutation("set_all");

        let contradicted = report.accepted == 0 && self.presence.joined();
        if contradicted {
            metrics::record_snapshot_contradiction();
            warn!(
                target: "oc.actor.session",
                outpost_id = ?self.outpost_id,
                "Empty snapshot while joined, leaving it to the supervisor"
            );
        }

        debug!(
            target: "oc.actor.session",
            accepted = report.accepted,
            dropped = report.dropped,
            silenced = report.silenced,
            "Snapshot applied"
        );

        SetAllOutcome {
            report,
            contradicted,
        }
    }

    fn handle_upsert_speaking(&mut self, address: &str, speaking: bool) {
        let outcome = self
            .store
            .set_speaking(address, speaking, chrono::Utc::now().timestamp_millis());
        debug!(
            target: "oc.actor.session",
            address = %address,
            speaking = speaking,
            outcome = ?outcome,
            "Speaking update"
        );
        if outcome == SpeakingUpdate::Applied {
            metrics::record_store_mutation("speaking");
        }
    }

    async fn handle_remaining_time(&mut self, address: &str, seconds: i64) {
        let Some(outcome) = self.store.set_remaining_time(address, seconds) else {
            debug!(target: "oc.actor.session", address = %address, "Remaining time for unknown member");
            return;
        };
        self.countdowns
            .insert(address.to_string(), CountdownView::new(seconds, Instant::now()));
        metrics::record_store_mutation("remaining_time");
        self.after_time_outcome(address, outcome).await;
    }

    async fn handle_time_is_up(&mut self, address: &str) {
        let Some(outcome) = self.store.time_is_up(address) else {
            debug!(target: "oc.actor.session", address = %address, "Time's up for unknown member");
            return;
        };
        if let Some(member) = self.store.get(address) {
            self.countdowns.insert(
                address.to_string(),
                CountdownView::new(member.remaining_time, Instant::now()),
            );
        }
        metrics::record_store_mutation("time_is_up");
        self.after_time_outcome(address, outcome).await;
    }

    async fn after_time_outcome(&mut self, address: &str, outcome: TimeOutcome) {
        if outcome != TimeOutcome::Silenced {
            return;
        }
        info!(target: "oc.actor.session", address = %address, "Speaker silenced, time is up");
        if address == self.local_user.address {
            let effects = self.presence.on_local_silenced();
            self.apply_effects(effects).await;
        }
    }

    async fn handle_incoming(&mut self, message: IncomingMessage) {
        if let Some(reaction) = message.as_reaction() {
            let _ = self.reactions.send(reaction);
            return;
        }

        let kind = message.kind();
        match message {
            IncomingMessage::UserJoined(member) => {
                if self.store.upsert_member(member) {
                    metrics::record_store_mutation("upsert");
                }
            }
            IncomingMessage::UserLeft(payload) => {
                self.raised_hands.lower(&payload.address);
                self.countdowns.remove(&payload.address);
                if self.store.remove(&payload.address).is_some() {
                    metrics::record_store_mutation("remove");
                }
            }
            IncomingMessage::UserStartedSpeaking(payload) => {
                self.handle_upsert_speaking(&payload.address, true);
            }
            IncomingMessage::UserStoppedSpeaking(payload) => {
                self.handle_upsert_speaking(&payload.address, false);
            }
            IncomingMessage::RemainingTimeUpdated(payload) => {
                self.handle_remaining_time(&payload.address, payload.remaining_time)
                    .await;
            }
            IncomingMessage::UserTimeIsUp(payload) => {
                self.handle_time_is_up(&payload.address).await;
            }
            IncomingMessage::UserStartedRecording(payload) => {
                if self.store.set_recording(&payload.address, true) {
                    metrics::record_store_mutation("recording");
                }
            }
            IncomingMessage::Cheer(_)
            | IncomingMessage::Boo(_)
            | IncomingMessage::Like(_)
            | IncomingMessage::Dislike(_) => {}
        }

        debug!(target: "oc.actor.session", kind = kind, "Transport delta applied");
    }

    async fn handle_widget_event(&mut self, event: WidgetEvent) {
        let kind = event.kind();
        let effects = {
            let mut ctx = PresenceContext {
                store: &mut self.store,
                raised_hands: &mut self.raised_hands,
                local_address: &self.local_user.address,
                now_ms: chrono::Utc::now().timestamp_millis(),
            };
            self.presence.handle(event, &mut ctx)
        };
        metrics::record_store_mutation(if kind == "raise_hand" {
            "raise_hand"
        } else {
            "presence"
        });
        debug!(
            target: "oc.actor.session",
            event = kind,
            effects = effects.len(),
            joined = self.presence.joined(),
            "Widget event applied"
        );
        self.apply_effects(effects).await;
    }

    fn handle_set_outpost_id(&mut self, outpost_id: Option<String>) {
        if self.outpost_id == outpost_id {
            return;
        }
        info!(
            target: "oc.actor.session",
            from = ?self.outpost_id,
            to = ?outpost_id,
            "Session id changed, resetting session state"
        );
        if self.outpost.as_ref().map(|o| &o.uuid) != outpost_id.as_ref() {
            self.outpost = None;
            self.store.set_creator(None);
        }
        self.outpost_id = outpost_id;
        self.store.set_all(Vec::new());
        self.raised_hands = RaisedHands::new();
        self.countdowns.clear();
        self.in_flight.clear();
        self.presence = PresenceMachine::new();
    }

    async fn handle_leave(&mut self, reason: LeaveReason) -> bool {
        let effects = {
            let mut ctx = PresenceContext {
                store: &mut self.store,
                raised_hands: &mut self.raised_hands,
                local_address: &self.local_user.address,
                now_ms: chrono::Utc::now().timestamp_millis(),
            };
            self.presence.force_leave(&mut ctx)
        };
        let sent = effects.contains(&PresenceEffect::Send(MessageType::Leave));
        info!(
            target: "oc.actor.session",
            reason = reason.as_str(),
            sent = sent,
            "Leaving session"
        );
        self.apply_effects(effects).await;

        // Left on purpose: nothing to rejoin until the session is entered again.
        self.handle_set_outpost_id(None);
        sent
    }

    async fn handle_start_recording(&mut self) -> Result<(), CoordinatorError> {
        let outpost_id = self
            .outpost_id
            .clone()
            .ok_or(CoordinatorError::SessionUnknown)?;
        self.transport
            .send(OutgoingMessage::bare(MessageType::StartRecording, outpost_id))
            .await?;
        if self.store.set_recording(&self.local_user.address, true) {
            metrics::record_store_mutation("recording");
        }
        Ok(())
    }

    async fn apply_effects(&self, effects: Vec<PresenceEffect>) {
        for effect in effects {
            match effect {
                PresenceEffect::Send(message_type) => {
                    let Some(outpost_id) = self.outpost_id.as_deref() else {
                        warn!(
                            target: "oc.actor.session",
                            message_type = message_type.as_str(),
                            "No session id, message not sent"
                        );
                        continue;
                    };
                    if let Err(e) = self
                        .transport
                        .send(OutgoingMessage::bare(message_type, outpost_id))
                        .await
                    {
                        warn!(
                            target: "oc.actor.session",
                            message_type = message_type.as_str(),
                            error = %e,
                            "Failed to send message"
                        );
                    }
                }
                PresenceEffect::WidgetCommand(command) => {
                    if let Err(e) = self.widget.execute_command(command, &[]).await {
                        warn!(
                            target: "oc.actor.session",
                            command = command,
                            error = %e,
                            "Widget command failed"
                        );
                    }
                }
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            outpost_id: self.outpost_id.clone(),
            outpost: self.outpost.clone(),
            members: self.store.sorted_by_last_spoken(),
            raised_hands: self.raised_hands.to_vec(),
            joined: self.presence.joined(),
            revision: self.store.revision(),
            countdowns: self.countdowns.clone(),
            reactions_in_flight: self.in_flight.len(),
        }
    }

    fn publish_revision(&self) {
        self.changes.send_replace(self.store.revision());
        metrics::set_members_present(self.store.members().filter(|m| m.is_present).count());
    }

    async fn graceful_shutdown(&mut self) {
        if self.presence.joined() {
            self.handle_leave(LeaveReason::Teardown).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{MockTransport, MockWidget};
    use crate::presence::{WIDGET_HANGUP, WIDGET_TOGGLE_AUDIO};
    use crate::protocol::{AddressPayload, IncomingReactionType, ReactionPayload, RemainingTimePayload};
    use crate::time_tracker::TimeDisplay;

    const ME: &str = "0xme";

    fn member(uuid: &str, address: &str, remaining_time: i64) -> LiveMember {
        LiveMember {
            uuid: uuid.to_string(),
            address: address.to_string(),
            aptos_address: format!("{address}-pay"),
            primary_aptos_address: None,
            name: uuid.to_string(),
            image: String::new(),
            is_present: true,
            is_speaking: false,
            is_recording: false,
            remaining_time,
            last_speaked_at_timestamp: None,
            followed_by_me: false,
        }
    }

    fn local_user() -> LocalUser {
        LocalUser {
            uuid: "u-me".to_string(),
            address: ME.to_string(),
            aptos_address: "0xme-pay".to_string(),
            primary_aptos_address: None,
            authenticated: true,
        }
    }

    struct Harness {
        handle: SessionActorHandle,
        transport: Arc<MockTransport>,
        widget: Arc<MockWidget>,
    }

    async fn spawn_session() -> Harness {
        let transport = Arc::new(MockTransport::new());
        let widget = Arc::new(MockWidget::new());
        let (handle, _task) = SessionActor::spawn(
            local_user(),
            transport.clone(),
            widget.clone(),
            SESSION_CHANNEL_BUFFER,
            CancellationToken::new(),
        );
        handle
            .set_outpost_id(Some("outpost-1".to_string()))
            .await
            .unwrap();
        Harness {
            handle,
            transport,
            widget,
        }
    }

    async fn join(h: &Harness) {
        h.handle
            .apply_widget_event(WidgetEvent::VideoConferenceJoined)
            .await
            .unwrap();
        h.handle
            .apply_widget_event(WidgetEvent::AudioMuteStatusChanged { muted: true })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_session_actor_spawn_and_cancel() {
        let h = spawn_session().await;
        assert!(!h.handle.is_cancelled());
        assert_eq!(h.handle.local_user().uuid, "u-me");

        h.handle.cancel();
        assert!(h.handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_set_all_wins_over_earlier_point_updates() {
        let h = spawn_session().await;
        h.handle
            .set_all(vec![member("u-a", "0xa", 60), member("u-b", "0xb", 60)])
            .await
            .unwrap();
        h.handle.upsert_speaking("0xa", true).await.unwrap();
        h.handle.upsert_remaining_time("0xb", 5).await.unwrap();

        h.handle
            .set_all(vec![member("u-a", "0xa", 40)])
            .await
            .unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert_eq!(snapshot.member_count(), 1);
        let a = snapshot.member("0xa").unwrap();
        assert!(!a.is_speaking);
        assert_eq!(a.remaining_time, 40);
    }

    #[tokio::test]
    async fn test_point_updates_for_unknown_addresses_are_ignored() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-a", "0xa", 60)]).await.unwrap();
        let before = h.handle.get_snapshot().await.unwrap().revision;

        h.handle.upsert_speaking("0xnobody", true).await.unwrap();
        h.handle.upsert_remaining_time("0xnobody", 1).await.unwrap();
        h.handle.handle_time_is_up("0xnobody").await.unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert_eq!(snapshot.revision, before);
        assert_eq!(snapshot.member_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_snapshot_while_joined_is_reported() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        join(&h).await;

        let outcome = h.handle.set_all(Vec::new()).await.unwrap();
        assert!(outcome.contradicted);

        let outcome = h.handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        assert!(!outcome.contradicted);
    }

    #[tokio::test]
    async fn test_widget_join_sends_join_and_leave_exactly_once() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        join(&h).await;

        h.handle
            .apply_widget_event(WidgetEvent::VideoConferenceLeft)
            .await
            .unwrap();
        h.handle
            .apply_widget_event(WidgetEvent::VideoConferenceLeft)
            .await
            .unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert!(!snapshot.joined);
        assert_eq!(h.transport.sent_of(MessageType::Join).len(), 1);
        assert_eq!(h.transport.sent_of(MessageType::Leave).len(), 1);
        assert_eq!(
            h.transport
                .sent_of(MessageType::Join)
                .first()
                .unwrap()
                .outpost_uuid,
            "outpost-1"
        );
    }

    #[tokio::test]
    async fn test_local_time_up_mutes_widget() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        join(&h).await;
        h.handle
            .apply_widget_event(WidgetEvent::AudioMuteStatusChanged { muted: false })
            .await
            .unwrap();
        assert_eq!(h.transport.sent_of(MessageType::StartSpeaking).len(), 1);

        h.handle
            .apply_incoming(IncomingMessage::UserTimeIsUp(AddressPayload {
                address: ME.to_string(),
            }))
            .await
            .unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        let me = snapshot.member(ME).unwrap();
        assert!(!me.is_speaking);
        assert_eq!(me.remaining_time, 0);
        assert_eq!(h.widget.commands(), vec![WIDGET_TOGGLE_AUDIO.to_string()]);
    }

    #[tokio::test]
    async fn test_remote_time_up_does_not_touch_widget() {
        let h = spawn_session().await;
        h.handle
            .set_all(vec![member("u-me", ME, 60), member("u-b", "0xb", 60)])
            .await
            .unwrap();
        join(&h).await;
        h.handle.upsert_speaking("0xb", true).await.unwrap();

        h.handle
            .apply_incoming(IncomingMessage::RemainingTimeUpdated(RemainingTimePayload {
                address: "0xb".to_string(),
                remaining_time: -3,
            }))
            .await
            .unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert!(!snapshot.member("0xb").unwrap().is_speaking);
        assert!(h.widget.commands().is_empty());
    }

    #[tokio::test]
    async fn test_creator_keeps_speaking_and_displays_creator() {
        let h = spawn_session().await;
        h.handle
            .set_outpost(Outpost {
                uuid: "outpost-1".to_string(),
                name: "Town hall".to_string(),
                creator_user_uuid: "u-host".to_string(),
                creator_joined: true,
                scheduled_for: None,
            })
            .await
            .unwrap();
        h.handle
            .set_all(vec![member("u-host", "0xhost", 0)])
            .await
            .unwrap();
        h.handle.upsert_speaking("0xhost", true).await.unwrap();
        h.handle.handle_time_is_up("0xhost").await.unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert!(snapshot.member("0xhost").unwrap().is_speaking);
        assert_eq!(
            snapshot.time_display("0xhost", Instant::now()),
            Some(TimeDisplay::Creator)
        );
    }

    #[tokio::test]
    async fn test_incoming_deltas_update_store() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-a", "0xa", 60)]).await.unwrap();

        h.handle
            .apply_incoming(IncomingMessage::UserJoined(member("u-b", "0xb", 30)))
            .await
            .unwrap();
        h.handle
            .apply_incoming(IncomingMessage::UserStartedSpeaking(AddressPayload {
                address: "0xb".to_string(),
            }))
            .await
            .unwrap();
        h.handle
            .apply_incoming(IncomingMessage::UserStartedRecording(AddressPayload {
                address: "0xa".to_string(),
            }))
            .await
            .unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert_eq!(snapshot.member_count(), 2);
        assert_eq!(snapshot.members.first().unwrap().address, "0xb");
        assert!(snapshot.member("0xb").unwrap().is_speaking);
        assert!(snapshot.member("0xa").unwrap().is_recording);

        h.handle
            .apply_incoming(IncomingMessage::UserLeft(AddressPayload {
                address: "0xb".to_string(),
            }))
            .await
            .unwrap();
        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert!(snapshot.member("0xb").is_none());
    }

    #[tokio::test]
    async fn test_incoming_reactions_are_broadcast_not_stored() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-a", "0xa", 60)]).await.unwrap();
        let mut reactions = h.handle.subscribe_reactions();
        let before = h.handle.get_snapshot().await.unwrap().revision;

        h.handle
            .apply_incoming(IncomingMessage::Cheer(ReactionPayload {
                address: "0xb".to_string(),
                react_to_user_address: "0xa".to_string(),
                amount: Some(2.5),
            }))
            .await
            .unwrap();

        let reaction = reactions.recv().await.unwrap();
        assert_eq!(reaction.reaction_type, IncomingReactionType::Cheer);
        assert_eq!(reaction.target_address, "0xa");
        assert_eq!(h.handle.get_snapshot().await.unwrap().revision, before);
    }

    #[tokio::test]
    async fn test_revision_published_on_change() {
        let h = spawn_session().await;
        let mut changes = h.handle.subscribe_changes();
        let _ = changes.borrow_and_update();

        h.handle.set_all(vec![member("u-a", "0xa", 60)]).await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), h.handle.get_snapshot().await.unwrap().revision);
    }

    #[tokio::test]
    async fn test_force_leave_hangs_up_and_reports() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        join(&h).await;

        assert!(h.handle.leave(LeaveReason::SessionEmptied).await.unwrap());
        assert!(!h.handle.leave(LeaveReason::User).await.unwrap());
        assert_eq!(h.transport.sent_of(MessageType::Leave).len(), 1);
        assert_eq!(h.widget.commands(), vec![WIDGET_HANGUP.to_string()]);
    }

    #[tokio::test]
    async fn test_leave_clears_session_id() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        join(&h).await;

        h.handle.leave(LeaveReason::User).await.unwrap();

        let leave = h.transport.sent_of(MessageType::Leave);
        assert_eq!(leave.len(), 1);
        assert!(leave.iter().all(|m| m.outpost_uuid == "outpost-1"));
        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert_eq!(snapshot.outpost_id, None);
        assert_eq!(snapshot.member_count(), 0);
    }

    #[tokio::test]
    async fn test_start_recording_requires_session() {
        let transport = Arc::new(MockTransport::new());
        let widget = Arc::new(MockWidget::new());
        let (handle, _task) = SessionActor::spawn(
            local_user(),
            transport.clone(),
            widget,
            SESSION_CHANNEL_BUFFER,
            CancellationToken::new(),
        );
        assert!(matches!(
            handle.start_recording().await,
            Err(CoordinatorError::SessionUnknown)
        ));

        handle.set_outpost_id(Some("o-9".to_string())).await.unwrap();
        handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        handle.start_recording().await.unwrap();
        assert_eq!(transport.sent_of(MessageType::StartRecording).len(), 1);
        assert!(handle.get_snapshot().await.unwrap().member(ME).unwrap().is_recording);
    }

    #[tokio::test]
    async fn test_reaction_in_flight_slot() {
        let h = spawn_session().await;
        assert!(h.handle.begin_reaction("0xa", ReactionKind::Cheer).await.unwrap());
        assert!(!h.handle.begin_reaction("0xa", ReactionKind::Cheer).await.unwrap());
        assert!(h.handle.begin_reaction("0xa", ReactionKind::Boo).await.unwrap());

        h.handle.end_reaction("0xa", ReactionKind::Cheer).await.unwrap();
        assert!(h.handle.begin_reaction("0xa", ReactionKind::Cheer).await.unwrap());
        assert_eq!(h.handle.get_snapshot().await.unwrap().reactions_in_flight, 2);
    }

    #[tokio::test]
    async fn test_session_id_change_resets_state() {
        let h = spawn_session().await;
        h.handle.set_all(vec![member("u-a", "0xa", 60)]).await.unwrap();
        h.handle
            .apply_widget_event(WidgetEvent::RaiseHandUpdated {
                id: "0xa".to_string(),
                hand_raised: true,
            })
            .await
            .unwrap();
        assert_eq!(h.handle.get_snapshot().await.unwrap().raised_hands.len(), 1);

        h.handle
            .set_outpost_id(Some("outpost-2".to_string()))
            .await
            .unwrap();

        let snapshot = h.handle.get_snapshot().await.unwrap();
        assert_eq!(snapshot.outpost_id.as_deref(), Some("outpost-2"));
        assert_eq!(snapshot.member_count(), 0);
        assert!(snapshot.raised_hands.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_joined_sends_leave() {
        let transport = Arc::new(MockTransport::new());
        let (handle, task) = SessionActor::spawn(
            local_user(),
            transport.clone(),
            Arc::new(MockWidget::new()),
            SESSION_CHANNEL_BUFFER,
            CancellationToken::new(),
        );
        handle.set_outpost_id(Some("o-1".to_string())).await.unwrap();
        handle.set_all(vec![member("u-me", ME, 60)]).await.unwrap();
        handle
            .apply_widget_event(WidgetEvent::VideoConferenceJoined)
            .await
            .unwrap();
        let _ = handle.get_snapshot().await.unwrap();

        handle.cancel();
        task.await.unwrap();

        assert_eq!(transport.sent_of(MessageType::Leave).len(), 1);
    }
}
