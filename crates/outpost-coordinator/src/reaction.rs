//! Reaction Economy Coordinator.
//!
//! A cheer or boo is a paid reaction: the chain payment must succeed and
//! produce a transaction hash before anything is broadcast. Every gate fails
//! closed. A user dismissing the amount prompt is a silent
//! [`ReactionOutcome::Cancelled`], not an error.
//!
//! Likes and dislikes are free and go straight to the transport.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::actors::{LeaveReason, SessionActorHandle};
use crate::collaborators::{
    ChainClient, CheerBooRequest, ConfirmationDialog, DialogRequest, RestClient, Transport,
};
use crate::errors::CoordinatorError;
use crate::models::{LiveMember, LocalUser};
use crate::observability::metrics;
use crate::protocol::{MessageType, OutgoingMessage};

/// Paid reaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Cheer,
    Boo,
}

impl ReactionKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Cheer => "cheer",
            ReactionKind::Boo => "boo",
        }
    }

    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            ReactionKind::Cheer => MessageType::Cheer,
            ReactionKind::Boo => MessageType::Boo,
        }
    }

    fn title(self) -> &'static str {
        match self {
            ReactionKind::Cheer => "Cheer",
            ReactionKind::Boo => "Boo",
        }
    }
}

/// How a paid reaction ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// Paid and broadcast.
    Sent { tx_hash: String },
    /// The user dismissed the prompt or entered no usable amount.
    Cancelled,
}

/// Static parameters of the payment flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSettings {
    /// Receives payments that would otherwise have no receiver.
    pub fallback_address: String,
    pub chain_id: u64,
}

/// Runs cheer/boo payments and free reactions for one session.
#[derive(Clone)]
pub struct ReactionCoordinator {
    session: SessionActorHandle,
    rest: Arc<dyn RestClient>,
    transport: Arc<dyn Transport>,
    chain: Arc<dyn ChainClient>,
    dialog: Arc<dyn ConfirmationDialog>,
    settings: ReactionSettings,
}

impl ReactionCoordinator {
    #[must_use]
    pub fn new(
        session: SessionActorHandle,
        rest: Arc<dyn RestClient>,
        transport: Arc<dyn Transport>,
        chain: Arc<dyn ChainClient>,
        dialog: Arc<dyn ConfirmationDialog>,
        settings: ReactionSettings,
    ) -> Self {
        Self {
            session,
            rest,
            transport,
            chain,
            dialog,
            settings,
        }
    }

    /// Check the transport before the user is asked for an amount.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the health check fails or errors.
    pub async fn preflight(&self) -> Result<(), CoordinatorError> {
        match self.transport.health_check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CoordinatorError::TransportUnavailable),
            Err(e) => {
                warn!(target: "oc.reaction", error = %e, "Transport health check errored");
                Err(CoordinatorError::TransportUnavailable)
            }
        }
    }

    /// Cheer or boo the member at `target_address`.
    ///
    /// # Errors
    ///
    /// Guard failures (`NotAuthenticated`, `SessionUnknown`,
    /// `MissingPayableAddress`, `ReactionInProgress`), `SessionEmptied` when
    /// the live data is gone, `NoReceivers` for a self-cheer with nobody else
    /// present, `PaymentFailed` when the chain call does not produce a proof,
    /// and transient REST errors from the fresh fetch.
    #[instrument(skip_all, name = "oc.reaction.cheer_boo", fields(kind = kind.as_str()))]
    pub async fn cheer_boo(
        &self,
        target_address: &str,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome, CoordinatorError> {
        let started = Instant::now();
        let result = self.guarded_cheer_boo(target_address, kind).await;

        let outcome = match &result {
            Ok(ReactionOutcome::Sent { .. }) => "sent",
            Ok(ReactionOutcome::Cancelled) => "cancelled",
            Err(CoordinatorError::SessionEmptied) => "session_emptied",
            Err(CoordinatorError::PaymentFailed(_)) => "payment_failed",
            Err(
                CoordinatorError::NotAuthenticated
                | CoordinatorError::MissingPayableAddress(_)
                | CoordinatorError::SessionUnknown
                | CoordinatorError::NoReceivers
                | CoordinatorError::ReactionInProgress(_),
            ) => "rejected",
            Err(_) => "error",
        };
        metrics::record_reaction(kind.as_str(), outcome);
        metrics::record_reaction_duration(kind.as_str(), started.elapsed());

        match &result {
            Ok(_) => debug!(target: "oc.reaction", outcome = outcome, "Reaction finished"),
            Err(e) => warn!(target: "oc.reaction", outcome = outcome, error = %e, "Reaction failed"),
        }
        result
    }

    pub async fn like(&self, target_address: &str) -> Result<(), CoordinatorError> {
        self.send_free(target_address, MessageType::Like, "like").await
    }

    pub async fn dislike(&self, target_address: &str) -> Result<(), CoordinatorError> {
        self.send_free(target_address, MessageType::Dislike, "dislike")
            .await
    }

    async fn send_free(
        &self,
        target_address: &str,
        message_type: MessageType,
        label: &'static str,
    ) -> Result<(), CoordinatorError> {
        let snapshot = self.session.get_snapshot().await?;
        let result = match snapshot.outpost_id {
            Some(outpost_id) => {
                self.transport
                    .send(OutgoingMessage::reaction(message_type, outpost_id, target_address))
                    .await
            }
            None => Err(CoordinatorError::SessionUnknown),
        };
        metrics::record_reaction(label, if result.is_ok() { "sent" } else { "error" });
        result
    }

    async fn guarded_cheer_boo(
        &self,
        target_address: &str,
        kind: ReactionKind,
    ) -> Result<ReactionOutcome, CoordinatorError> {
        let local = self.session.local_user();
        if !local.authenticated {
            return Err(CoordinatorError::NotAuthenticated);
        }

        let snapshot = self.session.get_snapshot().await?;
        let outpost_id = snapshot.outpost_id.clone().ok_or(CoordinatorError::SessionUnknown)?;
        let target = snapshot
            .member(target_address)
            .cloned()
            .ok_or_else(|| CoordinatorError::MissingPayableAddress(target_address.to_string()))?;
        let target_payable = target
            .payable_address()
            .map(str::to_string)
            .ok_or_else(|| CoordinatorError::MissingPayableAddress(target_address.to_string()))?;

        if !self.session.begin_reaction(target_address, kind).await? {
            return Err(CoordinatorError::ReactionInProgress(
                target_address.to_string(),
            ));
        }

        let result = self
            .pay_and_broadcast(&outpost_id, &target, target_payable, kind, local)
            .await;

        if let Err(e) = self.session.end_reaction(target_address, kind).await {
            warn!(target: "oc.reaction", error = %e, "Failed to release reaction slot");
        }
        result
    }

    async fn pay_and_broadcast(
        &self,
        outpost_id: &str,
        target: &LiveMember,
        target_payable: String,
        kind: ReactionKind,
        local: &LocalUser,
    ) -> Result<ReactionOutcome, CoordinatorError> {
        let Some(amount) = self.prompt_amount(target, kind).await? else {
            return Ok(ReactionOutcome::Cancelled);
        };

        let Some(live) = self.rest.get_latest_live_data(outpost_id).await? else {
            info!(
                target: "oc.reaction",
                outpost_id = %outpost_id,
                "Live data gone, leaving session"
            );
            self.session.leave(LeaveReason::SessionEmptied).await?;
            return Err(CoordinatorError::SessionEmptied);
        };

        let mut receivers: Vec<String> = live
            .members
            .iter()
            .filter_map(LiveMember::payable_address)
            .map(str::to_string)
            .collect();

        let self_cheer = kind == ReactionKind::Cheer
            && (target.uuid == local.uuid || target.address == local.address);
        let mut chain_target = target_payable;
        if self_cheer {
            receivers.retain(|address| {
                local
                    .own_payable_addresses()
                    .all(|own| own != address.as_str())
            });
            if receivers.is_empty() {
                return Err(CoordinatorError::NoReceivers);
            }
        } else if receivers.is_empty() {
            debug!(target: "oc.reaction", "No receivers, paying the fallback address");
            chain_target.clone_from(&self.settings.fallback_address);
            receivers = vec![self.settings.fallback_address.clone()];
        }

        let request = CheerBooRequest {
            target: chain_target,
            receiver_addresses: receivers,
            amount,
            cheer: kind == ReactionKind::Cheer,
            outpost_id: outpost_id.to_string(),
        };
        let tx_hash = match self.chain.cheer_boo(request).await {
            Ok((true, Some(tx_hash))) => tx_hash,
            Ok((true, None)) => {
                return Err(CoordinatorError::PaymentFailed(
                    "no transaction hash returned".to_string(),
                ))
            }
            Ok((false, _)) => {
                return Err(CoordinatorError::PaymentFailed(
                    "chain call did not succeed".to_string(),
                ))
            }
            Err(e) => return Err(CoordinatorError::PaymentFailed(e.to_string())),
        };

        self.transport
            .send(OutgoingMessage::paid_reaction(
                kind.message_type(),
                outpost_id,
                target.address.clone(),
                tx_hash.clone(),
                self.settings.chain_id,
            ))
            .await?;

        info!(
            target: "oc.reaction",
            tx_hash = %tx_hash,
            "Reaction paid and broadcast"
        );
        Ok(ReactionOutcome::Sent { tx_hash })
    }

    /// `None` when the user cancels or enters no positive amount.
    async fn prompt_amount(
        &self,
        target: &LiveMember,
        kind: ReactionKind,
    ) -> Result<Option<f64>, CoordinatorError> {
        let result = self
            .dialog
            .confirm(DialogRequest {
                title: kind.title().to_string(),
                content: format!("How much do you want to {} {}?", kind.as_str(), target.name),
                action_text: kind.title().to_string(),
                input_placeholder: Some("Amount".to_string()),
            })
            .await?;

        if !result.confirmed {
            return Ok(None);
        }
        let amount = result
            .entered_text
            .as_deref()
            .and_then(|text| text.trim().parse::<f64>().ok())
            .filter(|amount| amount.is_finite() && *amount > 0.0);
        Ok(amount)
    }
}
