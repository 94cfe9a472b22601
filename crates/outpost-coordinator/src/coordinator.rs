//! Session context object.
//!
//! `LiveSessionCoordinator` owns everything a live session needs: the session
//! actor, the reconnection supervisor, the reaction coordinator and the tasks
//! that pump widget and transport events into the actor. It is created once
//! per session view and passed explicitly to whoever needs it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::actors::{LeaveReason, SessionActor, SessionActorHandle, SessionSnapshot};
use crate::collaborators::{
    ChainClient, ConferenceWidget, ConfirmationDialog, ListenerId, RestClient, Transport,
};
use crate::config::Config;
use crate::errors::CoordinatorError;
use crate::models::LocalUser;
use crate::presence::WidgetEvent;
use crate::protocol::IncomingMessage;
use crate::reaction::{ReactionCoordinator, ReactionSettings};
use crate::supervisor::{ReconnectionSupervisor, SupervisorSettings};

/// External collaborators injected into the coordinator.
#[derive(Clone)]
pub struct Collaborators {
    pub rest: Arc<dyn RestClient>,
    pub transport: Arc<dyn Transport>,
    pub widget: Arc<dyn ConferenceWidget>,
    pub chain: Arc<dyn ChainClient>,
    pub dialog: Arc<dyn ConfirmationDialog>,
}

/// Live session context.
pub struct LiveSessionCoordinator {
    config: Config,
    collaborators: Collaborators,
    session: SessionActorHandle,
    session_task: Option<JoinHandle<()>>,
    supervisor: ReconnectionSupervisor,
    reactions: ReactionCoordinator,
    cancel_token: CancellationToken,
    transport_connected: bool,
    widget_listener: Option<ListenerId>,
    listener_tasks: Vec<JoinHandle<()>>,
}

impl LiveSessionCoordinator {
    /// Build the session context and start the rejoin watchdog.
    #[must_use]
    pub fn new(config: Config, local_user: LocalUser, collaborators: Collaborators) -> Self {
        let cancel_token = CancellationToken::new();

        let (session, session_task) = SessionActor::spawn(
            local_user,
            Arc::clone(&collaborators.transport),
            Arc::clone(&collaborators.widget),
            config.session_mailbox,
            cancel_token.child_token(),
        );

        let supervisor = ReconnectionSupervisor::new(
            session.clone(),
            Arc::clone(&collaborators.rest),
            Arc::clone(&collaborators.transport),
            SupervisorSettings {
                idle_backup: config.idle_backup,
                rejoin_check: config.rejoin_check,
            },
            cancel_token.child_token(),
        );
        let rejoin_task = supervisor.start();

        let reactions = ReactionCoordinator::new(
            session.clone(),
            Arc::clone(&collaborators.rest),
            Arc::clone(&collaborators.transport),
            Arc::clone(&collaborators.chain),
            Arc::clone(&collaborators.dialog),
            ReactionSettings {
                fallback_address: config.fallback_address.clone(),
                chain_id: config.chain_id,
            },
        );

        info!(
            target: "oc.coordinator",
            api_url = %config.api_url,
            ws_url = %config.ws_url,
            "Session coordinator created"
        );

        Self {
            config,
            collaborators,
            session,
            session_task: Some(session_task),
            supervisor,
            reactions,
            cancel_token,
            transport_connected: false,
            widget_listener: None,
            listener_tasks: vec![rejoin_task],
        }
    }

    /// Enter (or switch to) a session.
    ///
    /// Connects the transport on first use, resets the store for the new id,
    /// arms the idle-backup watchdog, loads the outpost and the first
    /// snapshot, and attaches the widget listener.
    ///
    /// # Errors
    ///
    /// Transport connect failures, and `SessionUnknown` if the outpost does
    /// not exist. A failed snapshot fetch is not an error: the idle-backup
    /// watchdog retries it.
    #[instrument(skip_all, name = "oc.coordinator.enter", fields(outpost_id = %outpost_id))]
    pub async fn enter(&mut self, outpost_id: &str) -> Result<(), CoordinatorError> {
        if !self.transport_connected {
            self.connect_transport().await?;
        }

        self.session
            .set_outpost_id(Some(outpost_id.to_string()))
            .await?;
        self.supervisor.arm_idle_backup(outpost_id.to_string());

        let outpost = self
            .collaborators
            .rest
            .get_outpost(outpost_id)
            .await?
            .ok_or(CoordinatorError::SessionUnknown)?;
        self.session.set_outpost(outpost).await?;

        match self.collaborators.rest.get_latest_live_data(outpost_id).await {
            Ok(Some(live)) => {
                self.session.set_all(live.members).await?;
            }
            Ok(None) => {
                debug!(target: "oc.coordinator", "No live data yet");
            }
            Err(e) => {
                warn!(
                    target: "oc.coordinator",
                    error = %e,
                    "Initial snapshot failed, idle-backup will retry"
                );
            }
        }

        if self.widget_listener.is_none() {
            self.attach_widget();
        }

        info!(target: "oc.coordinator", "Entered session");
        Ok(())
    }

    /// The local user leaves the conference. The session id is cleared, so
    /// the rejoin watchdog stays idle until the next `enter`.
    pub async fn leave(&self) -> Result<bool, CoordinatorError> {
        self.session.leave(LeaveReason::User).await
    }

    /// Tear the session down: stop watchdogs, leave, detach listeners and
    /// stop the actor. Never fails; detaching from a dead widget is tolerated.
    #[instrument(skip_all, name = "oc.coordinator.teardown")]
    pub async fn teardown(&mut self) {
        self.supervisor.shutdown();

        if let Err(e) = self.session.leave(LeaveReason::Teardown).await {
            debug!(target: "oc.coordinator", error = %e, "Leave during teardown failed");
        }
        if let Err(e) = self.session.set_outpost_id(None).await {
            debug!(target: "oc.coordinator", error = %e, "Session reset during teardown failed");
        }

        if let Some(id) = self.widget_listener.take() {
            if let Err(e) = self.collaborators.widget.remove_listener(id) {
                debug!(
                    target: "oc.coordinator",
                    error = %e,
                    "Widget already gone, listener not removed"
                );
            }
        }

        self.cancel_token.cancel();
        for task in self.listener_tasks.drain(..) {
            let _ = task.await;
        }
        if let Some(task) = self.session_task.take() {
            let _ = task.await;
        }
        self.transport_connected = false;

        info!(target: "oc.coordinator", "Session torn down");
    }

    #[must_use]
    pub fn session(&self) -> &SessionActorHandle {
        &self.session
    }

    #[must_use]
    pub fn reactions(&self) -> &ReactionCoordinator {
        &self.reactions
    }

    #[must_use]
    pub fn supervisor(&self) -> &ReconnectionSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, CoordinatorError> {
        self.session.get_snapshot().await
    }

    async fn connect_transport(&mut self) -> Result<(), CoordinatorError> {
        self.collaborators
            .transport
            .connect(&self.config.ws_token, &self.config.ws_url)
            .await?;
        self.transport_connected = true;

        let incoming = self.collaborators.transport.subscribe();
        let task = tokio::spawn(pump_transport(
            incoming,
            self.session.clone(),
            self.cancel_token.child_token(),
        ));
        self.listener_tasks.push(task);
        debug!(target: "oc.coordinator", "Transport connected");
        Ok(())
    }

    fn attach_widget(&mut self) {
        let (id, events) = self.collaborators.widget.add_listener();
        self.widget_listener = Some(id);
        let task = tokio::spawn(pump_widget(
            events,
            self.session.clone(),
            self.cancel_token.child_token(),
        ));
        self.listener_tasks.push(task);
        debug!(target: "oc.coordinator", listener = id.0, "Widget listener attached");
    }
}

async fn pump_transport(
    mut incoming: mpsc::Receiver<IncomingMessage>,
    session: SessionActorHandle,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            message = incoming.recv() => {
                let Some(message) = message else {
                    debug!(target: "oc.coordinator", "Transport stream closed");
                    break;
                };
                if session.apply_incoming(message).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn pump_widget(
    mut events: mpsc::Receiver<WidgetEvent>,
    session: SessionActorHandle,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else {
                    debug!(target: "oc.coordinator", "Widget event stream closed");
                    break;
                };
                if session.apply_widget_event(event).await.is_err() {
                    break;
                }
            }
        }
    }
}
