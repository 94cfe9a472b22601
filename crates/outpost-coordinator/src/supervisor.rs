//! Reconnection Supervisor.
//!
//! Two independent watchdogs recover from a stale view of the session:
//!
//! - **Idle-backup**: single-shot, armed whenever a session id becomes
//!   available. If the store is still empty and the local participant has not
//!   joined when it fires, a REST snapshot is fetched and applied.
//! - **Rejoin**: re-armed on every store revision (and once at start). If a
//!   session id is set but the local participant is missing from the members
//!   when it fires, the transport join handshake is retried and the snapshot
//!   silently refetched. Leaving clears the session id, so there is nothing to
//!   rejoin after a voluntary leave.
//!
//! Each watchdog runs as its own task under a child of the supervisor's
//! cancellation token. Watchdogs only read snapshots and call the session
//! actor's public operations.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::actors::SessionActorHandle;
use crate::collaborators::{RestClient, Transport};
use crate::observability::metrics;

/// Default idle-backup delay.
pub const DEFAULT_IDLE_BACKUP: Duration = Duration::from_secs(30);

/// Default rejoin check delay.
pub const DEFAULT_REJOIN_CHECK: Duration = Duration::from_secs(5);

const IDLE_BACKUP: &str = "idle_backup";
const REJOIN: &str = "rejoin";

/// Watchdog timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub idle_backup: Duration,
    pub rejoin_check: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            idle_backup: DEFAULT_IDLE_BACKUP,
            rejoin_check: DEFAULT_REJOIN_CHECK,
        }
    }
}

/// Owner of the idle-backup and rejoin watchdogs.
#[derive(Clone)]
pub struct ReconnectionSupervisor {
    session: SessionActorHandle,
    rest: Arc<dyn RestClient>,
    transport: Arc<dyn Transport>,
    settings: SupervisorSettings,
    cancel_token: CancellationToken,
    /// Token of the currently armed idle-backup watchdog.
    idle_token: Arc<Mutex<Option<CancellationToken>>>,
}

impl ReconnectionSupervisor {
    #[must_use]
    pub fn new(
        session: SessionActorHandle,
        rest: Arc<dyn RestClient>,
        transport: Arc<dyn Transport>,
        settings: SupervisorSettings,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            session,
            rest,
            transport,
            settings,
            cancel_token,
            idle_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn the rejoin watchdog.
    pub fn start(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_rejoin_watchdog().await })
    }

    /// Arm the idle-backup watchdog for `outpost_id`, cancelling any armed one.
    pub fn arm_idle_backup(&self, outpost_id: String) -> JoinHandle<()> {
        let token = self.cancel_token.child_token();
        self.replace_idle_token(Some(token.clone()));

        let this = self.clone();
        tokio::spawn(async move { this.run_idle_backup(outpost_id, token).await })
    }

    /// Cancel the idle-backup watchdog, if armed.
    pub fn disarm_idle_backup(&self) {
        self.replace_idle_token(None);
    }

    /// Cancel both watchdogs.
    pub fn shutdown(&self) {
        self.disarm_idle_backup();
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    fn replace_idle_token(&self, token: Option<CancellationToken>) {
        let previous = {
            let mut slot = self
                .idle_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, token)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    #[instrument(skip_all, name = "oc.supervisor.idle_backup", fields(outpost_id = %outpost_id))]
    async fn run_idle_backup(self, outpost_id: String, token: CancellationToken) {
        tokio::select! {
            () = token.cancelled() => {
                debug!(target: "oc.supervisor", "Idle-backup watchdog cancelled");
                return;
            }
            () = tokio::time::sleep(self.settings.idle_backup) => {}
        }

        let snapshot = match self.session.get_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(target: "oc.supervisor", error = %e, "Idle-backup could not read session");
                metrics::record_watchdog_fire(IDLE_BACKUP, "error");
                return;
            }
        };

        if token.is_cancelled() || snapshot.outpost_id.as_deref() != Some(outpost_id.as_str()) {
            debug!(target: "oc.supervisor", "Idle-backup superseded");
            return;
        }
        if snapshot.member_count() > 0 || snapshot.joined {
            metrics::record_watchdog_fire(IDLE_BACKUP, "skipped");
            return;
        }

        info!(target: "oc.supervisor", "Session still empty, fetching snapshot");
        match self.rest.get_latest_live_data(&outpost_id).await {
            Ok(Some(live)) => {
                if let Err(e) = self.session.set_all(live.members).await {
                    warn!(target: "oc.supervisor", error = %e, "Idle-backup could not apply snapshot");
                    metrics::record_watchdog_fire(IDLE_BACKUP, "error");
                    return;
                }
                metrics::record_watchdog_fire(IDLE_BACKUP, "refetched");
            }
            Ok(None) => {
                debug!(target: "oc.supervisor", "No live data yet");
                metrics::record_watchdog_fire(IDLE_BACKUP, "refetched");
            }
            Err(e) => {
                warn!(target: "oc.supervisor", error = %e, "Idle-backup fetch failed");
                metrics::record_watchdog_fire(IDLE_BACKUP, "error");
            }
        }
    }

    #[instrument(skip_all, name = "oc.supervisor.rejoin")]
    async fn run_rejoin_watchdog(self) {
        let mut changes = self.session.subscribe_changes();
        let _ = changes.borrow_and_update();

        debug!(target: "oc.supervisor", "Rejoin watchdog started");

        'armed: loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break 'armed,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break 'armed;
                    }
                    continue 'armed;
                }
                () = tokio::time::sleep(self.settings.rejoin_check) => {}
            }

            self.check_rejoin().await;

            // Fired: stay idle until the store changes again.
            tokio::select! {
                () = self.cancel_token.cancelled() => break 'armed,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break 'armed;
                    }
                }
            }
        }

        debug!(target: "oc.supervisor", "Rejoin watchdog stopped");
    }

    async fn check_rejoin(&self) {
        let snapshot = match self.session.get_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(target: "oc.supervisor", error = %e, "Rejoin check could not read session");
                metrics::record_watchdog_fire(REJOIN, "error");
                return;
            }
        };

        let local_uuid = &self.session.local_user().uuid;
        let Some(outpost_id) = snapshot.outpost_id.as_deref() else {
            return;
        };
        if snapshot.contains_uuid(local_uuid) {
            metrics::record_watchdog_fire(REJOIN, "skipped");
            return;
        }

        info!(
            target: "oc.supervisor",
            outpost_id = %outpost_id,
            "Local participant missing from members, rejoining"
        );
        match self.transport.async_join(outpost_id).await {
            Ok(true) => {
                metrics::record_watchdog_fire(REJOIN, "rejoined");
                self.silent_refetch(outpost_id).await;
            }
            Ok(false) => {
                warn!(target: "oc.supervisor", "Rejoin refused, waiting for next change");
                metrics::record_watchdog_fire(REJOIN, "join_refused");
            }
            Err(e) => {
                warn!(target: "oc.supervisor", error = %e, "Rejoin failed, waiting for next change");
                metrics::record_watchdog_fire(REJOIN, "error");
            }
        }
    }

    async fn silent_refetch(&self, outpost_id: &str) {
        match self.rest.get_latest_live_data(outpost_id).await {
            Ok(Some(live)) => {
                if let Err(e) = self.session.set_all(live.members).await {
                    warn!(target: "oc.supervisor", error = %e, "Refetched snapshot not applied");
                }
            }
            Ok(None) => debug!(target: "oc.supervisor", "No live data after rejoin"),
            Err(e) => warn!(target: "oc.supervisor", error = %e, "Refetch after rejoin failed"),
        }
    }
}
