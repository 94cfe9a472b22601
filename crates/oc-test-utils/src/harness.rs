//! A coordinator wired to in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use outpost_coordinator::collaborators::mock::{
    MockChainClient, MockDialog, MockRestClient, MockTransport, MockWidget,
};
use outpost_coordinator::config::Config;
use outpost_coordinator::models::{LiveMember, LocalUser, Outpost};
use outpost_coordinator::{Collaborators, LiveSessionCoordinator};

use crate::fixtures::{test_config, test_local_user, test_outpost};

/// Coordinator under test plus the mocks behind it.
pub struct Harness {
    pub coordinator: LiveSessionCoordinator,
    pub rest: Arc<MockRestClient>,
    pub transport: Arc<MockTransport>,
    pub widget: Arc<MockWidget>,
    pub chain: Arc<MockChainClient>,
    pub dialog: Arc<MockDialog>,
}

impl Harness {
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

/// Builder for [`Harness`].
///
/// Defaults: local user `me`, the fixture outpost, no live members, a chain
/// that succeeds with `0xtx`, and a dialog that enters `1`.
pub struct HarnessBuilder {
    config: Config,
    local_user: LocalUser,
    members: Vec<LiveMember>,
    outposts: Vec<Outpost>,
    chain: MockChainClient,
    dialog: MockDialog,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: test_config(),
            local_user: test_local_user("me"),
            members: Vec::new(),
            outposts: vec![test_outpost()],
            chain: MockChainClient::succeeding("0xtx"),
            dialog: MockDialog::entering("1"),
        }
    }
}

impl HarnessBuilder {
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn local_user(mut self, local_user: LocalUser) -> Self {
        self.local_user = local_user;
        self
    }

    /// Members served by every live-data fetch.
    #[must_use]
    pub fn members(mut self, members: Vec<LiveMember>) -> Self {
        self.members = members;
        self
    }

    /// Make another outpost known to the REST mock.
    #[must_use]
    pub fn outpost(mut self, outpost: Outpost) -> Self {
        self.outposts.push(outpost);
        self
    }

    #[must_use]
    pub fn chain(mut self, chain: MockChainClient) -> Self {
        self.chain = chain;
        self
    }

    #[must_use]
    pub fn dialog(mut self, dialog: MockDialog) -> Self {
        self.dialog = dialog;
        self
    }

    /// Spawn the coordinator. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> Harness {
        let rest = self
            .outposts
            .into_iter()
            .fold(MockRestClient::with_members(self.members), MockRestClient::with_outpost);
        let rest = Arc::new(rest);
        let transport = Arc::new(MockTransport::new());
        let widget = Arc::new(MockWidget::new());
        let chain = Arc::new(self.chain);
        let dialog = Arc::new(self.dialog);

        let collaborators = Collaborators {
            rest: rest.clone(),
            transport: transport.clone(),
            widget: widget.clone(),
            chain: chain.clone(),
            dialog: dialog.clone(),
        };
        let coordinator = LiveSessionCoordinator::new(self.config, self.local_user, collaborators);

        Harness {
            coordinator,
            rest,
            transport,
            widget,
            chain,
            dialog,
        }
    }
}

/// Let spawned tasks run until they are idle.
///
/// Works under `start_paused = true`: the sleep auto-advances once every
/// task is blocked.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
