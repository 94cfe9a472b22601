//! External collaborators consumed by the coordinator.
//!
//! Only the contracts live here; concrete REST, WebSocket, widget, wallet and
//! dialog implementations belong to the embedding application. In-memory
//! implementations for tests are in [`mock`].
//!
//! Every call is a suspension point: the coordinator never holds store state
//! across one.

pub mod mock;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;

use crate::errors::CoordinatorError;
use crate::models::{LiveData, Outpost};
use crate::presence::WidgetEvent;
use crate::protocol::{IncomingMessage, OutgoingMessage};

/// REST API client.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// `None` when the outpost does not exist.
    async fn get_outpost(&self, outpost_id: &str) -> Result<Option<Outpost>, CoordinatorError>;

    /// `None` when the outpost has no live session anymore.
    async fn get_latest_live_data(
        &self,
        outpost_id: &str,
    ) -> Result<Option<LiveData>, CoordinatorError>;
}

/// Real-time transport (WebSocket).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, token: &SecretString, url: &str) -> Result<(), CoordinatorError>;

    async fn send(&self, message: OutgoingMessage) -> Result<(), CoordinatorError>;

    async fn health_check(&self) -> Result<bool, CoordinatorError>;

    /// Join handshake. `Ok(false)` means the server refused.
    async fn async_join(&self, outpost_id: &str) -> Result<bool, CoordinatorError>;

    /// Stream of deltas, in delivery order.
    fn subscribe(&self) -> mpsc::Receiver<IncomingMessage>;
}

/// Registration handle returned by [`ConferenceWidget::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Third-party conference widget.
#[async_trait]
pub trait ConferenceWidget: Send + Sync {
    fn add_listener(&self) -> (ListenerId, mpsc::Receiver<WidgetEvent>);

    /// May fail if the widget has already been torn down.
    fn remove_listener(&self, id: ListenerId) -> Result<(), CoordinatorError>;

    async fn execute_command(
        &self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<(), CoordinatorError>;
}

/// Arguments of the reaction payment call.
#[derive(Debug, Clone, PartialEq)]
pub struct CheerBooRequest {
    pub target: String,
    pub receiver_addresses: Vec<String>,
    pub amount: f64,
    pub cheer: bool,
    pub outpost_id: String,
}

/// Blockchain collaborator.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Returns `(succeeded, tx_hash)`. A returned error means the call threw.
    async fn cheer_boo(
        &self,
        request: CheerBooRequest,
    ) -> Result<(bool, Option<String>), CoordinatorError>;
}

/// Amount-entry prompt shown before a paid reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub title: String,
    pub content: String,
    pub action_text: String,
    pub input_placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DialogResult {
    pub confirmed: bool,
    pub entered_text: Option<String>,
}

/// Confirmation / amount-entry dialog.
#[async_trait]
pub trait ConfirmationDialog: Send + Sync {
    async fn confirm(&self, request: DialogRequest) -> Result<DialogResult, CoordinatorError>;
}
