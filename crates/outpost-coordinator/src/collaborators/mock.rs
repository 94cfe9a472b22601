//! In-memory collaborators for tests.
//!
//! Each mock records the calls it receives and returns scripted responses.
//! Recording uses `std::sync::Mutex` because several trait methods are
//! synchronous; poisoned locks are recovered rather than unwrapped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::mpsc;

use super::{
    ChainClient, CheerBooRequest, ConferenceWidget, ConfirmationDialog, DialogRequest,
    DialogResult, ListenerId, RestClient, Transport,
};
use crate::errors::CoordinatorError;
use crate::models::{LiveData, LiveMember, Outpost};
use crate::presence::WidgetEvent;
use crate::protocol::{IncomingMessage, MessageType, OutgoingMessage};

const MOCK_CHANNEL_BUFFER: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// REST
// ----------------------------------------------------------------------------

/// Mock REST client.
///
/// Live-data responses are served from a queue; once it is drained the
/// fallback response is returned on every call.
#[derive(Debug, Default)]
pub struct MockRestClient {
    outposts: Mutex<HashMap<String, Outpost>>,
    live_data_queue: Mutex<VecDeque<Result<Option<LiveData>, String>>>,
    live_data_fallback: Mutex<Option<LiveData>>,
    outpost_calls: AtomicUsize,
    live_data_calls: AtomicUsize,
    live_data_requests: Mutex<Vec<String>>,
}

impl MockRestClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `members` on every live-data call.
    #[must_use]
    pub fn with_members(members: Vec<LiveMember>) -> Self {
        let mock = Self::new();
        mock.set_members(members);
        mock
    }

    #[must_use]
    pub fn with_outpost(self, outpost: Outpost) -> Self {
        lock(&self.outposts).insert(outpost.uuid.clone(), outpost);
        self
    }

    /// Replace the fallback live-data response.
    pub fn set_members(&self, members: Vec<LiveMember>) {
        *lock(&self.live_data_fallback) = Some(LiveData { members });
    }

    /// Make the fallback response "no live data".
    pub fn clear_live_data(&self) {
        *lock(&self.live_data_fallback) = None;
    }

    /// Queue a one-shot live-data response.
    pub fn push_live_data(&self, response: Option<LiveData>) {
        lock(&self.live_data_queue).push_back(Ok(response));
    }

    /// Queue a one-shot failure.
    pub fn push_failure(&self, reason: &str) {
        lock(&self.live_data_queue).push_back(Err(reason.to_string()));
    }

    /// Outpost ids of every live-data call, in call order.
    #[must_use]
    pub fn live_data_requests(&self) -> Vec<String> {
        lock(&self.live_data_requests).clone()
    }

    #[must_use]
    pub fn live_data_calls(&self) -> usize {
        self.live_data_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn outpost_calls(&self) -> usize {
        self.outpost_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestClient for MockRestClient {
    async fn get_outpost(&self, outpost_id: &str) -> Result<Option<Outpost>, CoordinatorError> {
        self.outpost_calls.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.outposts).get(outpost_id).cloned())
    }

    async fn get_latest_live_data(
        &self,
        outpost_id: &str,
    ) -> Result<Option<LiveData>, CoordinatorError> {
        self.live_data_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.live_data_requests).push(outpost_id.to_string());
        if let Some(queued) = lock(&self.live_data_queue).pop_front() {
            return queued.map_err(CoordinatorError::Rest);
        }
        Ok(lock(&self.live_data_fallback).clone())
    }
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Mock real-time transport.
#[derive(Debug)]
pub struct MockTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    healthy: AtomicBool,
    join_accepts: AtomicBool,
    join_calls: AtomicUsize,
    connected_url: Mutex<Option<String>>,
    incoming: Mutex<Option<mpsc::Sender<IncomingMessage>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            healthy: AtomicBool::new(true),
            join_accepts: AtomicBool::new(true),
            join_calls: AtomicUsize::new(0),
            connected_url: Mutex::new(None),
            incoming: Mutex::new(None),
        }
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_join_accepts(&self, accepts: bool) {
        self.join_accepts.store(accepts, Ordering::SeqCst);
    }

    #[must_use]
    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }

    /// Sent messages of one type.
    #[must_use]
    pub fn sent_of(&self, message_type: MessageType) -> Vec<OutgoingMessage> {
        lock(&self.sent)
            .iter()
            .filter(|m| m.message_type == message_type)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn connected_url(&self) -> Option<String> {
        lock(&self.connected_url).clone()
    }

    /// Push a delta to the current subscriber. Returns `false` if none.
    pub async fn push(&self, message: IncomingMessage) -> bool {
        let sender = lock(&self.incoming).clone();
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _token: &SecretString, url: &str) -> Result<(), CoordinatorError> {
        *lock(&self.connected_url) = Some(url.to_string());
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), CoordinatorError> {
        lock(&self.sent).push(message);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, CoordinatorError> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    async fn async_join(&self, _outpost_id: &str) -> Result<bool, CoordinatorError> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.join_accepts.load(Ordering::SeqCst))
    }

    fn subscribe(&self) -> mpsc::Receiver<IncomingMessage> {
        let (tx, rx) = mpsc::channel(MOCK_CHANNEL_BUFFER);
        *lock(&self.incoming) = Some(tx);
        rx
    }
}

// ----------------------------------------------------------------------------
// Widget
// ----------------------------------------------------------------------------

/// Mock conference widget.
#[derive(Debug, Default)]
pub struct MockWidget {
    listeners: Mutex<HashMap<ListenerId, mpsc::Sender<WidgetEvent>>>,
    next_id: AtomicU64,
    commands: Mutex<Vec<String>>,
    torn_down: AtomicBool,
}

impl MockWidget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event to every registered listener.
    pub async fn emit(&self, event: WidgetEvent) {
        let senders: Vec<_> = lock(&self.listeners).values().cloned().collect();
        for sender in senders {
            let _ = sender.send(event.clone()).await;
        }
    }

    /// Simulate the widget being destroyed underneath its listeners.
    pub fn tear_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        lock(&self.listeners).clear();
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }
}

#[async_trait]
impl ConferenceWidget for MockWidget {
    fn add_listener(&self) -> (ListenerId, mpsc::Receiver<WidgetEvent>) {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(MOCK_CHANNEL_BUFFER);
        lock(&self.listeners).insert(id, tx);
        (id, rx)
    }

    fn remove_listener(&self, id: ListenerId) -> Result<(), CoordinatorError> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(CoordinatorError::Widget("widget already disposed".to_string()));
        }
        lock(&self.listeners).remove(&id);
        Ok(())
    }

    async fn execute_command(
        &self,
        name: &str,
        _args: &[serde_json::Value],
    ) -> Result<(), CoordinatorError> {
        lock(&self.commands).push(name.to_string());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Chain
// ----------------------------------------------------------------------------

/// Mock blockchain client.
#[derive(Debug)]
pub struct MockChainClient {
    response: Mutex<Result<(bool, Option<String>), String>>,
    requests: Mutex<Vec<CheerBooRequest>>,
}

impl MockChainClient {
    /// Always succeeds with `tx_hash`.
    #[must_use]
    pub fn succeeding(tx_hash: &str) -> Self {
        Self {
            response: Mutex::new(Ok((true, Some(tx_hash.to_string())))),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `(false, None)`.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            response: Mutex::new(Ok((false, None))),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always throws.
    #[must_use]
    pub fn throwing(reason: &str) -> Self {
        Self {
            response: Mutex::new(Err(reason.to_string())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Return a custom pair.
    #[must_use]
    pub fn returning(succeeded: bool, tx_hash: Option<&str>) -> Self {
        Self {
            response: Mutex::new(Ok((succeeded, tx_hash.map(str::to_string)))),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<CheerBooRequest> {
        lock(&self.requests).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn cheer_boo(
        &self,
        request: CheerBooRequest,
    ) -> Result<(bool, Option<String>), CoordinatorError> {
        lock(&self.requests).push(request);
        lock(&self.response).clone().map_err(CoordinatorError::Chain)
    }
}

// ----------------------------------------------------------------------------
// Dialog
// ----------------------------------------------------------------------------

/// Mock amount-entry dialog.
#[derive(Debug)]
pub struct MockDialog {
    result: Mutex<DialogResult>,
    prompts: Mutex<Vec<DialogRequest>>,
}

impl MockDialog {
    /// User confirms and types `amount`.
    #[must_use]
    pub fn entering(amount: &str) -> Self {
        Self {
            result: Mutex::new(DialogResult {
                confirmed: true,
                entered_text: Some(amount.to_string()),
            }),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// User dismisses the dialog.
    #[must_use]
    pub fn cancelling() -> Self {
        Self {
            result: Mutex::new(DialogResult::default()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn prompt_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl ConfirmationDialog for MockDialog {
    async fn confirm(&self, request: DialogRequest) -> Result<DialogResult, CoordinatorError> {
        lock(&self.prompts).push(request);
        Ok(lock(&self.result).clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rest_queue_then_fallback() {
        let rest = MockRestClient::with_members(Vec::new());
        rest.push_failure("boom");
        rest.push_live_data(None);

        assert!(rest.get_latest_live_data("o-1").await.is_err());
        assert_eq!(rest.get_latest_live_data("o-1").await.unwrap(), None);
        assert_eq!(
            rest.get_latest_live_data("o-1").await.unwrap(),
            Some(LiveData::default())
        );
        assert_eq!(rest.live_data_calls(), 3);
        assert_eq!(rest.live_data_requests(), vec!["o-1", "o-1", "o-1"]);
    }

    #[tokio::test]
    async fn test_widget_remove_after_teardown_errors() {
        let widget = MockWidget::new();
        let (id, _rx) = widget.add_listener();
        assert_eq!(widget.listener_count(), 1);

        widget.tear_down();
        assert!(widget.remove_listener(id).is_err());
    }

    #[tokio::test]
    async fn test_transport_push_reaches_subscriber() {
        let transport = MockTransport::new();
        assert!(
            !transport
                .push(IncomingMessage::UserLeft(crate::protocol::AddressPayload {
                    address: "0xa".to_string(),
                }))
                .await
        );

        let mut rx = transport.subscribe();
        assert!(
            transport
                .push(IncomingMessage::UserLeft(crate::protocol::AddressPayload {
                    address: "0xa".to_string(),
                }))
                .await
        );
        assert!(rx.recv().await.is_some());
    }
}
