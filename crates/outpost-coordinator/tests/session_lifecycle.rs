//! Integration tests for the session context.
//!
//! Drives a `LiveSessionCoordinator` through its collaborators:
//! - enter/teardown and listener attachment
//! - transport and widget events pumped into the session actor
//! - the rejoin watchdog recovering a dropped local participant

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use oc_test_utils::{settle, test_local_user, test_outpost, Harness, TestMember, OUTPOST_ID};
use outpost_coordinator::presence::{WidgetEvent, WIDGET_HANGUP, WIDGET_TOGGLE_AUDIO};
use outpost_coordinator::protocol::{AddressPayload, IncomingMessage, MessageType};
use outpost_coordinator::CoordinatorError;

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

fn me() -> TestMember {
    TestMember::new("me")
}

// ============================================================================
// Enter / teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_enter_loads_outpost_and_snapshot() {
    let mut harness = Harness::builder()
        .members(vec![me().build(), TestMember::new("alice").build()])
        .build();

    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    settle().await;

    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.outpost_id.as_deref(), Some(OUTPOST_ID));
    assert_eq!(
        snapshot.outpost.as_ref().map(|o| o.name.as_str()),
        Some("Test Outpost")
    );
    assert_eq!(snapshot.member_count(), 2);
    assert!(snapshot.member("0xalice").is_some());
    assert!(!snapshot.joined);

    assert_eq!(
        harness.transport.connected_url().as_deref(),
        Some("wss://ws.example.test")
    );
    assert_eq!(harness.widget.listener_count(), 1);
    assert_eq!(harness.rest.outpost_calls(), 1);

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_enter_unknown_outpost_fails() {
    let mut harness = Harness::builder().build();

    let result = harness.coordinator.enter("no-such-outpost").await;
    assert!(matches!(result, Err(CoordinatorError::SessionUnknown)));

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_enter_without_live_data_leaves_store_empty() {
    let mut harness = Harness::builder().build();
    harness.rest.clear_live_data();

    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.member_count(), 0);
    assert_eq!(harness.widget.listener_count(), 1);

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reenter_connects_transport_once() {
    let mut harness = Harness::builder().members(vec![me().build()]).build();

    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    assert_eq!(harness.widget.listener_count(), 1);
    assert_eq!(harness.rest.outpost_calls(), 2);

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_teardown_leaves_exactly_once() {
    let mut harness = Harness::builder().members(vec![me().build()]).build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    harness.widget.emit(WidgetEvent::VideoConferenceJoined).await;
    settle().await;

    harness.coordinator.teardown().await;

    assert_eq!(harness.transport.sent_of(MessageType::Join).len(), 1);
    assert_eq!(harness.transport.sent_of(MessageType::Leave).len(), 1);
    assert!(harness.widget.commands().iter().any(|c| c == WIDGET_HANGUP));
    assert_eq!(harness.widget.listener_count(), 0);
    assert!(harness.coordinator.session().is_cancelled());
    assert!(harness.coordinator.supervisor().is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_tolerates_disposed_widget() {
    let mut harness = Harness::builder().members(vec![me().build()]).build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    harness.widget.tear_down();
    harness.coordinator.teardown().await;

    assert!(harness.coordinator.session().is_cancelled());
    assert!(harness.transport.sent_of(MessageType::Leave).is_empty());
}

// ============================================================================
// Event pumping
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transport_deltas_reach_the_store() {
    let mut harness = Harness::builder().members(vec![me().build()]).build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    let bob = TestMember::new("bob").build();
    assert!(harness.transport.push(IncomingMessage::UserJoined(bob)).await);
    assert!(
        harness
            .transport
            .push(IncomingMessage::UserStartedSpeaking(AddressPayload {
                address: "0xbob".to_string(),
            }))
            .await
    );
    settle().await;

    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.member_count(), 2);
    assert!(snapshot.member("0xbob").unwrap().is_speaking);

    assert!(
        harness
            .transport
            .push(IncomingMessage::UserLeft(AddressPayload {
                address: "0xbob".to_string(),
            }))
            .await
    );
    settle().await;

    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert!(snapshot.member("0xbob").is_none());

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_widget_mute_events_drive_speaking_state() {
    let mut harness = Harness::builder().members(vec![me().build()]).build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    harness.widget.emit(WidgetEvent::VideoConferenceJoined).await;
    // The widget reports its initial mute state right after joining.
    harness
        .widget
        .emit(WidgetEvent::AudioMuteStatusChanged { muted: false })
        .await;
    settle().await;
    assert!(harness
        .transport
        .sent_of(MessageType::StartSpeaking)
        .is_empty());

    harness
        .widget
        .emit(WidgetEvent::AudioMuteStatusChanged { muted: false })
        .await;
    settle().await;

    assert_eq!(harness.transport.sent_of(MessageType::StartSpeaking).len(), 1);
    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert!(snapshot.joined);
    assert!(snapshot.member("0xme").unwrap().is_speaking);

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_member_is_muted_by_widget() {
    let mut harness = Harness::builder()
        .members(vec![me().remaining_time(0).build()])
        .build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    harness.widget.emit(WidgetEvent::VideoConferenceJoined).await;
    harness
        .widget
        .emit(WidgetEvent::AudioMuteStatusChanged { muted: true })
        .await;
    harness
        .widget
        .emit(WidgetEvent::AudioMuteStatusChanged { muted: false })
        .await;
    settle().await;

    assert!(harness
        .transport
        .sent_of(MessageType::StartSpeaking)
        .is_empty());
    assert!(harness
        .widget
        .commands()
        .iter()
        .any(|c| c == WIDGET_TOGGLE_AUDIO));

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_raised_hands_follow_widget() {
    let mut harness = Harness::builder()
        .members(vec![me().build(), TestMember::new("alice").build()])
        .build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();

    harness
        .widget
        .emit(WidgetEvent::RaiseHandUpdated {
            id: "0xalice".to_string(),
            hand_raised: true,
        })
        .await;
    settle().await;
    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert_eq!(snapshot.raised_hands.len(), 1);

    harness
        .widget
        .emit(WidgetEvent::ParticipantLeft {
            id: "0xalice".to_string(),
        })
        .await;
    settle().await;
    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert!(snapshot.raised_hands.is_empty());
    assert!(!snapshot.member("0xalice").unwrap().is_present);

    harness.coordinator.teardown().await;
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rejoins_after_local_participant_dropped() {
    let mut harness = Harness::builder()
        .local_user(test_local_user("me"))
        .members(vec![me().build(), TestMember::new("alice").build()])
        .build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    harness.widget.emit(WidgetEvent::VideoConferenceJoined).await;
    settle().await;

    assert!(
        harness
            .transport
            .push(IncomingMessage::UserLeft(AddressPayload {
                address: "0xme".to_string(),
            }))
            .await
    );
    settle().await;
    assert!(!harness
        .coordinator
        .snapshot()
        .await
        .unwrap()
        .contains_uuid("u-me"));

    advance(Duration::from_secs(6)).await;

    assert_eq!(harness.transport.join_calls(), 1);
    assert!(harness
        .coordinator
        .snapshot()
        .await
        .unwrap()
        .contains_uuid("u-me"));

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_backup_recovers_missed_snapshot() {
    let mut harness = Harness::builder()
        .members(vec![TestMember::new("alice").build()])
        .build();
    harness.rest.push_failure("gateway timeout");
    // Keep the rejoin path from refetching first.
    harness.transport.set_join_accepts(false);

    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    assert_eq!(harness.coordinator.snapshot().await.unwrap().member_count(), 0);

    advance(Duration::from_secs(31)).await;

    assert_eq!(harness.transport.join_calls(), 1);
    assert_eq!(harness.coordinator.snapshot().await.unwrap().member_count(), 1);
    assert_eq!(harness.rest.live_data_calls(), 2);

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_switching_session_cancels_idle_backup() {
    let mut second = test_outpost();
    second.uuid = "outpost-2".to_string();
    let mut harness = Harness::builder().outpost(second).build();
    harness.rest.clear_live_data();
    harness.transport.set_join_accepts(false);

    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    advance(Duration::from_secs(10)).await;
    harness.coordinator.enter("outpost-2").await.unwrap();

    // Past the first session's deadline, short of the second's.
    advance(Duration::from_secs(25)).await;
    assert_eq!(harness.rest.live_data_requests(), vec![OUTPOST_ID, "outpost-2"]);

    advance(Duration::from_secs(10)).await;
    assert_eq!(
        harness.rest.live_data_requests(),
        vec![OUTPOST_ID, "outpost-2", "outpost-2"]
    );
    assert_eq!(
        harness.coordinator.snapshot().await.unwrap().outpost_id.as_deref(),
        Some("outpost-2")
    );

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejoins_before_widget_reports_join() {
    let mut harness = Harness::builder()
        .members(vec![TestMember::new("alice").build()])
        .build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    harness.rest.set_members(vec![me().build(), TestMember::new("alice").build()]);
    settle().await;

    advance(Duration::from_secs(6)).await;

    assert_eq!(harness.transport.join_calls(), 1);
    let snapshot = harness.coordinator.snapshot().await.unwrap();
    assert!(!snapshot.joined);
    assert!(snapshot.contains_uuid("u-me"));

    harness.coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_voluntary_leave_is_not_rejoined() {
    let mut harness = Harness::builder()
        .members(vec![me().build(), TestMember::new("alice").build()])
        .build();
    harness.coordinator.enter(OUTPOST_ID).await.unwrap();
    harness.widget.emit(WidgetEvent::VideoConferenceJoined).await;
    settle().await;

    assert!(harness.coordinator.leave().await.unwrap());
    settle().await;
    advance(Duration::from_secs(60)).await;

    assert_eq!(harness.transport.join_calls(), 0);
    assert_eq!(harness.transport.sent_of(MessageType::Leave).len(), 1);
    assert_eq!(harness.coordinator.snapshot().await.unwrap().outpost_id, None);

    harness.coordinator.teardown().await;
}
