//! Metric recording functions.
//!
//! All metrics use the `oc_` prefix, `_total` for counters and `_seconds` for
//! duration histograms.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Membership
// ============================================================================

/// Record one Membership Store mutation.
///
/// Metric: `oc_store_mutations_total`
/// Labels: `kind` (set_all, speaking, remaining_time, time_is_up, presence,
/// recording, upsert, remove, raise_hand)
pub fn record_store_mutation(kind: &'static str) {
    counter!("oc_store_mutations_total", "kind" => kind).increment(1);
}

/// Record an empty snapshot received while the local participant is joined.
///
/// Metric: `oc_snapshot_contradictions_total`
pub fn record_snapshot_contradiction() {
    counter!("oc_snapshot_contradictions_total").increment(1);
}

/// Metric: `oc_members_present`
pub fn set_members_present(count: usize) {
    // usize to f64 conversion is safe for realistic session sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("oc_members_present").set(count as f64);
}

/// Metric: `oc_session_mailbox_depth`
pub fn set_session_mailbox_depth(depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("oc_session_mailbox_depth").set(depth as f64);
}

// ============================================================================
// Reconnection
// ============================================================================

/// Record a watchdog firing.
///
/// Metric: `oc_watchdog_fires_total`
/// Labels: `watchdog` (idle_backup, rejoin), `action` (refetched, skipped,
/// rejoined, join_refused, error)
///
/// Cardinality: 10
pub fn record_watchdog_fire(watchdog: &'static str, action: &'static str) {
    counter!(
        "oc_watchdog_fires_total",
        "watchdog" => watchdog,
        "action" => action
    )
    .increment(1);
}

// ============================================================================
// Reactions
// ============================================================================

/// Record a reaction attempt and its outcome.
///
/// Metric: `oc_reactions_total`
/// Labels: `kind` (cheer, boo, like, dislike), `outcome` (sent, cancelled,
/// rejected, session_emptied, payment_failed, error)
///
/// Cardinality: 24
pub fn record_reaction(kind: &'static str, outcome: &'static str) {
    counter!("oc_reactions_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Metric: `oc_reaction_duration_seconds`
/// Labels: `kind`
pub fn record_reaction_duration(kind: &'static str, duration: Duration) {
    histogram!("oc_reaction_duration_seconds", "kind" => kind).record(duration.as_secs_f64());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        entries: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
        labels: &[(&str, &str)],
    ) -> Option<u64> {
        entries.iter().find_map(|(key, _, _, value)| {
            let key = key.key();
            let matches = key.name() == name
                && labels
                    .iter()
                    .all(|(k, v)| key.labels().any(|l| l.key() == *k && l.value() == *v));
            match value {
                DebugValue::Counter(n) if matches => Some(*n),
                _ => None,
            }
        })
    }

    #[test]
    fn test_store_and_watchdog_counters() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_store_mutation("set_all");
            record_store_mutation("set_all");
            record_store_mutation("speaking");
            record_watchdog_fire("rejoin", "rejoined");
            record_snapshot_contradiction();
        });

        let entries = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&entries, "oc_store_mutations_total", &[("kind", "set_all")]),
            Some(2)
        );
        assert_eq!(
            counter_value(&entries, "oc_store_mutations_total", &[("kind", "speaking")]),
            Some(1)
        );
        assert_eq!(
            counter_value(
                &entries,
                "oc_watchdog_fires_total",
                &[("watchdog", "rejoin"), ("action", "rejoined")]
            ),
            Some(1)
        );
        assert_eq!(
            counter_value(&entries, "oc_snapshot_contradictions_total", &[]),
            Some(1)
        );
    }

    #[test]
    fn test_reaction_metrics_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_reaction("cheer", "sent");
            record_reaction("boo", "payment_failed");
            record_reaction_duration("cheer", Duration::from_millis(250));
            set_members_present(3);
            set_session_mailbox_depth(0);
        });

        let entries = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(
                &entries,
                "oc_reactions_total",
                &[("kind", "boo"), ("outcome", "payment_failed")]
            ),
            Some(1)
        );
        assert!(entries.iter().any(|(key, _, _, value)| {
            key.key().name() == "oc_members_present"
                && matches!(value, DebugValue::Gauge(v) if v.into_inner() == 3.0)
        }));
        assert!(entries
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "oc_reaction_duration_seconds"));
    }
}
