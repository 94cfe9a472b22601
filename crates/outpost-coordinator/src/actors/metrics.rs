//! Session actor mailbox monitoring.
//!
//! | Level | Depth |
//! |-------|-------|
//! | Normal | < 100 |
//! | Warning | 100-500 |
//! | Critical | > 500 |

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::observability::metrics;

pub const SESSION_MAILBOX_NORMAL: usize = 100;
pub const SESSION_MAILBOX_WARNING: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Tracks the session actor's backlog.
///
/// Shared between the handle (enqueue) and the actor (dequeue).
#[derive(Debug, Default)]
pub struct MailboxMonitor {
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);
        metrics::set_session_mailbox_depth(new_depth);

        match Self::level_for_depth(new_depth) {
            MailboxLevel::Critical => warn!(
                target: "oc.actor.mailbox",
                depth = new_depth,
                threshold = SESSION_MAILBOX_WARNING,
                "Session mailbox depth critical"
            ),
            MailboxLevel::Warning if new_depth == SESSION_MAILBOX_NORMAL + 1 => debug!(
                target: "oc.actor.mailbox",
                depth = new_depth,
                "Session mailbox depth elevated"
            ),
            _ => {}
        }
    }

    pub fn record_dequeue(&self) {
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)))
            .unwrap_or(0);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        metrics::set_session_mailbox_depth(previous.saturating_sub(1));
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        Self::level_for_depth(self.current_depth())
    }

    fn level_for_depth(depth: usize) -> MailboxLevel {
        if depth > SESSION_MAILBOX_WARNING {
            MailboxLevel::Critical
        } else if depth > SESSION_MAILBOX_NORMAL {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}
