//! Actor owning the live session state.
//!
//! One `SessionActor` per session context. Its mailbox is the single
//! serialization point for Membership Store mutations; everything else (the
//! watchdogs, the reaction flow, the listener tasks) talks to it through a
//! cloneable [`SessionActorHandle`].

pub mod messages;
pub mod metrics;
pub mod session;

pub use messages::{LeaveReason, SessionMessage, SessionSnapshot, SetAllOutcome};
pub use metrics::{MailboxLevel, MailboxMonitor};
pub use session::{SessionActor, SessionActorHandle, SESSION_CHANNEL_BUFFER};
