//! Outpost Live Session Coordinator Library
//!
//! Coordination layer for a live, time-boxed audio session ("outpost"):
//!
//! - Membership reconciliation across REST snapshots, transport deltas and
//!   conference-widget events
//! - Presence and speaking state with time-boxed speaking access
//! - Reconnection supervision (idle-backup and rejoin watchdogs)
//! - Paid cheer/boo reactions that must settle on chain before broadcast
//!
//! # Architecture
//!
//! ```text
//! LiveSessionCoordinator (one per session view)
//! ├── SessionActor (single serialization point for the Membership Store)
//! │   ├── MembershipStore + RaisedHands
//! │   └── PresenceMachine (+ Time-Boxed Access Tracker)
//! ├── ReconnectionSupervisor
//! │   ├── idle-backup watchdog
//! │   └── rejoin watchdog
//! ├── ReactionCoordinator
//! └── widget / transport pump tasks
//! ```
//!
//! # Key Design Decisions
//!
//! - **One mailbox**: every store mutation is a message to the session actor,
//!   so a snapshot replace and a delta can never interleave.
//! - **Server-authoritative time**: `remaining_time` is only overwritten by
//!   server pushes; local interpolation is display-only.
//! - **Fail closed**: a reaction is broadcast only with a transaction hash.
//! - **Collaborators as traits**: REST, transport, widget, chain and dialog
//!   implementations are injected; in-memory mocks live in
//!   [`collaborators::mock`].
//!
//! # Modules
//!
//! - [`actors`] - Session actor (Membership Reconciler)
//! - [`store`] - Membership Store and Raised-Hand Set
//! - [`presence`] - Presence and speaking state machine
//! - [`time_tracker`] - Time-Boxed Access Tracker
//! - [`supervisor`] - Reconnection watchdogs
//! - [`reaction`] - Reaction payment flow
//! - [`coordinator`] - Session context object
//! - [`protocol`] - Wire messages
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types

pub mod actors;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod models;
pub mod observability;
pub mod presence;
pub mod protocol;
pub mod reaction;
pub mod store;
pub mod supervisor;
pub mod time_tracker;

pub use coordinator::{Collaborators, LiveSessionCoordinator};
pub use errors::CoordinatorError;
