//! Test utilities for the Outpost Live Session Coordinator
//!
//! Provides:
//! - Fixtures for members, outposts, the local user and configuration
//! - [`Harness`], a coordinator wired to the in-memory collaborators from
//!   `outpost_coordinator::collaborators::mock`
//!
//! # Usage
//!
//! ```rust,ignore
//! use oc_test_utils::{Harness, TestMember, OUTPOST_ID};
//!
//! let mut harness = Harness::builder()
//!     .members(vec![TestMember::new("alice").build()])
//!     .build();
//! harness.coordinator.enter(OUTPOST_ID).await?;
//!
//! let snapshot = harness.coordinator.snapshot().await?;
//! assert_eq!(snapshot.member_count(), 1);
//! ```

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
