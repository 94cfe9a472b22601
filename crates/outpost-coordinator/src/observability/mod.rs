//! Observability for the session coordinator.
//!
//! Logging goes through `tracing` with explicit `oc.*` targets. Metrics go
//! through the `metrics` facade; installing a recorder/exporter is left to the
//! embedding application.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `oc_store_mutations_total` | Counter | `kind` | Membership Store mutations |
//! | `oc_snapshot_contradictions_total` | Counter | none | Empty snapshots received while joined |
//! | `oc_members_present` | Gauge | none | Members currently present |
//! | `oc_session_mailbox_depth` | Gauge | none | Session actor backlog |
//! | `oc_watchdog_fires_total` | Counter | `watchdog`, `action` | Watchdog firings and what they did |
//! | `oc_reactions_total` | Counter | `kind`, `outcome` | Reaction attempts |
//! | `oc_reaction_duration_seconds` | Histogram | `kind` | End-to-end reaction latency |
//!
//! Labels are bounded by code; addresses and outpost ids never appear as
//! label values.

pub mod metrics;
