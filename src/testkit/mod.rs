//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`admin`]: `ScriptedAdminClient`, a snapshot-replaying
//!   [`AdminClient`](crate::admin::AdminClient), and `RecordingReporter`.
//! - [`process`]: `ProcessTable`, an in-memory
//!   [`ProcessInfoProvider`](crate::process::ProcessInfoProvider).

pub mod admin;
pub mod process;
