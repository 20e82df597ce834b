//! Deploywatch - deployment readiness and process supervision.
//!
//! This crate answers the questions an agent asks around a deployment: did the
//! service I launched come up, which processes belong to it, what is it writing
//! to its logs, and has the remote deployment reached the topology it planned.
//!
//! # Modules
//!
//! - [`process`] - Process locators: process-tree heuristic and external script
//! - [`liveness`] - Port, HTTP and log-file liveness detectors
//! - [`tail`] - Rolling file readers and directory tailing
//! - [`latch`] - Poll-until-done with timeout
//! - [`admin`] - Remote admin API client
//! - [`topology`] - Install/uninstall waits over the admin API
//! - [`startup`] - Launch sequence and start detection
//! - [`config`] - Configuration loading from TOML files
//! - [`cli`] - The `deploywatch` command line
//! - [`error`] - Error types for the crate
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use deploywatch::latch::{poll_fn, PollLatch};
//!
//! # async fn run() -> deploywatch::error::Result<()> {
//! let mut attempts = 0;
//! PollLatch::new(Duration::from_secs(5))
//!     .interval(Duration::from_millis(100))
//!     .wait_for(&mut poll_fn(move || {
//!         attempts += 1;
//!         async move { Ok::<_, deploywatch::error::Error>(attempts >= 3) }
//!     }))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod latch;
pub mod liveness;
pub mod process;
pub mod startup;
pub mod tail;
pub mod topology;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
