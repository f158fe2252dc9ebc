//! # Cadence Core
//!
//! A recurring-task materialization engine: operators define recurring
//! templates (daily, weekly, biweekly, monthly, quarterly, yearly, weekdays)
//! and the engine materializes concrete task instances into user-facing
//! lists across a long horizon, while permitting per-occurrence edits and
//! deletions that survive template changes.
//!
//! ## Core modules
//!
//! - [`pattern`]: pure occurrence calculation for each recurrence kind.
//! - [`generator`]: builds task instances from a template, filtered by
//!   exceptions.
//! - [`models`]: templates, items, exceptions, jobs, dead-letter rows, leases.
//! - [`storage`]: the abstract storage contract and a SQLite implementation.
//! - [`services`]: template and item orchestration (create/update/delete).
//! - [`coordinator`]: the generation job queue (claim, heartbeat, complete,
//!   fail, dead-letter, exclusive-run lease).
//! - [`worker`]: the concurrent generation worker pool.
//! - [`reconciliation`]: the safety-net controller loop and on-demand top-up.
//! - [`scheduler`]: the periodic loop that enqueues generation jobs.
//! - [`retry`]: error classification and backoff math.
//! - [`config`]: operational knobs.
//! - [`clock`]: a testable source of "now".
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cadence_core::{
//!     clock::SystemClock, config::EngineConfig, db, services::TemplateService,
//!     storage::sqlite::SqliteStorage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("cadence.db").await?;
//!     let storage = Arc::new(SqliteStorage::new(pool));
//!     let service = TemplateService::new(storage, Arc::new(SystemClock), EngineConfig::default());
//!     let _ = service;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod generator;
pub mod models;
pub mod pattern;
pub mod query;
pub mod reconciliation;
pub mod retry;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod timezone;
pub mod worker;

pub use error::CoreError;
