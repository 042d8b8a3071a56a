//! Cash-out transaction engine for crypto ATMs.
//!
//! Tracks every cash-out from first device report to physical dispense:
//! deposit address provisioning, a monotonic status ladder driven by
//! funding-side observations, bill allocation against live cassette
//! inventory, customer notification, and an append-only audit trail.
//!
//! # Modules
//!
//! - [`cashout`] - The transaction core: lifecycle engine, store, sweeps
//! - [`config`] - YAML application configuration
//! - [`db`] - Connection pool and schema setup
//! - [`logging`] - tracing subscriber initialization

pub mod cashout;
pub mod config;
pub mod db;
pub mod logging;

pub use cashout::{
    CashOutError, CashOutStatus, CashOutTx, ChangeMaker, Integration, IntegrationMap,
    LifecycleEngine, MonitorSweeps,
};
pub use config::{AppConfig, CashOutConfig};
pub use db::Database;
