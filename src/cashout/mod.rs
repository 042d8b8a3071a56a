//! Cash-out transaction core.
//!
//! A cash-out starts when a device reports a new transaction id, gets a
//! deposit address provisioned, advances through a monotonic status
//! ladder as the funding side is observed, has bills allocated when the
//! customer asks for their cash, and ends with a confirmed physical
//! dispense. Every state change flows through [`engine::LifecycleEngine`]
//! and leaves a row in the append-only action log.

pub mod audit;
pub mod cancel;
pub mod dispense;
pub mod engine;
pub mod error;
pub mod events;
pub mod integration;
pub mod monitor;
pub mod patch;
pub mod status;
pub mod store;
pub mod types;

pub use audit::AuditAction;
pub use cancel::cancel;
pub use dispense::{BillPlan, ChangeMaker};
pub use engine::LifecycleEngine;
pub use error::{CashOutError, INSUFFICIENT_FUNDS_CODE};
pub use events::TransitionEvent;
pub use integration::{Integration, IntegrationDirectory, IntegrationMap, MockIntegration};
pub use monitor::MonitorSweeps;
pub use patch::TxPatch;
pub use status::CashOutStatus;
pub use types::{BillSlot, CASSETTE_SLOTS, Cassette, CashOutTx};
