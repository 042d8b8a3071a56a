//! Cash-out transaction record and related value types.
//!
//! `CashOutTx` is the in-memory image of one `cash_out_txs` row. Monetary
//! amounts are `rust_decimal::Decimal` bound to Postgres NUMERIC so they
//! round-trip exactly; they never pass through floating point.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;

use super::error::CashOutError;
use super::status::CashOutStatus;

/// Number of physical cassette slots in the dispensing hardware.
pub const CASSETTE_SLOTS: usize = 2;

/// Per-cassette bill accounting for one transaction.
///
/// `provisioned` is what the change-maker allocated; `dispensed` and
/// `rejected` are what the hardware reported after the physical dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillSlot {
    pub provisioned: i32,
    pub dispensed: i32,
    pub rejected: i32,
    pub denomination: Decimal,
}

impl BillSlot {
    /// A fresh allocation: provisioned counts only, nothing dispensed yet.
    pub fn provisioned(provisioned: i32, denomination: Decimal) -> Self {
        Self {
            provisioned,
            dispensed: 0,
            rejected: 0,
            denomination,
        }
    }
}

/// Live inventory of one cassette slot, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cassette {
    pub denomination: Decimal,
    pub count: i32,
}

/// One cash-out transaction row. Created on first sight of an id, mutated
/// for the rest of its life, never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct CashOutTx {
    /// Externally supplied unique identifier; never regenerated.
    pub id: String,
    pub device_id: String,
    /// Deposit address; set exactly once, on first persistence.
    pub to_address: Option<String>,
    /// HD derivation index, reserved when the device uses deterministic
    /// address derivation. Set together with `to_address`.
    pub hd_index: Option<i64>,
    pub crypto_atoms: Decimal,
    pub fiat: Decimal,
    pub tx_hash: Option<String>,
    pub status: CashOutStatus,
    /// Dispensing requested.
    pub dispense: bool,
    /// Bills physically dispensed by the hardware.
    pub dispense_confirmed: bool,
    pub dispense_time: Option<DateTime<Utc>>,
    /// Exactly [`CASSETTE_SLOTS`] entries once populated, index-aligned
    /// with the physical cassette slots.
    pub bills: Option<Vec<BillSlot>>,
    pub notified: bool,
    pub redeem: bool,
    pub swept: bool,
    pub phone: Option<String>,
    pub error: Option<String>,
    pub created: DateTime<Utc>,
}

impl CashOutTx {
    /// A fresh incoming transaction as first reported by a device.
    pub fn new(
        id: impl Into<String>,
        device_id: impl Into<String>,
        crypto_atoms: Decimal,
        fiat: Decimal,
        status: CashOutStatus,
    ) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            to_address: None,
            hd_index: None,
            crypto_atoms,
            fiat,
            tx_hash: None,
            status,
            dispense: false,
            dispense_confirmed: false,
            dispense_time: None,
            bills: None,
            notified: false,
            redeem: false,
            swept: false,
            phone: None,
            error: None,
            created: Utc::now(),
        }
    }

    /// Map a `cash_out_txs` row to a record.
    pub fn from_row(row: &PgRow) -> Result<Self, CashOutError> {
        let status_str: String = row.try_get("status")?;
        let status = CashOutStatus::parse(&status_str)
            .ok_or_else(|| CashOutError::Corrupt(format!("invalid status: {status_str}")))?;

        let bills: Option<Json<Vec<BillSlot>>> = row.try_get("bills")?;

        Ok(Self {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            to_address: row.try_get("to_address")?,
            hd_index: row.try_get("hd_index")?,
            crypto_atoms: row.try_get("crypto_atoms")?,
            fiat: row.try_get("fiat")?,
            tx_hash: row.try_get("tx_hash")?,
            status,
            dispense: row.try_get("dispense")?,
            dispense_confirmed: row.try_get("dispense_confirmed")?,
            dispense_time: row.try_get("dispense_time")?,
            bills: bills.map(|j| j.0),
            notified: row.try_get("notified")?,
            redeem: row.try_get("redeem")?,
            swept: row.try_get("swept")?,
            phone: row.try_get("phone")?,
            error: row.try_get("error")?,
            created: row.try_get("created")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn new_tx_has_no_address_and_clear_flags() {
        let tx = CashOutTx::new(
            "t1",
            "dev-1",
            Decimal::new(125_000, 0),
            Decimal::new(20, 0),
            CashOutStatus::NotSeen,
        );
        assert!(tx.to_address.is_none());
        assert!(tx.hd_index.is_none());
        assert!(!tx.dispense && !tx.dispense_confirmed && !tx.notified);
        assert!(tx.bills.is_none());
    }

    #[test]
    fn bill_slot_json_round_trip() {
        let slot = BillSlot::provisioned(3, Decimal::new(20, 0));
        let raw = serde_json::to_string(&slot).unwrap();
        let back: BillSlot = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, slot);
        assert_eq!(back.dispensed, 0);
        assert_eq!(back.rejected, 0);
    }

    #[test]
    fn decimal_amounts_keep_exact_text_form() {
        // Amounts must survive as decimal strings, never via floats.
        let fiat: Decimal = "70.00001".parse().unwrap();
        assert_eq!(fiat.to_string(), "70.00001");
    }
}
