//! Typed field-level delta between two versions of a transaction.
//!
//! One comparator per field, compiled rather than reflected. `None` means
//! "unchanged"; a field that currently holds a value is never nulled out
//! by a patch, because absence is the only way a patch can express "no new
//! value".

use chrono::{DateTime, Utc};

use super::status::CashOutStatus;
use super::types::{BillSlot, CashOutTx};

/// The subset of fields whose values actually changed between two
/// versions of a record. Only these fields are written back to the store.
///
/// Device updates drive `tx_hash..swept`; `dispense_time` and `bills` are
/// written by the cancellation handler and the note-provisioning step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxPatch {
    pub tx_hash: Option<String>,
    pub status: Option<CashOutStatus>,
    pub dispense: Option<bool>,
    pub dispense_confirmed: Option<bool>,
    pub notified: Option<bool>,
    pub redeem: Option<bool>,
    pub phone: Option<String>,
    pub error: Option<String>,
    pub swept: Option<bool>,
    pub dispense_time: Option<DateTime<Utc>>,
    pub bills: Option<Vec<BillSlot>>,
}

/// Include a textual field only when the incoming value is present and
/// differs. Nil-vs-nil counts as equal; Some-vs-None is never emitted, so
/// an update carrying null for a populated field is ignored.
fn changed<T: Clone + PartialEq>(old: &Option<T>, new: &Option<T>) -> Option<T> {
    match (old, new) {
        (_, None) => None,
        (Some(o), Some(n)) if o == n => None,
        (_, Some(n)) => Some(n.clone()),
    }
}

fn flag(old: bool, new: bool) -> Option<bool> {
    if old == new { None } else { Some(new) }
}

impl TxPatch {
    /// Field-by-field diff of `new` against `old`.
    pub fn diff(old: &CashOutTx, new: &CashOutTx) -> Self {
        Self {
            tx_hash: changed(&old.tx_hash, &new.tx_hash),
            status: if old.status == new.status {
                None
            } else {
                Some(new.status)
            },
            dispense: flag(old.dispense, new.dispense),
            dispense_confirmed: flag(old.dispense_confirmed, new.dispense_confirmed),
            notified: flag(old.notified, new.notified),
            redeem: flag(old.redeem, new.redeem),
            phone: changed(&old.phone, &new.phone),
            error: changed(&old.error, &new.error),
            swept: flag(old.swept, new.swept),
            dispense_time: changed(&old.dispense_time, &new.dispense_time),
            bills: changed(&old.bills, &new.bills),
        }
    }

    /// An empty patch is an idempotent no-op: the store performs no I/O.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The old record with this patch applied, i.e. the merged in-memory
    /// record the store hands back after a partial write.
    pub fn apply(&self, old: &CashOutTx) -> CashOutTx {
        let mut merged = old.clone();
        if let Some(v) = &self.tx_hash {
            merged.tx_hash = Some(v.clone());
        }
        if let Some(v) = self.status {
            merged.status = v;
        }
        if let Some(v) = self.dispense {
            merged.dispense = v;
        }
        if let Some(v) = self.dispense_confirmed {
            merged.dispense_confirmed = v;
        }
        if let Some(v) = self.notified {
            merged.notified = v;
        }
        if let Some(v) = self.redeem {
            merged.redeem = v;
        }
        if let Some(v) = &self.phone {
            merged.phone = Some(v.clone());
        }
        if let Some(v) = &self.error {
            merged.error = Some(v.clone());
        }
        if let Some(v) = self.swept {
            merged.swept = v;
        }
        if let Some(v) = self.dispense_time {
            merged.dispense_time = Some(v);
        }
        if let Some(v) = &self.bills {
            merged.bills = Some(v.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn base_tx() -> CashOutTx {
        CashOutTx::new(
            "t1",
            "dev-1",
            Decimal::new(125_000, 0),
            Decimal::new(20, 0),
            CashOutStatus::Published,
        )
    }

    #[test]
    fn identical_records_produce_empty_patch() {
        let tx = base_tx();
        let patch = TxPatch::diff(&tx, &tx.clone());
        assert!(patch.is_empty());
    }

    #[test]
    fn nil_vs_nil_counts_as_equal() {
        let old = base_tx();
        let new = base_tx();
        assert!(old.tx_hash.is_none() && new.tx_hash.is_none());
        assert!(TxPatch::diff(&old, &new).is_empty());
    }

    #[test]
    fn null_never_overwrites_existing_value() {
        let mut old = base_tx();
        old.phone = Some("+15551234567".to_string());
        old.tx_hash = Some("abc123".to_string());

        let new = base_tx(); // phone/tx_hash None
        let patch = TxPatch::diff(&old, &new);
        assert!(patch.phone.is_none());
        assert!(patch.tx_hash.is_none());

        let merged = patch.apply(&old);
        assert_eq!(merged.phone.as_deref(), Some("+15551234567"));
        assert_eq!(merged.tx_hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn changed_values_are_included() {
        let old = base_tx();
        let mut new = base_tx();
        new.tx_hash = Some("deadbeef".to_string());
        new.status = CashOutStatus::Authorized;
        new.dispense = true;

        let patch = TxPatch::diff(&old, &new);
        assert_eq!(patch.tx_hash.as_deref(), Some("deadbeef"));
        assert_eq!(patch.status, Some(CashOutStatus::Authorized));
        assert_eq!(patch.dispense, Some(true));
        assert!(patch.notified.is_none());
    }

    #[test]
    fn flag_transitions_both_ways_are_captured() {
        let mut old = base_tx();
        old.notified = true;
        let new = base_tx();
        // notified true -> false is still a genuine change for bools.
        assert_eq!(TxPatch::diff(&old, &new).notified, Some(false));
    }

    #[test]
    fn apply_merges_patch_over_old() {
        let old = base_tx();
        let patch = TxPatch {
            status: Some(CashOutStatus::Confirmed),
            phone: Some("+15550000000".to_string()),
            ..Default::default()
        };
        let merged = patch.apply(&old);
        assert_eq!(merged.status, CashOutStatus::Confirmed);
        assert_eq!(merged.phone.as_deref(), Some("+15550000000"));
        assert_eq!(merged.fiat, old.fiat);
    }

    #[test]
    fn bills_attachment_is_a_change() {
        let old = base_tx();
        let mut new = base_tx();
        new.bills = Some(vec![
            BillSlot::provisioned(1, Decimal::new(20, 0)),
            BillSlot::provisioned(1, Decimal::new(50, 0)),
        ]);
        let patch = TxPatch::diff(&old, &new);
        assert_eq!(patch.bills.as_ref().map(|b| b.len()), Some(2));
    }
}
