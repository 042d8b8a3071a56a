//! Dispense coordination: change-making contract and cassette accounting.
//!
//! The change-making algorithm itself lives outside this core. We define
//! its contract and own the inventory bookkeeping that must mirror the
//! physical dispense.

use rust_decimal::Decimal;

use super::error::CashOutError;
use super::types::{BillSlot, CASSETTE_SLOTS, Cassette};

/// A per-slot bill allocation produced by the change maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillPlan {
    pub provisioned: i32,
    pub denomination: Decimal,
}

/// External change-making function.
///
/// Contract: deterministic, no side effects, one plan entry per cassette
/// slot (same order as the input), and `None` when no combination of the
/// given denominations/counts sums to the requested fiat amount.
pub trait ChangeMaker: Send + Sync {
    fn make_change(&self, cassettes: &[Cassette], fiat: Decimal) -> Option<Vec<BillPlan>>;
}

/// Turn a change-maker plan into the persisted bill attachment.
///
/// Rejects plans that do not cover exactly the fixed number of cassette
/// slots; a malformed allocation must never reach the row.
pub fn bills_from_plan(plan: &[BillPlan]) -> Result<Vec<BillSlot>, CashOutError> {
    if plan.len() != CASSETTE_SLOTS {
        return Err(CashOutError::Integration(format!(
            "change maker returned {} slots, expected {}",
            plan.len(),
            CASSETTE_SLOTS
        )));
    }
    Ok(plan
        .iter()
        .map(|p| BillSlot::provisioned(p.provisioned, p.denomination))
        .collect())
}

/// Decrement cassette inventory to match a confirmed physical dispense:
/// per slot, `dispensed + rejected` bills left the machine.
///
/// Executed exactly once, on the false->true flip of
/// `dispense_confirmed`; not retried.
pub async fn decrement_cassettes(
    conn: &mut sqlx::PgConnection,
    device_id: &str,
    bills: &[BillSlot],
) -> Result<(), CashOutError> {
    for (slot, bill) in bills.iter().enumerate() {
        let removed = bill.dispensed + bill.rejected;
        if removed == 0 {
            continue;
        }
        sqlx::query(
            r#"
            UPDATE device_cassettes
            SET count = count - $1
            WHERE device_id = $2 AND slot = $3
            "#,
        )
        .bind(removed)
        .bind(device_id)
        .bind((slot + 1) as i16)
        .execute(&mut *conn)
        .await?;
    }

    tracing::info!(device_id, "cassette inventory decremented for confirmed dispense");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_must_cover_every_slot() {
        let short = [BillPlan {
            provisioned: 1,
            denomination: Decimal::new(20, 0),
        }];
        assert!(bills_from_plan(&short).is_err());

        let full = [
            BillPlan {
                provisioned: 1,
                denomination: Decimal::new(20, 0),
            },
            BillPlan {
                provisioned: 1,
                denomination: Decimal::new(50, 0),
            },
        ];
        let bills = bills_from_plan(&full).unwrap();
        assert_eq!(bills.len(), CASSETTE_SLOTS);
        assert!(bills.iter().all(|b| b.dispensed == 0 && b.rejected == 0));
    }
}
