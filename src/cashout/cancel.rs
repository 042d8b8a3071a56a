//! Operator cancellation.
//!
//! Cancelling marks the transaction as dispensed with a fixed error
//! marker, closing it out of every sweep without touching its status.
//! The cancel is conditional on the dispense flag so it can neither
//! clobber a real dispense nor be applied twice.

use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use super::audit::{self, AuditAction};
use super::error::CashOutError;
use super::types::CashOutTx;

/// Error marker written by a cancel; distinguishes operator action from
/// device-reported dispense failures.
pub const OPERATOR_CANCEL: &str = "Operator cancel";

/// Cancel a pending cash-out by id.
///
/// Fails with [`CashOutError::NoSuchTransaction`] when the id does not
/// exist or the transaction was already dispensed (or already cancelled).
pub async fn cancel(pool: &PgPool, tx_id: &str) -> Result<(), CashOutError> {
    let mut dbtx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        UPDATE cash_out_txs
        SET dispense = true, dispense_time = now(), error = $1
        WHERE id = $2 AND NOT dispense
        RETURNING *
        "#,
    )
    .bind(OPERATOR_CANCEL)
    .bind(tx_id)
    .fetch_optional(&mut *dbtx)
    .await?;

    let Some(row) = row else {
        return Err(CashOutError::NoSuchTransaction(tx_id.to_string()));
    };
    let tx = CashOutTx::from_row(&row)?;

    audit::record(&mut *dbtx, AuditAction::OperatorCompleted, &tx, Value::Null).await?;
    dbtx.commit().await?;

    info!(tx_id, "cash-out cancelled by operator");
    Ok(())
}
