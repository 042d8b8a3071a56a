//! Append-only audit trail for cash-out transactions.
//!
//! One row per meaningful state change, written solely by the lifecycle
//! engine (the cancellation handler records through the same writer).
//! Rows are never updated or deleted, and a failed append propagates:
//! an entry is never silently dropped. No read API exists in this core.

use serde_json::Value;
use sqlx::PgExecutor;

use super::error::CashOutError;
use super::status::CashOutStatus;
use super::types::CashOutTx;

/// Names of the audit actions this core appends.
///
/// Status advances are recorded under the new status's own wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ProvisionAddress,
    ProvisionAddressError,
    StatusChange(CashOutStatus),
    Dispense,
    DispenseError,
    AddPhone,
    RedeemLater,
    ProvisionNotes,
    ProvisionNotesError,
    OperatorCompleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ProvisionAddress => "provisionAddress",
            AuditAction::ProvisionAddressError => "provisionAddressError",
            AuditAction::StatusChange(status) => status.as_str(),
            AuditAction::Dispense => "dispense",
            AuditAction::DispenseError => "dispenseError",
            AuditAction::AddPhone => "addPhone",
            AuditAction::RedeemLater => "redeemLater",
            AuditAction::ProvisionNotes => "provisionNotes",
            AuditAction::ProvisionNotesError => "provisionNotesError",
            AuditAction::OperatorCompleted => "operatorCompleted",
        }
    }
}

/// Append one audit row carrying the transaction id and its current
/// `redeem` flag.
///
/// Takes any Postgres executor: success-path entries run inside the same
/// transaction as the row change they describe; failure-path entries run
/// on the pool so they survive the rolled-back attempt.
pub async fn record<'a, E>(
    exec: E,
    action: AuditAction,
    tx: &CashOutTx,
    payload: Value,
) -> Result<(), CashOutError>
where
    E: PgExecutor<'a>,
{
    sqlx::query(
        r#"
        INSERT INTO cash_out_actions (tx_id, action, redeem, payload)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&tx.id)
    .bind(action.as_str())
    .bind(tx.redeem)
    .bind(payload)
    .execute(exec)
    .await?;

    tracing::debug!(tx_id = %tx.id, action = action.as_str(), "audit action recorded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_actions_use_wire_names() {
        assert_eq!(
            AuditAction::StatusChange(CashOutStatus::Confirmed).as_str(),
            "confirmed"
        );
        assert_eq!(
            AuditAction::StatusChange(CashOutStatus::InsufficientFunds).as_str(),
            "insufficientFunds"
        );
    }

    #[test]
    fn fixed_action_names() {
        assert_eq!(AuditAction::ProvisionAddress.as_str(), "provisionAddress");
        assert_eq!(AuditAction::ProvisionNotesError.as_str(), "provisionNotesError");
        assert_eq!(AuditAction::OperatorCompleted.as_str(), "operatorCompleted");
    }
}
