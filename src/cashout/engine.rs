//! The transaction lifecycle engine.
//!
//! `post` is the single entry point every status update funnels through:
//! device polls, confirmation sweeps, and operator tooling all converge
//! here. It reads the stored row inside a serializable transaction,
//! merges the incoming update under the status ratchet, dispatches the
//! side effects owed to the resulting transition, persists only the
//! fields that changed, and appends the audit record for the change.
//!
//! Note provisioning runs AFTER the persistence transaction commits: the
//! external cassette/change-making call must not hold the transaction
//! open, so the row may be updated twice (status first, bills second)
//! rather than once atomically.

use serde_json::{Value, json};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::audit::{self, AuditAction};
use super::dispense::{self, ChangeMaker, bills_from_plan};
use super::error::CashOutError;
use super::events::TransitionEvent;
use super::integration::Integration;
use super::patch::TxPatch;
use super::status::{CashOutStatus, ratchet};
use super::store;
use super::types::CashOutTx;

/// Orchestrates pre-processing, persistence, and post-processing for one
/// cash-out transaction update.
pub struct LifecycleEngine {
    pool: PgPool,
    change_maker: Arc<dyn ChangeMaker>,
}

impl LifecycleEngine {
    pub fn new(pool: PgPool, change_maker: Arc<dyn ChangeMaker>) -> Self {
        Self { pool, change_maker }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply one incoming update.
    ///
    /// Concurrent calls for the same id are serialized by the store: the
    /// read-modify-write below runs under serializable isolation with a
    /// row lock on the fetch, so the diff is always computed against a
    /// just-read prior state.
    pub async fn post(
        &self,
        incoming: CashOutTx,
        integration: Arc<dyn Integration>,
    ) -> Result<CashOutTx, CashOutError> {
        let mut dbtx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *dbtx)
            .await?;

        let existing = store::fetch_for_update(&mut *dbtx, &incoming.id).await?;
        let already_requested = existing
            .as_ref()
            .map(|old| old.dispense || old.redeem)
            .unwrap_or(false);

        let persisted = match &existing {
            None => self.insert_new(&mut dbtx, incoming, integration.as_ref()).await?,
            Some(old) => {
                self.advance_existing(&mut dbtx, old, &incoming, &integration)
                    .await?
            }
        };
        dbtx.commit().await?;

        // Post-processing: dispense/redeem newly requested in this call.
        if (persisted.dispense || persisted.redeem) && !already_requested {
            return self.provision_notes(persisted, integration).await;
        }
        Ok(persisted)
    }

    /// First sight of a transaction id: provision the deposit address and
    /// insert the full row.
    async fn insert_new(
        &self,
        dbtx: &mut Transaction<'_, Postgres>,
        mut tx: CashOutTx,
        integration: &dyn Integration,
    ) -> Result<CashOutTx, CashOutError> {
        if let Err(e) = self.provision_address(dbtx, &mut tx, integration).await {
            // Recorded through the pool so the entry survives the rollback
            // of this attempt; the row itself is not created.
            let payload = json!({ "error": e.to_string(), "error_code": e.kind() });
            audit::record(&self.pool, AuditAction::ProvisionAddressError, &tx, payload).await?;
            warn!(tx_id = %tx.id, error = %e, "address provisioning failed");
            return Err(e);
        }

        audit::record(
            &mut **dbtx,
            AuditAction::ProvisionAddress,
            &tx,
            json!({ "to_address": tx.to_address }),
        )
        .await?;

        info!(tx_id = %tx.id, device_id = %tx.device_id, "cash-out transaction created");
        store::insert(&mut **dbtx, &tx).await
    }

    async fn provision_address(
        &self,
        dbtx: &mut Transaction<'_, Postgres>,
        tx: &mut CashOutTx,
        integration: &dyn Integration,
    ) -> Result<(), CashOutError> {
        if integration.is_hd() {
            tx.hd_index = Some(store::next_hd_index(&mut **dbtx).await?);
        }
        tx.to_address = Some(integration.new_address(tx).await?);
        Ok(())
    }

    /// Subsequent update: ratchet the status, diff against the stored
    /// row, dispatch the transition's side effects, persist the patch.
    async fn advance_existing(
        &self,
        dbtx: &mut Transaction<'_, Postgres>,
        old: &CashOutTx,
        incoming: &CashOutTx,
        integration: &Arc<dyn Integration>,
    ) -> Result<CashOutTx, CashOutError> {
        let merged = merge_update(old, incoming);
        let patch = TxPatch::diff(old, &merged);

        if let Some(event) = TransitionEvent::compute(old, &patch) {
            self.apply_event(dbtx, event, old, &merged, integration).await?;
        } else {
            debug!(tx_id = %old.id, "no meaningful transition in update");
        }

        store::update(&mut **dbtx, old, &patch).await
    }

    /// Exactly one audit action per event.
    async fn apply_event(
        &self,
        dbtx: &mut Transaction<'_, Postgres>,
        event: TransitionEvent,
        old: &CashOutTx,
        merged: &CashOutTx,
        integration: &Arc<dyn Integration>,
    ) -> Result<(), CashOutError> {
        match event {
            TransitionEvent::StatusAdvanced(status) => {
                if just_authorized(old.status, status) {
                    self.dispatch_sell(merged, integration);
                }
                audit::record(
                    &mut **dbtx,
                    AuditAction::StatusChange(status),
                    merged,
                    json!({ "to_address": merged.to_address, "tx_hash": merged.tx_hash }),
                )
                .await?;
            }
            TransitionEvent::DispenseConfirmed => {
                let action = if merged.error.is_some() {
                    AuditAction::DispenseError
                } else {
                    AuditAction::Dispense
                };
                audit::record(
                    &mut **dbtx,
                    action,
                    merged,
                    json!({ "bills": merged.bills, "error": merged.error }),
                )
                .await?;
                if let Some(bills) = &merged.bills {
                    dispense::decrement_cassettes(&mut **dbtx, &merged.device_id, bills).await?;
                }
            }
            TransitionEvent::PhoneAdded => {
                audit::record(
                    &mut **dbtx,
                    AuditAction::AddPhone,
                    merged,
                    json!({ "phone": merged.phone }),
                )
                .await?;
            }
            TransitionEvent::RedeemRequested => {
                audit::record(&mut **dbtx, AuditAction::RedeemLater, merged, Value::Null).await?;
            }
        }
        Ok(())
    }

    /// Post-processing for a newly requested dispense/redeem: settle
    /// (best effort), then allocate bills against live cassette inventory
    /// and persist the allocation.
    async fn provision_notes(
        &self,
        tx: CashOutTx,
        integration: Arc<dyn Integration>,
    ) -> Result<CashOutTx, CashOutError> {
        self.dispatch_sell(&tx, &integration);

        let allocated = match integration.build_cassettes().await {
            Ok(cassettes) => self
                .change_maker
                .make_change(&cassettes, tx.fiat)
                .ok_or(CashOutError::InsufficientFunds)
                .and_then(|plan| bills_from_plan(&plan)),
            Err(e) => Err(e),
        };

        let bills = match allocated {
            Ok(bills) => bills,
            Err(e) => {
                let payload = json!({ "error": e.to_string(), "error_code": e.code() });
                audit::record(&self.pool, AuditAction::ProvisionNotesError, &tx, payload).await?;
                warn!(tx_id = %tx.id, error = %e, "note provisioning failed");
                return Err(e);
            }
        };

        let patch = TxPatch {
            bills: Some(bills.clone()),
            ..Default::default()
        };

        let mut dbtx = self.pool.begin().await?;
        let updated = store::update(&mut *dbtx, &tx, &patch).await?;
        audit::record(
            &mut *dbtx,
            AuditAction::ProvisionNotes,
            &updated,
            json!({ "bills": bills }),
        )
        .await?;
        dbtx.commit().await?;

        info!(tx_id = %updated.id, "bills provisioned");
        Ok(updated)
    }

    /// Settlement is fire-and-forget: the task is detached and its result
    /// is unobservable to the caller. Failures are logged, nothing more.
    fn dispatch_sell(&self, tx: &CashOutTx, integration: &Arc<dyn Integration>) {
        let integration = integration.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = integration.sell(&tx).await {
                warn!(tx_id = %tx.id, error = %e, "settlement call failed");
            }
        });
    }
}

/// The stored row overlaid with an incoming update: status ratcheted,
/// nullable fields taken from the update only when present, flags taken
/// from the update as reported. Identity and address fields never change
/// after creation.
pub(crate) fn merge_update(old: &CashOutTx, incoming: &CashOutTx) -> CashOutTx {
    let mut merged = old.clone();
    merged.status = ratchet(old.status, incoming.status);
    merged.tx_hash = incoming.tx_hash.clone().or_else(|| old.tx_hash.clone());
    merged.phone = incoming.phone.clone().or_else(|| old.phone.clone());
    merged.error = incoming.error.clone().or_else(|| old.error.clone());
    merged.dispense_time = incoming.dispense_time.or(old.dispense_time);
    merged.bills = incoming.bills.clone().or_else(|| old.bills.clone());
    merged.dispense = incoming.dispense;
    merged.dispense_confirmed = incoming.dispense_confirmed;
    merged.notified = incoming.notified;
    merged.redeem = incoming.redeem;
    merged.swept = incoming.swept;
    merged
}

/// The transition that owes a settlement call: status moves into
/// `authorized` from a not-yet-authorized state, or jumps from an early
/// state straight into `instant`/`confirmed`.
pub(crate) fn just_authorized(old: CashOutStatus, new: CashOutStatus) -> bool {
    use CashOutStatus::*;

    let entered_authorized = new == Authorized && !matches!(old, Authorized | Instant | Confirmed);
    let entered_final =
        matches!(new, Instant | Confirmed) && matches!(old, NotSeen | Published | Authorized);
    entered_authorized || entered_final
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn tx(status: CashOutStatus) -> CashOutTx {
        CashOutTx::new(
            "t1",
            "dev-1",
            Decimal::new(125_000, 0),
            Decimal::new(20, 0),
            status,
        )
    }

    #[test]
    fn just_authorized_on_entering_authorized() {
        use CashOutStatus::*;
        assert!(just_authorized(NotSeen, Authorized));
        assert!(just_authorized(Published, Authorized));
        assert!(just_authorized(Rejected, Authorized));
        assert!(just_authorized(InsufficientFunds, Authorized));
        assert!(!just_authorized(Authorized, Authorized));
    }

    #[test]
    fn just_authorized_on_early_jump_to_final() {
        use CashOutStatus::*;
        assert!(just_authorized(NotSeen, Instant));
        assert!(just_authorized(Published, Confirmed));
        assert!(just_authorized(Authorized, Confirmed));
        // Already past the settlement point: no second settlement.
        assert!(!just_authorized(Instant, Confirmed));
        assert!(!just_authorized(Rejected, Confirmed));
    }

    #[test]
    fn merge_ratchets_status_and_keeps_identity() {
        let mut old = tx(CashOutStatus::Published);
        old.to_address = Some("addr-1".to_string());
        old.hd_index = Some(7);

        let incoming = tx(CashOutStatus::NotSeen);
        let merged = merge_update(&old, &incoming);

        assert_eq!(merged.status, CashOutStatus::Published);
        assert_eq!(merged.to_address.as_deref(), Some("addr-1"));
        assert_eq!(merged.hd_index, Some(7));
    }

    #[test]
    fn merge_never_nulls_populated_fields() {
        let mut old = tx(CashOutStatus::Published);
        old.tx_hash = Some("hash-1".to_string());
        old.phone = Some("+15551234567".to_string());

        let incoming = tx(CashOutStatus::Published);
        let merged = merge_update(&old, &incoming);

        assert_eq!(merged.tx_hash.as_deref(), Some("hash-1"));
        assert_eq!(merged.phone.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn merge_takes_new_values_when_present() {
        let old = tx(CashOutStatus::Published);
        let mut incoming = tx(CashOutStatus::Authorized);
        incoming.tx_hash = Some("hash-2".to_string());
        incoming.dispense = true;

        let merged = merge_update(&old, &incoming);
        assert_eq!(merged.status, CashOutStatus::Authorized);
        assert_eq!(merged.tx_hash.as_deref(), Some("hash-2"));
        assert!(merged.dispense);
    }
}
