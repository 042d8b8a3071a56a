//! Transition events derived from a computed patch.
//!
//! Side-effect dispatch is driven by an explicit event computed once per
//! update, not by ad-hoc branching over individual diffed fields. Exactly
//! one audit action corresponds to exactly one event.

use super::patch::TxPatch;
use super::status::CashOutStatus;
use super::types::CashOutTx;

/// The single meaningful transition (if any) represented by one update.
///
/// Priority order when several fields change in the same update: a status
/// advance outranks a dispense confirmation, which outranks a new phone
/// number, which outranks a redeem request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEvent {
    /// Status moved forward under the ratchet.
    StatusAdvanced(CashOutStatus),
    /// `dispense_confirmed` flipped false -> true: bills left the machine.
    DispenseConfirmed,
    /// A phone number was recorded for the first time.
    PhoneAdded,
    /// The customer asked to redeem later.
    RedeemRequested,
}

impl TransitionEvent {
    /// Compute the event for an update against an existing row.
    ///
    /// Returns `None` when the patch carries no meaningful transition
    /// (including the empty patch of a repeated identical update).
    pub fn compute(old: &CashOutTx, patch: &TxPatch) -> Option<Self> {
        if let Some(status) = patch.status {
            return Some(TransitionEvent::StatusAdvanced(status));
        }
        if patch.dispense_confirmed == Some(true) && !old.dispense_confirmed {
            return Some(TransitionEvent::DispenseConfirmed);
        }
        if patch.phone.is_some() && old.phone.is_none() {
            return Some(TransitionEvent::PhoneAdded);
        }
        if patch.redeem == Some(true) && !old.redeem {
            return Some(TransitionEvent::RedeemRequested);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn old_tx() -> CashOutTx {
        CashOutTx::new(
            "t1",
            "dev-1",
            Decimal::new(125_000, 0),
            Decimal::new(20, 0),
            CashOutStatus::Published,
        )
    }

    #[test]
    fn empty_patch_yields_no_event() {
        assert_eq!(TransitionEvent::compute(&old_tx(), &TxPatch::default()), None);
    }

    #[test]
    fn status_change_outranks_everything() {
        let patch = TxPatch {
            status: Some(CashOutStatus::Authorized),
            dispense_confirmed: Some(true),
            phone: Some("+15551234567".to_string()),
            redeem: Some(true),
            ..Default::default()
        };
        assert_eq!(
            TransitionEvent::compute(&old_tx(), &patch),
            Some(TransitionEvent::StatusAdvanced(CashOutStatus::Authorized))
        );
    }

    #[test]
    fn dispense_confirmation_fires_only_on_false_to_true() {
        let patch = TxPatch {
            dispense_confirmed: Some(true),
            ..Default::default()
        };
        assert_eq!(
            TransitionEvent::compute(&old_tx(), &patch),
            Some(TransitionEvent::DispenseConfirmed)
        );

        let mut already = old_tx();
        already.dispense_confirmed = true;
        assert_eq!(TransitionEvent::compute(&already, &patch), None);
    }

    #[test]
    fn phone_added_only_when_previously_absent() {
        let patch = TxPatch {
            phone: Some("+15551234567".to_string()),
            ..Default::default()
        };
        assert_eq!(
            TransitionEvent::compute(&old_tx(), &patch),
            Some(TransitionEvent::PhoneAdded)
        );

        let mut had_phone = old_tx();
        had_phone.phone = Some("+15550000000".to_string());
        assert_eq!(TransitionEvent::compute(&had_phone, &patch), None);
    }

    #[test]
    fn redeem_request_detected() {
        let patch = TxPatch {
            redeem: Some(true),
            ..Default::default()
        };
        assert_eq!(
            TransitionEvent::compute(&old_tx(), &patch),
            Some(TransitionEvent::RedeemRequested)
        );
    }
}
