//! Cash-out status ordering and the never-regress ratchet.
//!
//! A transaction's status only ever advances along the confirmation order.
//! Out-of-order updates (a stale poll arriving after a confirmation sweep)
//! must never make a transaction look "less confirmed" than it already was.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a cash-out transaction.
///
/// The ranked variants form a total order (`rank`); `InsufficientFunds` is
/// the out-of-band terminal override and carries no rank. It always wins as
/// an incoming status, and always loses as a stored one, so a transaction
/// parked on `insufficientFunds` can still be advanced by a later sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashOutStatus {
    #[serde(rename = "notSeen")]
    NotSeen,
    #[serde(rename = "published")]
    Published,
    #[serde(rename = "rejected")]
    Rejected,
    #[serde(rename = "authorized")]
    Authorized,
    #[serde(rename = "instant")]
    Instant,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "insufficientFunds")]
    InsufficientFunds,
}

impl CashOutStatus {
    /// Position in the confirmation order. `None` for the override variant.
    pub fn rank(&self) -> Option<u8> {
        match self {
            CashOutStatus::NotSeen => Some(0),
            CashOutStatus::Published => Some(1),
            CashOutStatus::Rejected => Some(2),
            CashOutStatus::Authorized => Some(3),
            CashOutStatus::Instant => Some(4),
            CashOutStatus::Confirmed => Some(5),
            CashOutStatus::InsufficientFunds => None,
        }
    }

    /// Wire/storage name (stored as TEXT in `cash_out_txs.status`).
    pub fn as_str(&self) -> &'static str {
        match self {
            CashOutStatus::NotSeen => "notSeen",
            CashOutStatus::Published => "published",
            CashOutStatus::Rejected => "rejected",
            CashOutStatus::Authorized => "authorized",
            CashOutStatus::Instant => "instant",
            CashOutStatus::Confirmed => "confirmed",
            CashOutStatus::InsufficientFunds => "insufficientFunds",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "notSeen" => Some(CashOutStatus::NotSeen),
            "published" => Some(CashOutStatus::Published),
            "rejected" => Some(CashOutStatus::Rejected),
            "authorized" => Some(CashOutStatus::Authorized),
            "instant" => Some(CashOutStatus::Instant),
            "confirmed" => Some(CashOutStatus::Confirmed),
            "insufficientFunds" => Some(CashOutStatus::InsufficientFunds),
            _ => None,
        }
    }
}

impl fmt::Display for CashOutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge rule for status updates: monotonic-only transitions.
///
/// - equal statuses return unchanged;
/// - an incoming `InsufficientFunds` wins unconditionally (override);
/// - otherwise the higher-ranked status wins. A stored
///   `InsufficientFunds` is unranked and loses to any ranked incoming
///   status, so sweeps can move such transactions forward again.
pub fn ratchet(old: CashOutStatus, new: CashOutStatus) -> CashOutStatus {
    if old == new {
        return old;
    }
    if new == CashOutStatus::InsufficientFunds {
        return new;
    }

    // new is ranked here; an unranked old always loses.
    match (old.rank(), new.rank()) {
        (Some(o), Some(n)) if o > n => old,
        _ => new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CashOutStatus::*;

    const RANKED: [CashOutStatus; 6] =
        [NotSeen, Published, Rejected, Authorized, Instant, Confirmed];

    #[test]
    fn equal_statuses_unchanged() {
        for s in RANKED {
            assert_eq!(ratchet(s, s), s);
        }
        assert_eq!(ratchet(InsufficientFunds, InsufficientFunds), InsufficientFunds);
    }

    #[test]
    fn higher_rank_wins_both_directions() {
        assert_eq!(ratchet(NotSeen, Published), Published);
        assert_eq!(ratchet(Published, NotSeen), Published);
        assert_eq!(ratchet(Authorized, Confirmed), Confirmed);
        assert_eq!(ratchet(Confirmed, Authorized), Confirmed);
    }

    #[test]
    fn insufficient_funds_override_always_wins() {
        for s in RANKED {
            assert_eq!(ratchet(s, InsufficientFunds), InsufficientFunds);
        }
    }

    #[test]
    fn insufficient_funds_stored_loses_to_any_ranked_update() {
        for s in RANKED {
            assert_eq!(ratchet(InsufficientFunds, s), s);
        }
    }

    #[test]
    fn never_regresses() {
        // For every ranked pair, the result rank is >= the old rank unless
        // the incoming status is the override.
        for old in RANKED {
            for new in RANKED {
                let merged = ratchet(old, new);
                assert!(
                    merged.rank().unwrap() >= old.rank().unwrap(),
                    "ratchet({old}, {new}) regressed to {merged}"
                );
            }
        }
    }

    #[test]
    fn text_round_trip() {
        for s in [
            NotSeen,
            Published,
            Rejected,
            Authorized,
            Instant,
            Confirmed,
            InsufficientFunds,
        ] {
            assert_eq!(CashOutStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(CashOutStatus::parse("pending"), None);
    }
}
