use thiserror::Error;

/// Error code reserved for "no bill combination sums to the requested
/// fiat amount" during note provisioning.
pub const INSUFFICIENT_FUNDS_CODE: u16 = 570;

#[derive(Error, Debug)]
pub enum CashOutError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Integration failure: {0}")]
    Integration(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("No such transaction: {0}")]
    NoSuchTransaction(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Corrupt transaction record: {0}")]
    Corrupt(String),
}

impl CashOutError {
    /// Numeric code exposed to callers. `570` is reserved for the
    /// insufficient-funds condition raised from note provisioning.
    pub fn code(&self) -> u16 {
        match self {
            CashOutError::InsufficientFunds => INSUFFICIENT_FUNDS_CODE,
            CashOutError::NoSuchTransaction(_) => 404,
            CashOutError::Database(_) => 500,
            CashOutError::Integration(_) => 502,
            CashOutError::UnknownDevice(_) => 404,
            CashOutError::Corrupt(_) => 500,
        }
    }

    /// Stable kind tag, recorded alongside the message in failure audit
    /// entries.
    pub fn kind(&self) -> &'static str {
        match self {
            CashOutError::Database(_) => "database",
            CashOutError::Integration(_) => "integration",
            CashOutError::InsufficientFunds => "insufficientFunds",
            CashOutError::NoSuchTransaction(_) => "noSuchTransaction",
            CashOutError::UnknownDevice(_) => "unknownDevice",
            CashOutError::Corrupt(_) => "corrupt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_funds_carries_reserved_code() {
        assert_eq!(CashOutError::InsufficientFunds.code(), 570);
        assert_eq!(CashOutError::InsufficientFunds.kind(), "insufficientFunds");
    }

    #[test]
    fn not_found_is_distinct_from_insufficient_funds() {
        let e = CashOutError::NoSuchTransaction("t9".to_string());
        assert_ne!(e.code(), INSUFFICIENT_FUNDS_CODE);
    }
}
