//! Injected collaborator interfaces.
//!
//! Each device is backed by an integration (wallet + exchange + SMS
//! plumbing) that the lifecycle engine and the monitor sweeps consume
//! through this narrow trait. Integrations are looked up per transaction,
//! keyed by device id.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::CashOutError;
use super::status::CashOutStatus;
use super::types::{Cassette, CashOutTx};

/// Per-device integration consumed by the lifecycle engine and sweeps.
///
/// `sell` and `notify_confirmation` are dispatched fire-and-forget by the
/// callers that treat them as best effort; their failures are logged but
/// never observed by the transaction pipeline.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Does this device derive deposit addresses from a sequence index?
    fn is_hd(&self) -> bool;

    /// Produce a deposit address for the transaction. For HD devices the
    /// reserved `hd_index` is already set on `tx`.
    async fn new_address(&self, tx: &CashOutTx) -> Result<String, CashOutError>;

    /// Re-query the transaction's current status from the outside world.
    async fn get_status(&self, tx: &CashOutTx) -> Result<CashOutStatus, CashOutError>;

    /// Settle the crypto side on the exchange. Fire-and-forget.
    async fn sell(&self, tx: &CashOutTx) -> Result<(), CashOutError>;

    /// Current cassette inventory for the device, one entry per slot.
    async fn build_cassettes(&self) -> Result<Vec<Cassette>, CashOutError>;

    /// Tell the customer their cash is ready.
    async fn notify_confirmation(&self, tx: &CashOutTx) -> Result<(), CashOutError>;
}

/// Device-keyed lookup used by the monitor sweeps, which process rows for
/// many devices in one batch.
pub trait IntegrationDirectory: Send + Sync {
    fn integration_for(&self, device_id: &str) -> Result<Arc<dyn Integration>, CashOutError>;
}

/// DashMap-backed directory; devices register at startup (or on
/// connection) and sweeps look them up per row.
#[derive(Default)]
pub struct IntegrationMap {
    inner: DashMap<String, Arc<dyn Integration>>,
}

impl IntegrationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device_id: impl Into<String>, integration: Arc<dyn Integration>) {
        self.inner.insert(device_id.into(), integration);
    }

    pub fn remove(&self, device_id: &str) {
        self.inner.remove(device_id);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl IntegrationDirectory for IntegrationMap {
    fn integration_for(&self, device_id: &str) -> Result<Arc<dyn Integration>, CashOutError> {
        self.inner
            .get(device_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CashOutError::UnknownDevice(device_id.to_string()))
    }
}

// === Mock integration (test double) ===

/// Scriptable integration for tests: fixed address/status/cassettes plus
/// call counters for the fire-and-forget side effects.
pub struct MockIntegration {
    pub hd: bool,
    pub address: String,
    pub status: Mutex<CashOutStatus>,
    pub cassettes: Mutex<Vec<Cassette>>,
    /// When set, `new_address` fails with this message.
    pub fail_address: Option<String>,
    pub sell_calls: AtomicUsize,
    pub notify_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl MockIntegration {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            hd: false,
            address: address.into(),
            status: Mutex::new(CashOutStatus::NotSeen),
            cassettes: Mutex::new(Vec::new()),
            fail_address: None,
            sell_calls: AtomicUsize::new(0),
            notify_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn hd(mut self) -> Self {
        self.hd = true;
        self
    }

    pub fn with_cassettes(self, cassettes: Vec<Cassette>) -> Self {
        *self.cassettes.lock().unwrap() = cassettes;
        self
    }

    pub fn failing_address(mut self, message: impl Into<String>) -> Self {
        self.fail_address = Some(message.into());
        self
    }

    pub fn set_status(&self, status: CashOutStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl Integration for MockIntegration {
    fn is_hd(&self) -> bool {
        self.hd
    }

    async fn new_address(&self, _tx: &CashOutTx) -> Result<String, CashOutError> {
        if let Some(msg) = &self.fail_address {
            return Err(CashOutError::Integration(msg.clone()));
        }
        Ok(self.address.clone())
    }

    async fn get_status(&self, _tx: &CashOutTx) -> Result<CashOutStatus, CashOutError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.status.lock().unwrap())
    }

    async fn sell(&self, _tx: &CashOutTx) -> Result<(), CashOutError> {
        self.sell_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn build_cassettes(&self) -> Result<Vec<Cassette>, CashOutError> {
        Ok(self.cassettes.lock().unwrap().clone())
    }

    async fn notify_confirmation(&self, _tx: &CashOutTx) -> Result<(), CashOutError> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_lookup_by_device_id() {
        let map = IntegrationMap::new();
        map.register("dev-1", Arc::new(MockIntegration::new("addr-1")));

        assert!(map.integration_for("dev-1").is_ok());
        assert!(matches!(
            map.integration_for("dev-unknown"),
            Err(CashOutError::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn mock_counts_fire_and_forget_calls() {
        let mock = MockIntegration::new("addr-1");
        let tx = CashOutTx::new(
            "t1",
            "dev-1",
            rust_decimal::Decimal::ONE,
            rust_decimal::Decimal::ONE,
            CashOutStatus::NotSeen,
        );
        mock.sell(&tx).await.unwrap();
        mock.sell(&tx).await.unwrap();
        mock.notify_confirmation(&tx).await.unwrap();
        assert_eq!(mock.sell_calls.load(Ordering::SeqCst), 2);
        assert_eq!(mock.notify_calls.load(Ordering::SeqCst), 1);
    }
}
