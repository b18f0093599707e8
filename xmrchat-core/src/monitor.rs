//! PaymentMonitor: the reconciliation state machine.
//!
//! The monitor owns the map of pending payments and the set of already
//! processed transaction ids. A recurring task fetches incoming
//! transfers from the wallet, matches them against pending payments and
//! emits one [`ConfirmedPayment`] per settled payment on the confirmed
//! channel. Cycles are serialized: the next tick is not awaited until
//! the previous cycle has fully applied, so a slow wallet call can never
//! overlap two cycles.
//!
//! No error leaves a cycle. A failed transfer fetch skips the whole
//! cycle (no partial processing, no expiry sweep) and the next tick
//! retries from scratch.

use crate::events::ConfirmedPaymentSender;
use crate::payments::{ConfirmedPayment, PendingPayment};
use crate::wallet::WalletRpc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Matching thresholds, swappable at runtime via config reload.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Confirmations required before a transfer settles a payment.
    pub min_confirmations: u64,
    /// Pending payments older than this are silently dropped.
    pub expiry: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            min_confirmations: 1,
            expiry: Duration::from_secs(3600),
        }
    }
}

#[derive(Default)]
struct MonitorState {
    /// payment_id -> pending payment. At most one live record per id.
    pending: HashMap<String, PendingPayment>,
    /// Transaction ids already turned into a confirmation event. Grows
    /// monotonically; bounded by actual wallet activity.
    processed_txids: HashSet<String>,
}

/// Reconciles incoming wallet transfers against registered payments.
pub struct PaymentMonitor<W> {
    wallet: W,
    settings: Arc<RwLock<MonitorSettings>>,
    state: Mutex<MonitorState>,
    confirmed_tx: ConfirmedPaymentSender,
    /// Shutdown handle of the running polling task, if any.
    running: Mutex<Option<watch::Sender<bool>>>,
}

impl<W: WalletRpc + 'static> PaymentMonitor<W> {
    pub fn new(
        wallet: W,
        settings: Arc<RwLock<MonitorSettings>>,
        confirmed_tx: ConfirmedPaymentSender,
    ) -> Self {
        Self {
            wallet,
            settings,
            state: Mutex::new(MonitorState::default()),
            confirmed_tx,
            running: Mutex::new(None),
        }
    }

    /// Register a payment to watch for. Inserts or replaces the record
    /// keyed by `payment_id`; last registration wins.
    pub async fn register_payment(&self, payment: PendingPayment) {
        if payment.payment_id.is_empty() {
            warn!("ignoring payment registration with empty payment id");
            return;
        }
        debug!(
            payment_id = %payment.payment_id,
            topic_id = %payment.topic_id,
            amount = %payment.amount,
            "registered pending payment"
        );
        let mut state = self.state.lock().await;
        state.pending.insert(payment.payment_id.clone(), payment);
    }

    /// Number of unmatched pending payments.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Start the recurring reconciliation task.
    ///
    /// Idempotent: a second call while the task is running is a no-op.
    /// The first cycle runs immediately, then every `interval`.
    pub async fn start_monitoring(self: &Arc<Self>, interval: Duration) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("payment monitor already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *running = Some(shutdown_tx);

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "payment monitor started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }

                    _ = ticker.tick() => {
                        monitor.run_cycle().await;
                    }
                }
            }

            info!("payment monitor stopped");
        });
    }

    /// Stop the recurring task. Safe to call when not running. A cycle
    /// already awaiting the wallet completes and applies its results.
    pub async fn stop_monitoring(&self) {
        if let Some(shutdown_tx) = self.running.lock().await.take() {
            let _ = shutdown_tx.send(true);
        }
    }

    /// One reconciliation cycle: fetch, match, sweep.
    async fn run_cycle(&self) {
        let transfers = match self.wallet.incoming_transfers().await {
            Ok(transfers) => transfers,
            Err(e) => {
                error!(error = %e, "transfer fetch failed, skipping reconciliation cycle");
                return;
            }
        };

        let settings = *self.settings.read().await;

        // Matching and eviction happen under one lock so a registration
        // arriving mid-cycle either sees the whole cycle applied or none
        // of it.
        let confirmed = {
            let mut state = self.state.lock().await;
            let mut confirmed = Vec::new();

            for transfer in transfers {
                if state.processed_txids.contains(&transfer.txid) {
                    continue;
                }
                let Some(expected) = state.pending.get(&transfer.payment_id) else {
                    continue;
                };
                if transfer.confirmations < settings.min_confirmations {
                    continue;
                }
                if transfer.amount < expected.amount {
                    warn!(
                        txid = %transfer.txid,
                        payment_id = %transfer.payment_id,
                        expected = %expected.amount,
                        received = %transfer.amount,
                        "transfer below expected amount, leaving payment pending"
                    );
                    continue;
                }

                state.processed_txids.insert(transfer.txid.clone());
                // Presence was checked above; the remove cannot miss.
                if let Some(pending) = state.pending.remove(&transfer.payment_id) {
                    confirmed.push(ConfirmedPayment::settle(
                        pending,
                        transfer.txid,
                        transfer.confirmations,
                        transfer.timestamp,
                    ));
                }
            }

            let cutoff = OffsetDateTime::now_utc() - settings.expiry;
            let before = state.pending.len();
            state.pending.retain(|_, payment| payment.created_at > cutoff);
            let expired = before - state.pending.len();
            if expired > 0 {
                debug!(expired, "swept expired pending payments");
            }

            confirmed
        };

        for payment in confirmed {
            info!(
                txid = %payment.txid,
                payment_id = %payment.payment_id,
                topic_id = %payment.topic_id,
                confirmations = payment.confirmations,
                "payment confirmed"
            );
            if let Err(e) = self.confirmed_tx.send(payment).await {
                error!(error = %e, "failed to emit confirmed payment event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::events::{ConfirmedPaymentReceiver, confirmed_payment_channel};
    use crate::wallet::{Balance, IntegratedAddress, Transfer, WalletError};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockWallet {
        transfers: StdMutex<Result<Vec<Transfer>, ()>>,
        fetch_calls: AtomicUsize,
    }

    impl MockWallet {
        fn new() -> Self {
            Self {
                transfers: StdMutex::new(Ok(Vec::new())),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn set_transfers(&self, transfers: Vec<Transfer>) {
            *self.transfers.lock().unwrap() = Ok(transfers);
        }

        fn set_unavailable(&self) {
            *self.transfers.lock().unwrap() = Err(());
        }

        fn fetch_count(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WalletRpc for MockWallet {
        async fn create_integrated_address(
            &self,
            payment_id: Option<&str>,
        ) -> Result<IntegratedAddress, WalletError> {
            Ok(IntegratedAddress {
                address: "4testaddress".into(),
                payment_id: payment_id.unwrap_or("minted").into(),
            })
        }

        async fn incoming_transfers(&self) -> Result<Vec<Transfer>, WalletError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.transfers
                .lock()
                .unwrap()
                .clone()
                .map_err(|()| WalletError::Unavailable("mock outage".into()))
        }

        async fn balance(&self) -> Result<Balance, WalletError> {
            Ok(Balance {
                balance: Decimal::ZERO,
                unlocked_balance: Decimal::ZERO,
            })
        }
    }

    fn pending(payment_id: &str, topic_id: &str, amount: &str, age: Duration) -> PendingPayment {
        PendingPayment {
            payment_id: payment_id.into(),
            topic_id: topic_id.into(),
            amount: amount.parse().unwrap(),
            message: "hi".into(),
            created_at: OffsetDateTime::now_utc() - age,
        }
    }

    fn transfer(txid: &str, payment_id: &str, amount: &str, confirmations: u64) -> Transfer {
        Transfer {
            txid: txid.into(),
            payment_id: payment_id.into(),
            amount: amount.parse().unwrap(),
            confirmations,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    fn setup() -> (
        Arc<MockWallet>,
        Arc<PaymentMonitor<Arc<MockWallet>>>,
        ConfirmedPaymentReceiver,
    ) {
        let wallet = Arc::new(MockWallet::new());
        let (confirmed_tx, confirmed_rx) = confirmed_payment_channel();
        let monitor = Arc::new(PaymentMonitor::new(
            Arc::clone(&wallet),
            Arc::new(RwLock::new(MonitorSettings::default())),
            confirmed_tx,
        ));
        (wallet, monitor, confirmed_rx)
    }

    #[tokio::test]
    async fn confirms_payment_end_to_end() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::ZERO))
            .await;
        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);

        monitor.run_cycle().await;

        let confirmed = confirmed_rx.try_recv().unwrap();
        assert_eq!(confirmed.txid, "t1");
        assert_eq!(confirmed.payment_id, "p1");
        assert_eq!(confirmed.topic_id, "v1");
        assert_eq!(confirmed.confirmations, 1);
        assert_eq!(confirmed.message, "hi");
        assert_eq!(monitor.pending_count().await, 0);
    }

    #[tokio::test]
    async fn confirms_at_most_once_per_txid() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::ZERO))
            .await;
        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);

        for _ in 0..3 {
            monitor.run_cycle().await;
        }

        assert!(confirmed_rx.try_recv().is_ok());
        assert!(confirmed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_payment_id_is_ignored_and_not_marked_processed() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);

        monitor.run_cycle().await;
        assert!(confirmed_rx.try_recv().is_err());

        // The txid never entered the processed set: once the payment is
        // registered, a later cycle still confirms it.
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::ZERO))
            .await;
        monitor.run_cycle().await;
        assert_eq!(confirmed_rx.try_recv().unwrap().txid, "t1");
    }

    #[tokio::test]
    async fn zero_confirmations_stays_pending_until_confirmed() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::ZERO))
            .await;

        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 0)]);
        monitor.run_cycle().await;
        assert!(confirmed_rx.try_recv().is_err());
        assert_eq!(monitor.pending_count().await, 1);

        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);
        monitor.run_cycle().await;
        monitor.run_cycle().await;
        assert!(confirmed_rx.try_recv().is_ok());
        assert!(confirmed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn underpaid_transfer_does_not_confirm() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.5", Duration::ZERO))
            .await;
        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);

        monitor.run_cycle().await;

        assert!(confirmed_rx.try_recv().is_err());
        assert_eq!(monitor.pending_count().await, 1);
    }

    #[tokio::test]
    async fn expired_payment_is_swept_and_never_confirms() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::from_secs(7200)))
            .await;

        monitor.run_cycle().await;
        assert_eq!(monitor.pending_count().await, 0);

        // A matching transfer arriving after expiry is of no interest.
        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);
        monitor.run_cycle().await;
        assert!(confirmed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn wallet_outage_skips_cycle_without_state_changes() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::from_secs(7200)))
            .await;
        wallet.set_unavailable();

        monitor.run_cycle().await;

        // No event, and not even the expiry sweep ran.
        assert!(confirmed_rx.try_recv().is_err());
        assert_eq!(monitor.pending_count().await, 1);

        // The next cycle proceeds normally once the wallet recovers.
        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);
        monitor.run_cycle().await;
        assert_eq!(confirmed_rx.try_recv().unwrap().txid, "t1");
    }

    #[tokio::test]
    async fn last_registration_wins_for_a_payment_id() {
        let (wallet, monitor, mut confirmed_rx) = setup();
        monitor
            .register_payment(pending("p1", "v1", "0.1", Duration::ZERO))
            .await;
        let mut replacement = pending("p1", "v2", "0.1", Duration::ZERO);
        replacement.message = "replaced".into();
        monitor.register_payment(replacement).await;
        assert_eq!(monitor.pending_count().await, 1);

        wallet.set_transfers(vec![transfer("t1", "p1", "0.1", 1)]);
        monitor.run_cycle().await;

        let confirmed = confirmed_rx.try_recv().unwrap();
        assert_eq!(confirmed.topic_id, "v2");
        assert_eq!(confirmed.message, "replaced");
    }

    #[tokio::test]
    async fn empty_payment_id_is_rejected() {
        let (_wallet, monitor, _confirmed_rx) = setup();
        monitor
            .register_payment(pending("", "v1", "0.1", Duration::ZERO))
            .await;
        assert_eq!(monitor.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn start_monitoring_is_idempotent() {
        let (wallet, monitor, _confirmed_rx) = setup();

        monitor.start_monitoring(Duration::from_secs(10)).await;
        monitor.start_monitoring(Duration::from_secs(10)).await;

        // Immediate tick plus ticks at 10s, 20s and 30s. A second
        // polling loop would roughly double the count.
        tokio::time::sleep(Duration::from_secs(35)).await;
        monitor.stop_monitoring().await;

        let calls = wallet.fetch_count();
        assert!((3..=5).contains(&calls), "unexpected fetch count {calls}");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_monitoring_halts_polling() {
        let (wallet, monitor, _confirmed_rx) = setup();

        monitor.start_monitoring(Duration::from_secs(10)).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        monitor.stop_monitoring().await;

        let calls_at_stop = wallet.fetch_count();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(wallet.fetch_count(), calls_at_stop);

        // Safe to call again when not running.
        monitor.stop_monitoring().await;
    }
}
