//! Event channel plumbing between the monitor and the broadcaster.
//!
//! The monitor emits one [`ConfirmedPayment`](crate::payments::ConfirmedPayment)
//! per settled payment on an mpsc channel; the broadcaster consumes the
//! channel and fans each event out to the subscribers of its topic.

use crate::payments::ConfirmedPayment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// Enough to absorb a burst of confirmations from one reconciliation
/// cycle while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for ConfirmedPayment events.
pub type ConfirmedPaymentSender = mpsc::Sender<ConfirmedPayment>;
/// Receiver handle for ConfirmedPayment events.
pub type ConfirmedPaymentReceiver = mpsc::Receiver<ConfirmedPayment>;

/// Create a new ConfirmedPayment channel.
pub fn confirmed_payment_channel() -> (ConfirmedPaymentSender, ConfirmedPaymentReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// The event delivered to subscribers of a topic when a payment settles.
///
/// This is the wire shape pushed over WebSocket connections; it carries
/// only what the overlay needs to render the superchat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuperchatEvent {
    pub amount: Decimal,
    pub message: String,
    pub txid: String,
    pub confirmations: u64,
}

impl From<ConfirmedPayment> for SuperchatEvent {
    fn from(payment: ConfirmedPayment) -> Self {
        Self {
            amount: payment.amount,
            message: payment.message,
            txid: payment.txid,
            confirmations: payment.confirmations,
        }
    }
}
