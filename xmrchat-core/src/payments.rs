//! Payment records tracked by the monitor.
//!
//! A [`PendingPayment`] is registered when a viewer requests a payment
//! address and lives until it is either matched against an incoming
//! transfer or swept by the expiry pass. A [`ConfirmedPayment`] is the
//! pending record enriched with the transfer that settled it, emitted
//! exactly once per transaction id.

use rust_decimal::Decimal;
use time::OffsetDateTime;

/// An expected, not-yet-confirmed payment.
///
/// Records are never mutated in place: re-registering the same
/// `payment_id` replaces the whole record.
#[derive(Debug, Clone)]
pub struct PendingPayment {
    /// Wallet-minted payment identifier, the correlation key.
    pub payment_id: String,
    /// Logical channel the confirmation is routed to (a video id).
    pub topic_id: String,
    /// Amount the viewer promised to send, in XMR.
    pub amount: Decimal,
    /// Viewer-supplied superchat message.
    pub message: String,
    /// When the payment was registered, used for expiry.
    pub created_at: OffsetDateTime,
}

/// A pending payment matched to an incoming transfer.
#[derive(Debug, Clone)]
pub struct ConfirmedPayment {
    pub payment_id: String,
    pub topic_id: String,
    pub amount: Decimal,
    pub message: String,
    pub created_at: OffsetDateTime,
    /// Transaction id of the settling transfer.
    pub txid: String,
    /// Confirmation count observed when the payment settled.
    pub confirmations: u64,
    /// Wallet-reported time of the settling transfer.
    pub confirmed_at: OffsetDateTime,
}

impl ConfirmedPayment {
    /// Build a confirmed record from the pending record and the transfer
    /// that settled it.
    pub fn settle(pending: PendingPayment, txid: String, confirmations: u64, confirmed_at: OffsetDateTime) -> Self {
        Self {
            payment_id: pending.payment_id,
            topic_id: pending.topic_id,
            amount: pending.amount,
            message: pending.message,
            created_at: pending.created_at,
            txid,
            confirmations,
            confirmed_at,
        }
    }
}
