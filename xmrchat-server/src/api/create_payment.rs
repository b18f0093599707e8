use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use xmrchat_core::payments::PendingPayment;
use xmrchat_core::wallet::WalletRpc;

use super::ApiError;
use crate::state::AppState;

/// Longest superchat message accepted.
const MAX_MESSAGE_LEN: usize = 512;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub video_id: String,
    pub amount: Decimal,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub address: String,
    pub payment_id: String,
    /// `monero:` URI embedding address and amount, for rendering as a
    /// scannable code by the client.
    pub qr_payload: String,
    pub amount: Decimal,
}

/// `POST /create-payment` — mint a receiving address for a superchat.
///
/// Asks the wallet for an integrated address (which embeds a fresh
/// payment id), registers the pending payment with the monitor, and
/// returns the address plus a payable `monero:` URI.
pub(super) async fn create_payment(
    state: State<AppState>,
    Json(body): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&body)?;

    let integrated = state.wallet.create_integrated_address(None).await?;

    state
        .monitor
        .register_payment(PendingPayment {
            payment_id: integrated.payment_id.clone(),
            topic_id: body.video_id,
            amount: body.amount,
            message: body.message,
            created_at: OffsetDateTime::now_utc(),
        })
        .await;

    let qr_payload = payment_uri(&integrated.address, body.amount);

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            address: integrated.address,
            payment_id: integrated.payment_id,
            qr_payload,
            amount: body.amount,
        }),
    ))
}

fn validate(body: &CreatePaymentRequest) -> Result<(), ApiError> {
    if body.video_id.trim().is_empty() {
        return Err(ApiError::Validation("video_id must not be empty"));
    }
    if body.message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty"));
    }
    if body.message.len() > MAX_MESSAGE_LEN {
        return Err(ApiError::Validation("message too long"));
    }
    if body.amount <= Decimal::ZERO {
        return Err(ApiError::Validation("amount must be positive"));
    }
    Ok(())
}

/// Build the payable URI the client renders as a QR code.
fn payment_uri(address: &str, amount: Decimal) -> String {
    format!("monero:{address}?tx_amount={amount}")
}
