//! Wallet recharge, gateway confirmation and webhook handlers.

use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        RechargeRequest, RechargeResponse, TransactionResponse, VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    models::{AccountKind, EntryStatus, Gateway, TransactionType},
    services::gateway::PaymentVerification,
    services::lifecycle::{self, BookingEvent, BookingState},
    services::metrics,
    services::wallet::PostEntry,
    AppState,
};

/// Start a wallet recharge: one gateway order plus one pending `recharge`
/// ledger entry waiting on confirmation.
pub async fn recharge(
    State(state): State<AppState>,
    Json(payload): Json<RechargeRequest>,
) -> Result<(StatusCode, Json<RechargeResponse>), AppError> {
    payload.validate()?;

    let customer = state
        .repository
        .find_customer(payload.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("customer not found")))?;

    if !state.gateway.is_configured() {
        return Err(AppError::DependencyFailure(
            "payment gateway is not configured".to_string(),
        ));
    }

    let order = state
        .gateway
        .create_order(payload.amount_paise as u64, None)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create recharge order");
            AppError::DependencyFailure(e.to_string())
        })?;

    let entry = state
        .wallet
        .post(
            AccountKind::Customer,
            PostEntry {
                account_id: customer.id,
                booking_id: None,
                transaction_type: TransactionType::Recharge,
                amount_paise: payload.amount_paise,
                gateway: Gateway::Razorpay,
                provider_order_id: Some(order.id.clone()),
                idempotency_key: None,
            },
            EntryStatus::Pending,
        )
        .await?;

    tracing::info!(
        transaction_id = %entry.id,
        customer_id = %customer.id,
        amount_paise = payload.amount_paise,
        gateway_order_id = %order.id,
        "Recharge order created"
    );

    Ok((
        StatusCode::CREATED,
        Json(RechargeResponse {
            transaction_id: entry.id,
            gateway_order_id: order.id,
            amount_paise: payload.amount_paise,
            key_id: state.gateway.key_id().to_string(),
        }),
    ))
}

/// Client-side confirmation after checkout: verify the signature, resolve
/// the pending entry, and drive the booking's payment transition when the
/// entry funds one.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let entry = state
        .wallet
        .find_entry(AccountKind::Customer, payload.transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("transaction not found")))?;

    if entry.provider_order_id.as_deref() != Some(payload.order_id.as_str()) {
        tracing::warn!(
            transaction_id = %payload.transaction_id,
            expected_order_id = ?entry.provider_order_id,
            received_order_id = %payload.order_id,
            "Order id mismatch"
        );
        return Err(AppError::BadRequest(anyhow!(
            "order id does not match transaction"
        )));
    }

    let verification = PaymentVerification {
        order_id: payload.order_id.clone(),
        payment_id: payload.payment_id.clone(),
        signature: payload.signature.clone(),
    };
    let is_valid = state
        .gateway
        .verify_payment_signature(&verification)
        .map_err(|e| AppError::InternalError(anyhow!("signature verification failed: {e}")))?;

    let (outcome, message) = if is_valid {
        (EntryStatus::Completed, "Payment verified successfully")
    } else {
        (EntryStatus::Failed, "Payment verification failed")
    };

    let resolved = state
        .wallet
        .resolve(
            AccountKind::Customer,
            entry.id,
            outcome,
            Some(payload.payment_id.clone()),
        )
        .await?;

    if resolved.transaction_type == TransactionType::GatewayBooking {
        if let Some(booking_id) = resolved.booking_id {
            apply_booking_payment_outcome(&state, booking_id, is_valid).await;
        }
    }

    Ok(Json(VerifyPaymentResponse {
        transaction_id: resolved.id,
        status: resolved.status,
        message: message.to_string(),
    }))
}

/// Gateway webhook: the out-of-band event that resolves pending entries.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get("X-Razorpay-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing X-Razorpay-Signature header");
            AppError::BadRequest(anyhow!("missing webhook signature"))
        })?;

    let is_valid = state
        .gateway
        .verify_webhook_signature(&body, signature)
        .map_err(|e| AppError::InternalError(anyhow!("webhook verification failed: {e}")))?;
    if !is_valid {
        return Err(AppError::BadRequest(anyhow!("invalid webhook signature")));
    }

    let event = state.gateway.parse_webhook_event(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(anyhow!("invalid webhook payload"))
    })?;

    tracing::info!(event_type = %event.event, "Processing gateway webhook");

    match event.event.as_str() {
        "payment.captured" | "order.paid" => {
            if let Some(payment) = event.payload.payment.map(|p| p.entity) {
                if let Some(order_id) = payment.order_id.as_deref() {
                    resolve_by_order(&state, order_id, EntryStatus::Completed, Some(payment.id))
                        .await;
                }
            }
        }
        "payment.failed" => {
            if let Some(payment) = event.payload.payment.map(|p| p.entity) {
                if let Some(order_id) = payment.order_id.as_deref() {
                    resolve_by_order(&state, order_id, EntryStatus::Failed, Some(payment.id)).await;
                }
            }
        }
        "refund.processed" | "refund.created" => {
            tracing::info!(event_type = %event.event, "Refund webhook received");
        }
        _ => {
            tracing::debug!(event_type = %event.event, "Unhandled webhook event type");
        }
    }

    // Always acknowledge after signature verification.
    Ok(StatusCode::OK)
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, AppError> {
    let entry = state
        .wallet
        .find_entry(AccountKind::Customer, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("transaction not found")))?;
    Ok(Json(TransactionResponse::from(entry)))
}

pub async fn list_wallet_transactions(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, AppError> {
    let entries = state
        .wallet
        .list_for_account(AccountKind::Customer, customer_id, 50)
        .await?;
    Ok(Json(
        entries.into_iter().map(TransactionResponse::from).collect(),
    ))
}

/// Resolve the entry behind a gateway order id. Webhook retries land on an
/// already-terminal entry and are dropped as conflicts.
async fn resolve_by_order(
    state: &AppState,
    order_id: &str,
    outcome: EntryStatus,
    payment_id: Option<String>,
) {
    let entry = match state.wallet.find_by_provider_order(order_id).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            tracing::warn!(order_id = %order_id, "No transaction for webhook order");
            return;
        }
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "Webhook transaction lookup failed");
            return;
        }
    };

    match state
        .wallet
        .resolve(AccountKind::Customer, entry.id, outcome, payment_id)
        .await
    {
        Ok(resolved) => {
            if resolved.transaction_type == TransactionType::GatewayBooking {
                if let Some(booking_id) = resolved.booking_id {
                    apply_booking_payment_outcome(state, booking_id, outcome == EntryStatus::Completed)
                        .await;
                }
            }
        }
        Err(AppError::Conflict(_)) => {
            tracing::debug!(
                transaction_id = %entry.id,
                "Webhook retry on terminal transaction ignored"
            );
        }
        Err(e) => {
            tracing::error!(
                transaction_id = %entry.id,
                error = %e,
                "Failed to resolve transaction from webhook"
            );
        }
    }
}

/// Drive the booking state machine from a payment outcome. Failures are
/// logged, not surfaced: the ledger entry is already terminal and the
/// gateway has been acknowledged.
async fn apply_booking_payment_outcome(state: &AppState, booking_id: Uuid, success: bool) {
    let booking = match state.repository.find_booking(booking_id).await {
        Ok(Some(booking)) => booking,
        Ok(None) => {
            tracing::warn!(booking_id = %booking_id, "Funded booking not found");
            return;
        }
        Err(e) => {
            tracing::error!(booking_id = %booking_id, error = %e, "Booking lookup failed");
            return;
        }
    };

    let booking_state = BookingState {
        status: booking.status,
        service_status: booking.service_status,
        payment_status: booking.payment_status,
        has_partner: !booking.partners.is_empty(),
    };
    let event = if success {
        BookingEvent::PaymentCompleted
    } else {
        BookingEvent::PaymentFailed
    };

    let transition = match lifecycle::transition(&booking_state, event) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(
                booking_id = %booking_id,
                error = %e,
                "Payment outcome arrived for a booking past the pending state"
            );
            return;
        }
    };

    match state
        .repository
        .apply_payment_transition(&booking, &transition)
        .await
    {
        Ok(updated) => {
            tracing::info!(
                booking_id = %updated.id,
                payment_status = updated.payment_status.as_str(),
                service_status = updated.service_status.as_str(),
                "Booking payment outcome applied"
            );
            metrics::record_booking(if success { "paid" } else { "payment_failed" });
        }
        Err(e) => {
            tracing::error!(
                booking_id = %booking_id,
                error = %e,
                "Failed to apply payment outcome"
            );
        }
    }
}
