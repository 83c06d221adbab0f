//! Booking lifecycle handlers.
//!
//! Handlers stay thin: fetch the document, run the pure state machine, and
//! let the repository's precondition-filtered update decide who wins a race.

use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        AssignPartnerRequest, BookingResponse, CancelBookingRequest, CancelBookingResponse,
        CreateBookingRequest, RatingRequest,
    },
    models::{
        fold_rating, AccountKind, Booking, BookingStatus, EntryStatus, Gateway, LineItem,
        PaymentMethod, PaymentStatus, ServiceStatus, TransactionType,
    },
    services::lifecycle::{self, BookingEvent, BookingState},
    services::metrics,
    services::notifier::Notification,
    services::wallet::PostEntry,
    AppState,
};

fn booking_state(booking: &Booking) -> BookingState {
    BookingState {
        status: booking.status,
        service_status: booking.service_status,
        payment_status: booking.payment_status,
        has_partner: !booking.partners.is_empty(),
    }
}

async fn load_booking(state: &AppState, id: Uuid) -> Result<Booking, AppError> {
    state
        .repository
        .find_booking(id)
        .await?
        .filter(|b| !b.archived)
        .ok_or_else(|| AppError::NotFound(anyhow!("booking not found")))
}

/// Create a booking from priced line items.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    payload.validate()?;

    let customer = state
        .repository
        .find_customer(payload.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("customer not found")))?;

    // Price every line from the catalog; the client only names products.
    let mut items = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let product = state
            .repository
            .find_product(item.product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("product not found")))?;
        items.push(LineItem {
            product_id: product.id,
            name: product.name,
            quantity: item.quantity,
            unit_price_paise: product.unit_price_paise,
            variant: item.variant.clone(),
        });
    }

    let total_price_paise: i64 = items.iter().map(LineItem::line_total_paise).sum();
    let discount_paise = payload
        .discount
        .as_ref()
        .map(|d| d.amount_off_paise(total_price_paise, &items))
        .unwrap_or(0);
    let final_price_paise = total_price_paise - discount_paise;

    let booking_id = Uuid::new_v4();
    let funding_key = format!("book:{}:funding", booking_id);

    // Collect (or commit to collecting) the money up front.
    let (payment_status, transaction_id) = match payload.payment_method {
        PaymentMethod::Wallet => {
            let entry = if final_price_paise > 0 {
                Some(
                    state
                        .wallet
                        .debit_guarded(
                            AccountKind::Customer,
                            PostEntry {
                                account_id: customer.id,
                                booking_id: Some(booking_id),
                                transaction_type: TransactionType::WalletBooking,
                                amount_paise: final_price_paise,
                                gateway: Gateway::Wallet,
                                provider_order_id: None,
                                idempotency_key: Some(funding_key),
                            },
                            0,
                        )
                        .await?,
                )
            } else {
                None
            };
            (PaymentStatus::Completed, entry.map(|e| e.id))
        }
        PaymentMethod::Gateway => {
            if final_price_paise > 0 {
                let order = state
                    .gateway
                    .create_order(final_price_paise as u64, Some(booking_id.to_string()))
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to create gateway order");
                        AppError::DependencyFailure(e.to_string())
                    })?;
                let entry = state
                    .wallet
                    .post(
                        AccountKind::Customer,
                        PostEntry {
                            account_id: customer.id,
                            booking_id: Some(booking_id),
                            transaction_type: TransactionType::GatewayBooking,
                            amount_paise: final_price_paise,
                            gateway: Gateway::Razorpay,
                            provider_order_id: Some(order.id),
                            idempotency_key: Some(funding_key),
                        },
                        EntryStatus::Pending,
                    )
                    .await?;
                (PaymentStatus::Pending, Some(entry.id))
            } else {
                (PaymentStatus::Completed, None)
            }
        }
        PaymentMethod::Cash => {
            // The slot is committed; the cash itself is collected at the
            // door, so the funding entry stays pending until completion.
            let entry = if final_price_paise > 0 {
                Some(
                    state
                        .wallet
                        .post(
                            AccountKind::Customer,
                            PostEntry {
                                account_id: customer.id,
                                booking_id: Some(booking_id),
                                transaction_type: TransactionType::CashBooking,
                                amount_paise: final_price_paise,
                                gateway: Gateway::Cash,
                                provider_order_id: None,
                                idempotency_key: Some(funding_key),
                            },
                            EntryStatus::Pending,
                        )
                        .await?,
                )
            } else {
                None
            };
            (PaymentStatus::Completed, entry.map(|e| e.id))
        }
    };

    let now = mongodb::bson::DateTime::now();
    let booking = Booking {
        id: booking_id,
        customer_id: customer.id,
        partners: Vec::new(),
        items,
        transaction_id,
        child_booking_id: None,
        total_price_paise,
        discount: payload.discount,
        discount_paise,
        final_price_paise,
        offer: payload.offer,
        status: BookingStatus::Pending,
        service_status: ServiceStatus::Pending,
        payment_status,
        payment_method: payload.payment_method,
        schedule_for: payload.schedule_for,
        address: payload.address.into(),
        cancelled_by: None,
        rating: 0.0,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        archived: false,
        created_at: now,
        updated_at: now,
    };

    state.repository.insert_booking(&booking).await?;

    for item in &booking.items {
        state
            .repository
            .record_product_booked(item.product_id)
            .await?;
    }

    tracing::info!(
        booking_id = %booking.id,
        customer_id = %booking.customer_id,
        final_price_paise = booking.final_price_paise,
        payment_method = booking.payment_method.as_str(),
        "Booking created"
    );
    metrics::record_booking("created");

    state.notifier.dispatch(
        customer.device_token,
        Notification {
            title: "Booking received".to_string(),
            body: "We're lining up a partner for your slot.".to_string(),
        },
    );

    Ok((StatusCode::CREATED, Json(BookingResponse::from(booking))))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .repository
        .find_booking(booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("booking not found")))?;
    Ok(Json(BookingResponse::from(booking)))
}

/// Partner accepts a pending booking.
pub async fn assign_partner(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<AssignPartnerRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.assignment.accept(booking_id, payload.partner_id).await?;

    if let Some(customer) = state.repository.find_customer(booking.customer_id).await? {
        state.notifier.dispatch(
            customer.device_token,
            Notification {
                title: "Partner assigned".to_string(),
                body: "A partner has accepted your booking.".to_string(),
            },
        );
    }

    Ok(Json(BookingResponse::from(booking)))
}

pub async fn start_service(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = load_booking(&state, booking_id).await?;
    let transition = lifecycle::transition(&booking_state(&booking), BookingEvent::ServiceStarted)?;
    let updated = state.repository.start_service(&booking, &transition).await?;

    tracing::info!(booking_id = %updated.id, "Service started");
    Ok(Json(BookingResponse::from(updated)))
}

pub async fn complete_service(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = load_booking(&state, booking_id).await?;
    let transition =
        lifecycle::transition(&booking_state(&booking), BookingEvent::ServiceCompleted)?;
    let updated = state
        .repository
        .complete_service(&booking, &transition)
        .await?;

    // Cash collected at the door: the funding entry resolves now.
    if booking.payment_method == PaymentMethod::Cash {
        if let Some(transaction_id) = booking.transaction_id {
            match state
                .wallet
                .resolve(AccountKind::Customer, transaction_id, EntryStatus::Completed, None)
                .await
            {
                Ok(_) => {}
                Err(AppError::Conflict(_)) => {
                    tracing::warn!(
                        booking_id = %booking.id,
                        transaction_id = %transaction_id,
                        "Cash funding entry was already resolved"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    tracing::info!(booking_id = %updated.id, "Service completed");
    metrics::record_booking("completed");

    if let Some(customer) = state.repository.find_customer(updated.customer_id).await? {
        state.notifier.dispatch(
            customer.device_token,
            Notification {
                title: "Service completed".to_string(),
                body: "Thanks for booking with us. Rate your experience!".to_string(),
            },
        );
    }

    Ok(Json(BookingResponse::from(updated)))
}

/// Cancel a booking. Settlement runs only when the booking had already been
/// scheduled; a still-pending one has taken no commission.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<CancelBookingRequest>,
) -> Result<Json<CancelBookingResponse>, AppError> {
    let booking = load_booking(&state, booking_id).await?;
    let transition = lifecycle::transition(
        &booking_state(&booking),
        BookingEvent::Cancel(payload.cancelled_by),
    )?;

    // Claim the cancellation; exactly one caller wins this update.
    let cancelled = state.repository.cancel_booking(&booking, &transition).await?;

    let mut response = CancelBookingResponse {
        booking: BookingResponse::from(cancelled),
        customer_charge_paise: 0,
        partner_charge_paise: 0,
        customer_refund_paise: 0,
        gateway_refund_paise: 0,
        partner_delta_paise: 0,
        child_booking_id: None,
    };

    if transition.settle {
        let outcome = state
            .settlement
            .settle(&booking, payload.cancelled_by, Utc::now().naive_utc())
            .await?;
        response.customer_charge_paise = outcome.customer_charge_paise;
        response.partner_charge_paise = outcome.partner_charge_paise;
        response.customer_refund_paise = outcome.settlement.customer_wallet_credit_paise;
        response.gateway_refund_paise = outcome.settlement.gateway_refund_paise;
        response.partner_delta_paise = outcome.settlement.partner_delta_paise;
        response.child_booking_id = outcome.child_booking_id;
        response.booking.child_booking_id = outcome.child_booking_id;
    }

    tracing::info!(
        booking_id = %booking_id,
        cancelled_by = payload.cancelled_by.as_str(),
        settled = transition.settle,
        "Booking cancelled"
    );
    metrics::record_booking("cancelled");

    if let Some(customer) = state.repository.find_customer(booking.customer_id).await? {
        state.notifier.dispatch(
            customer.device_token,
            Notification {
                title: "Booking cancelled".to_string(),
                body: "Your booking has been cancelled.".to_string(),
            },
        );
    }

    Ok(Json(response))
}

/// Rating feedback on a completed booking: a pairwise running-average fold
/// applied to the booking, its partner and each booked product.
pub async fn rate_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    payload.validate()?;

    let booking = state
        .repository
        .find_booking(booking_id)
        .await?
        .filter(|b| b.status == BookingStatus::Completed)
        .ok_or_else(|| AppError::NotFound(anyhow!("booking not found")))?;

    let overall = fold_rating(booking.rating, payload.rating);
    let partner = booking.assigned_partner().cloned();
    let partner_rating = partner
        .as_ref()
        .map(|p| fold_rating(p.rating, payload.rating));

    let updated = state
        .repository
        .store_booking_rating(booking.id, overall, partner_rating)
        .await?;

    if let Some(assigned) = partner {
        if let Some(account) = state.repository.find_partner(assigned.partner_id).await? {
            state
                .repository
                .set_partner_rating(account.id, fold_rating(account.rating, payload.rating))
                .await?;
        }
    }

    for item in &booking.items {
        if let Some(product) = state.repository.find_product(item.product_id).await? {
            state
                .repository
                .set_product_rating(product.id, fold_rating(product.rating, payload.rating))
                .await?;
        }
    }

    tracing::info!(
        booking_id = %booking.id,
        rating = payload.rating,
        folded = overall,
        "Rating recorded"
    );

    Ok(Json(BookingResponse::from(updated)))
}
