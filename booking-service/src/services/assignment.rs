//! Partner assignment gate.
//!
//! A partner may take a pending booking only while solvent enough to cover
//! the commission about to be pre-debited plus a flat working-capital
//! floor. The solvency check is enforced twice: a friendly read up front,
//! then atomically inside the guarded wallet debit.

use anyhow::anyhow;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{AccountKind, Booking, Gateway, TransactionType};
use crate::services::commission;
use crate::services::lifecycle::{self, BookingEvent, BookingState};
use crate::services::repository::BookingRepository;
use crate::services::wallet::{PostEntry, WalletLedger};

/// Flat working-capital floor a partner must retain after the commission
/// debit.
pub const WORKING_CAPITAL_FLOOR_PAISE: i64 = 50_000;

/// Minimum wallet balance required to accept a booking at this price.
pub fn required_balance_paise(final_price_paise: i64) -> i64 {
    WORKING_CAPITAL_FLOOR_PAISE + commission::commission_amount_paise(final_price_paise)
}

#[derive(Clone)]
pub struct AssignmentGate {
    repository: BookingRepository,
    wallet: WalletLedger,
}

impl AssignmentGate {
    pub fn new(repository: BookingRepository, wallet: WalletLedger) -> Self {
        Self { repository, wallet }
    }

    /// Accept `partner_id` onto a pending booking: push the partner,
    /// pre-debit the commission, advance the state machine.
    pub async fn accept(&self, booking_id: Uuid, partner_id: Uuid) -> Result<Booking, AppError> {
        let partner = self
            .repository
            .find_partner(partner_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("partner not found")))?;

        let booking = self
            .repository
            .find_booking(booking_id)
            .await?
            .filter(|b| !b.archived)
            .ok_or_else(|| AppError::NotFound(anyhow!("booking not found")))?;

        // At most one partner per booking; a repeat accept from the same
        // partner is the same conflict.
        if !booking.partners.is_empty() {
            return Err(AppError::Conflict(anyhow!("partner already assigned")));
        }

        let state = BookingState {
            status: booking.status,
            service_status: booking.service_status,
            payment_status: booking.payment_status,
            has_partner: false,
        };
        let transition = lifecycle::transition(&state, BookingEvent::PartnerAssigned)?;

        let commission_paise = commission::commission_amount_paise(booking.final_price_paise);
        if partner.wallet_balance_paise < required_balance_paise(booking.final_price_paise) {
            return Err(AppError::Conflict(anyhow!(
                "insufficient wallet balance to accept this booking"
            )));
        }

        // Claim the booking first; the conditional update loses cleanly if
        // another partner got there in between.
        let updated = self
            .repository
            .assign_partner(&booking, &transition, partner_id)
            .await?;

        if commission_paise > 0 {
            let debit = self
                .wallet
                .debit_guarded(
                    AccountKind::Partner,
                    PostEntry {
                        account_id: partner_id,
                        booking_id: Some(booking.id),
                        transaction_type: TransactionType::BookingConfirmation,
                        amount_paise: commission_paise,
                        gateway: Gateway::Wallet,
                        provider_order_id: None,
                        idempotency_key: Some(format!("assign:{}:{}", booking.id, partner_id)),
                    },
                    WORKING_CAPITAL_FLOOR_PAISE,
                )
                .await;

            if let Err(e) = debit {
                // The wallet drained between the pre-check and the debit;
                // give the booking back.
                if let Err(revert_err) = self
                    .repository
                    .unassign_partner(booking.id, partner_id, &booking)
                    .await
                {
                    tracing::error!(
                        booking_id = %booking.id,
                        partner_id = %partner_id,
                        error = %revert_err,
                        "Failed to revert partner assignment after debit failure"
                    );
                }
                return Err(e);
            }
        }

        tracing::info!(
            booking_id = %booking.id,
            partner_id = %partner_id,
            commission_paise,
            service_status = updated.service_status.as_str(),
            "Partner assignment accepted"
        );

        Ok(updated)
    }
}
