//! Refund settlement engine.
//!
//! Runs only when a booking that had reached `scheduled` is cancelled: by
//! then the partner commission has been taken and (except for cash) the
//! customer's money collected, so both sides need unwinding. `compute` is
//! pure; `SettlementEngine::settle` applies the result through the wallet
//! ledger with deterministic idempotency keys so either side can be retried
//! without double-posting.

use anyhow::anyhow;
use chrono::NaiveDateTime;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AccountKind, Booking, BookingStatus, CancellationFeeRecord, CancelledBy, EntryStatus,
    FeeStatus, Gateway, PaymentMethod, ServiceStatus, TransactionType,
};
use crate::services::cancellation::{self, RESCHEDULE_CUTOFF_HOURS};
use crate::services::commission;
use crate::services::gateway::GatewayClient;
use crate::services::metrics;
use crate::services::repository::BookingRepository;
use crate::services::wallet::{PostEntry, WalletLedger};

#[derive(Debug, Clone, Copy)]
pub struct SettlementInput {
    pub final_price_paise: i64,
    pub commission_paise: i64,
    pub cancelled_by: CancelledBy,
    pub customer_charge_paise: i64,
    pub partner_charge_paise: i64,
    pub hours_until_service: f64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCharge {
    pub party: CancelledBy,
    pub amount_paise: i64,
    pub status: FeeStatus,
}

/// Computed money movements for one cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    /// Credited to the customer wallet immediately.
    pub customer_wallet_credit_paise: i64,
    /// Queued for out-of-band refund on the gateway rail.
    pub gateway_refund_paise: i64,
    /// Signed partner wallet delta: positive credits back commission,
    /// negative claws the excess charge out of the wallet.
    pub partner_delta_paise: i64,
    pub customer_fee: Option<FeeCharge>,
    pub partner_fee: Option<FeeCharge>,
    /// Partner cancelled early enough that the job is re-offered as a fresh
    /// child booking.
    pub spawn_child: bool,
}

pub fn compute(input: &SettlementInput) -> Settlement {
    let spawn_child = input.cancelled_by == CancelledBy::Partner
        && input.hours_until_service > RESCHEDULE_CUTOFF_HOURS;

    // The payment carries over to the child booking; cash bookings never
    // collected anything to give back.
    let refund_base = if spawn_child || input.payment_method == PaymentMethod::Cash {
        0
    } else {
        input.final_price_paise
    };

    // The partner's penalty flows to the customer as compensation.
    let available = refund_base + input.partner_charge_paise;

    let (customer_fee, customer_total) = if input.customer_charge_paise > 0 {
        if available >= input.customer_charge_paise {
            (
                Some(FeeCharge {
                    party: CancelledBy::Customer,
                    amount_paise: input.customer_charge_paise,
                    status: FeeStatus::Paid,
                }),
                available - input.customer_charge_paise,
            )
        } else {
            // No credit to net the fee against; it stays receivable.
            (
                Some(FeeCharge {
                    party: CancelledBy::Customer,
                    amount_paise: input.customer_charge_paise,
                    status: FeeStatus::Pending,
                }),
                available,
            )
        }
    } else {
        (None, available)
    };

    let (customer_wallet_credit_paise, gateway_refund_paise) =
        if input.payment_method == PaymentMethod::Gateway && !spawn_child {
            (0, customer_total)
        } else {
            (customer_total, 0)
        };

    let partner_delta_paise =
        input.commission_paise - input.partner_charge_paise + input.customer_charge_paise;

    let partner_fee = (input.partner_charge_paise > 0).then_some(FeeCharge {
        party: CancelledBy::Partner,
        amount_paise: input.partner_charge_paise,
        // Partner fees are wallet-backed: netted against the commission
        // clawback or debited directly.
        status: FeeStatus::Paid,
    });

    Settlement {
        customer_wallet_credit_paise,
        gateway_refund_paise,
        partner_delta_paise,
        customer_fee,
        partner_fee,
        spawn_child,
    }
}

#[derive(Debug)]
pub struct SettlementOutcome {
    pub settlement: Settlement,
    pub customer_charge_paise: i64,
    pub partner_charge_paise: i64,
    pub child_booking_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct SettlementEngine {
    repository: BookingRepository,
    wallet: WalletLedger,
    gateway: GatewayClient,
}

impl SettlementEngine {
    pub fn new(
        repository: BookingRepository,
        wallet: WalletLedger,
        gateway: GatewayClient,
    ) -> Self {
        Self {
            repository,
            wallet,
            gateway,
        }
    }

    /// Settle a cancellation. `booking` is the pre-cancellation snapshot of
    /// a booking that had reached `scheduled`.
    pub async fn settle(
        &self,
        booking: &Booking,
        cancelled_by: CancelledBy,
        now: NaiveDateTime,
    ) -> Result<SettlementOutcome, AppError> {
        let partner_id = booking
            .assigned_partner()
            .map(|p| p.partner_id)
            .ok_or_else(|| {
                AppError::InternalError(anyhow!("scheduled booking has no assigned partner"))
            })?;

        let hours = cancellation::hours_until(&booking.schedule_for, now)
            .map_err(AppError::BadRequest)?;
        let customer_charge = match cancelled_by {
            CancelledBy::Customer => cancellation::charge_paise(cancelled_by, hours),
            CancelledBy::Partner => 0,
        };
        let partner_charge = match cancelled_by {
            CancelledBy::Partner => cancellation::charge_paise(cancelled_by, hours),
            CancelledBy::Customer => 0,
        };

        let settlement = compute(&SettlementInput {
            final_price_paise: booking.final_price_paise,
            commission_paise: commission::commission_amount_paise(booking.final_price_paise),
            cancelled_by,
            customer_charge_paise: customer_charge,
            partner_charge_paise: partner_charge,
            hours_until_service: hours,
            payment_method: booking.payment_method,
        });

        tracing::info!(
            booking_id = %booking.id,
            cancelled_by = cancelled_by.as_str(),
            hours_until_service = hours,
            customer_charge_paise = customer_charge,
            partner_charge_paise = partner_charge,
            customer_wallet_credit_paise = settlement.customer_wallet_credit_paise,
            gateway_refund_paise = settlement.gateway_refund_paise,
            partner_delta_paise = settlement.partner_delta_paise,
            spawn_child = settlement.spawn_child,
            "Settling cancelled booking"
        );

        self.apply_customer_side(booking, &settlement).await?;
        self.apply_partner_side(booking, partner_id, &settlement)
            .await?;
        self.record_fees(booking, &settlement).await?;

        let child_booking_id = if settlement.spawn_child {
            Some(self.spawn_child_booking(booking).await?)
        } else {
            None
        };

        Ok(SettlementOutcome {
            settlement,
            customer_charge_paise: customer_charge,
            partner_charge_paise: partner_charge,
            child_booking_id,
        })
    }

    async fn apply_customer_side(
        &self,
        booking: &Booking,
        settlement: &Settlement,
    ) -> Result<(), AppError> {
        if settlement.customer_wallet_credit_paise > 0 {
            match self
                .wallet
                .credit(
                    AccountKind::Customer,
                    PostEntry {
                        account_id: booking.customer_id,
                        booking_id: Some(booking.id),
                        transaction_type: TransactionType::BookingRefund,
                        amount_paise: settlement.customer_wallet_credit_paise,
                        gateway: Gateway::Wallet,
                        provider_order_id: None,
                        idempotency_key: Some(format!("settle:{}:customer", booking.id)),
                    },
                )
                .await
            {
                Ok(_) => {}
                // Already posted by an earlier attempt; the retry is a no-op.
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
            metrics::record_settlement("customer", settlement.customer_wallet_credit_paise);
        }

        if settlement.gateway_refund_paise > 0 {
            self.queue_gateway_refund(booking, settlement.gateway_refund_paise)
                .await?;
            metrics::record_settlement("customer", settlement.gateway_refund_paise);
        }

        Ok(())
    }

    /// Gateway refunds settle out-of-band: a pending `booking_refund` entry
    /// records the queued amount, and the refund call itself is
    /// fire-and-logged — a gateway failure never rolls back local state.
    async fn queue_gateway_refund(
        &self,
        booking: &Booking,
        amount_paise: i64,
    ) -> Result<(), AppError> {
        let funding = match booking.transaction_id {
            Some(id) => self.wallet.find_entry(AccountKind::Customer, id).await?,
            None => None,
        };
        let (provider_order_id, provider_payment_id) = funding
            .map(|e| (e.provider_order_id, e.provider_payment_id))
            .unwrap_or((None, None));

        match self
            .wallet
            .post(
                AccountKind::Customer,
                PostEntry {
                    account_id: booking.customer_id,
                    booking_id: Some(booking.id),
                    transaction_type: TransactionType::BookingRefund,
                    amount_paise,
                    gateway: Gateway::Razorpay,
                    provider_order_id,
                    idempotency_key: Some(format!("settle:{}:customer", booking.id)),
                },
                EntryStatus::Pending,
            )
            .await
        {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => return Ok(()),
            Err(e) => return Err(e),
        }

        match provider_payment_id {
            Some(payment_id) => {
                if let Err(e) = self
                    .gateway
                    .refund_payment(&payment_id, amount_paise as u64)
                    .await
                {
                    tracing::error!(
                        booking_id = %booking.id,
                        payment_id = %payment_id,
                        amount_paise,
                        error = %e,
                        "Gateway refund call failed; entry stays pending for reconciliation"
                    );
                }
            }
            None => {
                tracing::warn!(
                    booking_id = %booking.id,
                    amount_paise,
                    "No provider payment id on funding entry; refund queued for manual settlement"
                );
            }
        }

        Ok(())
    }

    async fn apply_partner_side(
        &self,
        booking: &Booking,
        partner_id: Uuid,
        settlement: &Settlement,
    ) -> Result<(), AppError> {
        let delta = settlement.partner_delta_paise;
        if delta == 0 {
            return Ok(());
        }

        let (transaction_type, amount) = if delta > 0 {
            (TransactionType::BookingRefund, delta)
        } else {
            // Charge exceeds the commission already taken: the excess comes
            // out of the partner wallet, with its own ledger row.
            (TransactionType::CancellationCharge, -delta)
        };

        match self
            .wallet
            .post(
                AccountKind::Partner,
                PostEntry {
                    account_id: partner_id,
                    booking_id: Some(booking.id),
                    transaction_type,
                    amount_paise: amount,
                    gateway: Gateway::Wallet,
                    provider_order_id: None,
                    idempotency_key: Some(format!("settle:{}:partner", booking.id)),
                },
                EntryStatus::Completed,
            )
            .await
        {
            Ok(_) => {}
            Err(AppError::Conflict(_)) => return Ok(()),
            Err(e) => return Err(e),
        }
        metrics::record_settlement("partner", amount);
        Ok(())
    }

    async fn record_fees(
        &self,
        booking: &Booking,
        settlement: &Settlement,
    ) -> Result<(), AppError> {
        for fee in [settlement.customer_fee, settlement.partner_fee]
            .into_iter()
            .flatten()
        {
            let record = CancellationFeeRecord {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                charged_party: fee.party,
                amount_paise: fee.amount_paise,
                status: fee.status,
                created_at: mongodb::bson::DateTime::now(),
            };
            self.repository.insert_cancellation_fee(&record).await?;
        }
        Ok(())
    }

    /// Re-offer the job: a fresh booking copying customer, items, prices,
    /// schedule and the funding transaction. The original payment carries
    /// over, so the child starts life payable-free.
    async fn spawn_child_booking(&self, booking: &Booking) -> Result<Uuid, AppError> {
        let now = mongodb::bson::DateTime::now();
        let child = Booking {
            id: Uuid::new_v4(),
            customer_id: booking.customer_id,
            partners: Vec::new(),
            items: booking.items.clone(),
            transaction_id: booking.transaction_id,
            child_booking_id: None,
            total_price_paise: booking.total_price_paise,
            discount: booking.discount.clone(),
            discount_paise: booking.discount_paise,
            final_price_paise: booking.final_price_paise,
            offer: booking.offer.clone(),
            status: BookingStatus::Pending,
            service_status: ServiceStatus::Pending,
            payment_status: booking.payment_status,
            payment_method: booking.payment_method,
            schedule_for: booking.schedule_for.clone(),
            address: booking.address.clone(),
            cancelled_by: None,
            rating: 0.0,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            archived: false,
            created_at: now,
            updated_at: now,
        };

        self.repository.insert_booking(&child).await?;
        self.repository
            .link_child_booking(booking.id, child.id)
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            child_booking_id = %child.id,
            "Child booking spawned for re-offer"
        );

        Ok(child.id)
    }
}
