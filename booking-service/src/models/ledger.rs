//! Ledger entry model: one immutable-once-terminal record per money movement.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which wallet a ledger entry belongs to. Customer entries live in the
/// `transactions` collection, partner entries in `partner_transactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Customer,
    Partner,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Customer => "customer",
            AccountKind::Partner => "partner",
        }
    }
}

/// Wallet direction of an entry. Amounts are always stored positive; the
/// direction is implied by the transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Recharge,
    WalletBooking,
    GatewayBooking,
    CashBooking,
    BookingRefund,
    BookingConfirmation,
    CancellationCharge,
    ReferralBonus,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Recharge => "recharge",
            TransactionType::WalletBooking => "wallet_booking",
            TransactionType::GatewayBooking => "gateway_booking",
            TransactionType::CashBooking => "cash_booking",
            TransactionType::BookingRefund => "booking_refund",
            TransactionType::BookingConfirmation => "booking_confirmation",
            TransactionType::CancellationCharge => "cancellation_charge",
            TransactionType::ReferralBonus => "referral_bonus",
        }
    }

    /// Wallet effect implied by the type. `None` for movements that ride the
    /// gateway or cash rails and never touch the wallet balance.
    pub fn wallet_effect(&self) -> Option<Direction> {
        match self {
            TransactionType::Recharge
            | TransactionType::BookingRefund
            | TransactionType::ReferralBonus => Some(Direction::Credit),
            TransactionType::WalletBooking
            | TransactionType::BookingConfirmation
            | TransactionType::CancellationCharge => Some(Direction::Debit),
            TransactionType::GatewayBooking | TransactionType::CashBooking => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }

    /// Completed and failed entries are frozen; only pending ones may move.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }
}

/// Rail the money moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Razorpay,
    Wallet,
    Cash,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Razorpay => "razorpay",
            Gateway::Wallet => "wallet",
            Gateway::Cash => "cash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub account_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    /// Always positive; direction implied by `transaction_type`.
    pub amount_paise: i64,
    pub gateway: Gateway,
    pub status: EntryStatus,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl LedgerEntry {
    /// Signed wallet delta this entry applies once completed; zero when the
    /// type has no wallet effect.
    pub fn signed_wallet_amount(&self) -> i64 {
        match self.transaction_type.wallet_effect() {
            Some(Direction::Credit) => self.amount_paise,
            Some(Direction::Debit) => -self.amount_paise,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(transaction_type: TransactionType, amount_paise: i64) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            booking_id: None,
            transaction_type,
            amount_paise,
            gateway: Gateway::Wallet,
            status: EntryStatus::Completed,
            provider_order_id: None,
            provider_payment_id: None,
            idempotency_key: None,
            created_at: DateTime::now(),
            updated_at: DateTime::now(),
        }
    }

    #[test]
    fn credits_and_debits_follow_the_type() {
        assert_eq!(entry(TransactionType::Recharge, 500).signed_wallet_amount(), 500);
        assert_eq!(
            entry(TransactionType::BookingConfirmation, 500).signed_wallet_amount(),
            -500
        );
    }

    #[test]
    fn gateway_and_cash_entries_never_touch_the_wallet() {
        assert_eq!(entry(TransactionType::GatewayBooking, 500).signed_wallet_amount(), 0);
        assert_eq!(entry(TransactionType::CashBooking, 500).signed_wallet_amount(), 0);
    }
}
