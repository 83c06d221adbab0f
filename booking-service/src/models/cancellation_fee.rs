//! Cancellation fee records: one per charge actually levied.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::CancelledBy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    /// Netted immediately against a credit owed to the charged party.
    Paid,
    /// No credit existed to net against (e.g. cash-paid bookings); the fee
    /// remains receivable.
    Pending,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Paid => "paid",
            FeeStatus::Pending => "pending",
        }
    }
}

/// At most one record exists per (booking, charged party); a unique index
/// backs this up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationFeeRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub booking_id: Uuid,
    pub charged_party: CancelledBy,
    pub amount_paise: i64,
    pub status: FeeStatus,
    pub created_at: DateTime,
}
