//! Booking aggregate: the central document of the platform.
//!
//! A booking carries two independent lifecycle axes: `status` tracks the
//! commercial/payment outcome while `service_status` tracks fulfilment
//! progress. They are never collapsed into one; the legal combinations are
//! enforced by the state machine in `services::lifecycle`.

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Commercial/payment lifecycle of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Processing => "processing",
            BookingStatus::Completed => "completed",
            BookingStatus::Failed => "failed",
            BookingStatus::Refunded => "refunded",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal commercial states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Failed | BookingStatus::Cancelled
        )
    }
}

/// Fulfilment lifecycle of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Scheduled => "scheduled",
            ServiceStatus::Ongoing => "ongoing",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// How the customer pays for the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Wallet,
    Gateway,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Gateway => "gateway",
            PaymentMethod::Cash => "cash",
        }
    }
}

/// Which party cancelled the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Customer,
    Partner,
}

impl CancelledBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelledBy::Customer => "customer",
            CancelledBy::Partner => "partner",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Meridiem {
    Am,
    Pm,
}

impl Meridiem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Meridiem::Am => "AM",
            Meridiem::Pm => "PM",
        }
    }
}

/// The committed service slot: calendar date plus a 12-hour wall-clock time.
///
/// Stored exactly as captured from the client; `resolve` combines the three
/// parts into one instant for time-to-service calculations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub date: NaiveDate,
    /// 12-hour wall-clock time, e.g. "09:30".
    pub time: String,
    pub meridiem: Meridiem,
}

impl ScheduleSlot {
    pub fn resolve(&self) -> anyhow::Result<NaiveDateTime> {
        let clock = format!("{} {}", self.time, self.meridiem.as_str());
        let time = NaiveTime::parse_from_str(&clock, "%I:%M %p")
            .with_context(|| format!("invalid schedule time '{}'", clock))?;
        Ok(self.date.and_time(time))
    }
}

/// Discount applied at checkout, tagged by its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    Percentage { value: i64 },
    FlatAmount { amount_paise: i64 },
    Product { product_id: Uuid },
}

impl Discount {
    /// Paise knocked off `total_paise` for the given line items, clamped to
    /// the total so the final price never goes negative.
    pub fn amount_off_paise(&self, total_paise: i64, items: &[LineItem]) -> i64 {
        let raw = match self {
            Discount::Percentage { value } => total_paise * (*value).clamp(0, 100) / 100,
            Discount::FlatAmount { amount_paise } => (*amount_paise).max(0),
            Discount::Product { product_id } => items
                .iter()
                .filter(|item| item.product_id == *product_id)
                .map(LineItem::line_total_paise)
                .sum(),
        };
        raw.clamp(0, total_paise)
    }
}

/// Source of a discount, tagged by the collection it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedOffer {
    Membership { membership_id: Uuid },
    Offer { offer_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price_paise: i64,
    pub variant: Option<String>,
}

impl LineItem {
    pub fn line_total_paise(&self) -> i64 {
        self.unit_price_paise * i64::from(self.quantity)
    }
}

/// Partner attached to a booking, with the rating the customer gave them for
/// this booking (0 until rated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedPartner {
    pub partner_id: Uuid,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub line1: String,
    pub city: String,
    pub pincode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub customer_id: Uuid,
    /// At most one partner; enforced by the assignment gate.
    pub partners: Vec<AssignedPartner>,
    pub items: Vec<LineItem>,
    /// Ledger entry funding this booking.
    pub transaction_id: Option<Uuid>,
    /// Replacement booking spawned when a partner cancels early enough for
    /// the job to be re-offered.
    pub child_booking_id: Option<Uuid>,
    pub total_price_paise: i64,
    pub discount: Option<Discount>,
    pub discount_paise: i64,
    pub final_price_paise: i64,
    pub offer: Option<AppliedOffer>,
    pub status: BookingStatus,
    pub service_status: ServiceStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub schedule_for: ScheduleSlot,
    pub address: ServiceAddress,
    pub cancelled_by: Option<CancelledBy>,
    pub rating: f64,
    pub started_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
    pub cancelled_at: Option<DateTime>,
    pub archived: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    pub fn assigned_partner(&self) -> Option<&AssignedPartner> {
        self.partners.first()
    }

    pub fn has_partner(&self, partner_id: Uuid) -> bool {
        self.partners.iter().any(|p| p.partner_id == partner_id)
    }
}

/// Running-average fold used for booking, partner and product ratings.
///
/// First rating is taken as-is; each subsequent one is averaged pairwise
/// with the previous value. Deliberately weights recent ratings heavily;
/// kept bit-for-bit compatible with the historical aggregates.
pub fn fold_rating(previous: f64, submitted: f64) -> f64 {
    if previous == 0.0 {
        submitted
    } else {
        (previous + submitted) / 2.0
    }
}
