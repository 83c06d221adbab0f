//! Request/response DTOs for the HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    AppliedOffer, AssignedPartner, Booking, BookingStatus, CancelledBy, Discount, EntryStatus,
    Gateway, LedgerEntry, LineItem, PaymentMethod, PaymentStatus, ScheduleSlot, ServiceAddress,
    ServiceStatus, TransactionType,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub customer_id: Uuid,
    #[validate(length(min = 1, message = "at least one line item is required"), nested)]
    pub items: Vec<BookingItemRequest>,
    pub schedule_for: ScheduleSlot,
    pub payment_method: PaymentMethod,
    pub discount: Option<Discount>,
    pub offer: Option<AppliedOffer>,
    #[validate(nested)]
    pub address: AddressRequest,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BookingItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: u32,
    pub variant: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1))]
    pub line1: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 6, max = 6))]
    pub pincode: String,
}

impl From<AddressRequest> for ServiceAddress {
    fn from(a: AddressRequest) -> Self {
        ServiceAddress {
            line1: a.line1,
            city: a.city,
            pincode: a.pincode,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignPartnerRequest {
    pub partner_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CancelBookingRequest {
    pub cancelled_by: CancelledBy,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RatingRequest {
    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: f64,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub partners: Vec<AssignedPartner>,
    pub items: Vec<LineItem>,
    pub transaction_id: Option<Uuid>,
    pub child_booking_id: Option<Uuid>,
    pub total_price_paise: i64,
    pub discount_paise: i64,
    pub final_price_paise: i64,
    pub status: BookingStatus,
    pub service_status: ServiceStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub schedule_for: ScheduleSlot,
    pub cancelled_by: Option<CancelledBy>,
    pub rating: f64,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            customer_id: b.customer_id,
            partners: b.partners,
            items: b.items,
            transaction_id: b.transaction_id,
            child_booking_id: b.child_booking_id,
            total_price_paise: b.total_price_paise,
            discount_paise: b.discount_paise,
            final_price_paise: b.final_price_paise,
            status: b.status,
            service_status: b.service_status,
            payment_status: b.payment_status,
            payment_method: b.payment_method,
            schedule_for: b.schedule_for,
            cancelled_by: b.cancelled_by,
            rating: b.rating,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelBookingResponse {
    pub booking: BookingResponse,
    pub customer_charge_paise: i64,
    pub partner_charge_paise: i64,
    pub customer_refund_paise: i64,
    pub gateway_refund_paise: i64,
    pub partner_delta_paise: i64,
    pub child_booking_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RechargeRequest {
    pub customer_id: Uuid,
    /// Amount in paise.
    #[validate(range(min = 100))]
    pub amount_paise: i64,
}

#[derive(Debug, Serialize)]
pub struct RechargeResponse {
    pub transaction_id: Uuid,
    pub gateway_order_id: String,
    pub amount_paise: i64,
    pub key_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub transaction_id: Uuid,
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub transaction_id: Uuid,
    pub status: EntryStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount_paise: i64,
    pub gateway: Gateway,
    pub status: EntryStatus,
    pub provider_order_id: Option<String>,
    pub created_at: String,
}

impl From<LedgerEntry> for TransactionResponse {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            account_id: e.account_id,
            booking_id: e.booking_id,
            transaction_type: e.transaction_type,
            amount_paise: e.amount_paise,
            gateway: e.gateway,
            status: e.status,
            provider_order_id: e.provider_order_id,
            created_at: e.created_at.to_string(),
        }
    }
}
