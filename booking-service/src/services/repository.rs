//! Booking repository.
//!
//! Every state transition repeats its precondition in the update filter, so
//! a booking that has already moved on simply doesn't match and surfaces as
//! not-found — a stale document and an absent one are indistinguishable to
//! the caller.

use anyhow::anyhow;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AssignedPartner, Booking, CancellationFeeRecord, Customer, Partner, Product,
};
use crate::services::lifecycle::Transition;

#[derive(Clone)]
pub struct BookingRepository {
    bookings: Collection<Booking>,
    customers: Collection<Customer>,
    partners: Collection<Partner>,
    products: Collection<Product>,
    cancellation_fees: Collection<CancellationFeeRecord>,
}

impl BookingRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            bookings: db.collection("bookings"),
            customers: db.collection("customers"),
            partners: db.collection("partners"),
            products: db.collection("products"),
            cancellation_fees: db.collection("cancellation_fees"),
        }
    }

    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        let customer_bookings_index = IndexModel::builder()
            .keys(doc! { "customer_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("customer_bookings_idx".to_string())
                    .build(),
            )
            .build();

        let open_bookings_index = IndexModel::builder()
            .keys(doc! { "service_status": 1, "archived": 1 })
            .options(
                IndexOptions::builder()
                    .name("open_bookings_idx".to_string())
                    .build(),
            )
            .build();

        self.bookings
            .create_indexes([customer_bookings_index, open_bookings_index], None)
            .await?;

        // One fee per (booking, charged party), enforced at the index level.
        let fee_index = IndexModel::builder()
            .keys(doc! { "booking_id": 1, "charged_party": 1 })
            .options(
                IndexOptions::builder()
                    .name("booking_party_fee_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.cancellation_fees.create_indexes([fee_index], None).await?;

        tracing::info!("Booking service indexes initialized");
        Ok(())
    }

    pub async fn insert_booking(&self, booking: &Booking) -> Result<(), AppError> {
        self.bookings.insert_one(booking, None).await?;
        Ok(())
    }

    pub async fn find_booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        let booking = self
            .bookings
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        Ok(booking)
    }

    /// Precondition filter shared by every transition update: the booking
    /// must still be exactly where the caller saw it.
    fn state_filter(booking: &Booking) -> Document {
        doc! {
            "_id": booking.id.to_string(),
            "status": booking.status.as_str(),
            "service_status": booking.service_status.as_str(),
            "payment_status": booking.payment_status.as_str(),
        }
    }

    fn transition_set(transition: &Transition) -> Document {
        doc! {
            "status": transition.status.as_str(),
            "service_status": transition.service_status.as_str(),
            "payment_status": transition.payment_status.as_str(),
            "updated_at": mongodb::bson::DateTime::now(),
        }
    }

    async fn apply_update(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<Booking, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.bookings
            .find_one_and_update(filter, update, options)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("booking not found")))
    }

    /// Apply a payment-confirmed / payment-failed transition.
    pub async fn apply_payment_transition(
        &self,
        booking: &Booking,
        transition: &Transition,
    ) -> Result<Booking, AppError> {
        self.apply_update(
            Self::state_filter(booking),
            doc! { "$set": Self::transition_set(transition) },
        )
        .await
    }

    /// Push the accepted partner and advance the statuses in one document
    /// update; the empty-partner-list precondition rides in the filter.
    pub async fn assign_partner(
        &self,
        booking: &Booking,
        transition: &Transition,
        partner_id: Uuid,
    ) -> Result<Booking, AppError> {
        let mut filter = Self::state_filter(booking);
        filter.insert("partners.0", doc! { "$exists": false });

        let partner = mongodb::bson::to_bson(&AssignedPartner {
            partner_id,
            rating: 0.0,
        })
        .map_err(|e| AppError::InternalError(e.into()))?;

        self.apply_update(
            filter,
            doc! {
                "$set": Self::transition_set(transition),
                "$push": { "partners": partner },
            },
        )
        .await
    }

    /// Best-effort rollback when the commission debit fails after the
    /// booking was already claimed for the partner.
    pub async fn unassign_partner(
        &self,
        booking_id: Uuid,
        partner_id: Uuid,
        previous: &Booking,
    ) -> Result<(), AppError> {
        let update = doc! {
            "$set": {
                "status": previous.status.as_str(),
                "service_status": previous.service_status.as_str(),
                "updated_at": mongodb::bson::DateTime::now(),
            },
            "$pull": { "partners": { "partner_id": partner_id.to_string() } },
        };
        self.bookings
            .update_one(doc! { "_id": booking_id.to_string() }, update, None)
            .await?;
        Ok(())
    }

    pub async fn start_service(
        &self,
        booking: &Booking,
        transition: &Transition,
    ) -> Result<Booking, AppError> {
        let mut set = Self::transition_set(transition);
        set.insert("started_at", mongodb::bson::DateTime::now());
        self.apply_update(Self::state_filter(booking), doc! { "$set": set })
            .await
    }

    pub async fn complete_service(
        &self,
        booking: &Booking,
        transition: &Transition,
    ) -> Result<Booking, AppError> {
        let mut set = Self::transition_set(transition);
        set.insert("completed_at", mongodb::bson::DateTime::now());
        // Completed bookings are soft-retired, never deleted.
        set.insert("archived", true);
        self.apply_update(Self::state_filter(booking), doc! { "$set": set })
            .await
    }

    /// Claim the cancellation: exactly one caller wins the conditional
    /// update, so settlement runs at most once per booking.
    pub async fn cancel_booking(
        &self,
        booking: &Booking,
        transition: &Transition,
    ) -> Result<Booking, AppError> {
        let mut set = Self::transition_set(transition);
        set.insert("cancelled_at", mongodb::bson::DateTime::now());
        if let Some(by) = transition.cancelled_by {
            set.insert("cancelled_by", by.as_str());
        }
        self.apply_update(Self::state_filter(booking), doc! { "$set": set })
            .await
    }

    pub async fn link_child_booking(
        &self,
        booking_id: Uuid,
        child_id: Uuid,
    ) -> Result<(), AppError> {
        self.bookings
            .update_one(
                doc! { "_id": booking_id.to_string() },
                doc! { "$set": {
                    "child_booking_id": child_id.to_string(),
                    "updated_at": mongodb::bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(())
    }

    /// Persist rating feedback on a completed booking.
    pub async fn store_booking_rating(
        &self,
        booking_id: Uuid,
        overall: f64,
        partner_rating: Option<f64>,
    ) -> Result<Booking, AppError> {
        let mut set = doc! {
            "rating": overall,
            "updated_at": mongodb::bson::DateTime::now(),
        };
        if let Some(rating) = partner_rating {
            set.insert("partners.0.rating", rating);
        }
        self.apply_update(
            doc! {
                "_id": booking_id.to_string(),
                "status": "completed",
            },
            doc! { "$set": set },
        )
        .await
    }

    pub async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        let customer = self
            .customers
            .find_one(
                doc! { "_id": id.to_string(), "is_active": true, "is_deleted": false },
                None,
            )
            .await?;
        Ok(customer)
    }

    pub async fn find_partner(&self, id: Uuid) -> Result<Option<Partner>, AppError> {
        let partner = self
            .partners
            .find_one(
                doc! { "_id": id.to_string(), "is_active": true, "is_deleted": false },
                None,
            )
            .await?;
        Ok(partner)
    }

    pub async fn set_partner_rating(&self, id: Uuid, rating: f64) -> Result<(), AppError> {
        self.partners
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "rating": rating,
                    "updated_at": mongodb::bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn find_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        let product = self
            .products
            .find_one(doc! { "_id": id.to_string(), "is_active": true }, None)
            .await?;
        Ok(product)
    }

    /// Bump the most-booked counter at checkout.
    pub async fn record_product_booked(&self, id: Uuid) -> Result<(), AppError> {
        self.products
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$inc": { "times_booked": 1 } },
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn set_product_rating(&self, id: Uuid, rating: f64) -> Result<(), AppError> {
        self.products
            .update_one(
                doc! { "_id": id.to_string() },
                doc! { "$set": {
                    "rating": rating,
                    "updated_at": mongodb::bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(())
    }

    /// Record a cancellation fee. Returns `false` when the (booking, party)
    /// pair was already recorded — a retried settlement, not an error.
    pub async fn insert_cancellation_fee(
        &self,
        record: &CancellationFeeRecord,
    ) -> Result<bool, AppError> {
        match self.cancellation_fees.insert_one(record, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => {
                tracing::warn!(
                    booking_id = %record.booking_id,
                    charged_party = record.charged_party.as_str(),
                    "Cancellation fee already recorded"
                );
                Ok(false)
            }
            Err(e) => Err(AppError::from(e)),
        }
    }

}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(e))
            if e.code == 11000
    )
}
