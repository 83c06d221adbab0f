//! Minimal read-mostly mirror of the service catalog.
//!
//! Owned upstream by the catalog service; this service reads price and name
//! at booking creation and folds rating/bookings-count feedback back in.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub unit_price_paise: i64,
    pub rating: f64,
    pub times_booked: i64,
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
