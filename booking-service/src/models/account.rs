//! Customer and partner account documents.
//!
//! `wallet_balance_paise` is denormalized: it must always equal the signed
//! sum of the account's completed ledger entries. It is mutated only through
//! `services::wallet`, never by handlers.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub wallet_balance_paise: i64,
    pub device_token: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub wallet_balance_paise: i64,
    /// Running-average aggregate over the ratings of completed jobs.
    pub rating: f64,
    pub device_token: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
