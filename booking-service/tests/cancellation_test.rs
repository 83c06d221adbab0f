//! Cancellation settlement tests: charges, refunds, clawbacks and child
//! bookings, end to end.

mod common;

use booking_service::models::CancellationFeeRecord;
use common::{slot_hours_from_now, test_address, TestApp};
use serde_json::{json, Value};
use uuid::Uuid;

/// Rs 1000 wallet booking scheduled `hours_out` ahead, with the partner
/// already assigned. Returns (booking id, customer, partner).
async fn scheduled_booking(app: &TestApp, hours_out: f64) -> (String, Uuid, Uuid) {
    let customer = app.seed_customer(200_000).await;
    let partner = app.seed_partner(100_000).await;
    let product = app.seed_product(100_000).await;

    let response = app
        .client
        .post(format!("{}/bookings", app.address))
        .json(&json!({
            "customer_id": customer,
            "items": [{ "product_id": product, "quantity": 1 }],
            "schedule_for": slot_hours_from_now(hours_out),
            "payment_method": "wallet",
            "address": test_address(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let booking: Value = response.json().await.unwrap();
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let response = app
        .client
        .post(format!("{}/bookings/{}/assign", app.address, booking_id))
        .json(&json!({ "partner_id": partner }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    (booking_id, customer, partner)
}

async fn cancel(app: &TestApp, booking_id: &str, by: &str) -> reqwest::Response {
    app.client
        .post(format!("{}/bookings/{}/cancel", app.address, booking_id))
        .json(&json!({ "cancelled_by": by }))
        .send()
        .await
        .unwrap()
}

async fn fee_records(app: &TestApp, booking_id: &str) -> Vec<CancellationFeeRecord> {
    use futures::TryStreamExt;
    app.db
        .collection::<CancellationFeeRecord>("cancellation_fees")
        .find(mongodb::bson::doc! { "booking_id": booking_id }, None)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn customer_cancelling_in_the_last_hour_pays_the_fee() {
    let Some(app) = TestApp::spawn().await else { return };

    // After payment (100_000) and commission (15_000): customer 100_000,
    // partner 85_000.
    let (booking_id, customer, partner) = scheduled_booking(&app, 0.5).await;

    let response = cancel(&app, &booking_id, "customer").await;
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["customer_charge_paise"], 10_000);
    assert_eq!(outcome["partner_charge_paise"], 0);
    assert_eq!(outcome["customer_refund_paise"], 90_000);
    // Commission back in full, plus the customer's penalty.
    assert_eq!(outcome["partner_delta_paise"], 25_000);
    assert_eq!(outcome["booking"]["status"], "cancelled");
    assert_eq!(outcome["booking"]["service_status"], "cancelled");
    assert_eq!(outcome["booking"]["cancelled_by"], "customer");

    assert_eq!(app.customer_balance(customer).await, 190_000);
    assert_eq!(app.partner_balance(partner).await, 110_000);

    let fees = fee_records(&app, &booking_id).await;
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].amount_paise, 10_000);
    assert_eq!(fees[0].status.as_str(), "paid");
    assert_eq!(fees[0].charged_party.as_str(), "customer");

    // A second cancellation finds nothing to cancel.
    assert_eq!(cancel(&app, &booking_id, "customer").await.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn customer_cancelling_early_is_refunded_in_full() {
    let Some(app) = TestApp::spawn().await else { return };

    let (booking_id, customer, partner) = scheduled_booking(&app, 2.0).await;

    let response = cancel(&app, &booking_id, "customer").await;
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["customer_charge_paise"], 0);
    assert_eq!(outcome["customer_refund_paise"], 100_000);
    assert_eq!(outcome["partner_delta_paise"], 15_000);

    // Both parties end up exactly where they started.
    assert_eq!(app.customer_balance(customer).await, 200_000);
    assert_eq!(app.partner_balance(partner).await, 100_000);
    assert!(fee_records(&app, &booking_id).await.is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn partner_cancelling_late_compensates_the_customer() {
    let Some(app) = TestApp::spawn().await else { return };

    let (booking_id, customer, partner) = scheduled_booking(&app, 2.0).await;

    let response = cancel(&app, &booking_id, "partner").await;
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["partner_charge_paise"], 15_000);
    // Full refund plus the partner's penalty.
    assert_eq!(outcome["customer_refund_paise"], 115_000);
    // Commission 15_000 netted exactly against the 15_000 charge.
    assert_eq!(outcome["partner_delta_paise"], 0);
    assert!(outcome["child_booking_id"].is_null());

    assert_eq!(app.customer_balance(customer).await, 215_000);
    assert_eq!(app.partner_balance(partner).await, 85_000);

    let fees = fee_records(&app, &booking_id).await;
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].charged_party.as_str(), "partner");
    assert_eq!(fees[0].amount_paise, 15_000);

    app.cleanup().await;
}

#[tokio::test]
async fn partner_cancelling_in_the_last_hour_pays_out_of_the_wallet() {
    let Some(app) = TestApp::spawn().await else { return };

    let (booking_id, customer, partner) = scheduled_booking(&app, 0.5).await;

    let response = cancel(&app, &booking_id, "partner").await;
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["partner_charge_paise"], 25_000);
    assert_eq!(outcome["customer_refund_paise"], 125_000);
    // The charge exceeds the commission: 10_000 more comes out of the
    // partner wallet as a cancellation_charge debit.
    assert_eq!(outcome["partner_delta_paise"], -10_000);

    assert_eq!(app.customer_balance(customer).await, 225_000);
    assert_eq!(app.partner_balance(partner).await, 75_000);

    use booking_service::models::LedgerEntry;
    let entry = app
        .db
        .collection::<LedgerEntry>("partner_transactions")
        .find_one(
            mongodb::bson::doc! {
                "booking_id": &booking_id,
                "transaction_type": "cancellation_charge",
            },
            None,
        )
        .await
        .unwrap()
        .expect("debit should carry its own ledger row");
    assert_eq!(entry.amount_paise, 10_000);

    app.cleanup().await;
}

#[tokio::test]
async fn partner_cancelling_early_spawns_a_child_booking() {
    let Some(app) = TestApp::spawn().await else { return };

    let (booking_id, customer, partner) = scheduled_booking(&app, 5.0).await;

    let response = cancel(&app, &booking_id, "partner").await;
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["partner_charge_paise"], 0);
    // The payment carries over to the child; nothing flows back.
    assert_eq!(outcome["customer_refund_paise"], 0);
    assert_eq!(outcome["partner_delta_paise"], 15_000);

    let child_id = outcome["child_booking_id"]
        .as_str()
        .expect("child booking expected")
        .to_string();

    let response = app
        .client
        .get(format!("{}/bookings/{}", app.address, child_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let child: Value = response.json().await.unwrap();
    assert_eq!(child["status"], "pending");
    assert_eq!(child["service_status"], "pending");
    assert_eq!(child["payment_status"], "completed");
    assert_eq!(child["final_price_paise"], 100_000);
    assert_eq!(child["partners"].as_array().unwrap().len(), 0);

    // Customer keeps the paid-for child; partner gets the commission back.
    assert_eq!(app.customer_balance(customer).await, 100_000);
    assert_eq!(app.partner_balance(partner).await, 100_000);
    assert!(fee_records(&app, &booking_id).await.is_empty());

    // A second early partner on the child can take the job over.
    let second = app.seed_partner(100_000).await;
    let response = app
        .client
        .post(format!("{}/bookings/{}/assign", app.address, child_id))
        .json(&json!({ "partner_id": second }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let assigned: Value = response.json().await.unwrap();
    assert_eq!(assigned["service_status"], "scheduled");

    app.cleanup().await;
}

#[tokio::test]
async fn cancelling_a_pending_booking_skips_settlement() {
    let Some(app) = TestApp::spawn().await else { return };

    let customer = app.seed_customer(200_000).await;
    let product = app.seed_product(100_000).await;

    let response = app
        .client
        .post(format!("{}/bookings", app.address))
        .json(&json!({
            "customer_id": customer,
            "items": [{ "product_id": product, "quantity": 1 }],
            "schedule_for": slot_hours_from_now(0.5),
            "payment_method": "wallet",
            "address": test_address(),
        }))
        .send()
        .await
        .unwrap();
    let booking: Value = response.json().await.unwrap();
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let response = cancel(&app, &booking_id, "customer").await;
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    // No partner was ever charged a commission, so nothing settles.
    assert_eq!(outcome["customer_charge_paise"], 0);
    assert_eq!(outcome["customer_refund_paise"], 0);
    assert_eq!(outcome["partner_delta_paise"], 0);
    assert!(fee_records(&app, &booking_id).await.is_empty());

    app.cleanup().await;
}
