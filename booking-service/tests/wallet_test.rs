//! Wallet ledger tests: terminal entries are frozen, credits land exactly
//! once, and the webhook drives the booking payment transition.

mod common;

use booking_service::models::{
    Booking, BookingStatus, EntryStatus, Gateway, LedgerEntry, LineItem, Meridiem, PaymentMethod,
    PaymentStatus, ScheduleSlot, ServiceAddress, ServiceStatus, TransactionType,
};
use common::{TestApp, TEST_KEY_SECRET, TEST_WEBHOOK_SECRET};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn seed_pending_entry(
    app: &TestApp,
    customer_id: Uuid,
    booking_id: Option<Uuid>,
    transaction_type: TransactionType,
    amount_paise: i64,
    order_id: &str,
) -> Uuid {
    let now = mongodb::bson::DateTime::now();
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        account_id: customer_id,
        booking_id,
        transaction_type,
        amount_paise,
        gateway: Gateway::Razorpay,
        status: EntryStatus::Pending,
        provider_order_id: Some(order_id.to_string()),
        provider_payment_id: None,
        idempotency_key: None,
        created_at: now,
        updated_at: now,
    };
    app.db
        .collection::<LedgerEntry>("transactions")
        .insert_one(&entry, None)
        .await
        .expect("Failed to seed ledger entry");
    entry.id
}

async fn entry_status(app: &TestApp, id: Uuid) -> EntryStatus {
    app.db
        .collection::<LedgerEntry>("transactions")
        .find_one(mongodb::bson::doc! { "_id": id.to_string() }, None)
        .await
        .unwrap()
        .expect("entry missing")
        .status
}

#[tokio::test]
async fn a_verified_recharge_credits_the_wallet_exactly_once() {
    let Some(app) = TestApp::spawn().await else { return };

    let customer = app.seed_customer(0).await;
    let entry =
        seed_pending_entry(&app, customer, None, TransactionType::Recharge, 50_000, "order_w1")
            .await;

    let body = json!({
        "transaction_id": entry,
        "order_id": "order_w1",
        "payment_id": "pay_w1",
        "signature": sign("order_w1|pay_w1", TEST_KEY_SECRET),
    });

    let response = app
        .client
        .post(format!("{}/payments/verify", app.address))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let verified: Value = response.json().await.unwrap();
    assert_eq!(verified["status"], "completed");
    assert_eq!(app.customer_balance(customer).await, 50_000);

    // Re-submitting against the now-terminal entry is rejected and the
    // wallet is not credited twice.
    let response = app
        .client
        .post(format!("{}/payments/verify", app.address))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    assert_eq!(app.customer_balance(customer).await, 50_000);
    assert_eq!(entry_status(&app, entry).await.as_str(), "completed");

    app.cleanup().await;
}

#[tokio::test]
async fn a_bad_signature_fails_the_entry_and_freezes_it() {
    let Some(app) = TestApp::spawn().await else { return };

    let customer = app.seed_customer(0).await;
    let entry =
        seed_pending_entry(&app, customer, None, TransactionType::Recharge, 50_000, "order_w2")
            .await;

    let response = app
        .client
        .post(format!("{}/payments/verify", app.address))
        .json(&json!({
            "transaction_id": entry,
            "order_id": "order_w2",
            "payment_id": "pay_w2",
            "signature": "forged",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let verified: Value = response.json().await.unwrap();
    assert_eq!(verified["status"], "failed");
    assert_eq!(app.customer_balance(customer).await, 0);

    // Failed is just as terminal as completed.
    let response = app
        .client
        .post(format!("{}/payments/verify", app.address))
        .json(&json!({
            "transaction_id": entry,
            "order_id": "order_w2",
            "payment_id": "pay_w2",
            "signature": sign("order_w2|pay_w2", TEST_KEY_SECRET),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    assert_eq!(app.customer_balance(customer).await, 0);

    app.cleanup().await;
}

async fn seed_gateway_booking(app: &TestApp, customer_id: Uuid, order_id: &str) -> (Uuid, Uuid) {
    let booking_id = Uuid::new_v4();
    let entry = seed_pending_entry(
        app,
        customer_id,
        Some(booking_id),
        TransactionType::GatewayBooking,
        120_000,
        order_id,
    )
    .await;

    let now = mongodb::bson::DateTime::now();
    let booking = Booking {
        id: booking_id,
        customer_id,
        partners: Vec::new(),
        items: vec![LineItem {
            product_id: Uuid::new_v4(),
            name: "Bridal Makeup".to_string(),
            quantity: 1,
            unit_price_paise: 120_000,
            variant: None,
        }],
        transaction_id: Some(entry),
        child_booking_id: None,
        total_price_paise: 120_000,
        discount: None,
        discount_paise: 0,
        final_price_paise: 120_000,
        offer: None,
        status: BookingStatus::Pending,
        service_status: ServiceStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: PaymentMethod::Gateway,
        schedule_for: ScheduleSlot {
            date: "2026-12-01".parse().unwrap(),
            time: "10:00".to_string(),
            meridiem: Meridiem::Am,
        },
        address: ServiceAddress {
            line1: "12 MG Road".to_string(),
            city: "Bengaluru".to_string(),
            pincode: "560001".to_string(),
        },
        cancelled_by: None,
        rating: 0.0,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        archived: false,
        created_at: now,
        updated_at: now,
    };
    app.db
        .collection::<Booking>("bookings")
        .insert_one(&booking, None)
        .await
        .expect("Failed to seed booking");

    (booking_id, entry)
}

#[tokio::test]
async fn the_webhook_confirms_a_gateway_funded_booking() {
    let Some(app) = TestApp::spawn().await else { return };

    let customer = app.seed_customer(0).await;
    let (booking_id, entry) = seed_gateway_booking(&app, customer, "order_g1").await;

    let body = json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_g1",
                    "amount": 120000,
                    "status": "captured",
                    "order_id": "order_g1"
                }
            }
        }
    })
    .to_string();

    let response = app
        .client
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("X-Razorpay-Signature", sign(&body, TEST_WEBHOOK_SECRET))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(entry_status(&app, entry).await.as_str(), "completed");
    // A gateway_booking entry moves no wallet money.
    assert_eq!(app.customer_balance(customer).await, 0);

    let response = app
        .client
        .get(format!("{}/bookings/{}", app.address, booking_id))
        .send()
        .await
        .unwrap();
    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["payment_status"], "completed");
    // Still no partner, so the slot is not yet committed.
    assert_eq!(booking["service_status"], "pending");

    // Webhook retries land on a terminal entry and change nothing.
    let response = app
        .client
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("X-Razorpay-Signature", sign(&body, TEST_WEBHOOK_SECRET))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(app.customer_balance(customer).await, 0);

    app.cleanup().await;
}

#[tokio::test]
async fn the_webhook_rejects_a_forged_signature() {
    let Some(app) = TestApp::spawn().await else { return };

    let body = json!({ "event": "payment.captured", "payload": {} }).to_string();
    let response = app
        .client
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("X-Razorpay-Signature", "forged")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn a_failed_payment_kills_the_booking() {
    let Some(app) = TestApp::spawn().await else { return };

    let customer = app.seed_customer(0).await;
    let (booking_id, entry) = seed_gateway_booking(&app, customer, "order_g2").await;

    let body = json!({
        "event": "payment.failed",
        "payload": {
            "payment": {
                "entity": {
                    "id": "pay_g2",
                    "amount": 120000,
                    "status": "failed",
                    "order_id": "order_g2"
                }
            }
        }
    })
    .to_string();

    let response = app
        .client
        .post(format!("{}/webhooks/razorpay", app.address))
        .header("X-Razorpay-Signature", sign(&body, TEST_WEBHOOK_SECRET))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(entry_status(&app, entry).await.as_str(), "failed");

    let response = app
        .client
        .get(format!("{}/bookings/{}", app.address, booking_id))
        .send()
        .await
        .unwrap();
    let booking: Value = response.json().await.unwrap();
    assert_eq!(booking["status"], "failed");
    assert_eq!(booking["service_status"], "cancelled");
    assert_eq!(booking["payment_status"], "failed");

    app.cleanup().await;
}

#[tokio::test]
async fn the_wallet_statement_lists_entries_newest_first() {
    let Some(app) = TestApp::spawn().await else { return };

    let customer = app.seed_customer(0).await;
    seed_pending_entry(&app, customer, None, TransactionType::Recharge, 10_000, "order_s1").await;
    seed_pending_entry(&app, customer, None, TransactionType::Recharge, 20_000, "order_s2").await;

    let response = app
        .client
        .get(format!("{}/wallet/{}/transactions", app.address, customer))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let entries: Vec<Value> = response.json().await.unwrap();
    assert_eq!(entries.len(), 2);

    app.cleanup().await;
}
