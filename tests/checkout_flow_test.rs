//! Checkout, payment confirmation and gateway webhooks.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, shipping_address, TestApp, KEY_SECRET, WEBHOOK_SECRET};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::str::FromStr;
use stonecraft_api::entities::order::{OrderStatus, PaymentStatus};
use stonecraft_api::gateway::{sign, GatewayPaymentStatus};
use stonecraft_api::services::pricing::minor_units;
use uuid::Uuid;

fn money(value: &serde_json::Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("money is serialized as a string")).expect("decimal")
}

async fn place_order(app: &TestApp, token: &str, product_id: Uuid, method: &str) -> serde_json::Value {
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": 2 }],
                "shipping_address": shipping_address(),
                "payment_method": method
            })),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await
}

#[tokio::test]
async fn cod_order_is_priced_from_the_catalog() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Elephant", dec!(1500)).await;

    let body = place_order(&app, &token, product.id, "cod").await;
    let order = &body["data"]["order"];

    assert!(body["success"].as_bool().unwrap());
    assert!(body["data"]["checkout"].is_null());
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
    assert_eq!(money(&order["subtotal"]), dec!(3000));
    assert_eq!(order["items"][0]["quantity"], 2);
    assert!(money(&order["total"]) >= dec!(3000));
}

#[tokio::test]
async fn order_requires_authentication() {
    let app = TestApp::new().await;
    let product = app.seed_product("Onyx Bowl", dec!(800)).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": shipping_address(),
                "payment_method": "cod"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_without_any_address_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Sandstone Lamp", dec!(900)).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "payment_method": "cod"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["status"], 400);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn online_order_returns_checkout_details() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Carrara Buddha", dec!(12000)).await;

    let body = place_order(&app, &token, product.id, "razorpay").await;
    let checkout = &body["data"]["checkout"];

    assert_eq!(checkout["key_id"], "rzp_test_key");
    assert!(checkout["gateway_order_id"].as_str().unwrap().starts_with("order_stub"));
    let total = money(&body["data"]["order"]["total"]);
    assert_eq!(checkout["amount"].as_i64().unwrap(), minor_units(total));
}

#[tokio::test]
async fn verify_with_bad_signature_leaves_order_untouched() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Jali Screen", dec!(5000)).await;

    let body = place_order(&app, &token, product.id, "razorpay").await;
    let order_id: Uuid = body["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = body["data"]["checkout"]["gateway_order_id"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/payment/verify",
            Some(json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_forged",
                "razorpay_signature": sign("wrong_secret", format!("{}|pay_forged", gateway_order_id).as_bytes())
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.transaction_id.is_none());
}

#[tokio::test]
async fn verify_with_valid_signature_confirms_order() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Inlay Coaster Set", dec!(2400)).await;

    let body = place_order(&app, &token, product.id, "razorpay").await;
    let order_id: Uuid = body["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = body["data"]["checkout"]["gateway_order_id"].as_str().unwrap();
    let signature = sign(KEY_SECRET, format!("{}|pay_ok1", gateway_order_id).as_bytes());

    let response = app
        .request(
            Method::POST,
            "/api/payment/verify",
            Some(json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_ok1",
                "razorpay_signature": signature
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.transaction_id.as_deref(), Some("pay_ok1"));
    assert!(order.paid_at.is_some());
}

#[tokio::test]
async fn verify_reports_failed_gateway_payment() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Diya", dec!(600)).await;
    app.gateway.set_payment_status(GatewayPaymentStatus::Failed);

    let body = place_order(&app, &token, product.id, "razorpay").await;
    let order_id: Uuid = body["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = body["data"]["checkout"]["gateway_order_id"].as_str().unwrap();
    let signature = sign(KEY_SECRET, format!("{}|pay_bad", gateway_order_id).as_bytes());

    let response = app
        .request(
            Method::POST,
            "/api/payment/verify",
            Some(json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_bad",
                "razorpay_signature": signature
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.find_order(order_id).await.payment_status, PaymentStatus::Failed);
}

fn captured_event(gateway_order_id: &str, payment_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "payment.captured",
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": gateway_order_id,
                    "status": "captured",
                    "amount": 100
                }
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn webhook_with_invalid_signature_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Ganesha Murti", dec!(7000)).await;

    let body = place_order(&app, &token, product.id, "razorpay").await;
    let order_id: Uuid = body["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = body["data"]["checkout"]["gateway_order_id"].as_str().unwrap();

    let payload = captured_event(gateway_order_id, "pay_hook1");
    let forged = sign("not_the_webhook_secret", &payload);
    let response = app
        .request_raw(
            "/api/webhooks/razorpay",
            payload.clone(),
            &[("x-razorpay-signature", forged.as_str()), ("content-type", "application/json")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .request_raw("/api/webhooks/razorpay", payload, &[("content-type", "application/json")])
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn signed_webhook_confirms_payment_once() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Lotus Fountain", dec!(18000)).await;

    let body = place_order(&app, &token, product.id, "razorpay").await;
    let order_id: Uuid = body["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = body["data"]["checkout"]["gateway_order_id"].as_str().unwrap();

    let payload = captured_event(gateway_order_id, "pay_hook2");
    let signature = sign(WEBHOOK_SECRET, &payload);
    let headers = [
        ("x-razorpay-signature", signature.as_str()),
        ("x-razorpay-event-id", "evt_001"),
        ("content-type", "application/json"),
    ];

    let first = app.request_raw("/api/webhooks/razorpay", payload.clone(), &headers).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(response_json(first).await["status"], "processed");

    let second = app.request_raw("/api/webhooks/razorpay", payload, &headers).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(response_json(second).await["status"], "duplicate");

    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.transaction_id.as_deref(), Some("pay_hook2"));
}

#[tokio::test]
async fn signed_webhook_for_unknown_order_is_ignored() {
    let app = TestApp::new().await;
    let payload = captured_event("order_unknown", "pay_x");
    let signature = sign(WEBHOOK_SECRET, &payload);

    let response = app
        .request_raw(
            "/api/webhooks/razorpay",
            payload,
            &[("x-razorpay-signature", signature.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["status"], "ignored");
}

#[tokio::test]
async fn payment_arriving_after_cancellation_is_refunded() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Jharokha", dec!(9000)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;

    let cancel = app
        .request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;
    assert_eq!(cancel.status(), StatusCode::OK);
    assert_eq!(app.gateway.refund_count(), 0);

    let verify = app.verify_payment(&token, &gateway_order_id, "pay_late").await;
    assert_eq!(verify.status(), StatusCode::OK);

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(order.transaction_id.as_deref(), Some("pay_late"));
    let refunds = app.gateway.refunds.lock().unwrap().clone();
    assert_eq!(refunds, vec![("pay_late".to_string(), order.amount_minor_units())]);
}

#[tokio::test]
async fn late_payment_webhook_is_refunded_once() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Soapstone Box", dec!(1800)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;
    app.request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;

    let payload: serde_json::Value =
        serde_json::from_slice(&captured_event(&gateway_order_id, "pay_late_hook")).unwrap();
    assert_eq!(app.send_webhook(payload.clone()).await.status(), StatusCode::OK);
    // redelivery without an event id reaches the order again
    assert_eq!(app.send_webhook(payload).await.status(), StatusCode::OK);

    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(app.gateway.refund_count(), 1);
}

#[tokio::test]
async fn payment_for_a_different_amount_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Lamp Base", dec!(4200)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;
    app.gateway.set_payment_amount(100);

    let response = app.verify_payment(&token, &gateway_order_id, "pay_short").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.transaction_id.is_none());
}

#[tokio::test]
async fn payment_for_another_gateway_order_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let cheap = app.seed_product("Marble Keyholder", dec!(500)).await;
    let dear = app.seed_product("Marble Temple", dec!(65000)).await;
    let (cheap_order, cheap_gateway_id) = app.online_order(&token, cheap.id).await;
    let (_, dear_gateway_id) = app.online_order(&token, dear.id).await;

    // the payment was made against the cheap order but is presented for the dear one
    app.gateway.bind_payment("pay_swap", &cheap_gateway_id);
    let signature = sign(KEY_SECRET, format!("{}|pay_swap", dear_gateway_id).as_bytes());
    let response = app
        .request(
            Method::POST,
            "/api/payment/verify",
            Some(json!({
                "razorpay_order_id": dear_gateway_id,
                "razorpay_payment_id": "pay_swap",
                "razorpay_signature": signature
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.find_order(cheap_order).await.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn gateway_outage_leaves_no_order_behind() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Onyx Pen Stand", dec!(950)).await;
    app.gateway.reject_orders();

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": shipping_address(),
                "payment_method": "razorpay"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response_json(response).await["error"], "Payment gateway unavailable");

    let listed = response_json(app.request(Method::GET, "/api/orders", None, Some(&token)).await).await;
    assert_eq!(listed["data"]["total"], 0);

    // the database is free for the next checkout
    let cod = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": shipping_address(),
                "payment_method": "cod"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(cod.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn payment_failed_webhook_marks_order_failed() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Mortar", dec!(650)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;

    let response = app
        .send_webhook(json!({
            "event": "payment.failed",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_declined",
                        "order_id": gateway_order_id,
                        "status": "failed",
                        "error_description": "Card declined by issuer"
                    }
                }
            }
        }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["status"], "processed");

    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.timeline.last().unwrap().note.contains("Card declined"));
}
