//! Order status transitions, cancellation and access control.

mod common;

use axum::http::{Method, StatusCode};
use common::{refund_event, response_json, shipping_address, TestApp, KEY_SECRET};
use rust_decimal_macros::dec;
use serde_json::json;
use stonecraft_api::entities::order::{OrderStatus, PaymentStatus};
use stonecraft_api::gateway::sign;
use uuid::Uuid;

async fn cod_order(app: &TestApp, token: &str) -> Uuid {
    let product = app.seed_product("Marble Tray", dec!(1200)).await;
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": shipping_address(),
                "payment_method": "cod"
            })),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["data"]["order"]["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn customer_can_cancel_pending_order() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let order_id = cod_order(&app, &token).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "Ordered the wrong size" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order
        .timeline
        .last()
        .unwrap()
        .note
        .contains("Ordered the wrong size"));
}

#[tokio::test]
async fn cancel_without_body_is_accepted() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let order_id = cod_order(&app, &token).await;

    let response = app
        .request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let order_id = cod_order(&app, &token).await;
    app.force_order_status(order_id, OrderStatus::Shipped, 0).await;

    let response = app
        .request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.find_order(order_id).await.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn cancelling_paid_online_order_refunds_in_full() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Onyx Vase", dec!(4000)).await;

    let placed = response_json(
        app.request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "shipping_address": shipping_address(),
                "payment_method": "razorpay"
            })),
            Some(&token),
        )
        .await,
    )
    .await;
    let order_id: Uuid = placed["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
    let gateway_order_id = placed["data"]["checkout"]["gateway_order_id"].as_str().unwrap();

    let verify = app
        .request(
            Method::POST,
            "/api/payment/verify",
            Some(json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": "pay_cancel",
                "razorpay_signature": sign(KEY_SECRET, format!("{}|pay_cancel", gateway_order_id).as_bytes())
            })),
            Some(&token),
        )
        .await;
    assert_eq!(verify.status(), StatusCode::OK);

    let response = app
        .request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    let refunds = app.gateway.refunds.lock().unwrap().clone();
    assert_eq!(refunds, vec![("pay_cancel".to_string(), order.amount_minor_units())]);
}

#[tokio::test]
async fn other_customers_cannot_see_or_cancel_an_order() {
    let app = TestApp::new().await;
    let (_, owner) = app.customer().await;
    let (_, stranger) = app.customer().await;
    let order_id = cod_order(&app, &owner).await;

    let view = app
        .request(Method::GET, &format!("/api/orders/{}", order_id), None, Some(&stranger))
        .await;
    assert_eq!(view.status(), StatusCode::FORBIDDEN);

    let cancel = app
        .request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&stranger))
        .await;
    assert_eq!(cancel.status(), StatusCode::FORBIDDEN);

    let listed = response_json(app.request(Method::GET, "/api/orders", None, Some(&stranger)).await).await;
    assert_eq!(listed["data"]["total"], 0);
}

#[tokio::test]
async fn admin_walks_order_through_lifecycle() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let (_, admin) = app.admin().await;
    let order_id = cod_order(&app, &token).await;
    let uri = format!("/api/orders/{}", order_id);

    for status in ["confirmed", "processing", "shipped", "delivered"] {
        let response = app
            .request(Method::PUT, &uri, Some(json!({ "status": status })), Some(&admin))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "transition to {}", status);
    }

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Delivered);
    // COD is collected on delivery
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert_eq!(order.timeline.len(), 5);
}

#[tokio::test]
async fn invalid_transition_is_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let (_, admin) = app.admin().await;
    let order_id = cod_order(&app, &token).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}", order_id),
            Some(json!({ "status": "delivered" })),
            Some(&admin),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn customers_cannot_update_order_status() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let order_id = cod_order(&app, &token).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}", order_id),
            Some(json!({ "status": "confirmed" })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pending_refund_settles_on_refund_webhook() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Coasters", dec!(1500)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;
    app.gateway.set_refund_status("pending");
    assert_eq!(
        app.verify_payment(&token, &gateway_order_id, "pay_slow").await.status(),
        StatusCode::OK
    );

    app.request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;
    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert!(order.timeline.last().unwrap().note.contains("awaiting gateway confirmation"));
    assert_eq!(app.gateway.refund_count(), 1);

    let amount = order.amount_minor_units();
    let response = app
        .send_webhook(refund_event("refund.processed", "rfnd_slow", "pay_slow", amount))
        .await;
    assert_eq!(response_json(response).await["status"], "processed");
    assert_eq!(app.find_order(order_id).await.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn failed_refund_webhook_reverts_refunded_order() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Bookends", dec!(2600)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;
    app.verify_payment(&token, &gateway_order_id, "pay_bounce").await;
    app.request(Method::POST, &format!("/api/orders/{}/cancel", order_id), None, Some(&token))
        .await;
    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Refunded);

    let response = app
        .send_webhook(refund_event(
            "refund.failed",
            "rfnd_bounce",
            "pay_bounce",
            order.amount_minor_units(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.find_order(order_id).await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert!(order.timeline.last().unwrap().note.contains("manual refund required"));
}

#[tokio::test]
async fn partial_refund_webhook_keeps_payment_completed() {
    let app = TestApp::new().await;
    let (_, token) = app.customer().await;
    let product = app.seed_product("Marble Soap Dish", dec!(800)).await;
    let (order_id, gateway_order_id) = app.online_order(&token, product.id).await;
    app.verify_payment(&token, &gateway_order_id, "pay_part").await;

    app.send_webhook(refund_event("refund.processed", "rfnd_part", "pay_part", 100))
        .await;
    let order = app.find_order(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Completed);
    assert!(order.timeline.last().unwrap().note.starts_with("Refund of 1.00"));
}
