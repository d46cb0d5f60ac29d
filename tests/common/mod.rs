#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use stonecraft_api::{
    build_router,
    config::AppConfig,
    db,
    entities::{
        order::{self, OrderStatus},
        product::{self, Highlight, StockStatus},
        user::{self, AddressBook, UserRole},
        UuidList,
    },
    events::{self, EventProcessor, EventSender},
    gateway::{
        sign, CreateGatewayOrder, GatewayError, GatewayOrder, GatewayPayment, GatewayPaymentStatus,
        GatewayRefund, PaymentGateway,
    },
    notifications::LogMailer,
    services::catalog::CreateProductInput,
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
const JWT_SECRET: &str =
    "stonecraft_test_secret_key_that_is_definitely_at_least_sixty_four_characters";

/// In-process stand-in for the payment gateway.
///
/// A fetched payment belongs to the gateway order it was bound to with
/// [`StubGateway::bind_payment`], or else to the most recently created one,
/// and carries that order's amount.
#[derive(Default)]
pub struct StubGateway {
    created: Mutex<Vec<GatewayOrder>>,
    bindings: Mutex<HashMap<String, String>>,
    payment_status: Mutex<Option<GatewayPaymentStatus>>,
    payment_amount: Mutex<Option<i64>>,
    refund_status: Mutex<Option<String>>,
    reject_orders: AtomicBool,
    pub refunds: Mutex<Vec<(String, i64)>>,
}

impl StubGateway {
    pub fn set_payment_status(&self, status: GatewayPaymentStatus) {
        *self.payment_status.lock().unwrap() = Some(status);
    }

    pub fn set_payment_amount(&self, amount: i64) {
        *self.payment_amount.lock().unwrap() = Some(amount);
    }

    /// Status reported for new refunds, `processed` unless set.
    pub fn set_refund_status(&self, status: &str) {
        *self.refund_status.lock().unwrap() = Some(status.to_string());
    }

    pub fn bind_payment(&self, payment_id: &str, gateway_order_id: &str) {
        self.bindings
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), gateway_order_id.to_string());
    }

    pub fn reject_orders(&self) {
        self.reject_orders.store(true, Ordering::SeqCst);
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }

    fn order_for_payment(&self, payment_id: &str) -> Option<GatewayOrder> {
        let created = self.created.lock().unwrap();
        match self.bindings.lock().unwrap().get(payment_id) {
            Some(order_id) => created.iter().find(|o| &o.id == order_id).cloned(),
            None => created.last().cloned(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, request: CreateGatewayOrder) -> Result<GatewayOrder, GatewayError> {
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        let mut created = self.created.lock().unwrap();
        let order = GatewayOrder {
            id: format!("order_stub{}", created.len() + 1),
            amount: request.amount,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: "created".into(),
        };
        created.push(order.clone());
        Ok(order)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        let status = self
            .payment_status
            .lock()
            .unwrap()
            .unwrap_or(GatewayPaymentStatus::Captured);
        let order = self.order_for_payment(payment_id);
        let amount = self
            .payment_amount
            .lock()
            .unwrap()
            .or(order.as_ref().map(|o| o.amount))
            .unwrap_or(0);
        Ok(GatewayPayment {
            id: payment_id.to_string(),
            amount,
            currency: "INR".into(),
            status,
            order_id: order.map(|o| o.id),
            method: Some("upi".into()),
        })
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount: i64,
        _receipt: &str,
    ) -> Result<GatewayRefund, GatewayError> {
        self.refunds
            .lock()
            .unwrap()
            .push((payment_id.to_string(), amount));
        let status = self
            .refund_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "processed".into());
        Ok(GatewayRefund {
            id: format!("rfnd_{}", Uuid::new_v4().simple()),
            payment_id: payment_id.to_string(),
            amount,
            status,
        })
    }
}

/// Full router over a throwaway SQLite file with a stub gateway.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("stonecraft_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.razorpay.key_id = "rzp_test_key".into();
        cfg.razorpay.key_secret = KEY_SECRET.into();
        cfg.razorpay.webhook_secret = WEBHOOK_SECRET.into();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let pool = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(
            event_rx,
            EventProcessor::new(pool.clone(), Arc::new(LogMailer::new("store@test.local"))),
        ));

        let gateway = Arc::new(StubGateway::default());
        let state = AppState::new(pool, cfg, EventSender::new(event_tx), gateway.clone());
        let router = build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _dir: dir,
            _event_task: event_task,
        }
    }

    /// Inserts an account directly and returns it with a bearer token.
    pub async fn create_user(&self, email: &str, role: UserRole) -> (user::Model, String) {
        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("User {}", email)),
            email: Set(email.to_string()),
            mobile: Set(None),
            password_hash: Set(String::new()),
            role: Set(role),
            addresses: Set(AddressBook::default()),
            wishlist: Set(UuidList::default()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert test user");

        let token = self
            .state
            .auth
            .issue_token(&user)
            .expect("issue test token")
            .access_token;
        (user, token)
    }

    pub async fn customer(&self) -> (user::Model, String) {
        self.create_user(&format!("customer-{}@test.local", Uuid::new_v4().simple()), UserRole::Customer)
            .await
    }

    pub async fn admin(&self) -> (user::Model, String) {
        self.create_user(&format!("admin-{}@test.local", Uuid::new_v4().simple()), UserRole::Admin)
            .await
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        self.state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                slug: None,
                description: "Seeded for integration tests".into(),
                category: "Idols".into(),
                material: Some("Marble".into()),
                dimensions: None,
                price,
                discount: 0,
                stock_status: Some(StockStatus::InStock),
                images: vec![],
                tags: vec![],
                highlight: Highlight::None,
                featured: false,
            })
            .await
            .expect("seed product")
    }

    pub async fn find_order(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    /// Moves an order straight to `status`, optionally backdating it.
    pub async fn force_order_status(&self, id: Uuid, status: OrderStatus, age_days: i64) {
        let current = self.find_order(id).await;
        let mut active: order::ActiveModel = current.into();
        active.status = Set(status);
        active.created_at = Set(Utc::now() - Duration::days(age_days));
        active.update(&*self.state.db).await.expect("update order");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Places a Razorpay order for one unit of `product_id` and returns the
    /// order id with its gateway order id.
    pub async fn online_order(&self, token: &str, product_id: Uuid) -> (Uuid, String) {
        let response = self
            .request(
                Method::POST,
                "/api/orders",
                Some(serde_json::json!({
                    "items": [{ "product_id": product_id, "quantity": 1 }],
                    "shipping_address": shipping_address(),
                    "payment_method": "razorpay"
                })),
                Some(token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response_json(response).await;
        let order_id = body["data"]["order"]["id"].as_str().unwrap().parse().unwrap();
        let gateway_order_id = body["data"]["checkout"]["gateway_order_id"]
            .as_str()
            .unwrap()
            .to_string();
        (order_id, gateway_order_id)
    }

    /// Confirms `gateway_order_id` through the checkout callback.
    pub async fn verify_payment(&self, token: &str, gateway_order_id: &str, payment_id: &str) -> Response {
        self.gateway.bind_payment(payment_id, gateway_order_id);
        let signature = sign(
            KEY_SECRET,
            format!("{}|{}", gateway_order_id, payment_id).as_bytes(),
        );
        self.request(
            Method::POST,
            "/api/payment/verify",
            Some(serde_json::json!({
                "razorpay_order_id": gateway_order_id,
                "razorpay_payment_id": payment_id,
                "razorpay_signature": signature
            })),
            Some(token),
        )
        .await
    }

    /// Delivers `payload` to the Razorpay webhook with a valid signature.
    pub async fn send_webhook(&self, payload: Value) -> Response {
        let body = serde_json::to_vec(&payload).expect("serialize webhook");
        let signature = sign(WEBHOOK_SECRET, &body);
        self.request_raw(
            "/api/webhooks/razorpay",
            body,
            &[
                ("x-razorpay-signature", signature.as_str()),
                ("content-type", "application/json"),
            ],
        )
        .await
    }

    pub async fn request_raw(&self, uri: &str, body: Vec<u8>, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn refund_event(event: &str, refund_id: &str, payment_id: &str, amount: i64) -> Value {
    serde_json::json!({
        "event": event,
        "payload": {
            "refund": {
                "entity": {
                    "id": refund_id,
                    "payment_id": payment_id,
                    "amount": amount,
                    "status": if event == "refund.processed" { "processed" } else { "failed" }
                }
            }
        }
    })
}

pub fn shipping_address() -> Value {
    serde_json::json!({
        "full_name": "Riya Sharma",
        "phone": "9876543210",
        "line1": "12 MI Road",
        "city": "Jaipur",
        "state": "Rajasthan",
        "postal_code": "302001",
        "country": "India"
    })
}
