//! Payment confirmation.
//!
//! An order is confirmed either by the browser callback after checkout
//! ([`PaymentService::verify_payment`]) or by a gateway webhook
//! ([`PaymentService::handle_webhook`]). Both paths converge on
//! [`PaymentService::mark_paid`], which is idempotent, so whichever arrives
//! second is a no-op.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::orders::refund_order_in_full;
use super::promotions::PromotionService;
use crate::auth::AuthUser;
use crate::config::RazorpayConfig;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::return_request::{self, RefundStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    verify_checkout_signature, verify_webhook_signature, GatewayPaymentStatus, PaymentGateway,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentInput {
    #[validate(length(min = 1, max = 64))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, max = 64))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub razorpay_signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    payment: Option<Wrapped<WebhookPayment>>,
    order: Option<Wrapped<WebhookOrder>>,
    refund: Option<Wrapped<WebhookRefund>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct WebhookPayment {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: GatewayPaymentStatus,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookRefund {
    id: String,
    payment_id: String,
    amount: i64,
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    key_secret: String,
    webhook_secret: String,
    processed_events: Arc<DashMap<String, Instant>>,
    dedupe_ttl: Duration,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        config: &RazorpayConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            key_secret: config.key_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            processed_events: Arc::new(DashMap::new()),
            dedupe_ttl: Duration::from_secs(config.webhook_dedupe_ttl_secs),
        }
    }

    async fn order_by_gateway_id(&self, gateway_order_id: &str) -> Result<Option<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await?)
    }

    /// Checkout callback. The signature is checked before anything is read
    /// or written, so a forged callback never touches the order.
    #[instrument(skip(self, input), fields(gateway_order_id = %input.razorpay_order_id))]
    pub async fn verify_payment(
        &self,
        caller: &AuthUser,
        input: VerifyPaymentInput,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;

        if !verify_checkout_signature(
            &self.key_secret,
            &input.razorpay_order_id,
            &input.razorpay_payment_id,
            &input.razorpay_signature,
        ) {
            warn!("checkout signature mismatch");
            metrics::counter!("stonecraft_payments.signature_failures", 1, "source" => "checkout");
            return Err(ServiceError::InvalidSignature);
        }

        let order = self
            .order_by_gateway_id(&input.razorpay_order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order for gateway order", &input.razorpay_order_id))?;
        caller.ensure_can_access(order.user_id, "order")?;

        if order.payment_status == PaymentStatus::Completed {
            debug!(order_id = %order.id, "payment already confirmed");
            return Ok(order);
        }

        let payment = self.gateway.fetch_payment(&input.razorpay_payment_id).await?;
        if payment.order_id.as_deref() != Some(input.razorpay_order_id.as_str()) {
            warn!(payment_id = %payment.id, "payment is not linked to the gateway order");
            return Err(ServiceError::InvalidOperation(
                "Payment does not belong to this order".into(),
            ));
        }
        if payment.amount != order.amount_minor_units() {
            warn!(
                payment_id = %payment.id,
                paid = payment.amount,
                expected = order.amount_minor_units(),
                "payment amount does not match order total"
            );
            return Err(ServiceError::InvalidOperation(
                "Payment amount does not match the order total".into(),
            ));
        }

        match payment.status {
            status if status.is_successful() => self.mark_paid(order.id, &payment.id).await,
            GatewayPaymentStatus::Failed => {
                self.mark_failed(order.id, "Payment failed at gateway").await?;
                Err(ServiceError::InvalidOperation("Payment failed".into()))
            }
            _ => Err(ServiceError::InvalidOperation(
                "Payment has not been completed".into(),
            )),
        }
    }

    /// Records a successful payment and confirms the order. Safe to call
    /// more than once for the same order. Money that arrives for a cancelled
    /// or returned order is recorded and then refunded in full.
    pub async fn mark_paid(&self, order_id: Uuid, payment_id: &str) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;

        if current.payment_status == PaymentStatus::Completed
            || current.payment_status == PaymentStatus::Refunded
        {
            txn.commit().await?;
            return Ok(current);
        }

        let closed = current.status.is_closed();
        let status = match current.status {
            OrderStatus::Pending => OrderStatus::Confirmed,
            other => {
                warn!(%order_id, status = %other, "payment received for order that is not pending");
                other
            }
        };
        let mut timeline = current.timeline.clone();
        timeline.push(
            status,
            if closed {
                format!("Payment received after the order was {}", status)
            } else {
                "Payment received".to_string()
            },
        );
        let promo_code = current.promo_code.clone();
        let user_id = current.user_id;

        let mut active: order::ActiveModel = current.into();
        active.payment_status = Set(PaymentStatus::Completed);
        active.transaction_id = Set(Some(payment_id.to_string()));
        active.paid_at = Set(Some(Utc::now()));
        active.status = Set(status);
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if !closed {
            if let Some(code) = promo_code.as_deref() {
                PromotionService::record_usage(&txn, code, user_id).await?;
            }
        }
        txn.commit().await?;

        metrics::counter!("stonecraft_payments.confirmed", 1);
        info!(%order_id, payment_id, "payment confirmed");

        if closed {
            metrics::counter!("stonecraft_payments.late_payments", 1);
            return self.refund_late_payment(updated, payment_id).await;
        }

        self.event_sender
            .send_or_log(Event::PaymentConfirmed(order_id))
            .await;
        Ok(updated)
    }

    async fn refund_late_payment(
        &self,
        order: order::Model,
        payment_id: &str,
    ) -> Result<order::Model, ServiceError> {
        let mut timeline = order.timeline.clone();
        let payment_status = refund_order_in_full(
            self.gateway.as_ref(),
            &order,
            payment_id,
            order.status,
            &mut timeline,
        )
        .await;

        let order_id = order.id;
        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(payment_status);
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        warn!(%order_id, payment_id, payment_status = %payment_status, "late payment refunded");
        Ok(updated)
    }

    async fn mark_failed(&self, order_id: Uuid, reason: &str) -> Result<(), ServiceError> {
        let Some(current) = order::Entity::find_by_id(order_id).one(&*self.db).await? else {
            return Ok(());
        };
        if matches!(
            current.payment_status,
            PaymentStatus::Completed | PaymentStatus::Refunded
        ) {
            return Ok(());
        }

        let mut timeline = current.timeline.clone();
        timeline.push(current.status, reason);
        let mut active: order::ActiveModel = current.into();
        active.payment_status = Set(PaymentStatus::Failed);
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        metrics::counter!("stonecraft_payments.failed", 1);
        warn!(%order_id, reason, "payment failed");
        self.event_sender
            .send_or_log(Event::PaymentFailed(order_id))
            .await;
        Ok(())
    }

    fn already_processed(&self, event_id: &str) -> bool {
        let ttl = self.dedupe_ttl;
        self.processed_events.retain(|_, seen| seen.elapsed() < ttl);
        self.processed_events.contains_key(event_id)
    }

    /// Handles a signed gateway webhook. Nothing is parsed or written until
    /// the body's HMAC has been verified.
    #[instrument(skip(self, body, signature), fields(event_id = event_id.unwrap_or("-")))]
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        event_id: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        let valid = signature
            .is_some_and(|sig| verify_webhook_signature(&self.webhook_secret, body, sig));
        if !valid {
            warn!("webhook signature verification failed");
            metrics::counter!("stonecraft_payments.signature_failures", 1, "source" => "webhook");
            return Err(ServiceError::InvalidSignature);
        }

        if let Some(id) = event_id {
            if self.already_processed(id) {
                info!("duplicate webhook delivery acknowledged");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let envelope: WebhookEnvelope = serde_json::from_slice(body)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid webhook payload: {}", e)))?;
        metrics::counter!("stonecraft_payments.webhooks", 1, "event" => envelope.event.clone());

        let outcome = self.dispatch(envelope).await?;

        if let Some(id) = event_id {
            self.processed_events.insert(id.to_string(), Instant::now());
        }
        Ok(outcome)
    }

    async fn dispatch(&self, envelope: WebhookEnvelope) -> Result<WebhookOutcome, ServiceError> {
        let WebhookEnvelope { event, payload } = envelope;
        match event.as_str() {
            "payment.captured" | "payment.authorized" | "order.paid" => {
                let payment = payload.payment.map(|p| p.entity);
                let gateway_order_id = payload
                    .order
                    .map(|o| o.entity.id)
                    .or_else(|| payment.as_ref().and_then(|p| p.order_id.clone()));
                let (Some(payment), Some(gateway_order_id)) = (payment, gateway_order_id) else {
                    warn!(%event, "webhook without payment or order reference");
                    return Ok(WebhookOutcome::Ignored);
                };
                if !payment.status.is_successful() {
                    return Ok(WebhookOutcome::Ignored);
                }
                match self.order_by_gateway_id(&gateway_order_id).await? {
                    Some(order) => {
                        self.mark_paid(order.id, &payment.id).await?;
                        Ok(WebhookOutcome::Processed)
                    }
                    None => {
                        warn!(%gateway_order_id, "webhook for unknown gateway order");
                        Ok(WebhookOutcome::Ignored)
                    }
                }
            }
            "payment.failed" => {
                let Some(payment) = payload.payment.map(|p| p.entity) else {
                    return Ok(WebhookOutcome::Ignored);
                };
                let Some(gateway_order_id) = payment.order_id.as_deref() else {
                    return Ok(WebhookOutcome::Ignored);
                };
                match self.order_by_gateway_id(gateway_order_id).await? {
                    Some(order) => {
                        let reason = match payment.error_description.as_deref() {
                            Some(description) => format!("Payment failed: {}", description),
                            None => "Payment failed".to_string(),
                        };
                        self.mark_failed(order.id, &reason).await?;
                        Ok(WebhookOutcome::Processed)
                    }
                    None => Ok(WebhookOutcome::Ignored),
                }
            }
            "refund.processed" | "refund.failed" => {
                let Some(refund) = payload.refund.map(|r| r.entity) else {
                    return Ok(WebhookOutcome::Ignored);
                };
                self.apply_refund(refund, event == "refund.processed").await
            }
            other => {
                debug!(event = other, "unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn apply_refund(
        &self,
        refund: WebhookRefund,
        processed: bool,
    ) -> Result<WebhookOutcome, ServiceError> {
        let mut touched = false;
        let now = Utc::now();

        let matching_return = return_request::Entity::find()
            .filter(return_request::Column::RefundGatewayId.eq(refund.id.as_str()))
            .one(&*self.db)
            .await?;
        if let Some(request) = matching_return {
            let return_id = request.id;
            let mut timeline = request.timeline.clone();
            timeline.push(
                request.status,
                if processed { "Refund processed" } else { "Refund failed" },
            );
            let mut active: return_request::ActiveModel = request.into();
            active.refund_status = Set(if processed {
                RefundStatus::Processed
            } else {
                RefundStatus::Failed
            });
            if processed {
                active.refund_processed_at = Set(Some(now));
            }
            active.timeline = Set(timeline);
            active.updated_at = Set(now);
            active.update(&*self.db).await?;
            touched = true;
            self.event_sender
                .send_or_log(Event::RefundUpdated(return_id))
                .await;
        }

        let paid_order = order::Entity::find()
            .filter(order::Column::TransactionId.eq(refund.payment_id.as_str()))
            .one(&*self.db)
            .await?;
        if let Some(order) = paid_order {
            let amount = Decimal::new(refund.amount, 2);
            let full_refund = refund.amount >= order.amount_minor_units();
            let mut timeline = order.timeline.clone();
            let payment_status = match (processed, order.payment_status) {
                (true, _) if full_refund => PaymentStatus::Refunded,
                // a refund we counted as settled bounced; the money is still with us
                (false, PaymentStatus::Refunded) => PaymentStatus::Completed,
                (_, current) => current,
            };
            timeline.push(
                order.status,
                if processed {
                    format!("Refund of {} {} processed", amount, order.currency)
                } else {
                    format!(
                        "Refund of {} {} failed; manual refund required",
                        amount, order.currency
                    )
                },
            );
            if !processed {
                warn!(order_id = %order.id, refund_id = %refund.id, "refund failed at gateway");
                metrics::counter!("stonecraft_payments.refund_failures", 1);
            }
            let mut active: order::ActiveModel = order.into();
            active.payment_status = Set(payment_status);
            active.timeline = Set(timeline);
            active.updated_at = Set(now);
            active.update(&*self.db).await?;
            touched = true;
        }

        if touched {
            info!(refund_id = %refund.id, processed, "refund webhook applied");
            Ok(WebhookOutcome::Processed)
        } else {
            warn!(refund_id = %refund.id, "refund webhook matched nothing");
            Ok(WebhookOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user::UserRole;
    use crate::gateway::{
        sign, CreateGatewayOrder, GatewayError, GatewayOrder, GatewayPayment, GatewayRefund,
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockall::mock;
    use sea_orm::Database;
    use test_case::test_case;
    use tokio::sync::mpsc;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn create_order(&self, request: CreateGatewayOrder) -> Result<GatewayOrder, GatewayError>;
            async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError>;
            async fn refund_payment(
                &self,
                payment_id: &str,
                amount: i64,
                receipt: &str,
            ) -> Result<GatewayRefund, GatewayError>;
        }
    }

    const KEY_SECRET: &str = "unit_key_secret";
    const WEBHOOK_SECRET: &str = "unit_webhook_secret";

    async fn service(gateway: MockGateway) -> PaymentService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let config = RazorpayConfig {
            key_id: "rzp_unit".into(),
            key_secret: KEY_SECRET.into(),
            webhook_secret: WEBHOOK_SECRET.into(),
            ..RazorpayConfig::default()
        };
        PaymentService::new(
            Arc::new(db),
            Arc::new(gateway),
            Arc::new(EventSender::new(tx)),
            &config,
        )
    }

    fn customer() -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            name: "Meera".into(),
            email: "meera@example.com".into(),
            role: UserRole::Customer,
            token_id: Uuid::new_v4().to_string(),
        }
    }

    #[tokio::test]
    async fn forged_checkout_signature_never_reaches_gateway() {
        let mut gateway = MockGateway::new();
        gateway.expect_fetch_payment().never();
        let service = service(gateway).await;

        let input = VerifyPaymentInput {
            razorpay_order_id: "order_abc".into(),
            razorpay_payment_id: "pay_abc".into(),
            razorpay_signature: sign("someone_else", b"order_abc|pay_abc"),
        };
        let result = service.verify_payment(&customer(), input).await;
        assert_matches!(result, Err(ServiceError::InvalidSignature));
    }

    #[test_case(None ; "missing signature")]
    #[test_case(Some("00ff") ; "wrong signature")]
    #[test_case(Some("not-hex") ; "malformed signature")]
    #[tokio::test]
    async fn unsigned_webhooks_are_rejected(signature: Option<&str>) {
        let mut gateway = MockGateway::new();
        gateway.expect_refund_payment().never();
        gateway.expect_fetch_payment().never();
        let service = service(gateway).await;

        let result = service
            .handle_webhook(signature, Some("evt_unit"), br#"{"event":"payment.captured"}"#)
            .await;
        assert_matches!(result, Err(ServiceError::InvalidSignature));
        assert!(service.processed_events.is_empty());
    }

    #[tokio::test]
    async fn repeated_event_id_is_acknowledged_as_duplicate() {
        let service = service(MockGateway::new()).await;
        let body = br#"{"event":"account.updated"}"#;
        let signature = sign(WEBHOOK_SECRET, body);

        let first = service
            .handle_webhook(Some(&signature), Some("evt_dup"), body)
            .await;
        assert_matches!(first, Ok(WebhookOutcome::Ignored));

        let second = service
            .handle_webhook(Some(&signature), Some("evt_dup"), body)
            .await;
        assert_matches!(second, Ok(WebhookOutcome::Duplicate));
    }

    #[test]
    fn webhook_envelope_parses_nested_entities() {
        let body = r#"{
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": {"entity": {"id": "pay_1", "order_id": "order_1", "status": "captured", "amount": 100}},
                "order": {"entity": {"id": "order_1", "status": "paid"}}
            }
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.event, "payment.captured");
        let payment = envelope.payload.payment.unwrap().entity;
        assert_eq!(payment.id, "pay_1");
        assert!(payment.status.is_successful());
        assert_eq!(envelope.payload.order.unwrap().entity.id, "order_1");
    }

    #[test]
    fn envelope_without_payload_defaults() {
        let envelope: WebhookEnvelope = serde_json::from_str(r#"{"event":"account.updated"}"#).unwrap();
        assert!(envelope.payload.payment.is_none());
        assert!(envelope.payload.refund.is_none());
    }
}
