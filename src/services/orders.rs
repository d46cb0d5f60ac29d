use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::promotions::PromotionService;
use super::{clean_optional, insert_with_retry, pricing, reference_number, Page, PageRequest};
use crate::auth::AuthUser;
use crate::config::CommerceConfig;
use crate::entities::order::{
    self, OrderItem, OrderItems, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::entities::user::{self, AddressDetails};
use crate::entities::{product, Timeline};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{CreateGatewayOrder, PaymentGateway};

pub const MAX_LINE_QUANTITY: i32 = 100;
const ORDER_NUMBER_ATTEMPTS: usize = 5;

static GSTIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("GSTIN pattern compiles")
});

pub fn is_valid_gstin(gstin: &str) -> bool {
    GSTIN_PATTERN.is_match(gstin)
}

/// True when `err` is a unique-index violation, e.g. a duplicate order number.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Checkout request. Prices are never taken from the client; every line is
/// priced from the catalog at the moment the order is placed.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderInput {
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<OrderLineInput>,
    /// Entry from the caller's address book
    pub shipping_address_id: Option<Uuid>,
    #[validate]
    pub shipping_address: Option<AddressDetails>,
    #[validate]
    pub billing_address: Option<AddressDetails>,
    pub payment_method: PaymentMethod,
    pub promo_code: Option<String>,
    #[serde(default)]
    pub gift_wrap: bool,
    #[validate(length(max = 500))]
    pub gift_message: Option<String>,
    #[serde(default)]
    pub gst_invoice: bool,
    pub gstin: Option<String>,
    #[validate(length(max = 200))]
    pub gst_business_name: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// What the browser needs to open the gateway's checkout widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct GatewayCheckout {
    pub key_id: String,
    pub gateway_order_id: String,
    /// Minor units (paise)
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlacedOrder {
    pub order: order::Model,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout: Option<GatewayCheckout>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderInput {
    pub status: Option<OrderStatus>,
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CancelOrderInput {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    /// Admin only: restrict to one customer
    pub user_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Merges repeated product lines and checks quantities.
fn merge_lines(lines: &[OrderLineInput]) -> Result<BTreeMap<Uuid, i32>, ServiceError> {
    let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".into(),
            ));
        }
        let qty = merged.entry(line.product_id).or_insert(0);
        *qty = qty.saturating_add(line.quantity);
        if *qty > MAX_LINE_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "Quantity per product cannot exceed {}",
                MAX_LINE_QUANTITY
            )));
        }
    }
    Ok(merged)
}

fn snapshot_line(product: &product::Model, quantity: i32) -> OrderItem {
    let discounted_price = product.discounted_price();
    OrderItem {
        product_id: product.id,
        name: product.name.clone(),
        image: product.primary_image(),
        unit_price: product.price,
        discount: product.discount,
        discounted_price,
        quantity,
        line_total: pricing::round_money(discounted_price * Decimal::from(quantity)),
    }
}

/// Asks the gateway to return everything paid for `order` and notes the
/// outcome on `timeline` under `status`. Returns the payment status the
/// order should carry: only a refund the gateway reports as processed
/// counts as `Refunded`; anything else stays `Completed` until a refund
/// webhook settles it.
pub(crate) async fn refund_order_in_full(
    gateway: &dyn PaymentGateway,
    order: &order::Model,
    payment_id: &str,
    status: OrderStatus,
    timeline: &mut Timeline,
) -> PaymentStatus {
    match gateway
        .refund_payment(payment_id, order.amount_minor_units(), &order.order_number)
        .await
    {
        Ok(refund) if refund.status == "processed" => {
            info!(order_id = %order.id, refund_id = %refund.id, "full refund processed");
            timeline.push(status, format!("Refund processed ({})", refund.id));
            PaymentStatus::Refunded
        }
        Ok(refund) => {
            info!(
                order_id = %order.id,
                refund_id = %refund.id,
                refund_status = %refund.status,
                "full refund requested"
            );
            timeline.push(
                status,
                format!("Refund initiated ({}), awaiting gateway confirmation", refund.id),
            );
            PaymentStatus::Completed
        }
        Err(err) => {
            warn!(order_id = %order.id, error = %err, "full refund failed");
            metrics::counter!("stonecraft_orders.refund_failures", 1);
            timeline.push(status, "Refund could not be initiated; manual refund required");
            PaymentStatus::Completed
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    promotions: PromotionService,
    commerce: CommerceConfig,
    gateway_key_id: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        commerce: CommerceConfig,
        gateway_key_id: String,
    ) -> Self {
        Self {
            promotions: PromotionService::new(db.clone()),
            db,
            gateway,
            event_sender,
            commerce,
            gateway_key_id,
        }
    }

    pub async fn find_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    /// Places an order for `caller`.
    #[instrument(skip(self, input), fields(user_id = %caller.user_id, lines = input.items.len()))]
    pub async fn create_order(
        &self,
        caller: &AuthUser,
        input: CreateOrderInput,
    ) -> Result<PlacedOrder, ServiceError> {
        input.validate()?;
        let quantities = merge_lines(&input.items)?;

        let customer = user::Entity::find_by_id(caller.user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Account no longer exists".into()))?;

        let shipping_address = self.resolve_shipping_address(&customer, &input)?;
        let (gstin, gst_business_name) = Self::resolve_gst(&input)?;

        let ids: Vec<Uuid> = quantities.keys().copied().collect();
        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?;

        let mut items = Vec::with_capacity(quantities.len());
        for (product_id, quantity) in &quantities {
            let product = products
                .iter()
                .find(|p| p.id == *product_id)
                .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
            if !product.stock_status.is_purchasable() {
                return Err(ServiceError::InvalidOperation(format!(
                    "{} is out of stock",
                    product.name
                )));
            }
            items.push(snapshot_line(product, *quantity));
        }

        let subtotal = pricing::subtotal(items.iter().map(|i| (i.discounted_price, i.quantity)));

        let promo = match clean_optional(input.promo_code.clone()) {
            Some(code) => Some(
                self.promotions
                    .quote_for_checkout(caller.user_id, &code, subtotal)
                    .await?,
            ),
            None => None,
        };

        let totals = pricing::order_totals(
            pricing::TotalsInput {
                subtotal,
                promo_discount: promo.as_ref().map_or(Decimal::ZERO, |p| p.discount),
                gift_wrap: input.gift_wrap,
            },
            &self.commerce,
        );

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let draft = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(String::new()),
            user_id: Set(caller.user_id),
            items: Set(OrderItems(items)),
            shipping_address: Set(shipping_address),
            billing_address: Set(input.billing_address.clone()),
            payment_method: Set(input.payment_method),
            payment_status: Set(PaymentStatus::Pending),
            gateway_order_id: Set(None),
            transaction_id: Set(None),
            paid_at: Set(None),
            currency: Set(self.commerce.currency.clone()),
            subtotal: Set(totals.subtotal),
            discount_amount: Set(totals.discount),
            shipping_cost: Set(totals.shipping),
            gift_wrap_cost: Set(totals.gift_wrap_cost),
            tax_amount: Set(totals.tax),
            total: Set(totals.total),
            promo_code: Set(promo.as_ref().map(|p| p.code.clone())),
            gift_wrap: Set(input.gift_wrap),
            gift_message: Set(if input.gift_wrap {
                clean_optional(input.gift_message.clone())
            } else {
                None
            }),
            gstin: Set(gstin),
            gst_business_name: Set(gst_business_name),
            status: Set(OrderStatus::Pending),
            tracking_number: Set(None),
            notes: Set(clean_optional(input.notes.clone())),
            timeline: Set(Timeline::starting_with(OrderStatus::Pending, "Order placed")),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let txn = self.db.begin().await?;
        let placed = insert_with_retry(&txn, ORDER_NUMBER_ATTEMPTS, || {
            let mut candidate = draft.clone();
            candidate.order_number = Set(reference_number("ORD"));
            candidate
        })
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError("could not allocate a unique order number".into())
        })?;
        if placed.payment_method == PaymentMethod::Cod {
            if let Some(code) = placed.promo_code.as_deref() {
                PromotionService::record_usage(&txn, code, caller.user_id).await?;
            }
        }
        txn.commit().await?;

        let mut checkout = None;
        let placed = match placed.payment_method {
            PaymentMethod::Razorpay => {
                let (placed, details) = self.open_gateway_order(placed).await?;
                checkout = Some(details);
                placed
            }
            PaymentMethod::Cod => placed,
        };

        metrics::counter!("stonecraft_orders.created", 1, "payment_method" => placed.payment_method.to_string());
        info!(
            order_id = %placed.id,
            order_number = %placed.order_number,
            total = %placed.total,
            "order placed"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated(placed.id))
            .await;

        Ok(PlacedOrder {
            order: placed,
            checkout,
        })
    }

    /// Creates the gateway order for a committed order. No transaction is
    /// held across the gateway call; if it fails the order is removed again.
    async fn open_gateway_order(
        &self,
        placed: order::Model,
    ) -> Result<(order::Model, GatewayCheckout), ServiceError> {
        let request = CreateGatewayOrder {
            amount: placed.amount_minor_units(),
            currency: placed.currency.clone(),
            receipt: placed.order_number.clone(),
        };
        let gateway_order = match self.gateway.create_order(request).await {
            Ok(gateway_order) => gateway_order,
            Err(err) => {
                if let Err(db_err) = order::Entity::delete_by_id(placed.id).exec(&*self.db).await {
                    warn!(order_id = %placed.id, error = %db_err, "could not discard order after gateway failure");
                }
                return Err(err.into());
            }
        };

        let checkout = GatewayCheckout {
            key_id: self.gateway_key_id.clone(),
            gateway_order_id: gateway_order.id.clone(),
            amount: gateway_order.amount,
            currency: gateway_order.currency.clone(),
        };
        let mut active: order::ActiveModel = placed.into();
        active.gateway_order_id = Set(Some(gateway_order.id));
        let updated = active.update(&*self.db).await?;
        Ok((updated, checkout))
    }

    fn resolve_shipping_address(
        &self,
        customer: &user::Model,
        input: &CreateOrderInput,
    ) -> Result<AddressDetails, ServiceError> {
        if let Some(id) = input.shipping_address_id {
            return customer
                .addresses
                .get(id)
                .map(|a| a.details.clone())
                .ok_or_else(|| ServiceError::not_found("Address", id));
        }
        if let Some(address) = &input.shipping_address {
            return Ok(address.clone());
        }
        customer
            .addresses
            .default_address()
            .map(|a| a.details.clone())
            .ok_or_else(|| ServiceError::ValidationError("Shipping address is required".into()))
    }

    fn resolve_gst(input: &CreateOrderInput) -> Result<(Option<String>, Option<String>), ServiceError> {
        let gstin = clean_optional(input.gstin.clone()).map(|g| g.to_uppercase());
        let business = clean_optional(input.gst_business_name.clone());
        if !input.gst_invoice && gstin.is_none() {
            return Ok((None, None));
        }
        let gstin = gstin.ok_or_else(|| {
            ServiceError::ValidationError("GSTIN is required for a GST invoice".into())
        })?;
        if !is_valid_gstin(&gstin) {
            return Err(ServiceError::ValidationError("Invalid GSTIN format".into()));
        }
        if input.gst_invoice && business.is_none() {
            return Err(ServiceError::ValidationError(
                "Business name is required for a GST invoice".into(),
            ));
        }
        Ok((Some(gstin), business))
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id))]
    pub async fn list_orders(
        &self,
        caller: &AuthUser,
        query: OrderListQuery,
    ) -> Result<Page<order::Model>, ServiceError> {
        let page = PageRequest::from_parts(query.page, query.limit);
        let mut select = order::Entity::find().order_by_desc(order::Column::CreatedAt);

        if caller.is_admin() {
            if let Some(user_id) = query.user_id {
                select = select.filter(order::Column::UserId.eq(user_id));
            }
        } else {
            select = select.filter(order::Column::UserId.eq(caller.user_id));
        }
        if let Some(status) = query.status {
            select = select.filter(order::Column::Status.eq(status));
        }

        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get_order(&self, caller: &AuthUser, id: Uuid) -> Result<order::Model, ServiceError> {
        let order = self.find_order(id).await?;
        caller.ensure_can_access(order.user_id, "order")?;
        Ok(order)
    }

    /// Admin status and tracking update along the lifecycle graph.
    #[instrument(skip(self, input))]
    pub async fn update_order(
        &self,
        caller: &AuthUser,
        id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<order::Model, ServiceError> {
        caller.ensure_admin()?;
        input.validate()?;

        if input.status == Some(OrderStatus::Cancelled) {
            return self
                .cancel_order(caller, id, CancelOrderInput { reason: input.note })
                .await;
        }

        let order = self.find_order(id).await?;
        let old_status = order.status;
        let note = clean_optional(input.note);
        let tracking = clean_optional(input.tracking_number);

        if input.status.is_none() && tracking.is_none() && note.is_none() {
            return Ok(order);
        }

        let mut timeline = order.timeline.clone();
        let mut payment_status = order.payment_status;
        let mut paid_at = order.paid_at;
        let new_status = match input.status {
            Some(next) if next != old_status => {
                if !old_status.can_transition_to(next) {
                    return Err(ServiceError::InvalidOperation(format!(
                        "Cannot change order status from {} to {}",
                        old_status, next
                    )));
                }
                timeline.push(
                    next,
                    note.clone().unwrap_or_else(|| format!("Order {}", next)),
                );
                if next == OrderStatus::Delivered
                    && order.payment_method == PaymentMethod::Cod
                    && payment_status == PaymentStatus::Pending
                {
                    payment_status = PaymentStatus::Completed;
                    paid_at = Some(Utc::now());
                }
                next
            }
            _ => {
                let entry = match (&tracking, &note) {
                    (Some(t), None) => format!("Tracking number updated: {}", t),
                    (_, Some(n)) => n.clone(),
                    (None, None) => "Order updated".to_string(),
                };
                timeline.push(old_status, entry);
                old_status
            }
        };

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        active.timeline = Set(timeline);
        active.payment_status = Set(payment_status);
        active.paid_at = Set(paid_at);
        if tracking.is_some() {
            active.tracking_number = Set(tracking);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if new_status != old_status {
            info!(order_id = %id, from = %old_status, to = %new_status, "order status changed");
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id: id,
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                })
                .await;
        }
        Ok(updated)
    }

    /// Cancels a pending or confirmed order. Online payments are refunded in
    /// full; a failed refund is left for manual processing.
    #[instrument(skip(self, input))]
    pub async fn cancel_order(
        &self,
        caller: &AuthUser,
        id: Uuid,
        input: CancelOrderInput,
    ) -> Result<order::Model, ServiceError> {
        input.validate()?;
        let order = self.find_order(id).await?;
        caller.ensure_can_access(order.user_id, "order")?;

        if !order.status.is_cancellable() {
            return Err(ServiceError::InvalidOperation(
                "Order can only be cancelled while pending or confirmed".into(),
            ));
        }

        let mut timeline = order.timeline.clone();
        let reason = clean_optional(input.reason);
        timeline.push(
            OrderStatus::Cancelled,
            match &reason {
                Some(r) => format!("Order cancelled: {}", r),
                None => "Order cancelled".to_string(),
            },
        );

        let mut payment_status = order.payment_status;
        if order.is_paid_online() {
            if let Some(payment_id) = order.transaction_id.as_deref() {
                payment_status = refund_order_in_full(
                    self.gateway.as_ref(),
                    &order,
                    payment_id,
                    OrderStatus::Cancelled,
                    &mut timeline,
                )
                .await;
            }
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.payment_status = Set(payment_status);
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(order_id = %id, "order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled(id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_order(&self, caller: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        caller.ensure_admin()?;
        let result = order::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Order", id));
        }
        info!(order_id = %id, "order deleted");
        Ok(())
    }

    /// Delivered orders of `user_id` that contain `product_id`.
    pub async fn has_delivered_purchase(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let delivered = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .all(&*self.db)
            .await?;
        Ok(delivered.iter().any(|o| o.items.contains(product_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gstin_format() {
        assert!(is_valid_gstin("27AAPFU0939F1ZV"));
        assert!(is_valid_gstin("08ABCDE1234F1Z5"));
        assert!(!is_valid_gstin("27aapfu0939f1zv"));
        assert!(!is_valid_gstin("27AAPFU0939F1XV"));
        assert!(!is_valid_gstin("27AAPFU0939F0ZV"));
        assert!(!is_valid_gstin(""));
    }

    fn checkout_with_lines(count: usize) -> CreateOrderInput {
        let items: Vec<_> = (0..count)
            .map(|_| serde_json::json!({ "product_id": Uuid::new_v4(), "quantity": 1 }))
            .collect();
        serde_json::from_value(serde_json::json!({
            "items": items,
            "payment_method": "cod"
        }))
        .unwrap()
    }

    #[test]
    fn line_count_is_validated() {
        assert!(checkout_with_lines(1).validate().is_ok());
        assert!(checkout_with_lines(50).validate().is_ok());
        for count in [0, 51] {
            let errors = checkout_with_lines(count).validate().unwrap_err();
            assert!(errors.field_errors().contains_key("items"), "{} lines", count);
        }
    }

    #[test]
    fn repeated_lines_are_merged() {
        let p = Uuid::new_v4();
        let merged = merge_lines(&[
            OrderLineInput { product_id: p, quantity: 2 },
            OrderLineInput { product_id: p, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(merged.get(&p), Some(&5));
    }

    #[test]
    fn quantity_bounds_are_enforced() {
        let p = Uuid::new_v4();
        assert!(merge_lines(&[OrderLineInput { product_id: p, quantity: 0 }]).is_err());
        assert!(merge_lines(&[
            OrderLineInput { product_id: p, quantity: 60 },
            OrderLineInput { product_id: p, quantity: 41 },
        ])
        .is_err());
        assert!(merge_lines(&[OrderLineInput { product_id: p, quantity: 100 }]).is_ok());
    }
}
