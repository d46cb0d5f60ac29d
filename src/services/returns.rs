use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::orders::is_unique_violation;
use super::{clean_optional, pricing, reference_number, Page, PageRequest};
use crate::auth::AuthUser;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::return_request::{
    self, RefundStatus, ReturnItem, ReturnItems, ReturnReason, ReturnStatus,
};
use crate::entities::{StringList, Timeline};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PaymentGateway;

const RETURN_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub reason: ReturnReason,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReturnInput {
    pub order_id: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub items: Vec<ReturnLineInput>,
    #[validate(length(max = 2000))]
    pub comments: Option<String>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateReturnInput {
    pub status: ReturnStatus,
    #[validate(length(max = 1000))]
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ReturnListQuery {
    pub status: Option<ReturnStatus>,
    pub order_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Whether an order placed at `ordered_at` can still be returned at `now`.
pub fn within_return_window(ordered_at: DateTime<Utc>, now: DateTime<Utc>, window_days: i64) -> bool {
    now - ordered_at <= Duration::days(window_days)
}

/// Validates requested lines against the order snapshot and prices them at
/// what the customer actually paid per unit.
fn build_return_items(
    order: &order::Model,
    lines: &[ReturnLineInput],
) -> Result<Vec<ReturnItem>, ServiceError> {
    let mut requested: BTreeMap<Uuid, (i32, ReturnReason)> = BTreeMap::new();
    for line in lines {
        if line.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Return quantity must be at least 1".into(),
            ));
        }
        let entry = requested.entry(line.product_id).or_insert((0, line.reason));
        entry.0 = entry.0.saturating_add(line.quantity);
    }

    requested
        .into_iter()
        .map(|(product_id, (quantity, reason))| {
            let ordered = order.items.find(product_id).ok_or_else(|| {
                ServiceError::ValidationError(format!("Product {} is not part of this order", product_id))
            })?;
            if quantity > ordered.quantity {
                return Err(ServiceError::ValidationError(format!(
                    "Cannot return {} of {}; only {} ordered",
                    quantity, ordered.name, ordered.quantity
                )));
            }
            Ok(ReturnItem {
                product_id,
                name: ordered.name.clone(),
                quantity,
                unit_price: ordered.discounted_price,
                reason,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    window_days: i64,
}

impl ReturnService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        window_days: i64,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
            window_days,
        }
    }

    async fn find_return(&self, id: Uuid) -> Result<return_request::Model, ServiceError> {
        return_request::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", id))
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id, order_id = %input.order_id))]
    pub async fn create_return(
        &self,
        caller: &AuthUser,
        input: CreateReturnInput,
    ) -> Result<return_request::Model, ServiceError> {
        input.validate()?;

        let order = order::Entity::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", input.order_id))?;
        if order.user_id != caller.user_id {
            return Err(ServiceError::Forbidden(
                "You can only return your own orders".into(),
            ));
        }
        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::InvalidOperation(
                "Only delivered orders can be returned".into(),
            ));
        }
        if !within_return_window(order.created_at, Utc::now(), self.window_days) {
            return Err(ServiceError::InvalidOperation(format!(
                "Return window of {} days has expired",
                self.window_days
            )));
        }

        let open = return_request::Entity::find()
            .filter(return_request::Column::OrderId.eq(order.id))
            .filter(return_request::Column::Status.is_in([
                ReturnStatus::Pending,
                ReturnStatus::Approved,
                ReturnStatus::PickedUp,
                ReturnStatus::Processing,
            ]))
            .one(&*self.db)
            .await?;
        if let Some(existing) = open {
            return Err(ServiceError::Conflict(format!(
                "Return {} is already open for this order",
                existing.return_number
            )));
        }

        let items = build_return_items(&order, &input.items)?;
        let lines_value = pricing::subtotal(items.iter().map(|i| (i.unit_price, i.quantity)));
        let refund_amount = pricing::refund_share(order.subtotal, order.total, lines_value);

        let now = Utc::now();
        let draft = return_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            return_number: Set(String::new()),
            order_id: Set(order.id),
            user_id: Set(caller.user_id),
            items: Set(ReturnItems(items)),
            comments: Set(clean_optional(input.comments)),
            images: Set(StringList(input.images)),
            status: Set(ReturnStatus::Pending),
            admin_note: Set(None),
            refund_amount: Set(refund_amount),
            refund_status: Set(RefundStatus::NotInitiated),
            refund_gateway_id: Set(None),
            refund_processed_at: Set(None),
            timeline: Set(Timeline::starting_with(ReturnStatus::Pending, "Return requested")),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let mut created = None;
        for _ in 0..RETURN_NUMBER_ATTEMPTS {
            let mut candidate = draft.clone();
            candidate.return_number = Set(reference_number("RET"));
            match candidate.insert(&*self.db).await {
                Ok(model) => {
                    created = Some(model);
                    break;
                }
                Err(err) if is_unique_violation(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        let created = created.ok_or_else(|| {
            ServiceError::InternalError("could not allocate a unique return number".into())
        })?;

        info!(return_id = %created.id, return_number = %created.return_number, %refund_amount, "return requested");
        self.event_sender
            .send_or_log(Event::ReturnRequested(created.id))
            .await;
        Ok(created)
    }

    pub async fn list_returns(
        &self,
        caller: &AuthUser,
        query: ReturnListQuery,
    ) -> Result<Page<return_request::Model>, ServiceError> {
        let page = PageRequest::from_parts(query.page, query.limit);
        let mut select =
            return_request::Entity::find().order_by_desc(return_request::Column::CreatedAt);
        if !caller.is_admin() {
            select = select.filter(return_request::Column::UserId.eq(caller.user_id));
        }
        if let Some(status) = query.status {
            select = select.filter(return_request::Column::Status.eq(status));
        }
        if let Some(order_id) = query.order_id {
            select = select.filter(return_request::Column::OrderId.eq(order_id));
        }
        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get_return(
        &self,
        caller: &AuthUser,
        id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let request = self.find_return(id).await?;
        caller.ensure_can_access(request.user_id, "return")?;
        Ok(request)
    }

    /// Admin transition along the return graph. Completing a return refunds
    /// the customer and marks the order returned.
    #[instrument(skip(self, input), fields(status = %input.status))]
    pub async fn update_return(
        &self,
        caller: &AuthUser,
        id: Uuid,
        input: UpdateReturnInput,
    ) -> Result<return_request::Model, ServiceError> {
        caller.ensure_admin()?;
        input.validate()?;

        let request = self.find_return(id).await?;
        let next = input.status;
        if !request.status.can_transition_to(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot change return status from {} to {}",
                request.status, next
            )));
        }

        let note = clean_optional(input.admin_note);
        let mut timeline = request.timeline.clone();
        timeline.push(next, note.clone().unwrap_or_else(|| format!("Return {}", next)));

        let mut refund_status = request.refund_status;
        let mut refund_gateway_id = request.refund_gateway_id.clone();
        let mut refund_processed_at = request.refund_processed_at;

        if next == ReturnStatus::Completed {
            let order = order::Entity::find_by_id(request.order_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Order", request.order_id))?;

            let refund = self.request_refund(&order, &request).await;
            refund_status = refund.status;
            if refund.gateway_id.is_some() {
                refund_gateway_id = refund.gateway_id;
            }
            if refund.status == RefundStatus::Processed {
                refund_processed_at = Some(Utc::now());
            }
            timeline.push(next, refund.note);
            let full_refund = refund.status == RefundStatus::Processed
                && request.refund_amount >= order.total;
            self.mark_order_returned(order, full_refund).await?;
        }

        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(next);
        if note.is_some() {
            active.admin_note = Set(note);
        }
        active.refund_status = Set(refund_status);
        active.refund_gateway_id = Set(refund_gateway_id);
        active.refund_processed_at = Set(refund_processed_at);
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(return_id = %id, status = %next, "return status changed");
        self.event_sender
            .send_or_log(Event::ReturnStatusChanged {
                return_id: id,
                new_status: next.to_string(),
            })
            .await;
        if next == ReturnStatus::Completed {
            self.event_sender
                .send_or_log(Event::RefundUpdated(id))
                .await;
        }
        Ok(updated)
    }

    async fn request_refund(
        &self,
        order: &order::Model,
        request: &return_request::Model,
    ) -> RefundAttempt {
        let payment_id = match order.transaction_id.as_deref() {
            Some(payment_id) if order.is_paid_online() => payment_id,
            _ => {
                return RefundAttempt {
                    status: RefundStatus::Pending,
                    gateway_id: None,
                    note: "Refund pending manual processing".into(),
                }
            }
        };

        let amount = pricing::minor_units(request.refund_amount);
        match self
            .gateway
            .refund_payment(payment_id, amount, &request.return_number)
            .await
        {
            Ok(refund) => {
                let status = if refund.status == "processed" {
                    RefundStatus::Processed
                } else {
                    RefundStatus::Pending
                };
                info!(return_id = %request.id, refund_id = %refund.id, "refund requested");
                RefundAttempt {
                    status,
                    note: format!("Refund of {} initiated", request.refund_amount),
                    gateway_id: Some(refund.id),
                }
            }
            Err(err) => {
                warn!(return_id = %request.id, error = %err, "refund request failed");
                metrics::counter!("stonecraft_returns.refund_failures", 1);
                RefundAttempt {
                    status: RefundStatus::Failed,
                    gateway_id: None,
                    note: "Refund could not be initiated".into(),
                }
            }
        }
    }

    async fn mark_order_returned(
        &self,
        order: order::Model,
        full_refund: bool,
    ) -> Result<(), ServiceError> {
        if !order.status.can_transition_to(OrderStatus::Returned) {
            return Ok(());
        }
        let order_id = order.id;
        let old_status = order.status;
        let mut timeline = order.timeline.clone();
        timeline.push(OrderStatus::Returned, "Return completed");

        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Returned);
        if full_refund {
            active.payment_status = Set(PaymentStatus::Refunded);
        }
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Returned.to_string(),
            })
            .await;
        Ok(())
    }

    /// Customer withdraws a return that has not been reviewed yet.
    #[instrument(skip(self))]
    pub async fn cancel_return(
        &self,
        caller: &AuthUser,
        id: Uuid,
    ) -> Result<return_request::Model, ServiceError> {
        let request = self.find_return(id).await?;
        caller.ensure_can_access(request.user_id, "return")?;
        if request.status != ReturnStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "Only pending returns can be cancelled".into(),
            ));
        }

        let mut timeline = request.timeline.clone();
        timeline.push(ReturnStatus::Cancelled, "Return cancelled by customer");
        let mut active: return_request::ActiveModel = request.into();
        active.status = Set(ReturnStatus::Cancelled);
        active.timeline = Set(timeline);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ReturnStatusChanged {
                return_id: id,
                new_status: ReturnStatus::Cancelled.to_string(),
            })
            .await;
        Ok(updated)
    }
}

struct RefundAttempt {
    status: RefundStatus,
    gateway_id: Option<String>,
    note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_day_window() {
        let ordered = Utc::now() - Duration::days(30);
        assert!(within_return_window(ordered + Duration::minutes(1), Utc::now(), 30));
        assert!(!within_return_window(ordered - Duration::days(1), Utc::now(), 30));
    }

    #[test]
    fn return_needs_at_least_one_line() {
        let order_id = Uuid::new_v4();
        let empty: CreateReturnInput =
            serde_json::from_value(serde_json::json!({ "order_id": order_id, "items": [] }))
                .unwrap();
        assert!(empty.validate().unwrap_err().field_errors().contains_key("items"));

        let one: CreateReturnInput = serde_json::from_value(serde_json::json!({
            "order_id": order_id,
            "items": [{ "product_id": Uuid::new_v4(), "quantity": 1, "reason": "damaged" }]
        }))
        .unwrap();
        assert!(one.validate().is_ok());
    }
}
