use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::orders::is_unique_violation;
use super::{reference_number, Page, PageRequest};
use crate::auth::AuthUser;
use crate::entities::order;
use crate::entities::support_ticket::{
    self, TicketCategory, TicketMessages, TicketPriority, TicketStatus,
};
use crate::entities::user::UserRole;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const TICKET_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateTicketInput {
    #[validate(length(min = 3, max = 200))]
    pub subject: String,
    pub category: TicketCategory,
    #[serde(default)]
    pub priority: TicketPriority,
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TicketMessageInput {
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTicketInput {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// Status a ticket moves to when `role` posts a message, or an error when the
/// ticket no longer accepts messages.
pub fn status_after_message(
    current: TicketStatus,
    role: UserRole,
) -> Result<TicketStatus, ServiceError> {
    match (current, role) {
        (TicketStatus::Closed, _) => Err(ServiceError::InvalidOperation(
            "Ticket is closed".into(),
        )),
        (TicketStatus::Open, UserRole::Admin) => Ok(TicketStatus::InProgress),
        (TicketStatus::Resolved, UserRole::Customer) => Ok(TicketStatus::Open),
        (status, _) => Ok(status),
    }
}

#[derive(Clone)]
pub struct TicketService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl TicketService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_ticket(&self, id: Uuid) -> Result<support_ticket::Model, ServiceError> {
        support_ticket::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Ticket", id))
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn create_ticket(
        &self,
        caller: &AuthUser,
        input: CreateTicketInput,
    ) -> Result<support_ticket::Model, ServiceError> {
        input.validate()?;

        if let Some(order_id) = input.order_id {
            let order = order::Entity::find_by_id(order_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
            caller.ensure_can_access(order.user_id, "order")?;
        }

        let mut messages = TicketMessages::default();
        messages.push(caller.user_id, caller.role, input.message.trim().to_string());

        let now = Utc::now();
        let draft = support_ticket::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_number: Set(String::new()),
            user_id: Set(caller.user_id),
            subject: Set(input.subject.trim().to_string()),
            category: Set(input.category),
            priority: Set(input.priority),
            order_id: Set(input.order_id),
            status: Set(TicketStatus::Open),
            messages: Set(messages),
            created_at: Set(now),
            updated_at: Set(now),
        };

        for _ in 0..TICKET_NUMBER_ATTEMPTS {
            let mut candidate = draft.clone();
            candidate.ticket_number = Set(reference_number("TKT"));
            match candidate.insert(&*self.db).await {
                Ok(ticket) => {
                    info!(ticket_id = %ticket.id, ticket_number = %ticket.ticket_number, "support ticket opened");
                    return Ok(ticket);
                }
                Err(err) if is_unique_violation(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique ticket number".into(),
        ))
    }

    pub async fn list_tickets(
        &self,
        caller: &AuthUser,
        query: TicketListQuery,
    ) -> Result<Page<support_ticket::Model>, ServiceError> {
        let page = PageRequest::from_parts(query.page, query.limit);
        let mut select =
            support_ticket::Entity::find().order_by_desc(support_ticket::Column::UpdatedAt);
        if !caller.is_admin() {
            select = select.filter(support_ticket::Column::UserId.eq(caller.user_id));
        }
        if let Some(status) = query.status {
            select = select.filter(support_ticket::Column::Status.eq(status));
        }
        let paginator = select.paginate(&*self.db, page.limit());
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.index()).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get_ticket(
        &self,
        caller: &AuthUser,
        id: Uuid,
    ) -> Result<support_ticket::Model, ServiceError> {
        let ticket = self.find_ticket(id).await?;
        caller.ensure_can_access(ticket.user_id, "ticket")?;
        Ok(ticket)
    }

    #[instrument(skip(self, input), fields(user_id = %caller.user_id))]
    pub async fn add_message(
        &self,
        caller: &AuthUser,
        id: Uuid,
        input: TicketMessageInput,
    ) -> Result<support_ticket::Model, ServiceError> {
        input.validate()?;
        let ticket = self.find_ticket(id).await?;
        caller.ensure_can_access(ticket.user_id, "ticket")?;

        let next = status_after_message(ticket.status, caller.role)?;
        let staff_reply = caller.is_admin() && caller.user_id != ticket.user_id;

        let mut messages = ticket.messages.clone();
        messages.push(caller.user_id, caller.role, input.message.trim().to_string());

        let mut active: support_ticket::ActiveModel = ticket.into();
        active.messages = Set(messages);
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        if staff_reply {
            self.event_sender
                .send_or_log(Event::TicketReplied(updated.id))
                .await;
        }
        Ok(updated)
    }

    #[instrument(skip(self, input))]
    pub async fn update_ticket(
        &self,
        caller: &AuthUser,
        id: Uuid,
        input: UpdateTicketInput,
    ) -> Result<support_ticket::Model, ServiceError> {
        caller.ensure_admin()?;
        let ticket = self.find_ticket(id).await?;

        let mut active: support_ticket::ActiveModel = ticket.into();
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        if let Some(priority) = input.priority {
            active.priority = Set(priority);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;
        info!(ticket_id = %id, status = %updated.status, "ticket updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_reply_moves_open_ticket_in_progress() {
        assert_eq!(
            status_after_message(TicketStatus::Open, UserRole::Admin).unwrap(),
            TicketStatus::InProgress
        );
        assert_eq!(
            status_after_message(TicketStatus::Open, UserRole::Customer).unwrap(),
            TicketStatus::Open
        );
    }

    #[test]
    fn customer_reply_reopens_resolved_ticket() {
        assert_eq!(
            status_after_message(TicketStatus::Resolved, UserRole::Customer).unwrap(),
            TicketStatus::Open
        );
    }

    #[test]
    fn closed_ticket_rejects_messages() {
        assert!(status_after_message(TicketStatus::Closed, UserRole::Admin).is_err());
        assert!(status_after_message(TicketStatus::Closed, UserRole::Customer).is_err());
    }
}
