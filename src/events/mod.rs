use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::{order, return_request, support_ticket, user};
use crate::notifications::{self, EmailMessage, Mailer};

/// Domain events raised by services after their write has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    PaymentConfirmed(Uuid),
    PaymentFailed(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    ReturnRequested(Uuid),
    ReturnStatusChanged {
        return_id: Uuid,
        new_status: String,
    },
    RefundUpdated(Uuid),
    TicketReplied(Uuid),
}

#[derive(Debug, thiserror::Error)]
#[error("event channel closed: {0}")]
pub struct EventError(String);

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), EventError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| EventError(e.to_string()))
    }

    /// Sends and logs on failure. Events never fail the request that raised them.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "failed to publish event");
        }
    }
}

/// Turns events into customer notifications.
#[derive(Clone)]
pub struct EventProcessor {
    db: Arc<DatabaseConnection>,
    mailer: Arc<dyn Mailer>,
}

impl EventProcessor {
    pub fn new(db: Arc<DatabaseConnection>, mailer: Arc<dyn Mailer>) -> Self {
        Self { db, mailer }
    }

    async fn user_email(&self, user_id: Uuid) -> Option<String> {
        match user::Entity::find_by_id(user_id).one(&*self.db).await {
            Ok(found) => found.map(|u| u.email),
            Err(e) => {
                error!(%user_id, error = %e, "failed to load user for notification");
                None
            }
        }
    }

    async fn load_order(&self, order_id: Uuid) -> Option<order::Model> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(|e| error!(%order_id, error = %e, "failed to load order for notification"))
            .ok()
            .flatten()
    }

    async fn order_email(
        &self,
        order_id: Uuid,
        build: fn(&str, &order::Model) -> EmailMessage,
    ) -> Option<EmailMessage> {
        let order = self.load_order(order_id).await?;
        let to = self.user_email(order.user_id).await?;
        Some(build(&to, &order))
    }

    async fn return_email(&self, return_id: Uuid) -> Option<EmailMessage> {
        let request = return_request::Entity::find_by_id(return_id)
            .one(&*self.db)
            .await
            .map_err(|e| error!(%return_id, error = %e, "failed to load return for notification"))
            .ok()
            .flatten()?;
        let to = self.user_email(request.user_id).await?;
        Some(notifications::return_update(&to, &request))
    }

    async fn ticket_email(&self, ticket_id: Uuid) -> Option<EmailMessage> {
        let ticket = support_ticket::Entity::find_by_id(ticket_id)
            .one(&*self.db)
            .await
            .map_err(|e| error!(%ticket_id, error = %e, "failed to load ticket for notification"))
            .ok()
            .flatten()?;
        let to = self.user_email(ticket.user_id).await?;
        Some(notifications::ticket_reply(&to, &ticket))
    }

    pub async fn handle(&self, event: Event) {
        let message = match &event {
            Event::OrderCreated(id) => self.order_email(*id, notifications::order_confirmation).await,
            Event::PaymentConfirmed(id)
            | Event::OrderCancelled(id)
            | Event::OrderStatusChanged { order_id: id, .. } => {
                self.order_email(*id, notifications::order_status_update).await
            }
            Event::ReturnRequested(id)
            | Event::ReturnStatusChanged { return_id: id, .. }
            | Event::RefundUpdated(id) => self.return_email(*id).await,
            Event::TicketReplied(id) => self.ticket_email(*id).await,
            Event::PaymentFailed(id) => {
                info!(order_id = %id, "payment failed; customer may retry checkout");
                None
            }
        };

        if let Some(message) = message {
            let subject = message.subject.clone();
            if let Err(e) = self.mailer.send(message).await {
                warn!(error = %e, %subject, "notification email failed");
            }
        }
    }
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, processor: EventProcessor) {
    info!("Starting event processing loop");
    while let Some(event) = rx.recv().await {
        debug!(?event, "received event");
        processor.handle(event).await;
    }
    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_receiver_dropped_reports_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
        // and the logging variant swallows it
        sender.send_or_log(Event::OrderCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        sender.send(Event::OrderCreated(a)).await.unwrap();
        sender.send(Event::OrderCancelled(b)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::OrderCreated(a)));
        assert_eq!(rx.recv().await, Some(Event::OrderCancelled(b)));
    }
}
