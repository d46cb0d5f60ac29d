//! Customer email.
//!
//! Delivery is behind [`Mailer`]. Sending is always best effort: callers log
//! failures and carry on, an order never fails because an email did not go out.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::entities::{order, return_request, support_ticket};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Writes each message to the structured log instead of an SMTP relay.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if !message.to.contains('@') {
            return Err(MailError::InvalidRecipient(message.to));
        }
        info!(
            from = %self.from,
            subject = %message.subject,
            body_len = message.body.len(),
            "email dispatched"
        );
        Ok(())
    }
}

pub fn order_confirmation(to: &str, order: &order::Model) -> EmailMessage {
    let lines: Vec<String> = order
        .items
        .0
        .iter()
        .map(|item| format!("  {} x{}  {}", item.name, item.quantity, item.line_total))
        .collect();

    EmailMessage {
        to: to.to_string(),
        subject: format!("Order {} received", order.order_number),
        body: format!(
            "Thank you for your order {}.\n\n{}\n\nSubtotal: {}\nDiscount: {}\nShipping: {}\nTax: {}\nTotal: {} {}\n",
            order.order_number,
            lines.join("\n"),
            order.subtotal,
            order.discount_amount,
            order.shipping_cost,
            order.tax_amount,
            order.total,
            order.currency,
        ),
    }
}

pub fn order_status_update(to: &str, order: &order::Model) -> EmailMessage {
    let tracking = order
        .tracking_number
        .as_deref()
        .map(|t| format!("\nTracking number: {}", t))
        .unwrap_or_default();
    EmailMessage {
        to: to.to_string(),
        subject: format!("Order {} is now {}", order.order_number, order.status),
        body: format!(
            "Your order {} status changed to {}.{}\n",
            order.order_number, order.status, tracking
        ),
    }
}

pub fn return_update(to: &str, request: &return_request::Model) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Return {} is {}", request.return_number, request.status),
        body: format!(
            "Your return {} is now {}. Refund status: {} ({}).\n",
            request.return_number, request.status, request.refund_status, request.refund_amount
        ),
    }
}

pub fn ticket_reply(to: &str, ticket: &support_ticket::Model) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Update on ticket {}", ticket.ticket_number),
        body: format!(
            "Our team replied to your ticket \"{}\". Current status: {}.\n",
            ticket.subject, ticket.status
        ),
    }
}
