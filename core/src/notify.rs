//! Outbound notification collaborator.
//!
//! Notifications are fire-and-forget and only ever dispatched after the
//! transaction that produced them committed.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Message templates known to the delivery backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    /// First placement of an order
    OrderPlaced,
    /// A consultant was bound to an order on placement
    ConsultantAssigned,
    /// Payment settled
    PaymentCompleted,
    /// Payment denied, expired or cancelled by the gateway
    PaymentCancelled,
    /// Order cancelled explicitly
    OrderCancelled,
    /// Order moved to another consultant
    ConsultantReassigned,
}

impl Template {
    /// Template identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OrderPlaced => "order_placed",
            Self::ConsultantAssigned => "consultant_assigned",
            Self::PaymentCompleted => "payment_completed",
            Self::PaymentCancelled => "payment_cancelled",
            Self::OrderCancelled => "order_cancelled",
            Self::ConsultantReassigned => "consultant_reassigned",
        }
    }
}

/// A message waiting to be delivered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient email addresses
    pub recipients: Vec<String>,
    /// Template to render
    pub template: Template,
    /// Template variables
    pub content: serde_json::Value,
}

impl Notification {
    /// Create a notification.
    #[must_use]
    pub const fn new(
        recipients: Vec<String>,
        template: Template,
        content: serde_json::Value,
    ) -> Self {
        Self {
            recipients,
            template,
            content,
        }
    }
}

/// Delivery backend (email, SMS, push).
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns error if delivery failed; the engine logs it and moves on.
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
