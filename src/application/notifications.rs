use super::allocator::CardAllocator;
use super::completion::CompletionRecorder;
use crate::domain::bank_message::{BankMessage, BankMessageId, BankMessageStatus, PaymentNotification};
use crate::domain::order::{Order, OrderId, Status};
use crate::domain::ports::Stores;
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Why a notification could not settle its order.
#[derive(Debug)]
enum Rejection {
    /// The amount differs from the order; an operator decides.
    DifferentAmount,
    Error(String),
}

/// Settles transfer orders from the bank's inbound payment notifications.
pub struct NotificationService {
    stores: Stores,
    allocator: Arc<CardAllocator>,
    recorder: Arc<CompletionRecorder>,
}

impl NotificationService {
    pub fn new(
        stores: Stores,
        allocator: Arc<CardAllocator>,
        recorder: Arc<CompletionRecorder>,
    ) -> Self {
        Self {
            stores,
            allocator,
            recorder,
        }
    }

    /// Correlates the notification with the order waiting on the card and
    /// completes it when the amount matches. The notification is always
    /// stored; the returned message carries the outcome.
    pub async fn receive(&self, notification: PaymentNotification) -> Result<BankMessage> {
        let mut message = BankMessage::from_notification(&notification);
        let (order_id, outcome) = self.settle(&notification).await;
        message.order_id = order_id;

        match outcome {
            Ok(()) => message.status = BankMessageStatus::Success,
            Err(Rejection::DifferentAmount) => {
                message.status = BankMessageStatus::PendingApproval;
                message.error = Some("got different amount".to_string());
            }
            Err(Rejection::Error(reason)) => {
                message.status = BankMessageStatus::Error;
                message.error = Some(reason);
            }
        }

        let message = self.stores.messages.save(message).await?;
        tracing::info!(
            message_id = message.id,
            order_id = ?message.order_id,
            status = ?message.status,
            "Payment notification processed"
        );
        Ok(message)
    }

    async fn settle(
        &self,
        notification: &PaymentNotification,
    ) -> (Option<OrderId>, std::result::Result<(), Rejection>) {
        let card = match self.stores.cards.find_by_number(&notification.card_number).await {
            Ok(Some(card)) => card,
            Ok(None) => return (None, Err(Rejection::Error("card not found".to_string()))),
            Err(e) => return (None, Err(Rejection::Error(e.to_string()))),
        };

        let Some(lock) = self.allocator.get_locked(card.id).await else {
            return (
                None,
                Err(Rejection::Error(
                    "card with this number is not waiting for payment".to_string(),
                )),
            );
        };
        self.allocator.unlock(card.id).await;
        let Some(order_id) = lock.order_id else {
            return (
                None,
                Err(Rejection::Error("card is not bound to an order".to_string())),
            );
        };

        let order = match self.stores.orders.find_by_id(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return (Some(order_id), Err(Rejection::Error("order not found".to_string()))),
            Err(e) => return (Some(order_id), Err(Rejection::Error(e.to_string()))),
        };
        if order.amount != notification.amount {
            tracing::warn!(
                order_id,
                expected = %order.amount,
                received = %notification.amount,
                "Payment amount differs from order, awaiting approval"
            );
            return (Some(order_id), Err(Rejection::DifferentAmount));
        }

        match self.recorder.finish_order(order, Status::Completed).await {
            Ok(_) => (Some(order_id), Ok(())),
            Err(e) => (
                Some(order_id),
                Err(Rejection::Error(format!("unable to finish order: {e}"))),
            ),
        }
    }

    /// Operator decision on a message held for approval.
    ///
    /// Approving requires the amount actually received, which replaces the
    /// order amount before it completes. Declining fails the order.
    pub async fn process_approval(
        &self,
        message_id: BankMessageId,
        approved: bool,
        amount: Option<Decimal>,
    ) -> Result<Order> {
        let mut message = self
            .stores
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("message #{message_id}")))?;
        let mut order = match message.order_id {
            Some(order_id) => self.stores.orders.find_by_id(order_id).await?,
            None => None,
        }
        .ok_or_else(|| GatewayError::NotFound(format!("order of message #{message_id}")))?;

        let status = if approved {
            let amount = amount
                .filter(|a| *a > Decimal::ZERO)
                .ok_or_else(|| GatewayError::Validation("invalid amount passed".to_string()))?;
            if !message.approve() {
                return Err(GatewayError::Validation("unable to approve".to_string()));
            }
            order.amount = amount;
            Status::Completed
        } else {
            if !message.decline() {
                return Err(GatewayError::Validation("unable to decline".to_string()));
            }
            Status::Failed
        };
        if order.is_finished() {
            return Err(GatewayError::Validation(format!(
                "order #{} is already {}",
                order.id, order.status
            )));
        }

        self.stores.messages.save(message).await?;
        tracing::info!(message_id, order_id = order.id, approved, "Bank message decided");
        self.recorder.finish_order(order, status).await
    }
}
