use super::broker::{SubscriptionBroker, Watched};
use crate::domain::card::CardStatus;
use crate::domain::order::{Order, Status};
use crate::domain::ports::{AlerterRef, ListenerRef, Stores};
use crate::error::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Terminal bookkeeping shared by every path that finishes an order.
pub struct CompletionRecorder {
    stores: Stores,
    broker: Arc<SubscriptionBroker>,
    listener: ListenerRef,
    alerter: AlerterRef,
    card_disable_amount: Decimal,
}

impl CompletionRecorder {
    pub fn new(
        stores: Stores,
        broker: Arc<SubscriptionBroker>,
        listener: ListenerRef,
        alerter: AlerterRef,
        card_disable_amount: Decimal,
    ) -> Self {
        Self {
            stores,
            broker,
            listener,
            alerter,
            card_disable_amount,
        }
    }

    pub fn broker(&self) -> &Arc<SubscriptionBroker> {
        &self.broker
    }

    pub fn listener(&self) -> &ListenerRef {
        &self.listener
    }

    /// Moves the order to a terminal status, persists it, credits the card on
    /// success, then notifies the listener and publishes the order.
    pub async fn finish_order(&self, mut order: Order, status: Status) -> Result<Order> {
        order.advance(status)?;
        order.date_paid = Some(Utc::now());
        let order = self.stores.orders.save(order).await?;
        tracing::info!(order_id = order.id, status = %order.status, "Order finished");

        if order.status == Status::Completed
            && let Err(e) = self.credit_card(&order).await
        {
            tracing::error!(order_id = order.id, card_id = order.card_id, error = %e, "Failed to credit card");
        }

        self.listener.order_finished(&order);
        self.publish(Watched::Order(order.clone()));
        Ok(order)
    }

    async fn credit_card(&self, order: &Order) -> Result<()> {
        let balance = self
            .stores
            .cards
            .increase_balance(order.card_id, order.amount)
            .await?;
        if balance < self.card_disable_amount {
            return Ok(());
        }

        let Some(mut card) = self.stores.cards.find_by_id(order.card_id).await? else {
            return Ok(());
        };
        if card.status == CardStatus::Disabled {
            return Ok(());
        }
        card.status = CardStatus::Disabled;
        let card = self.stores.cards.save(card).await?;
        tracing::warn!(card_id = card.id, %balance, "Card disabled, balance limit reached");
        self.alerter.card_disabled(&card, balance);
        Ok(())
    }

    /// Publishes on a separate task; the caller never waits for subscribers.
    pub fn publish(&self, entity: Watched) {
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            broker.publish(entity).await;
        });
    }
}
