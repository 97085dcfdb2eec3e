use super::allocator::CardAllocator;
use super::settlement::SettlementOrchestrator;
use crate::config::GatewayConfig;
use crate::domain::order::{Order, PaymentMethod, Status};
use crate::domain::payment_link::PaymentLink;
use crate::domain::ports::Stores;
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOrderRequest {
    pub payment_method: String,
    pub amount: Decimal,
    pub payload: String,
}

/// What a payer needs to pay an order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInfo {
    pub order_number: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: Status,
    /// Only shown for methods paid by plain transfer.
    pub card_number: Option<String>,
    pub link: Option<PaymentLink>,
}

pub struct OrderService {
    stores: Stores,
    allocator: Arc<CardAllocator>,
    settlement: Arc<SettlementOrchestrator>,
    config: GatewayConfig,
}

impl OrderService {
    pub fn new(
        stores: Stores,
        allocator: Arc<CardAllocator>,
        settlement: Arc<SettlementOrchestrator>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            stores,
            allocator,
            settlement,
            config,
        }
    }

    fn validate(&self, request: &CreateOrderRequest) -> Result<PaymentMethod> {
        let method: PaymentMethod = request.payment_method.parse()?;
        let limits = self.config.limits(method);
        if request.amount <= Decimal::ZERO {
            return Err(GatewayError::Validation("amount must be positive".to_string()));
        }
        if request.amount < limits.min || request.amount > limits.max {
            return Err(GatewayError::Validation(format!(
                "amount must be between {} and {}",
                limits.min, limits.max
            )));
        }
        Ok(method)
    }

    /// Reserves a card and persists the order.
    ///
    /// Transfer orders are stored as `Pending` right away and wait for the
    /// bank notification. Link orders are stored as `New` with a new payment
    /// link; creating and confirming the link runs on the dispatcher.
    pub async fn create(&self, request: CreateOrderRequest) -> Result<Order> {
        let method = self.validate(&request)?;
        let mut order = Order::new(request.amount, method, request.payload);

        let lease = self.allocator.select(&order).await?;
        order.card_id = lease.card.id;
        if !method.requires_link() {
            order.advance(Status::Pending)?;
        }

        let order = match self.stores.orders.save(order).await {
            Ok(order) => order,
            Err(e) => {
                if lease.exclusive {
                    self.allocator.unlock(lease.card.id).await;
                }
                return Err(e);
            }
        };
        if lease.exclusive && !self.allocator.bind_order(lease.card.id, order.id).await {
            tracing::warn!(order_id = order.id, card_id = order.card_id, "Card lock lost before the order was bound");
            let mut order = order;
            order.advance(Status::Failed)?;
            self.stores.orders.save(order).await?;
            return Err(GatewayError::ResourceUnavailable(method));
        }
        tracing::info!(order_id = order.id, card_id = order.card_id, %method, amount = %order.amount, "Order created");

        if method.requires_link() {
            self.settlement.start(&order, lease.card).await?;
        }
        Ok(order)
    }

    pub async fn find(&self, number: Uuid) -> Result<Order> {
        self.stores
            .orders
            .find_by_number(number)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("order {number}")))
    }

    pub async fn status(&self, number: Uuid) -> Result<Status> {
        Ok(self.find(number).await?.status)
    }

    pub async fn payment_link(&self, number: Uuid) -> Result<Option<PaymentLink>> {
        let order = self.find(number).await?;
        self.stores.links.find_by_order_id(order.id).await
    }

    pub async fn payment_info(&self, number: Uuid) -> Result<PaymentInfo> {
        let order = self.find(number).await?;
        let (card_number, link) = if order.payment_method.requires_link() {
            (None, self.stores.links.find_by_order_id(order.id).await?)
        } else {
            let card = self.stores.cards.find_by_id(order.card_id).await?;
            (card.and_then(|c| c.card_number), None)
        };
        Ok(PaymentInfo {
            order_number: order.number,
            amount: order.amount,
            payment_method: order.payment_method,
            status: order.status,
            card_number,
            link,
        })
    }
}
