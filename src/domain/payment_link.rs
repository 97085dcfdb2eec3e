use super::order::{CardType, Order, OrderId, Status};
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type PaymentLinkId = u64;

/// A bank-generated payment page for one order.
///
/// Only the settlement orchestrator mutates links after creation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentLink {
    pub id: PaymentLinkId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub card_type: CardType,
    pub check_merchant_id: String,
    pub url: String,
    pub transaction_id: String,
    pub status: Status,
    pub failure_reason: Option<String>,
    pub date_paid: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentLink {
    pub fn for_order(order: &Order) -> Self {
        Self {
            id: 0,
            order_id: order.id,
            amount: order.amount,
            card_type: order.payment_method.card_type(),
            check_merchant_id: String::new(),
            url: String::new(),
            transaction_id: String::new(),
            status: Status::New,
            failure_reason: None,
            date_paid: None,
            updated_at: Utc::now(),
        }
    }

    pub fn advance(&mut self, status: Status) -> Result<(), GatewayError> {
        self.status.advance(status)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Amount in the bank's format: always two decimal places.
    pub fn formatted_amount(&self) -> String {
        format!("{:.2}", self.amount.round_dp(2))
    }
}
