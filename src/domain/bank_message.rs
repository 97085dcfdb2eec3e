use super::order::OrderId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type BankMessageId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum BankMessageStatus {
    Success,
    Error,
    /// The paid amount differs from the order; an operator has to decide.
    PendingApproval,
    Approved,
    Declined,
}

/// Raw payment notification forwarded by the bank, correlated by card number.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentNotification {
    pub card_number: String,
    pub amount: Decimal,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BankMessage {
    pub id: BankMessageId,
    pub card_number: String,
    pub amount: Decimal,
    pub text: String,
    pub order_id: Option<OrderId>,
    pub status: BankMessageStatus,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl BankMessage {
    pub fn from_notification(notification: &PaymentNotification) -> Self {
        Self {
            id: 0,
            card_number: notification.card_number.clone(),
            amount: notification.amount,
            text: notification.text.clone(),
            order_id: None,
            status: BankMessageStatus::Error,
            error: None,
            received_at: Utc::now(),
        }
    }

    /// Returns false when the message is not waiting for a decision.
    pub fn approve(&mut self) -> bool {
        self.decide(BankMessageStatus::Approved)
    }

    pub fn decline(&mut self) -> bool {
        self.decide(BankMessageStatus::Declined)
    }

    fn decide(&mut self, status: BankMessageStatus) -> bool {
        if self.status != BankMessageStatus::PendingApproval {
            return false;
        }
        self.status = status;
        true
    }
}
