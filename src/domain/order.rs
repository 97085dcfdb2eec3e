use super::card::CardId;
use crate::error::GatewayError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type OrderId = u64;

/// Lifecycle shared by orders and payment links.
///
/// Transitions only move forward; `Completed` and `Failed` are final.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    New,
    Pending,
    Completed,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Pending => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn can_become(self, next: Status) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    pub(crate) fn advance(&mut self, next: Status) -> Result<(), GatewayError> {
        if !self.can_become(next) {
            return Err(GatewayError::Validation(format!(
                "status cannot move from {self} to {next}"
            )));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for Status {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(GatewayError::Validation(format!("invalid status: {other}"))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    KapitalBank,
}

impl PaymentMethod {
    /// Methods whose settlement needs a generated payment link.
    pub fn requires_link(self) -> bool {
        self == Self::KapitalBank
    }

    pub fn card_type(self) -> CardType {
        match self {
            Self::KapitalBank => CardType::Visa,
            Self::BankTransfer => CardType::None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::BankTransfer => "Card",
            Self::KapitalBank => "Kapital Bank link",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BankTransfer => f.write_str("bank_transfer"),
            Self::KapitalBank => f.write_str("kapital_bank"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(Self::BankTransfer),
            "kapital_bank" => Ok(Self::KapitalBank),
            _ => Err(GatewayError::Validation("unknown payment method".to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    None,
    Visa,
    Mastercard,
}

impl CardType {
    /// The bank's own spelling of the card type, if it has one.
    pub fn bank_name(self) -> Option<&'static str> {
        match self {
            Self::Visa => Some("Visa"),
            Self::Mastercard => Some("Mastercard"),
            Self::None => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: OrderId,
    /// Public identifier handed to the merchant.
    pub number: Uuid,
    pub payload: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub card_id: CardId,
    pub status: Status,
    pub date_paid: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(amount: Decimal, payment_method: PaymentMethod, payload: impl Into<String>) -> Self {
        Self {
            id: 0,
            number: Uuid::new_v4(),
            payload: payload.into(),
            amount,
            payment_method,
            card_id: 0,
            status: Status::New,
            date_paid: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn advance(&mut self, status: Status) -> Result<(), GatewayError> {
        self.status.advance(status)
    }
}
