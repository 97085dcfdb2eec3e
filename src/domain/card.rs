use super::order::PaymentMethod;
use crate::error::GatewayError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type CardId = u64;

const PHONE_PREFIX_LEN: usize = 5;
const PHONE_NUMBER_LEN: usize = 7;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    /// Paid by plain bank transfer to the card number.
    #[serde(rename = "with_number")]
    NumberCard,
    /// Paid through a bank-generated link bound to the phone number.
    #[serde(rename = "with_phone")]
    PhoneCard,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Enabled,
    Disabled,
}

/// A settlement instrument from the shared pool.
///
/// `total_payment_sum` is only used to weight selection towards less-used cards.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Card {
    pub id: CardId,
    pub kind: CardKind,
    pub status: CardStatus,
    pub card_number: Option<String>,
    pub phone_prefix: Option<String>,
    pub phone_number: Option<String>,
    pub total_payment_sum: Decimal,
}

impl Card {
    pub fn with_number(card_number: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind: CardKind::NumberCard,
            status: CardStatus::Disabled,
            card_number: Some(card_number.into()),
            phone_prefix: None,
            phone_number: None,
            total_payment_sum: Decimal::ZERO,
        }
    }

    pub fn with_phone(prefix: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind: CardKind::PhoneCard,
            status: CardStatus::Disabled,
            card_number: None,
            phone_prefix: Some(prefix.into()),
            phone_number: Some(number.into()),
            total_payment_sum: Decimal::ZERO,
        }
    }

    pub fn enabled(mut self) -> Self {
        self.status = CardStatus::Enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.status == CardStatus::Enabled
    }

    pub fn supports(&self, method: PaymentMethod) -> bool {
        match self.kind {
            CardKind::NumberCard => method == PaymentMethod::BankTransfer,
            CardKind::PhoneCard => method == PaymentMethod::KapitalBank,
        }
    }

    /// Number cards are settled by an inbound notification correlated by
    /// card number, so one card can only serve one order at a time.
    pub fn requires_lock(&self) -> bool {
        self.kind == CardKind::NumberCard
    }

    pub fn phone(&self) -> Option<(&str, &str)> {
        match (&self.phone_prefix, &self.phone_number) {
            (Some(prefix), Some(number)) => Some((prefix.as_str(), number.as_str())),
            _ => None,
        }
    }

    /// Human-facing identifier: phone for phone cards, number otherwise.
    pub fn identifier(&self) -> String {
        match self.kind {
            CardKind::PhoneCard => self
                .phone()
                .map(|(prefix, number)| format!("{prefix}{number}"))
                .unwrap_or_default(),
            CardKind::NumberCard => self.card_number.clone().unwrap_or_default(),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        match self.kind {
            CardKind::NumberCard => {
                if self.card_number.as_deref().is_none_or(str::is_empty) {
                    return Err(GatewayError::Validation(
                        "card number cannot be empty".to_string(),
                    ));
                }
            }
            CardKind::PhoneCard => {
                if self.phone_prefix.as_ref().map(String::len) != Some(PHONE_PREFIX_LEN) {
                    return Err(GatewayError::Validation(format!(
                        "phone_prefix must have length {PHONE_PREFIX_LEN}"
                    )));
                }
                if self.phone_number.as_ref().map(String::len) != Some(PHONE_NUMBER_LEN) {
                    return Err(GatewayError::Validation(format!(
                        "phone_number must have length {PHONE_NUMBER_LEN}"
                    )));
                }
            }
        }
        Ok(())
    }
}
