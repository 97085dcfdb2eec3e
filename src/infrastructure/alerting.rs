use crate::domain::card::Card;
use crate::domain::order::PaymentMethod;
use crate::domain::ports::Alerter;
use rust_decimal::Decimal;

/// Raises operator alerts as `error`/`warn` events on the `alert` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlerter;

impl Alerter for TracingAlerter {
    fn no_cards_available(&self, method: Option<PaymentMethod>) {
        match method {
            Some(method) => {
                tracing::error!(target: "alert", %method, "No cards available for payment method")
            }
            None => tracing::error!(target: "alert", "Card pool is empty"),
        }
    }

    fn card_disabled(&self, card: &Card, balance: Decimal) {
        tracing::warn!(
            target: "alert",
            card_id = card.id,
            card = %card.identifier(),
            %balance,
            "Card disabled after reaching its balance limit"
        );
    }
}
