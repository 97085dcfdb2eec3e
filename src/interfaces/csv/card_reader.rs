use crate::domain::card::{Card, CardKind, CardStatus};
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct CardRecord {
    kind: CardKind,
    card_number: Option<String>,
    phone_prefix: Option<String>,
    phone_number: Option<String>,
    status: CardStatus,
    #[serde(default)]
    total_payment_sum: Option<Decimal>,
}

impl TryFrom<CardRecord> for Card {
    type Error = GatewayError;

    fn try_from(record: CardRecord) -> Result<Self> {
        let card = Card {
            id: 0,
            kind: record.kind,
            status: record.status,
            card_number: record.card_number.filter(|s| !s.is_empty()),
            phone_prefix: record.phone_prefix.filter(|s| !s.is_empty()),
            phone_number: record.phone_number.filter(|s| !s.is_empty()),
            total_payment_sum: record.total_payment_sum.unwrap_or_default(),
        };
        card.validate()?;
        Ok(card)
    }
}

/// Reads the card pool from a CSV source.
///
/// Columns: `kind, card_number, phone_prefix, phone_number, status, total_payment_sum`.
pub struct CardReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CardReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily parses and validates each card; ids are left for the store to assign.
    pub fn cards(self) -> impl Iterator<Item = Result<Card>> {
        self.reader.into_deserialize().map(|result| {
            let record: CardRecord = result?;
            Card::try_from(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "kind, card_number, phone_prefix, phone_number, status, total_payment_sum\n\
                    with_number, 4111111111111111, , , enabled, 150.5\n\
                    with_phone, , 99890, 1234567, disabled,";
        let cards: Vec<Result<Card>> = CardReader::new(data.as_bytes()).cards().collect();

        assert_eq!(cards.len(), 2);
        let first = cards[0].as_ref().unwrap();
        assert_eq!(first.kind, CardKind::NumberCard);
        assert_eq!(first.total_payment_sum, dec!(150.5));
        assert!(first.is_enabled());
        let second = cards[1].as_ref().unwrap();
        assert_eq!(second.phone(), Some(("99890", "1234567")));
        assert!(!second.is_enabled());
    }

    #[test]
    fn test_reader_rejects_invalid_cards() {
        let data = "kind, card_number, phone_prefix, phone_number, status, total_payment_sum\n\
                    with_phone, , 998, 1234567, enabled, 0\n\
                    plastic, 4111, , , enabled, 0";
        let cards: Vec<Result<Card>> = CardReader::new(data.as_bytes()).cards().collect();
        assert!(matches!(cards[0], Err(GatewayError::Validation(_))));
        assert!(matches!(cards[1], Err(GatewayError::Csv(_))));
    }
}
