use crate::application::orders::CreateOrderRequest;
use crate::error::{GatewayError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct OrderRecord {
    payment_method: String,
    amount: Decimal,
    #[serde(default)]
    payload: String,
}

/// Reads order requests from a CSV source with columns `payment_method, amount, payload`.
///
/// The payment method is kept as text; it is validated when the order is created.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn orders(self) -> impl Iterator<Item = Result<CreateOrderRequest>> {
        self.reader.into_deserialize().map(|result| {
            result
                .map(|record: OrderRecord| CreateOrderRequest {
                    payment_method: record.payment_method,
                    amount: record.amount,
                    payload: record.payload,
                })
                .map_err(GatewayError::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "payment_method, amount, payload\nbank_transfer, 10.5, shop-1\nkapital_bank, 20,";
        let orders: Vec<Result<CreateOrderRequest>> =
            OrderReader::new(data.as_bytes()).orders().collect();

        assert_eq!(orders.len(), 2);
        let first = orders[0].as_ref().unwrap();
        assert_eq!(first.payment_method, "bank_transfer");
        assert_eq!(first.amount, dec!(10.5));
        assert_eq!(first.payload, "shop-1");
        assert_eq!(orders[1].as_ref().unwrap().payload, "");
    }

    #[test]
    fn test_reader_malformed_amount() {
        let data = "payment_method, amount, payload\nbank_transfer, lots, x";
        let orders: Vec<Result<CreateOrderRequest>> =
            OrderReader::new(data.as_bytes()).orders().collect();
        assert!(orders[0].is_err());
    }
}
