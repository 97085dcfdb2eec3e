use crate::domain::order::{Order, PaymentMethod, Status};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

/// One output line per processed order.
#[derive(Debug, Serialize, PartialEq)]
pub struct OrderRow {
    pub order: Uuid,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub card: String,
    pub status: Status,
    pub link: String,
}

impl OrderRow {
    pub fn new(order: &Order, card: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            order: order.number,
            payment_method: order.payment_method,
            amount: order.amount,
            card: card.into(),
            status: order.status,
            link: link.into(),
        }
    }
}

pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, rows: impl IntoIterator<Item = OrderRow>) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
