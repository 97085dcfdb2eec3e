//! Domain entities and the ports the application layer talks through.

pub mod bank;
pub mod bank_message;
pub mod card;
pub mod order;
pub mod payment_link;
pub mod ports;
