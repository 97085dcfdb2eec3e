use super::bank::{Attributes, CheckMerchantRequest, LinkRequest, TransactionInfo};
use super::bank_message::{BankMessage, BankMessageId};
use super::card::{Card, CardId};
use super::order::{Order, OrderId, PaymentMethod};
use super::payment_link::{PaymentLink, PaymentLinkId};
use crate::error::Result;
use crate::infrastructure::proxy::ProxyHandle;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

// Every store call commits on its own; nothing spans two entities.

#[async_trait]
pub trait CardStore: Send + Sync {
    /// Inserts when `card.id == 0`, returning the card with its new id.
    async fn save(&self, card: Card) -> Result<Card>;
    async fn find_by_id(&self, id: CardId) -> Result<Option<Card>>;
    async fn find_by_number(&self, card_number: &str) -> Result<Option<Card>>;
    async fn enabled_cards(&self) -> Result<Vec<Card>>;
    /// Credits the card balance and its cumulative payment sum, returning the new balance.
    async fn increase_balance(&self, id: CardId, amount: Decimal) -> Result<Decimal>;
    async fn balance(&self, id: CardId) -> Result<Decimal>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save(&self, order: Order) -> Result<Order>;
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;
    async fn find_by_number(&self, number: Uuid) -> Result<Option<Order>>;
}

#[async_trait]
pub trait PaymentLinkStore: Send + Sync {
    async fn save(&self, link: PaymentLink) -> Result<PaymentLink>;
    async fn find_by_id(&self, id: PaymentLinkId) -> Result<Option<PaymentLink>>;
    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<PaymentLink>>;
    async fn get_pending(&self) -> Result<Vec<PaymentLink>>;
}

#[async_trait]
pub trait BankMessageStore: Send + Sync {
    async fn save(&self, message: BankMessage) -> Result<BankMessage>;
    async fn find_by_id(&self, id: BankMessageId) -> Result<Option<BankMessage>>;
}

/// The bank's consumer web flow, always reached through an egress proxy.
#[async_trait]
pub trait BankApi: Send + Sync {
    async fn get_attributes(&self, proxy: &ProxyHandle) -> Result<Attributes>;
    /// Returns the check-merchant id.
    async fn check_merchant(&self, proxy: &ProxyHandle, request: &CheckMerchantRequest)
    -> Result<String>;
    /// Returns the payment URL.
    async fn get_link(&self, proxy: &ProxyHandle, request: &LinkRequest) -> Result<String>;
    /// Opens the payment URL and returns its redirect target, if any.
    async fn follow_payment_url(&self, proxy: &ProxyHandle, url: &str) -> Result<Option<String>>;
    async fn get_transaction_info(
        &self,
        proxy: &ProxyHandle,
        transaction_id: &str,
    ) -> Result<TransactionInfo>;
}

/// Operator-facing alerts.
pub trait Alerter: Send + Sync {
    /// `None` means the whole pool is empty, not just one method.
    fn no_cards_available(&self, method: Option<PaymentMethod>);
    fn card_disabled(&self, card: &Card, balance: Decimal);
}

/// Hooks for merchant-facing side effects such as webhooks.
pub trait SettlementListener: Send + Sync {
    /// Called once the creation phase ends, whether the link is usable or failed.
    fn link_created(&self, _link: &PaymentLink) {}
    fn order_finished(&self, _order: &Order) {}
}

pub type CardStoreRef = Arc<dyn CardStore>;
pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type PaymentLinkStoreRef = Arc<dyn PaymentLinkStore>;
pub type BankMessageStoreRef = Arc<dyn BankMessageStore>;
pub type BankApiRef = Arc<dyn BankApi>;
pub type AlerterRef = Arc<dyn Alerter>;
pub type ListenerRef = Arc<dyn SettlementListener>;

/// The persistence collaborators, shared by every service.
#[derive(Clone)]
pub struct Stores {
    pub cards: CardStoreRef,
    pub orders: OrderStoreRef,
    pub links: PaymentLinkStoreRef,
    pub messages: BankMessageStoreRef,
}
