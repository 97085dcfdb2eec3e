use crate::domain::bank_message::{BankMessage, BankMessageId};
use crate::domain::card::{Card, CardId};
use crate::domain::order::{Order, OrderId, Status};
use crate::domain::payment_link::{PaymentLink, PaymentLinkId};
use crate::domain::ports::{BankMessageStore, CardStore, OrderStore, PaymentLinkStore, Stores};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hands out ids starting at 1; 0 marks an entity that was never saved.
#[derive(Default)]
pub(crate) struct IdSequence(AtomicU64);

impl IdSequence {
    pub(crate) fn starting_after(last: u64) -> Self {
        Self(AtomicU64::new(last))
    }

    pub(crate) fn assign(&self, id: &mut u64) {
        if *id == 0 {
            *id = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        } else {
            self.0.fetch_max(*id, Ordering::Relaxed);
        }
    }
}

#[derive(Default)]
struct CardTable {
    cards: HashMap<CardId, Card>,
    balances: HashMap<CardId, Decimal>,
}

/// A thread-safe in-memory card store.
#[derive(Default, Clone)]
pub struct InMemoryCardStore {
    table: Arc<RwLock<CardTable>>,
    ids: Arc<IdSequence>,
}

impl InMemoryCardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn save(&self, mut card: Card) -> Result<Card> {
        self.ids.assign(&mut card.id);
        self.table.write().await.cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn find_by_id(&self, id: CardId) -> Result<Option<Card>> {
        Ok(self.table.read().await.cards.get(&id).cloned())
    }

    async fn find_by_number(&self, card_number: &str) -> Result<Option<Card>> {
        let table = self.table.read().await;
        Ok(table
            .cards
            .values()
            .find(|c| c.card_number.as_deref() == Some(card_number))
            .cloned())
    }

    async fn enabled_cards(&self) -> Result<Vec<Card>> {
        let table = self.table.read().await;
        let mut cards: Vec<Card> = table
            .cards
            .values()
            .filter(|c| c.is_enabled())
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.id);
        Ok(cards)
    }

    async fn increase_balance(&self, id: CardId, amount: Decimal) -> Result<Decimal> {
        let mut table = self.table.write().await;
        let card = table
            .cards
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("card #{id}")))?;
        card.total_payment_sum += amount;
        let balance = table.balances.entry(id).or_default();
        *balance += amount;
        Ok(*balance)
    }

    async fn balance(&self, id: CardId) -> Result<Decimal> {
        Ok(self
            .table
            .read()
            .await
            .balances
            .get(&id)
            .copied()
            .unwrap_or_default())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, mut order: Order) -> Result<Order> {
        self.ids.assign(&mut order.id);
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_number(&self, number: Uuid) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.values().find(|o| o.number == number).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentLinkStore {
    links: Arc<RwLock<HashMap<PaymentLinkId, PaymentLink>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryPaymentLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLinkStore for InMemoryPaymentLinkStore {
    async fn save(&self, mut link: PaymentLink) -> Result<PaymentLink> {
        self.ids.assign(&mut link.id);
        self.links.write().await.insert(link.id, link.clone());
        Ok(link)
    }

    async fn find_by_id(&self, id: PaymentLinkId) -> Result<Option<PaymentLink>> {
        Ok(self.links.read().await.get(&id).cloned())
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<PaymentLink>> {
        let links = self.links.read().await;
        Ok(links
            .values()
            .filter(|l| l.order_id == order_id)
            .max_by_key(|l| l.id)
            .cloned())
    }

    async fn get_pending(&self) -> Result<Vec<PaymentLink>> {
        let links = self.links.read().await;
        let mut pending: Vec<PaymentLink> = links
            .values()
            .filter(|l| l.status == Status::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|l| l.id);
        Ok(pending)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBankMessageStore {
    messages: Arc<RwLock<HashMap<BankMessageId, BankMessage>>>,
    ids: Arc<IdSequence>,
}

impl InMemoryBankMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BankMessageStore for InMemoryBankMessageStore {
    async fn save(&self, mut message: BankMessage) -> Result<BankMessage> {
        self.ids.assign(&mut message.id);
        self.messages
            .write()
            .await
            .insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: BankMessageId) -> Result<Option<BankMessage>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            cards: Arc::new(InMemoryCardStore::new()),
            orders: Arc::new(InMemoryOrderStore::new()),
            links: Arc::new(InMemoryPaymentLinkStore::new()),
            messages: Arc::new(InMemoryBankMessageStore::new()),
        }
    }
}
