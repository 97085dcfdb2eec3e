use super::in_memory::IdSequence;
use crate::domain::bank_message::{BankMessage, BankMessageId};
use crate::domain::card::{Card, CardId};
use crate::domain::order::{Order, OrderId, Status};
use crate::domain::payment_link::{PaymentLink, PaymentLinkId};
use crate::domain::ports::{BankMessageStore, CardStore, OrderStore, PaymentLinkStore, Stores};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for cards.
pub const CF_CARDS: &str = "cards";
/// Column Family for card balances, kept apart from the card documents.
pub const CF_CARD_BALANCES: &str = "card_balances";
pub const CF_ORDERS: &str = "orders";
pub const CF_PAYMENT_LINKS: &str = "payment_links";
pub const CF_BANK_MESSAGES: &str = "bank_messages";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_CARDS,
    CF_CARD_BALANCES,
    CF_ORDERS,
    CF_PAYMENT_LINKS,
    CF_BANK_MESSAGES,
];

struct Sequences {
    cards: IdSequence,
    orders: IdSequence,
    links: IdSequence,
    messages: IdSequence,
}

/// A persistent store implementation using RocksDB.
///
/// Every entity kind lives in its own Column Family as JSON, keyed by its
/// big-endian id so iteration follows id order. Id sequences resume from the
/// highest stored key.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    ids: Arc<Sequences>,
    /// Serializes balance read-modify-write cycles.
    balance_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating missing Column Families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let ids = Sequences {
            cards: IdSequence::starting_after(last_id(&db, CF_CARDS)?),
            orders: IdSequence::starting_after(last_id(&db, CF_ORDERS)?),
            links: IdSequence::starting_after(last_id(&db, CF_PAYMENT_LINKS)?),
            messages: IdSequence::starting_after(last_id(&db, CF_BANK_MESSAGES)?),
        };

        Ok(Self {
            db: Arc::new(db),
            ids: Arc::new(ids),
            balance_lock: Arc::new(Mutex::new(())),
        })
    }

    /// The same database behind every store port.
    pub fn stores(&self) -> Stores {
        Stores {
            cards: Arc::new(self.clone()),
            orders: Arc::new(self.clone()),
            links: Arc::new(self.clone()),
            messages: Arc::new(self.clone()),
        }
    }

    fn put<T: Serialize>(&self, cf_name: &str, id: u64, value: &T) -> Result<()> {
        let cf = handle(&self.db, cf_name)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| GatewayError::Storage(format!("Serialization error: {e}")))?;
        self.db.put_cf(cf, id.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, id: u64) -> Result<Option<T>> {
        let cf = handle(&self.db, cf_name)?;
        match self.db.get_cf(cf, id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = handle(&self.db, cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(decode(&value)?);
        }
        Ok(items)
    }
}

fn handle<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| GatewayError::Storage(format!("{name} column family not found")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::Storage(format!("Deserialization error: {e}")))
}

fn last_id(db: &DB, cf_name: &str) -> Result<u64> {
    let cf = handle(db, cf_name)?;
    match db.iterator_cf(cf, IteratorMode::End).next() {
        Some(item) => {
            let (key, _value) = item?;
            let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                GatewayError::Storage(format!("malformed key in {cf_name}"))
            })?;
            Ok(u64::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

#[async_trait]
impl CardStore for RocksDBStore {
    async fn save(&self, mut card: Card) -> Result<Card> {
        self.ids.cards.assign(&mut card.id);
        self.put(CF_CARDS, card.id, &card)?;
        Ok(card)
    }

    async fn find_by_id(&self, id: CardId) -> Result<Option<Card>> {
        self.get(CF_CARDS, id)
    }

    async fn find_by_number(&self, card_number: &str) -> Result<Option<Card>> {
        let cards: Vec<Card> = self.scan(CF_CARDS)?;
        Ok(cards
            .into_iter()
            .find(|c| c.card_number.as_deref() == Some(card_number)))
    }

    async fn enabled_cards(&self) -> Result<Vec<Card>> {
        let cards: Vec<Card> = self.scan(CF_CARDS)?;
        Ok(cards.into_iter().filter(Card::is_enabled).collect())
    }

    async fn increase_balance(&self, id: CardId, amount: Decimal) -> Result<Decimal> {
        let _guard = self.balance_lock.lock().await;
        let mut card: Card = self
            .get(CF_CARDS, id)?
            .ok_or_else(|| GatewayError::NotFound(format!("card #{id}")))?;
        let balance = self.get::<Decimal>(CF_CARD_BALANCES, id)?.unwrap_or_default() + amount;

        card.total_payment_sum += amount;
        self.put(CF_CARDS, id, &card)?;
        self.put(CF_CARD_BALANCES, id, &balance)?;
        Ok(balance)
    }

    async fn balance(&self, id: CardId) -> Result<Decimal> {
        Ok(self.get(CF_CARD_BALANCES, id)?.unwrap_or_default())
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn save(&self, mut order: Order) -> Result<Order> {
        self.ids.orders.assign(&mut order.id);
        self.put(CF_ORDERS, order.id, &order)?;
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        self.get(CF_ORDERS, id)
    }

    async fn find_by_number(&self, number: Uuid) -> Result<Option<Order>> {
        let orders: Vec<Order> = self.scan(CF_ORDERS)?;
        Ok(orders.into_iter().find(|o| o.number == number))
    }
}

#[async_trait]
impl PaymentLinkStore for RocksDBStore {
    async fn save(&self, mut link: PaymentLink) -> Result<PaymentLink> {
        self.ids.links.assign(&mut link.id);
        self.put(CF_PAYMENT_LINKS, link.id, &link)?;
        Ok(link)
    }

    async fn find_by_id(&self, id: PaymentLinkId) -> Result<Option<PaymentLink>> {
        self.get(CF_PAYMENT_LINKS, id)
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<PaymentLink>> {
        let links: Vec<PaymentLink> = self.scan(CF_PAYMENT_LINKS)?;
        Ok(links.into_iter().rev().find(|l| l.order_id == order_id))
    }

    async fn get_pending(&self) -> Result<Vec<PaymentLink>> {
        let links: Vec<PaymentLink> = self.scan(CF_PAYMENT_LINKS)?;
        Ok(links
            .into_iter()
            .filter(|l| l.status == Status::Pending)
            .collect())
    }
}

#[async_trait]
impl BankMessageStore for RocksDBStore {
    async fn save(&self, mut message: BankMessage) -> Result<BankMessage> {
        self.ids.messages.assign(&mut message.id);
        self.put(CF_BANK_MESSAGES, message.id, &message)?;
        Ok(message)
    }

    async fn find_by_id(&self, id: BankMessageId) -> Result<Option<BankMessage>> {
        self.get(CF_BANK_MESSAGES, id)
    }
}
