//! Ephemeral publish/subscribe used to wake blocked readers.
//!
//! A subscription is a set of `{kind, id}` keys plus a one-shot callback. It
//! fires on the first published entity matching every key and is removed in
//! the same critical section, so duplicate publishes cannot fire it twice.

use crate::config::BrokerConfig;
use crate::domain::order::Order;
use crate::domain::payment_link::PaymentLink;
use crate::error::{GatewayError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    Order,
    PaymentLink,
}

/// Entities that can be published to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum Watched {
    Order(Order),
    PaymentLink(PaymentLink),
}

impl Watched {
    pub fn kind(&self) -> WatchKind {
        match self {
            Self::Order(_) => WatchKind::Order,
            Self::PaymentLink(_) => WatchKind::PaymentLink,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Self::Order(order) => order.id,
            Self::PaymentLink(link) => link.id,
        }
    }
}

/// Matches entities of `kind` with identity `id`; id 0 matches any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub kind: WatchKind,
    pub id: u64,
}

impl WatchKey {
    pub fn order(id: u64) -> Self {
        Self {
            kind: WatchKind::Order,
            id,
        }
    }

    pub fn payment_link(id: u64) -> Self {
        Self {
            kind: WatchKind::PaymentLink,
            id,
        }
    }

    pub fn matches(&self, entity: &Watched) -> bool {
        self.kind == entity.kind() && (self.id == 0 || self.id == entity.id())
    }
}

pub type Callback = Box<dyn FnOnce(Watched) + Send + 'static>;

struct Subscription {
    filters: Vec<WatchKey>,
    callback: Callback,
    created_at: Instant,
}

impl Subscription {
    fn matches(&self, entity: &Watched) -> bool {
        self.filters.iter().all(|key| key.matches(entity))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("filters", &self.filters)
            .field("created_at", &self.created_at)
            .finish()
    }
}

pub struct SubscriptionBroker {
    subscriptions: Mutex<Vec<Subscription>>,
    config: BrokerConfig,
}

impl SubscriptionBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            config,
        }
    }

    pub async fn subscribe<F>(&self, filters: Vec<WatchKey>, callback: F) -> Result<()>
    where
        F: FnOnce(Watched) + Send + 'static,
    {
        if filters.is_empty() {
            return Err(GatewayError::Validation(
                "subscription needs at least one filter".to_string(),
            ));
        }
        self.subscriptions.lock().await.push(Subscription {
            filters,
            callback: Box::new(callback),
            created_at: Instant::now(),
        });
        Ok(())
    }

    /// Fires and removes every subscription matching `entity`.
    ///
    /// Returns how many callbacks ran.
    pub async fn publish(&self, entity: Watched) -> usize {
        let fired: Vec<Subscription> = {
            let mut subscriptions = self.subscriptions.lock().await;
            let (fired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *subscriptions)
                .into_iter()
                .partition(|sub| sub.matches(&entity));
            *subscriptions = kept;
            fired
        };

        let count = fired.len();
        if count > 0 {
            tracing::debug!(kind = ?entity.kind(), id = entity.id(), count, "Notifying subscribers");
        }
        for sub in fired {
            (sub.callback)(entity.clone());
        }
        count
    }

    /// Removes subscriptions strictly older than the configured lifetime.
    pub async fn gc(&self) -> usize {
        let now = Instant::now();
        let lifetime = self.config.subscription_lifetime;
        let mut subscriptions = self.subscriptions.lock().await;
        let before = subscriptions.len();
        subscriptions.retain(|sub| now.duration_since(sub.created_at) <= lifetime);
        before - subscriptions.len()
    }

    pub fn spawn_gc(self: &Arc<Self>) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        let every = self.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = broker.gc().await;
                if removed > 0 {
                    tracing::debug!(removed, "Expired subscriptions removed");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
