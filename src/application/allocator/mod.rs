//! Card selection and exclusive reservation.
//!
//! The allocator owns a replace-only [`CardPool`] snapshot and the
//! [`CardLocker`] lock table. Selection draws a weighted candidate from the
//! snapshot; when the candidate cannot serve the order it falls back to the
//! first eligible card in pool order.

mod locker;
mod pool;

pub use locker::{CardLease, CardLock, CardLocker};
pub use pool::{CardPool, WeightedCard};

use crate::config::AllocatorConfig;
use crate::domain::card::{Card, CardId};
use crate::domain::order::{Order, OrderId, PaymentMethod};
use crate::domain::ports::{AlerterRef, CardStoreRef};
use crate::error::{GatewayError, Result};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct CardAllocator {
    pool: RwLock<Arc<CardPool>>,
    locker: CardLocker,
    alerter: AlerterRef,
    config: AllocatorConfig,
}

impl CardAllocator {
    pub fn new(cards: Vec<Card>, config: AllocatorConfig, alerter: AlerterRef) -> Self {
        Self {
            pool: RwLock::new(Arc::new(CardPool::new(cards))),
            locker: CardLocker::new(config.lock_ttl),
            alerter,
            config,
        }
    }

    /// Swaps in a freshly built snapshot. An empty result raises an alert.
    pub async fn reload(&self, cards: Vec<Card>) -> usize {
        let pool = CardPool::new(cards);
        let size = pool.len();
        if pool.is_empty() {
            tracing::warn!("Card pool is empty after reload");
            self.alerter.no_cards_available(None);
        }
        *self.pool.write().await = Arc::new(pool);
        tracing::debug!(cards = size, "Card pool reloaded");
        size
    }

    /// Rebuilds the snapshot from the enabled cards in storage.
    pub async fn refresh(&self, cards: &CardStoreRef) -> Result<usize> {
        let enabled = cards.enabled_cards().await?;
        Ok(self.reload(enabled).await)
    }

    pub async fn snapshot(&self) -> Arc<CardPool> {
        Arc::clone(&*self.pool.read().await)
    }

    pub fn locker(&self) -> &CardLocker {
        &self.locker
    }

    pub async fn select(&self, order: &Order) -> Result<CardLease> {
        let pool = self.snapshot().await;
        let draw = draw(&pool, &mut rand::thread_rng());
        self.select_from(&pool, order.payment_method, draw).await
    }

    /// Same as [`select`](Self::select) with a caller-provided random source.
    pub async fn select_with_rng<R: Rng + Send>(
        &self,
        method: PaymentMethod,
        rng: &mut R,
    ) -> Result<CardLease> {
        let pool = self.snapshot().await;
        let draw = draw(&pool, rng);
        self.select_from(&pool, method, draw).await
    }

    async fn select_from(
        &self,
        pool: &CardPool,
        method: PaymentMethod,
        draw: Option<u64>,
    ) -> Result<CardLease> {
        if let Some(card) = draw.and_then(|d| pool.candidate(d))
            && card.supports(method)
            && let Ok(lease) = self.locker.lock(card).await
        {
            tracing::debug!(card_id = card.id, %method, "Weighted pick");
            return Ok(lease);
        }

        for weighted in pool.cards() {
            if !weighted.card.supports(method) {
                continue;
            }
            if let Ok(lease) = self.locker.lock(&weighted.card).await {
                tracing::debug!(card_id = weighted.card.id, %method, "Fallback pick");
                return Ok(lease);
            }
        }

        tracing::warn!(%method, pool = pool.len(), "No card available");
        self.alerter.no_cards_available(Some(method));
        Err(GatewayError::ResourceUnavailable(method))
    }

    pub async fn get_locked(&self, card_id: CardId) -> Option<CardLock> {
        self.locker.get_locked(card_id).await
    }

    pub async fn bind_order(&self, card_id: CardId, order_id: OrderId) -> bool {
        self.locker.bind_order(card_id, order_id).await
    }

    pub async fn unlock(&self, card_id: CardId) {
        self.locker.unlock(card_id).await
    }

    pub async fn unlock_by_order(&self, order_id: OrderId) {
        self.locker.unlock_by_order(order_id).await
    }

    /// Periodically purges expired locks.
    pub fn spawn_lock_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let allocator = Arc::clone(self);
        let every = self.config.lock_sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = allocator.locker.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Expired card locks removed");
                }
            }
        })
    }

    /// Periodically rebuilds the pool from storage.
    pub fn spawn_refresh(self: &Arc<Self>, cards: CardStoreRef) -> JoinHandle<()> {
        let allocator = Arc::clone(self);
        let every = self.config.pool_refresh_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The pool was built at construction; skip the immediate tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = allocator.refresh(&cards).await {
                    tracing::error!(error = %e, "Card pool refresh failed");
                }
            }
        })
    }
}

fn draw<R: Rng + ?Sized>(pool: &CardPool, rng: &mut R) -> Option<u64> {
    (pool.limit() > 0).then(|| rng.gen_range(0..pool.limit()))
}
