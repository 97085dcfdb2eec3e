use crate::domain::card::{Card, CardId};
use crate::domain::order::OrderId;
use crate::error::{GatewayError, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// An exclusive, time-boxed reservation of a lockable card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLock {
    pub card_id: CardId,
    /// Set once the order holding the card has been persisted.
    pub order_id: Option<OrderId>,
    pub expires_at: Instant,
}

impl CardLock {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A card handed out to an order.
///
/// `exclusive` is false for kinds that never enter the lock table.
#[derive(Debug, Clone, PartialEq)]
pub struct CardLease {
    pub card: Card,
    pub exclusive: bool,
}

/// Lock table; every read and write goes through one mutex.
///
/// Expired locks are treated as absent before the sweep removes them.
pub struct CardLocker {
    ttl: Duration,
    locks: Mutex<HashMap<CardId, CardLock>>,
}

impl CardLocker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, card: &Card) -> Result<CardLease> {
        if !card.requires_lock() {
            return Ok(CardLease {
                card: card.clone(),
                exclusive: false,
            });
        }

        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if locks.get(&card.id).is_some_and(|lock| !lock.is_expired(now)) {
            return Err(GatewayError::ConcurrencyConflict(card.id));
        }
        locks.insert(
            card.id,
            CardLock {
                card_id: card.id,
                order_id: None,
                expires_at: now + self.ttl,
            },
        );
        tracing::debug!(card_id = card.id, "Card locked");
        Ok(CardLease {
            card: card.clone(),
            exclusive: true,
        })
    }

    /// Records which order holds the card. Returns false if the lock is gone.
    pub async fn bind_order(&self, card_id: CardId, order_id: OrderId) -> bool {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        match locks.get_mut(&card_id) {
            Some(lock) if !lock.is_expired(now) => {
                lock.order_id = Some(order_id);
                true
            }
            _ => false,
        }
    }

    pub async fn get_locked(&self, card_id: CardId) -> Option<CardLock> {
        let now = Instant::now();
        let locks = self.locks.lock().await;
        locks
            .get(&card_id)
            .filter(|lock| !lock.is_expired(now))
            .copied()
    }

    pub async fn is_locked(&self, card_id: CardId) -> bool {
        self.get_locked(card_id).await.is_some()
    }

    pub async fn unlock(&self, card_id: CardId) {
        if self.locks.lock().await.remove(&card_id).is_some() {
            tracing::debug!(card_id, "Card unlocked");
        }
    }

    pub async fn unlock_by_order(&self, order_id: OrderId) {
        let mut locks = self.locks.lock().await;
        let card_id = locks
            .values()
            .find(|lock| lock.order_id == Some(order_id))
            .map(|lock| lock.card_id);
        if let Some(card_id) = card_id {
            locks.remove(&card_id);
            tracing::debug!(card_id, order_id, "Card unlocked by order");
        }
    }

    /// Drops expired locks; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| !lock.is_expired(now));
        before - locks.len()
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_card(id: CardId) -> Card {
        let mut card = Card::with_number(format!("4111{id}")).enabled();
        card.id = id;
        card
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_lock_conflicts() {
        let locker = CardLocker::new(Duration::from_secs(60));
        let card = number_card(1);

        let lease = locker.lock(&card).await.unwrap();
        assert!(lease.exclusive);
        assert!(matches!(
            locker.lock(&card).await,
            Err(GatewayError::ConcurrencyConflict(1))
        ));

        locker.unlock(1).await;
        assert!(locker.lock(&card).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phone_cards_pass_through() {
        let locker = CardLocker::new(Duration::from_secs(60));
        let mut card = Card::with_phone("99890", "1234567").enabled();
        card.id = 5;
        for _ in 0..3 {
            let lease = locker.lock(&card).await.unwrap();
            assert!(!lease.exclusive);
        }
        assert!(!locker.is_locked(5).await);
        assert_eq!(locker.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_is_absent_before_sweep() {
        let locker = CardLocker::new(Duration::from_secs(60));
        let card = number_card(1);
        locker.lock(&card).await.unwrap();
        assert!(locker.is_locked(1).await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(locker.get_locked(1).await.is_none());
        assert_eq!(locker.len().await, 1);
        assert!(locker.lock(&card).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let locker = CardLocker::new(Duration::from_secs(60));
        locker.lock(&number_card(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        locker.lock(&number_card(2)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(locker.purge_expired().await, 1);
        assert!(!locker.is_locked(1).await);
        assert!(locker.is_locked(2).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_and_unlock_by_order() {
        let locker = CardLocker::new(Duration::from_secs(60));
        locker.lock(&number_card(1)).await.unwrap();
        locker.lock(&number_card(2)).await.unwrap();
        assert!(locker.bind_order(2, 77).await);
        assert!(!locker.bind_order(3, 78).await);
        assert_eq!(locker.get_locked(2).await.unwrap().order_id, Some(77));

        locker.unlock_by_order(77).await;
        assert!(!locker.is_locked(2).await);
        assert!(locker.is_locked(1).await);
    }
}
