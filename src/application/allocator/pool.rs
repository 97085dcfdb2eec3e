use crate::domain::card::{Card, CardId};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};

/// Immutable, fairness-weighted snapshot of the enabled cards.
///
/// Distinct cumulative payment sums are ranked in descending order starting
/// at 1, and every card weighs the rank of its sum: the most used cards weigh
/// 1, the least used weigh the most. Each entry also keeps the running prefix
/// sum of weights so a uniform draw in `[0, limit)` maps to one card.
#[derive(Debug, Default)]
pub struct CardPool {
    cards: Vec<WeightedCard>,
    limit: u64,
}

#[derive(Debug, Clone)]
pub struct WeightedCard {
    pub card: Card,
    pub weight: u64,
    /// Prefix sum of weights up to and including this card.
    pub cumulative: u64,
}

impl CardPool {
    pub fn new(cards: Vec<Card>) -> Self {
        let cards: Vec<Card> = cards.into_iter().filter(Card::is_enabled).collect();
        let ranks = rank_sums(&cards);

        let mut limit = 0;
        let weighted = cards
            .into_iter()
            .map(|card| {
                let weight = ranks[&card.total_payment_sum];
                limit += weight;
                WeightedCard {
                    card,
                    weight,
                    cumulative: limit,
                }
            })
            .collect();

        Self {
            cards: weighted,
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Sum of all weights; draws are taken from `[0, limit)`.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn cards(&self) -> &[WeightedCard] {
        &self.cards
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.cards.iter().any(|c| c.card.id == id)
    }

    pub fn weight(&self, id: CardId) -> Option<u64> {
        self.cards.iter().find(|c| c.card.id == id).map(|c| c.weight)
    }

    /// Selection probability of a card, 0 when it is not in the pool.
    pub fn chance(&self, id: CardId) -> f64 {
        match self.weight(id) {
            Some(weight) if self.limit > 0 => weight as f64 / self.limit as f64,
            _ => 0.0,
        }
    }

    /// The first card whose running limit exceeds `draw`.
    pub fn candidate(&self, draw: u64) -> Option<&Card> {
        self.cards
            .iter()
            .find(|c| c.cumulative > draw)
            .map(|c| &c.card)
    }
}

fn rank_sums(cards: &[Card]) -> HashMap<Decimal, u64> {
    let distinct: BTreeSet<Decimal> = cards.iter().map(|c| c.total_payment_sum).collect();
    distinct
        .into_iter()
        .rev()
        .zip(1..)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn card(id: CardId, sum: Decimal) -> Card {
        let mut card = Card::with_number(format!("4111{id}")).enabled();
        card.id = id;
        card.total_payment_sum = sum;
        card
    }

    #[test]
    fn test_weights_rank_distinct_sums_descending() {
        let pool = CardPool::new(vec![
            card(1, dec!(100)),
            card(2, dec!(50)),
            card(3, dec!(50)),
            card(4, dec!(0)),
        ]);
        let weights: Vec<u64> = pool.cards().iter().map(|c| c.weight).collect();
        assert_eq!(weights, [1, 2, 2, 3]);
        let cumulative: Vec<u64> = pool.cards().iter().map(|c| c.cumulative).collect();
        assert_eq!(cumulative, [1, 3, 5, 8]);
        assert_eq!(pool.limit(), 8);
    }

    #[test]
    fn test_candidate_maps_draws_to_cards() {
        let pool = CardPool::new(vec![card(1, dec!(100)), card(2, dec!(0))]);
        // weights [1, 2], cumulative [1, 3]
        assert_eq!(pool.candidate(0).unwrap().id, 1);
        assert_eq!(pool.candidate(1).unwrap().id, 2);
        assert_eq!(pool.candidate(2).unwrap().id, 2);
        assert!(pool.candidate(3).is_none());
    }

    #[test]
    fn test_disabled_cards_are_excluded() {
        let mut disabled = card(9, dec!(0));
        disabled.status = crate::domain::card::CardStatus::Disabled;
        let pool = CardPool::new(vec![card(1, dec!(10)), disabled]);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(9));
        assert_eq!(pool.chance(9), 0.0);
    }

    #[test]
    fn test_chance_is_weight_over_limit() {
        let pool = CardPool::new(vec![card(1, dec!(100)), card(2, dec!(50)), card(3, dec!(0))]);
        assert!((pool.chance(1) - 1.0 / 6.0).abs() < f64::EPSILON);
        assert!((pool.chance(3) - 3.0 / 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_pool() {
        let pool = CardPool::new(Vec::new());
        assert!(pool.is_empty());
        assert_eq!(pool.limit(), 0);
        assert!(pool.candidate(0).is_none());
    }
}
