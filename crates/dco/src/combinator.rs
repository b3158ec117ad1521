//! Cartesian product over per-slot component pools.
//!
//! Slots are combined in fixed order (headline, body, cta_text, cta_url,
//! image), first slot most significant. An empty pool contributes a single
//! blank value so the remaining slots still combine.

use dco_core::types::{Pool, PoolSlot};
use serde::{Deserialize, Serialize};

use crate::types::Combination;

/// Ordered value pools for every slot of one campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSet {
    slots: [Vec<String>; 5],
}

impl PoolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored pools; later entries for the same slot win.
    pub fn from_pools<'a>(pools: impl IntoIterator<Item = &'a Pool>) -> Self {
        let mut set = Self::new();
        for pool in pools {
            set.set(pool.slot, pool.values.clone());
        }
        set
    }

    pub fn with(mut self, slot: PoolSlot, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.set(slot, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn set(&mut self, slot: PoolSlot, values: Vec<String>) {
        self.slots[slot.index()] = values;
    }

    pub fn clear(&mut self, slot: PoolSlot) {
        self.slots[slot.index()].clear();
    }

    pub fn values(&self, slot: PoolSlot) -> &[String] {
        &self.slots[slot.index()]
    }

    /// True when every pool is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Vec::is_empty)
    }

    /// Total combinations without enumerating: the product of pool sizes,
    /// an empty pool counting as 1. Saturates at `u64::MAX`.
    pub fn estimate(&self) -> u64 {
        self.slots.iter().fold(1u64, |acc, pool| {
            acc.saturating_mul(pool.len().max(1) as u64)
        })
    }

    /// Lazily enumerate combinations in lexicographic order.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            pools: self,
            cursor: [0; 5],
            exhausted: false,
        }
    }

    /// The first `limit` combinations. Touches no stored state.
    pub fn preview(&self, limit: usize) -> Vec<Combination> {
        self.combinations().take(limit).collect()
    }
}

/// Odometer over pool indices; the last slot turns fastest.
pub struct Combinations<'a> {
    pools: &'a PoolSet,
    cursor: [usize; 5],
    exhausted: bool,
}

impl Combinations<'_> {
    fn current(&self) -> Combination {
        let pick = |slot: PoolSlot| -> Option<String> {
            self.pools
                .values(slot)
                .get(self.cursor[slot.index()])
                .cloned()
        };
        Combination {
            headline: pick(PoolSlot::Headline),
            body: pick(PoolSlot::Body),
            cta_text: pick(PoolSlot::CtaText),
            cta_url: pick(PoolSlot::CtaUrl),
            image: pick(PoolSlot::Image),
        }
    }

    fn advance(&mut self) {
        for i in (0..self.cursor.len()).rev() {
            let len = self.pools.slots[i].len().max(1);
            self.cursor[i] += 1;
            if self.cursor[i] < len {
                return;
            }
            self.cursor[i] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let combo = self.current();
        self.advance();
        Some(combo)
    }
}
