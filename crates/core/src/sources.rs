//! Injected clock and randomness.
//!
//! Decision functions take these explicitly so the same logic is
//! reproducible in tests and safe to run in parallel.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Source of "now" for schedule evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Uniform integer draws for weighted selection.
pub trait RandomSource {
    /// Draw uniformly from `[0, upper)`. `upper` is always > 0.
    fn draw(&mut self, upper: u64) -> u64;
}

/// Adapts any `rand` generator.
#[derive(Debug, Clone)]
pub struct RngSource<R>(pub R);

impl<R: Rng> RandomSource for RngSource<R> {
    fn draw(&mut self, upper: u64) -> u64 {
        self.0.gen_range(0..upper)
    }
}

/// Replays a scripted sequence of draws, each reduced modulo `upper`.
/// Panics when exhausted; intended for tests.
#[derive(Debug, Clone, Default)]
pub struct SequenceSource {
    draws: VecDeque<u64>,
}

impl SequenceSource {
    pub fn new(draws: impl IntoIterator<Item = u64>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl RandomSource for SequenceSource {
    fn draw(&mut self, upper: u64) -> u64 {
        let next = self
            .draws
            .pop_front()
            .expect("SequenceSource exhausted");
        next % upper
    }
}
