//! Shared data model for the DCO console: campaigns, variants, targeting
//! rules, component pools, signal contexts, delivery events, configuration,
//! and the injected clock/randomness used by the decision engine.

pub mod config;
pub mod error;
pub mod event_bus;
pub mod rules;
pub mod signals;
pub mod sources;
pub mod types;

pub use config::AppConfig;
pub use error::{DcoError, DcoResult};
pub use rules::{Operator, Rule, RuleCondition, RuleDraft, RuleSet};
pub use signals::{SignalCatalog, SignalContext, SignalValue};
pub use sources::{Clock, FixedClock, RandomSource, RngSource, SequenceSource, SystemClock};
