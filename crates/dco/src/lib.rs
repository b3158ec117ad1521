//! Decisioning core for dynamic creative optimization: schedule gating,
//! rule matching, variant selection, pool combination, and the serving
//! orchestrator that ties them together per request.

pub mod combinator;
pub mod engine;
pub mod generator;
pub mod matcher;
pub mod schedule;
pub mod selector;
pub mod types;

pub use combinator::PoolSet;
pub use engine::{ServingEngine, SnapshotSource};
pub use generator::{GenerationLease, GenerationRepository, PoolGenerator};
pub use matcher::{match_rules, trace_rules};
pub use schedule::{effective_status, EffectiveStatus};
pub use selector::{select_variant, select_variant_traced};
pub use types::{
    DecisionTrace, GenerationResult, NoAdReason, PoolPreview, RenderPayload, ServeOutcome,
    ServedAd, SelectionPath, SelectionResult, SimulationReport,
};
