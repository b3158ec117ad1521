use thiserror::Error;
use uuid::Uuid;

pub type DcoResult<T> = Result<T, DcoError>;

#[derive(Error, Debug)]
pub enum DcoError {
    #[error("Pool generation limit exceeded: {estimated} combinations (cap {cap})")]
    PoolGenerationLimitExceeded { estimated: u64, cap: u64 },

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Generation already in flight for campaign {0}")]
    ConcurrentGenerationConflict(Uuid),

    #[error("No pools defined for campaign {0}")]
    NoPoolsDefined(Uuid),

    #[error("Invalid pool slot: {0}")]
    InvalidPoolSlot(String),

    #[error("Campaign not found: {0}")]
    CampaignNotFound(Uuid),

    #[error("Variant not found: {0}")]
    VariantNotFound(Uuid),

    #[error("Rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Snapshot fetch error: {0}")]
    Snapshot(String),
}
