use dco_core::rules::Operator;
use dco_core::signals::{SignalContext, SignalValue};
use dco_core::types::{AbTestMode, PoolSlot, SelectionRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::EffectiveStatus;

/// Winning rule returned by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub rule_id: Uuid,
    pub variant_id: Uuid,
}

/// Which branch of the selector produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPath {
    DefaultVariant,
    RuleMatch,
    WeightedDraw,
    None,
}

/// Outcome of variant selection for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub variant_id: Option<Uuid>,
    pub matched_rule_id: Option<Uuid>,
    pub mode_used: AbTestMode,
    pub path: SelectionPath,
}

impl SelectionResult {
    pub fn none(mode: AbTestMode) -> Self {
        Self {
            variant_id: None,
            matched_rule_id: None,
            mode_used: mode,
            path: SelectionPath::None,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.variant_id.is_some()
    }
}

/// Why a single rule did or did not win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Matched,
    /// Condition held but an earlier rule already won.
    Shadowed,
    SignalMissing,
    NonNumericSignal,
    ConditionFailed,
    TargetVariantMissing,
}

/// One rule's line in a decision trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTrace {
    pub rule_id: Uuid,
    pub priority: i32,
    pub signal: String,
    pub operator: Operator,
    pub value: String,
    pub observed: Option<SignalValue>,
    pub variant_id: Uuid,
    pub outcome: RuleOutcome,
}

/// Every rule considered for a request, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub rules: Vec<RuleTrace>,
}

impl DecisionTrace {
    pub fn winner(&self) -> Option<&RuleTrace> {
        self.rules.iter().find(|r| r.outcome == RuleOutcome::Matched)
    }
}

/// Variant content plus template name; the renderer decides the format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    pub campaign_id: Uuid,
    pub variant_id: Uuid,
    pub template: String,
    pub headline: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
    pub click_url: String,
}

/// Why a request produced no ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "status", rename_all = "snake_case")]
pub enum NoAdReason {
    CampaignNotFound,
    NotLive(EffectiveStatus),
    NoEligibleVariant,
}

/// A served ad and the record emitted for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedAd {
    pub payload: RenderPayload,
    pub selection: SelectionResult,
    pub record: SelectionRecord,
}

/// Result of the serving orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ServeOutcome {
    Served(ServedAd),
    NoAd { reason: NoAdReason },
}

/// Result of a simulate call: the decision plus its full trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub campaign_id: Uuid,
    pub effective_status: EffectiveStatus,
    pub would_serve: bool,
    pub signals: SignalContext,
    pub selection: SelectionResult,
    pub trace: DecisionTrace,
}

/// One combination of pool values, indexed in fixed slot order.
/// `None` marks a slot whose pool is empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combination {
    pub headline: Option<String>,
    pub body: Option<String>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
    pub image: Option<String>,
}

impl Combination {
    pub fn get(&self, slot: PoolSlot) -> Option<&str> {
        match slot {
            PoolSlot::Headline => self.headline.as_deref(),
            PoolSlot::Body => self.body.as_deref(),
            PoolSlot::CtaText => self.cta_text.as_deref(),
            PoolSlot::CtaUrl => self.cta_url.as_deref(),
            PoolSlot::Image => self.image.as_deref(),
        }
    }
}

/// Outcome of a successful generate().
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub campaign_id: Uuid,
    pub created_variant_ids: Vec<Uuid>,
    pub combination_count: u64,
    pub replaced_count: usize,
}

/// Preview of the first combinations without persisting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPreview {
    pub total_combinations: u64,
    pub showing: usize,
    pub preview: Vec<Combination>,
}
