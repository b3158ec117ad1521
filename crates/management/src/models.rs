//! Editor request/response types.

use chrono::{DateTime, Utc};
use dco_core::types::{AbTestMode, CampaignStatus, Pool};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ─── Campaign ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: CampaignStatus,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ab_test_mode: AbTestMode,
    #[serde(default)]
    pub template: Option<String>,
}

/// Partial update. For the dates, an absent field leaves the value alone and
/// an explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<CampaignStatus>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub ab_test_mode: Option<AbTestMode>,
    pub template: Option<String>,
}

fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ─── Variant ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateVariantRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub cta_text: Option<String>,
    #[serde(default)]
    pub cta_url: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub is_default: bool,
}

fn default_weight() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVariantRequest {
    pub name: Option<String>,
    pub headline: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
    pub weight: Option<u32>,
    pub is_default: Option<bool>,
}

impl UpdateVariantRequest {
    /// True when the request changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.headline.is_none()
            && self.body.is_none()
            && self.image_url.is_none()
            && self.cta_text.is_none()
            && self.cta_url.is_none()
            && self.weight.is_none()
            && self.is_default.is_none()
    }
}

// ─── Rule ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRuleRequest {
    pub variant_id: Option<Uuid>,
    pub signal: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
    pub priority: Option<i32>,
}

// ─── Pools ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PoolUpsertRequest {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolsResponse {
    pub campaign_id: Uuid,
    pub pools: Vec<Pool>,
    pub total_combinations: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewQuery {
    pub limit: Option<usize>,
}

// ─── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
