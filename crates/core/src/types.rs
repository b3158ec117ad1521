use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DcoError, DcoResult};
use crate::rules::{Rule, RuleSet};
use crate::signals::SignalContext;

/// Template used when a campaign does not name one.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Template names understood by the external renderer.
pub const TEMPLATE_NAMES: &[&str] = &["default", "banner", "card", "minimal", "hero"];

/// Operator-controlled campaign status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Paused,
}

/// How a campaign picks a variant per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AbTestMode {
    #[default]
    Off,
    Rules,
    Weighted,
    RulesThenWeighted,
}

/// A DCO campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: CampaignStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub ab_test_mode: AbTestMode,
    pub template: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a variant came from. Generation only ever replaces `PoolGenerated`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Manual,
    PoolGenerated,
}

/// One concrete, renderable creative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variant {
    pub id: Uuid,
    pub campaign_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub headline: Option<String>,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub cta_text: Option<String>,
    pub cta_url: Option<String>,
    /// Zero excludes the variant from weighted draws only.
    pub weight: u32,
    pub is_default: bool,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    /// A blank manual variant with weight 1.
    pub fn new(campaign_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            name: None,
            headline: None,
            body: None,
            image_url: None,
            cta_text: None,
            cta_url: None,
            weight: 1,
            is_default: false,
            provenance: Provenance::Manual,
            created_at: Utc::now(),
        }
    }

    pub fn is_generated(&self) -> bool {
        self.provenance == Provenance::PoolGenerated
    }
}

/// A creative field that can be populated from a component pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PoolSlot {
    Headline,
    Body,
    CtaText,
    CtaUrl,
    Image,
}

impl PoolSlot {
    /// Fixed slot order; fixes combination indexing.
    pub const ALL: [PoolSlot; 5] = [
        PoolSlot::Headline,
        PoolSlot::Body,
        PoolSlot::CtaText,
        PoolSlot::CtaUrl,
        PoolSlot::Image,
    ];

    pub fn parse(name: &str) -> DcoResult<Self> {
        match name {
            "headline" => Ok(PoolSlot::Headline),
            "body" => Ok(PoolSlot::Body),
            "cta_text" => Ok(PoolSlot::CtaText),
            "cta_url" => Ok(PoolSlot::CtaUrl),
            "image" => Ok(PoolSlot::Image),
            other => Err(DcoError::InvalidPoolSlot(format!(
                "'{other}' (allowed: headline, body, cta_text, cta_url, image)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PoolSlot::Headline => "headline",
            PoolSlot::Body => "body",
            PoolSlot::CtaText => "cta_text",
            PoolSlot::CtaUrl => "cta_url",
            PoolSlot::Image => "image",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            PoolSlot::Headline => 0,
            PoolSlot::Body => 1,
            PoolSlot::CtaText => 2,
            PoolSlot::CtaUrl => 3,
            PoolSlot::Image => 4,
        }
    }
}

/// Ordered values for one slot of one campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pool {
    pub campaign_id: Uuid,
    pub slot: PoolSlot,
    pub values: Vec<String>,
}

/// Immutable read snapshot of everything needed to serve one campaign.
#[derive(Debug, Clone)]
pub struct CampaignSnapshot {
    pub campaign: Campaign,
    /// Stored order; drives the default fallback and weighted cumulative sums.
    pub variants: Vec<Variant>,
    pub rules: RuleSet,
}

impl CampaignSnapshot {
    pub fn new(campaign: Campaign, variants: Vec<Variant>, rules: Vec<Rule>) -> Self {
        Self {
            campaign,
            variants,
            rules: RuleSet::new(rules),
        }
    }

    pub fn variant(&self, id: &Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.id == id)
    }
}

/// Emitted for every served ad; aggregated downstream into impressions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionRecord {
    pub event_id: Uuid,
    pub campaign_id: Uuid,
    pub variant_id: Uuid,
    pub matched_rule_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub signals: SignalContext,
}

/// Emitted when a served creative is clicked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClickRecord {
    pub event_id: Uuid,
    pub campaign_id: Uuid,
    pub variant_id: Uuid,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Delivery events handed to the analytics aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DeliveryEvent {
    Impression(SelectionRecord),
    Click(ClickRecord),
}

impl DeliveryEvent {
    pub fn campaign_id(&self) -> Uuid {
        match self {
            DeliveryEvent::Impression(r) => r.campaign_id,
            DeliveryEvent::Click(c) => c.campaign_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_slot_parse_and_order() {
        for (i, slot) in PoolSlot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
            assert_eq!(PoolSlot::parse(slot.as_str()).unwrap(), *slot);
        }
        assert!(matches!(
            PoolSlot::parse("logo"),
            Err(DcoError::InvalidPoolSlot(_))
        ));
    }

    #[test]
    fn test_delivery_event_is_tagged() {
        let record = SelectionRecord {
            event_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            matched_rule_id: None,
            timestamp: Utc::now(),
            signals: SignalContext::new().with("geo_country", "US"),
        };
        let json = serde_json::to_value(DeliveryEvent::Impression(record)).unwrap();
        assert_eq!(json["event_type"], "impression");
        assert_eq!(json["signals"]["geo_country"], "US");
    }

    #[test]
    fn test_new_variant_defaults() {
        let v = Variant::new(Uuid::new_v4());
        assert_eq!(v.weight, 1);
        assert!(!v.is_default);
        assert!(!v.is_generated());
    }
}
