//! Schedule evaluation: campaign dates + manual status → effective lifecycle state.

use chrono::{DateTime, Utc};
use dco_core::types::CampaignStatus;
use serde::{Deserialize, Serialize};

/// Effective lifecycle state of a campaign at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Draft,
    Scheduled,
    Live,
    Ended,
    Paused,
    /// Undated campaign switched on manually; serves like `Live`.
    Active,
}

impl EffectiveStatus {
    pub fn is_servable(&self) -> bool {
        matches!(self, EffectiveStatus::Live | EffectiveStatus::Active)
    }
}

/// Compute the effective status. Pure; safe to call on every request.
///
/// Order of precedence:
/// 1. a paused campaign is paused regardless of dates;
/// 2. with both dates, the window decides (both bounds inclusive);
/// 3. with only a start date, `now >= start` is live;
/// 4. with only an end date, `now > end` has ended;
/// 5. otherwise the manual status applies.
pub fn effective_status(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    manual: CampaignStatus,
) -> EffectiveStatus {
    if manual == CampaignStatus::Paused {
        return EffectiveStatus::Paused;
    }

    match (start, end) {
        (Some(start), Some(end)) => {
            if now < start {
                EffectiveStatus::Scheduled
            } else if now > end {
                EffectiveStatus::Ended
            } else {
                EffectiveStatus::Live
            }
        }
        (Some(start), None) => {
            if now >= start {
                EffectiveStatus::Live
            } else {
                EffectiveStatus::Scheduled
            }
        }
        (None, Some(end)) if now > end => EffectiveStatus::Ended,
        _ => manual_status(manual),
    }
}

fn manual_status(manual: CampaignStatus) -> EffectiveStatus {
    match manual {
        CampaignStatus::Active => EffectiveStatus::Active,
        CampaignStatus::Draft => EffectiveStatus::Draft,
        CampaignStatus::Paused => EffectiveStatus::Paused,
    }
}
