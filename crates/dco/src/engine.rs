use std::sync::Arc;
use std::time::Instant;

use dco_core::error::DcoResult;
use dco_core::event_bus::EventSink;
use dco_core::signals::SignalContext;
use dco_core::sources::{Clock, RandomSource};
use dco_core::types::{CampaignSnapshot, DeliveryEvent, SelectionRecord, Variant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::schedule::effective_status;
use crate::selector::{select_variant, select_variant_traced};
use crate::types::{NoAdReason, RenderPayload, ServeOutcome, ServedAd, SimulationReport};

/// Read side of the persistence collaborator. Implementations may cache.
pub trait SnapshotSource: Send + Sync {
    /// `Ok(None)` when the campaign does not exist; `Err` for fetch failures.
    fn load_snapshot(&self, campaign_id: Uuid) -> DcoResult<Option<CampaignSnapshot>>;
}

/// Per-request orchestration: schedule gate, selection, payload, record.
#[derive(Clone)]
pub struct ServingEngine {
    sink: Arc<dyn EventSink>,
    click_base_path: String,
}

impl ServingEngine {
    pub fn new(sink: Arc<dyn EventSink>, click_base_path: impl Into<String>) -> Self {
        Self {
            sink,
            click_base_path: click_base_path.into(),
        }
    }

    /// Fetch the campaign snapshot and decide. Fetch errors propagate
    /// unchanged; every decision outcome is `Ok`.
    pub fn serve<R: RandomSource + ?Sized>(
        &self,
        source: &dyn SnapshotSource,
        campaign_id: Uuid,
        signals: SignalContext,
        clock: &dyn Clock,
        rng: &mut R,
        track: bool,
    ) -> DcoResult<ServeOutcome> {
        let Some(snapshot) = source.load_snapshot(campaign_id)? else {
            metrics::counter!("serving.no_ad", "reason" => "not_found").increment(1);
            return Ok(ServeOutcome::NoAd {
                reason: NoAdReason::CampaignNotFound,
            });
        };
        Ok(self.decide(&snapshot, signals, clock, rng, track))
    }

    /// Decide against an already-loaded snapshot. Pure apart from the
    /// emitted event when `track` is set.
    pub fn decide<R: RandomSource + ?Sized>(
        &self,
        snapshot: &CampaignSnapshot,
        signals: SignalContext,
        clock: &dyn Clock,
        rng: &mut R,
        track: bool,
    ) -> ServeOutcome {
        let campaign = &snapshot.campaign;
        let now = clock.now();

        let status = effective_status(now, campaign.start_date, campaign.end_date, campaign.status);
        if !status.is_servable() {
            debug!(campaign_id = %campaign.id, ?status, "campaign not live");
            metrics::counter!("serving.no_ad", "reason" => "not_live").increment(1);
            return ServeOutcome::NoAd {
                reason: NoAdReason::NotLive(status),
            };
        }

        let selection = select_variant(
            campaign.ab_test_mode,
            &snapshot.variants,
            &snapshot.rules,
            &signals,
            rng,
        );
        let Some(variant) = selection.variant_id.and_then(|id| snapshot.variant(&id)) else {
            debug!(campaign_id = %campaign.id, mode = ?campaign.ab_test_mode, "no eligible variant");
            metrics::counter!("serving.no_ad", "reason" => "no_eligible_variant").increment(1);
            return ServeOutcome::NoAd {
                reason: NoAdReason::NoEligibleVariant,
            };
        };

        let payload = self.render_payload(snapshot, variant);
        let record = SelectionRecord {
            event_id: Uuid::new_v4(),
            campaign_id: campaign.id,
            variant_id: variant.id,
            matched_rule_id: selection.matched_rule_id,
            timestamp: now,
            signals,
        };

        if track {
            self.sink.emit(DeliveryEvent::Impression(record.clone()));
        }
        metrics::counter!("serving.served").increment(1);

        ServeOutcome::Served(ServedAd {
            payload,
            selection,
            record,
        })
    }

    /// Run the full decision with an explicit signal override set and return
    /// the trace. Emits nothing.
    pub fn simulate<R: RandomSource + ?Sized>(
        &self,
        snapshot: &CampaignSnapshot,
        signals: SignalContext,
        clock: &dyn Clock,
        rng: &mut R,
    ) -> SimulationReport {
        let started = Instant::now();
        let campaign = &snapshot.campaign;
        let status = effective_status(
            clock.now(),
            campaign.start_date,
            campaign.end_date,
            campaign.status,
        );

        let (selection, trace) = select_variant_traced(
            campaign.ab_test_mode,
            &snapshot.variants,
            &snapshot.rules,
            &signals,
            rng,
        );

        info!(
            campaign_id = %campaign.id,
            ?status,
            rules = trace.rules.len(),
            selected = ?selection.variant_id,
            latency_us = started.elapsed().as_micros() as u64,
            "simulated ad decision"
        );

        SimulationReport {
            campaign_id: campaign.id,
            effective_status: status,
            would_serve: status.is_servable() && selection.is_selected(),
            signals,
            selection,
            trace,
        }
    }

    /// Click-tracking URL for a served variant.
    pub fn click_url(&self, campaign_id: Uuid, variant: &Variant) -> String {
        let base = self.click_base_path.trim_end_matches('/');
        match variant.cta_url.as_deref() {
            Some(target) if !target.is_empty() => format!(
                "{base}/{campaign_id}/{}?url={}",
                variant.id,
                encode_query_value(target)
            ),
            _ => format!("{base}/{campaign_id}/{}", variant.id),
        }
    }

    fn render_payload(&self, snapshot: &CampaignSnapshot, variant: &Variant) -> RenderPayload {
        RenderPayload {
            campaign_id: snapshot.campaign.id,
            variant_id: variant.id,
            template: snapshot.campaign.template.clone(),
            headline: variant.headline.clone(),
            body: variant.body.clone(),
            image_url: variant.image_url.clone(),
            cta_text: variant.cta_text.clone(),
            cta_url: variant.cta_url.clone(),
            click_url: self.click_url(snapshot.campaign.id, variant),
        }
    }
}

/// Form-encode a value for use in a query string.
fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
