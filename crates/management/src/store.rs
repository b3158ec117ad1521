//! In-memory campaign store backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.
//! Every campaign's variants, rules, pools and generation lease live in one
//! record, so a snapshot read or a generated-set swap happens under a single
//! shard lock.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use dashmap::DashMap;
use dco_core::config::DcoConfig;
use dco_core::error::{DcoError, DcoResult};
use dco_core::rules::{Rule, RuleDraft, RuleSet};
use dco_core::signals::SignalCatalog;
use dco_core::types::{
    Campaign, CampaignSnapshot, Pool, PoolSlot, Provenance, Variant, DEFAULT_TEMPLATE,
    TEMPLATE_NAMES,
};
use dco_engine::combinator::PoolSet;
use dco_engine::engine::SnapshotSource;
use dco_engine::generator::{GenerationLease, GenerationRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::*;

struct CampaignRecord {
    campaign: Campaign,
    /// Stored order; manual variants keep their position across generations.
    variants: Vec<Variant>,
    rules: Vec<Rule>,
    pools: PoolSet,
    /// Bumped whenever the variant set changes.
    variant_version: u64,
    lease: Option<GenerationLease>,
}

impl CampaignRecord {
    fn snapshot(&self) -> CampaignSnapshot {
        CampaignSnapshot::new(self.campaign.clone(), self.variants.clone(), self.rules.clone())
    }

    fn has_variant(&self, id: Uuid) -> bool {
        self.variants.iter().any(|v| v.id == id)
    }

    fn variant_mut(&mut self, id: Uuid) -> DcoResult<&mut Variant> {
        self.variants
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(DcoError::VariantNotFound(id))
    }

    fn make_default(&mut self, id: Uuid) {
        for v in self.variants.iter_mut() {
            v.is_default = v.id == id;
        }
    }

    /// Drop rules whose target is no longer in the variant set.
    fn prune_rules(&mut self) -> usize {
        let before = self.rules.len();
        let variants = &self.variants;
        self.rules
            .retain(|r| variants.iter().any(|v| v.id == r.variant_id));
        before - self.rules.len()
    }
}

/// Thread-safe in-memory store for campaigns and everything hanging off them.
pub struct ManagementStore {
    campaigns: DashMap<Uuid, CampaignRecord>,
    rule_sequence: AtomicU64,
    catalog: SignalCatalog,
    lease_ttl: Duration,
    max_pool_values: usize,
}

impl ManagementStore {
    pub fn new(catalog: SignalCatalog, lease_ttl: Duration) -> Self {
        info!("Management store initialized (in-memory, development mode)");
        Self {
            campaigns: DashMap::new(),
            rule_sequence: AtomicU64::new(0),
            catalog,
            lease_ttl,
            max_pool_values: cap_to_usize(DcoConfig::default().generation_cap),
        }
    }

    /// Largest number of values one pool slot may hold.
    pub fn with_max_pool_values(mut self, max: usize) -> Self {
        self.max_pool_values = max;
        self
    }

    pub fn from_config(config: &DcoConfig) -> Self {
        Self::new(
            SignalCatalog::with_extra(config.extra_signals.iter().cloned()),
            i64::try_from(config.generation_lease_ttl_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or_else(|| Duration::days(365)),
        )
        .with_max_pool_values(cap_to_usize(config.generation_cap))
    }

    fn with_record<T>(
        &self,
        campaign_id: Uuid,
        f: impl FnOnce(&mut CampaignRecord) -> DcoResult<T>,
    ) -> DcoResult<T> {
        let mut entry = self
            .campaigns
            .get_mut(&campaign_id)
            .ok_or(DcoError::CampaignNotFound(campaign_id))?;
        f(entry.value_mut())
    }

    fn read_record<T>(&self, campaign_id: Uuid, f: impl FnOnce(&CampaignRecord) -> T) -> DcoResult<T> {
        self.campaigns
            .get(&campaign_id)
            .map(|entry| f(entry.value()))
            .ok_or(DcoError::CampaignNotFound(campaign_id))
    }

    // ─── Campaigns ─────────────────────────────────────────────────────────

    pub fn list_campaigns(&self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> =
            self.campaigns.iter().map(|r| r.value().campaign.clone()).collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns
    }

    pub fn get_campaign(&self, id: Uuid) -> DcoResult<Campaign> {
        self.read_record(id, |r| r.campaign.clone())
    }

    pub fn create_campaign(&self, req: CreateCampaignRequest) -> DcoResult<Campaign> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(DcoError::InvalidRequest("campaign name must not be empty".into()));
        }
        let template = validate_template(req.template.as_deref().unwrap_or(DEFAULT_TEMPLATE))?;
        validate_window(req.start_date, req.end_date)?;

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name,
            description: req.description,
            status: req.status,
            start_date: req.start_date,
            end_date: req.end_date,
            ab_test_mode: req.ab_test_mode,
            template,
            created_at: now,
            updated_at: now,
        };
        self.campaigns.insert(
            campaign.id,
            CampaignRecord {
                campaign: campaign.clone(),
                variants: Vec::new(),
                rules: Vec::new(),
                pools: PoolSet::new(),
                variant_version: 0,
                lease: None,
            },
        );
        info!(campaign_id = %campaign.id, name = %campaign.name, "campaign created");
        Ok(campaign)
    }

    pub fn update_campaign(&self, id: Uuid, req: UpdateCampaignRequest) -> DcoResult<Campaign> {
        self.with_record(id, |record| {
            let mut c = record.campaign.clone();
            if let Some(name) = req.name {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(DcoError::InvalidRequest("campaign name must not be empty".into()));
                }
                c.name = name;
            }
            if let Some(description) = req.description { c.description = Some(description); }
            if let Some(status) = req.status { c.status = status; }
            if let Some(start) = req.start_date { c.start_date = start; }
            if let Some(end) = req.end_date { c.end_date = end; }
            if let Some(mode) = req.ab_test_mode { c.ab_test_mode = mode; }
            if let Some(template) = req.template { c.template = validate_template(&template)?; }
            validate_window(c.start_date, c.end_date)?;
            c.updated_at = Utc::now();
            record.campaign = c.clone();
            Ok(c)
        })
    }

    /// Removes the campaign with its variants, rules and pools.
    pub fn delete_campaign(&self, id: Uuid) -> DcoResult<()> {
        let (_, record) = self
            .campaigns
            .remove(&id)
            .ok_or(DcoError::CampaignNotFound(id))?;
        info!(
            campaign_id = %id,
            variants = record.variants.len(),
            rules = record.rules.len(),
            "campaign deleted"
        );
        Ok(())
    }

    // ─── Variants ──────────────────────────────────────────────────────────

    pub fn list_variants(&self, campaign_id: Uuid) -> DcoResult<Vec<Variant>> {
        self.read_record(campaign_id, |r| r.variants.clone())
    }

    pub fn create_variant(&self, campaign_id: Uuid, req: CreateVariantRequest) -> DcoResult<Variant> {
        self.with_record(campaign_id, |record| {
            let mut variant = Variant::new(campaign_id);
            variant.name = req.name;
            variant.headline = req.headline;
            variant.body = req.body;
            variant.image_url = req.image_url;
            variant.cta_text = req.cta_text;
            variant.cta_url = req.cta_url;
            variant.weight = req.weight;
            variant.provenance = Provenance::Manual;

            let id = variant.id;
            record.variants.push(variant);
            if req.is_default {
                record.make_default(id);
            }
            record.variant_version += 1;
            record.variant_mut(id).map(|v| v.clone())
        })
    }

    pub fn update_variant(
        &self,
        campaign_id: Uuid,
        variant_id: Uuid,
        req: UpdateVariantRequest,
    ) -> DcoResult<Variant> {
        self.with_record(campaign_id, |record| {
            let edited = !req.is_empty();
            let v = record.variant_mut(variant_id)?;
            if edited && v.is_generated() {
                // Hand-edited variants survive the next generation run.
                v.provenance = Provenance::Manual;
                debug!(%campaign_id, %variant_id, "generated variant edited; now manual");
            }
            if let Some(name) = req.name { v.name = Some(name); }
            if let Some(headline) = req.headline { v.headline = Some(headline); }
            if let Some(body) = req.body { v.body = Some(body); }
            if let Some(image_url) = req.image_url { v.image_url = Some(image_url); }
            if let Some(cta_text) = req.cta_text { v.cta_text = Some(cta_text); }
            if let Some(cta_url) = req.cta_url { v.cta_url = Some(cta_url); }
            if let Some(weight) = req.weight { v.weight = weight; }
            match req.is_default {
                Some(true) => record.make_default(variant_id),
                Some(false) => record.variant_mut(variant_id)?.is_default = false,
                None => {}
            }
            record.variant_version += 1;
            record.variant_mut(variant_id).map(|v| v.clone())
        })
    }

    /// Deletes the variant and every rule targeting it.
    pub fn delete_variant(&self, campaign_id: Uuid, variant_id: Uuid) -> DcoResult<()> {
        self.with_record(campaign_id, |record| {
            if !record.has_variant(variant_id) {
                return Err(DcoError::VariantNotFound(variant_id));
            }
            record.variants.retain(|v| v.id != variant_id);
            let pruned = record.prune_rules();
            record.variant_version += 1;
            debug!(%campaign_id, %variant_id, pruned_rules = pruned, "variant deleted");
            Ok(())
        })
    }

    // ─── Rules ─────────────────────────────────────────────────────────────

    /// Rules in evaluation order.
    pub fn list_rules(&self, campaign_id: Uuid) -> DcoResult<Vec<Rule>> {
        self.read_record(campaign_id, |r| {
            RuleSet::new(r.rules.clone()).as_slice().to_vec()
        })
    }

    pub fn create_rule(&self, campaign_id: Uuid, draft: RuleDraft) -> DcoResult<Rule> {
        self.with_record(campaign_id, |record| {
            let sequence = self.rule_sequence.fetch_add(1, Ordering::SeqCst);
            let rule = self.compile_rule(record, Uuid::new_v4(), sequence, draft)?;
            record.rules.push(rule.clone());
            debug!(%campaign_id, rule_id = %rule.id, signal = %rule.signal, "rule created");
            Ok(rule)
        })
    }

    pub fn update_rule(&self, campaign_id: Uuid, rule_id: Uuid, req: UpdateRuleRequest) -> DcoResult<Rule> {
        self.with_record(campaign_id, |record| {
            let idx = record
                .rules
                .iter()
                .position(|r| r.id == rule_id)
                .ok_or(DcoError::RuleNotFound(rule_id))?;
            let existing = &record.rules[idx];
            let mut draft = existing.to_draft();
            if let Some(variant_id) = req.variant_id { draft.variant_id = variant_id; }
            if let Some(signal) = req.signal { draft.signal = signal; }
            if let Some(operator) = req.operator { draft.operator = operator; }
            if let Some(value) = req.value { draft.value = value; }
            if let Some(priority) = req.priority { draft.priority = priority; }

            let (sequence, created_at) = (existing.sequence, existing.created_at);
            let mut rule = self.compile_rule(record, rule_id, sequence, draft)?;
            rule.created_at = created_at;
            record.rules[idx] = rule.clone();
            Ok(rule)
        })
    }

    pub fn delete_rule(&self, campaign_id: Uuid, rule_id: Uuid) -> DcoResult<()> {
        self.with_record(campaign_id, |record| {
            let before = record.rules.len();
            record.rules.retain(|r| r.id != rule_id);
            if record.rules.len() == before {
                return Err(DcoError::RuleNotFound(rule_id));
            }
            Ok(())
        })
    }

    fn compile_rule(
        &self,
        record: &CampaignRecord,
        id: Uuid,
        sequence: u64,
        draft: RuleDraft,
    ) -> DcoResult<Rule> {
        if !record.has_variant(draft.variant_id) {
            return Err(DcoError::InvalidRule(format!(
                "target variant {} does not belong to campaign {}",
                draft.variant_id, record.campaign.id
            )));
        }
        Rule::compile(id, record.campaign.id, sequence, draft, &self.catalog)
    }

    // ─── Pools ─────────────────────────────────────────────────────────────

    pub fn list_pools(&self, campaign_id: Uuid) -> DcoResult<PoolsResponse> {
        self.read_record(campaign_id, |r| PoolsResponse {
            campaign_id,
            pools: PoolSlot::ALL
                .iter()
                .filter(|slot| !r.pools.values(**slot).is_empty())
                .map(|slot| Pool {
                    campaign_id,
                    slot: *slot,
                    values: r.pools.values(*slot).to_vec(),
                })
                .collect(),
            total_combinations: r.pools.estimate(),
        })
    }

    pub fn pool_set(&self, campaign_id: Uuid) -> DcoResult<PoolSet> {
        self.read_record(campaign_id, |r| r.pools.clone())
    }

    /// Replace one slot's values. Blank entries are dropped.
    pub fn upsert_pool(&self, campaign_id: Uuid, slot: PoolSlot, values: Vec<String>) -> DcoResult<Pool> {
        let values: Vec<String> = values
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.len() > self.max_pool_values {
            return Err(DcoError::InvalidRequest(format!(
                "{} pool has {} values; at most {} allowed",
                slot.as_str(),
                values.len(),
                self.max_pool_values
            )));
        }
        self.with_record(campaign_id, |record| {
            record.pools.set(slot, values.clone());
            Ok(Pool {
                campaign_id,
                slot,
                values,
            })
        })
    }

    pub fn delete_pool(&self, campaign_id: Uuid, slot: PoolSlot) -> DcoResult<()> {
        self.with_record(campaign_id, |record| {
            record.pools.clear(slot);
            Ok(())
        })
    }
}

impl SnapshotSource for ManagementStore {
    fn load_snapshot(&self, campaign_id: Uuid) -> DcoResult<Option<CampaignSnapshot>> {
        Ok(self.campaigns.get(&campaign_id).map(|r| r.value().snapshot()))
    }
}

impl GenerationRepository for ManagementStore {
    fn load_pools(&self, campaign_id: Uuid) -> DcoResult<PoolSet> {
        self.pool_set(campaign_id)
    }

    fn acquire_generation(&self, campaign_id: Uuid) -> DcoResult<GenerationLease> {
        let lease_ttl = self.lease_ttl;
        self.with_record(campaign_id, |record| {
            let now = Utc::now();
            if let Some(held) = &record.lease {
                if now - held.acquired_at < lease_ttl {
                    return Err(DcoError::ConcurrentGenerationConflict(campaign_id));
                }
                warn!(%campaign_id, token = %held.token, "taking over abandoned generation lease");
            }
            let lease = GenerationLease {
                campaign_id,
                token: Uuid::new_v4(),
                base_version: record.variant_version,
                acquired_at: now,
            };
            record.lease = Some(lease.clone());
            Ok(lease)
        })
    }

    fn commit_generation(&self, lease: &GenerationLease, variants: Vec<Variant>) -> DcoResult<usize> {
        self.with_record(lease.campaign_id, |record| {
            if record.lease.as_ref().map(|l| l.token) != Some(lease.token) {
                // Lease expired and was taken over; the new holder owns the swap.
                return Err(DcoError::ConcurrentGenerationConflict(lease.campaign_id));
            }
            if record.variant_version != lease.base_version {
                warn!(
                    campaign_id = %lease.campaign_id,
                    base_version = lease.base_version,
                    version = record.variant_version,
                    "variant set changed during generation; discarding"
                );
                return Err(DcoError::ConcurrentGenerationConflict(lease.campaign_id));
            }
            let before = record.variants.len();
            record.variants.retain(|v| !v.is_generated());
            let replaced = before - record.variants.len();
            record.variants.extend(variants);
            let pruned = record.prune_rules();
            record.variant_version += 1;
            record.lease = None;
            debug!(
                campaign_id = %lease.campaign_id,
                version = record.variant_version,
                replaced,
                pruned_rules = pruned,
                "generated variant set committed"
            );
            Ok(replaced)
        })
    }

    fn release_generation(&self, lease: &GenerationLease) {
        if let Some(mut record) = self.campaigns.get_mut(&lease.campaign_id) {
            if record.lease.as_ref().map(|l| l.token) == Some(lease.token) {
                record.lease = None;
            }
        }
    }
}

fn cap_to_usize(cap: u64) -> usize {
    usize::try_from(cap).unwrap_or(usize::MAX)
}

fn validate_template(name: &str) -> DcoResult<String> {
    let name = name.trim();
    if TEMPLATE_NAMES.contains(&name) {
        Ok(name.to_string())
    } else {
        Err(DcoError::InvalidRequest(format!(
            "unknown template '{name}' (allowed: {})",
            TEMPLATE_NAMES.join(", ")
        )))
    }
}

fn validate_window(
    start: Option<chrono::DateTime<Utc>>,
    end: Option<chrono::DateTime<Utc>>,
) -> DcoResult<()> {
    match (start, end) {
        (Some(s), Some(e)) if s > e => Err(DcoError::InvalidRequest(
            "start_date must not be after end_date".into(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dco_core::types::{AbTestMode, CampaignStatus};
    use dco_engine::generator::PoolGenerator;

    fn store() -> ManagementStore {
        ManagementStore::new(SignalCatalog::default(), Duration::seconds(300))
    }

    fn campaign(store: &ManagementStore) -> Campaign {
        store
            .create_campaign(CreateCampaignRequest {
                name: "Summer Sale".into(),
                description: None,
                status: CampaignStatus::Active,
                start_date: None,
                end_date: None,
                ab_test_mode: AbTestMode::Rules,
                template: None,
            })
            .unwrap()
    }

    fn variant(store: &ManagementStore, campaign_id: Uuid, headline: &str) -> Variant {
        store
            .create_variant(
                campaign_id,
                CreateVariantRequest {
                    headline: Some(headline.into()),
                    weight: 1,
                    ..Default::default()
                },
            )
            .unwrap()
    }

    fn draft(variant_id: Uuid, signal: &str, operator: &str, value: &str) -> RuleDraft {
        RuleDraft {
            variant_id,
            signal: signal.into(),
            operator: operator.into(),
            value: value.into(),
            priority: 0,
        }
    }

    #[test]
    fn test_campaign_crud() {
        let store = store();
        let c = campaign(&store);
        assert_eq!(c.template, DEFAULT_TEMPLATE);
        assert_eq!(store.list_campaigns().len(), 1);

        let updated = store
            .update_campaign(
                c.id,
                UpdateCampaignRequest {
                    template: Some("hero".into()),
                    ab_test_mode: Some(AbTestMode::Weighted),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.template, "hero");
        assert_eq!(store.get_campaign(c.id).unwrap().ab_test_mode, AbTestMode::Weighted);

        assert!(matches!(
            store.update_campaign(c.id, UpdateCampaignRequest { template: Some("poster".into()), ..Default::default() }),
            Err(DcoError::InvalidRequest(_))
        ));

        store.delete_campaign(c.id).unwrap();
        assert!(matches!(store.get_campaign(c.id), Err(DcoError::CampaignNotFound(_))));
        assert!(store.load_snapshot(c.id).unwrap().is_none());
    }

    #[test]
    fn test_single_default_variant() {
        let store = store();
        let c = campaign(&store);
        let a = variant(&store, c.id, "A");
        let b = variant(&store, c.id, "B");
        store
            .update_variant(c.id, a.id, UpdateVariantRequest { is_default: Some(true), ..Default::default() })
            .unwrap();
        store
            .update_variant(c.id, b.id, UpdateVariantRequest { is_default: Some(true), ..Default::default() })
            .unwrap();
        let defaults: Vec<Uuid> = store
            .list_variants(c.id)
            .unwrap()
            .iter()
            .filter(|v| v.is_default)
            .map(|v| v.id)
            .collect();
        assert_eq!(defaults, vec![b.id]);
    }

    #[test]
    fn test_rule_validation() {
        let store = store();
        let c = campaign(&store);
        let other = campaign(&store);
        let v = variant(&store, c.id, "A");
        let foreign = variant(&store, other.id, "B");

        assert!(store.create_rule(c.id, draft(v.id, "geo_country", "equals", "US")).is_ok());
        for bad in [
            draft(foreign.id, "geo_country", "equals", "US"),
            draft(v.id, "shoe_size", "equals", "9"),
            draft(v.id, "weather_temp", "gt", "warm"),
            draft(v.id, "geo_city", "in", " , "),
            draft(v.id, "referer", "regex", "(unclosed"),
            draft(v.id, "geo_country", "like", "US"),
        ] {
            assert!(
                matches!(store.create_rule(c.id, bad.clone()), Err(DcoError::InvalidRule(_))),
                "accepted {bad:?}"
            );
        }
        assert_eq!(store.list_rules(c.id).unwrap().len(), 1);
    }

    #[test]
    fn test_rules_listed_in_evaluation_order() {
        let store = store();
        let c = campaign(&store);
        let v = variant(&store, c.id, "A");
        let mut late = draft(v.id, "geo_country", "equals", "US");
        late.priority = 5;
        let late = store.create_rule(c.id, late).unwrap();
        let first = store.create_rule(c.id, draft(v.id, "geo_country", "equals", "CA")).unwrap();
        let second = store.create_rule(c.id, draft(v.id, "geo_country", "equals", "MX")).unwrap();

        let ids: Vec<Uuid> = store.list_rules(c.id).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id, late.id]);

        let updated = store
            .update_rule(c.id, late.id, UpdateRuleRequest { priority: Some(-1), operator: Some("eq".into()), ..Default::default() })
            .unwrap();
        assert_eq!(updated.sequence, late.sequence);
        assert_eq!(updated.created_at, late.created_at);
        assert_eq!(store.list_rules(c.id).unwrap()[0].id, late.id);
    }

    #[test]
    fn test_delete_variant_cascades_to_rules() {
        let store = store();
        let c = campaign(&store);
        let a = variant(&store, c.id, "A");
        let b = variant(&store, c.id, "B");
        store.create_rule(c.id, draft(a.id, "daypart", "equals", "morning")).unwrap();
        store.create_rule(c.id, draft(b.id, "daypart", "equals", "evening")).unwrap();

        store.delete_variant(c.id, a.id).unwrap();
        let rules = store.list_rules(c.id).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].variant_id, b.id);
        assert!(matches!(store.delete_variant(c.id, a.id), Err(DcoError::VariantNotFound(_))));
    }

    #[test]
    fn test_pools_and_generation() {
        let store = store();
        let c = campaign(&store);
        let manual = variant(&store, c.id, "Hand written");
        store
            .upsert_pool(c.id, PoolSlot::Headline, vec!["A".into(), " ".into(), "B".into()])
            .unwrap();
        store.upsert_pool(c.id, PoolSlot::CtaText, vec!["Shop".into(), "Go".into()]).unwrap();

        let pools = store.list_pools(c.id).unwrap();
        assert_eq!(pools.total_combinations, 4);
        assert_eq!(pools.pools[0].values, vec!["A", "B"]);

        let generator = PoolGenerator::new(10);
        let first = generator.generate(c.id, &store).unwrap();
        assert_eq!(first.combination_count, 4);

        // A rule on a generated variant goes away with the generated set.
        store
            .create_rule(c.id, draft(first.created_variant_ids[0], "geo_country", "equals", "US"))
            .unwrap();
        store.create_rule(c.id, draft(manual.id, "geo_country", "equals", "CA")).unwrap();

        store.delete_pool(c.id, PoolSlot::CtaText).unwrap();
        let second = generator.generate(c.id, &store).unwrap();
        assert_eq!(second.replaced_count, 4);
        assert_eq!(second.combination_count, 2);

        let variants = store.list_variants(c.id).unwrap();
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].id, manual.id);
        let rules = store.list_rules(c.id).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].variant_id, manual.id);
    }

    #[test]
    fn test_lease_conflict_and_takeover() {
        let store = ManagementStore::new(SignalCatalog::default(), Duration::zero());
        let c = campaign(&store);
        let stale = store.acquire_generation(c.id).unwrap();
        // TTL of zero: any held lease is already abandoned.
        let fresh = store.acquire_generation(c.id).unwrap();
        assert_ne!(stale.token, fresh.token);
        assert!(matches!(
            store.commit_generation(&stale, vec![]),
            Err(DcoError::ConcurrentGenerationConflict(_))
        ));
        assert_eq!(store.commit_generation(&fresh, vec![]).unwrap(), 0);

        let store = store_with_long_ttl();
        let c = campaign(&store);
        let held = store.acquire_generation(c.id).unwrap();
        assert!(matches!(
            store.acquire_generation(c.id),
            Err(DcoError::ConcurrentGenerationConflict(_))
        ));
        store.release_generation(&held);
        assert!(store.acquire_generation(c.id).is_ok());
    }

    #[test]
    fn test_edited_generated_variant_survives_regeneration() {
        let store = store();
        let c = campaign(&store);
        store.upsert_pool(c.id, PoolSlot::Headline, vec!["A".into(), "B".into()]).unwrap();
        let generator = PoolGenerator::new(10);
        let first = generator.generate(c.id, &store).unwrap();
        let tuned_id = first.created_variant_ids[0];

        let tuned = store
            .update_variant(
                c.id,
                tuned_id,
                UpdateVariantRequest {
                    headline: Some("Hand-tuned by operator".into()),
                    is_default: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(tuned.provenance, Provenance::Manual);

        let second = generator.generate(c.id, &store).unwrap();
        assert_eq!(second.replaced_count, 1);

        let variants = store.list_variants(c.id).unwrap();
        assert_eq!(variants.len(), 3);
        let kept = variants.iter().find(|v| v.id == tuned_id).unwrap();
        assert_eq!(kept.headline.as_deref(), Some("Hand-tuned by operator"));
        assert!(kept.is_default);
        assert_eq!(variants.iter().filter(|v| v.is_generated()).count(), 2);
    }

    #[test]
    fn test_empty_update_keeps_generated_provenance() {
        let store = store();
        let c = campaign(&store);
        store.upsert_pool(c.id, PoolSlot::Body, vec!["Only".into()]).unwrap();
        let generated = PoolGenerator::new(10).generate(c.id, &store).unwrap();
        let v = store
            .update_variant(c.id, generated.created_variant_ids[0], UpdateVariantRequest::default())
            .unwrap();
        assert_eq!(v.provenance, Provenance::PoolGenerated);
    }

    #[test]
    fn test_commit_rejected_when_variant_set_changed() {
        let store = store_with_long_ttl();
        let c = campaign(&store);
        let lease = store.acquire_generation(c.id).unwrap();
        variant(&store, c.id, "Added mid-generation");

        assert!(matches!(
            store.commit_generation(&lease, vec![Variant::new(c.id)]),
            Err(DcoError::ConcurrentGenerationConflict(_))
        ));
        assert_eq!(store.list_variants(c.id).unwrap().len(), 1);

        store.release_generation(&lease);
        let retry = store.acquire_generation(c.id).unwrap();
        assert_eq!(store.commit_generation(&retry, vec![Variant::new(c.id)]).unwrap(), 0);
    }

    #[test]
    fn test_pool_size_bounded_by_generation_cap() {
        let config = DcoConfig {
            generation_cap: 3,
            ..DcoConfig::default()
        };
        let store = ManagementStore::from_config(&config);
        let c = campaign(&store);
        let four: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        assert!(matches!(
            store.upsert_pool(c.id, PoolSlot::Headline, four.clone()),
            Err(DcoError::InvalidRequest(_))
        ));
        assert!(store.pool_set(c.id).unwrap().is_empty());
        assert!(store.upsert_pool(c.id, PoolSlot::Headline, four[..3].to_vec()).is_ok());
    }

    fn store_with_long_ttl() -> ManagementStore {
        ManagementStore::new(SignalCatalog::default(), Duration::hours(1))
    }

    #[test]
    fn test_extra_signals_from_config() {
        let config = DcoConfig {
            extra_signals: vec!["loyalty_tier".into()],
            ..DcoConfig::default()
        };
        let store = ManagementStore::from_config(&config);
        let c = campaign(&store);
        let v = variant(&store, c.id, "Gold");
        assert!(store.create_rule(c.id, draft(v.id, "loyalty_tier", "equals", "gold")).is_ok());
    }
}
