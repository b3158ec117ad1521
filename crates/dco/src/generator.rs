//! Materializes pool combinations into pool-generated variants.
//!
//! Exclusivity and atomic replacement belong to the persistence layer: a
//! [`GenerationRepository`] hands out at most one lease per campaign and
//! swaps the generated subset in one step when the lease is committed.

use chrono::{DateTime, Utc};
use dco_core::error::{DcoError, DcoResult};
use dco_core::types::{Provenance, Variant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::combinator::PoolSet;
use crate::types::{Combination, GenerationResult, PoolPreview};

/// Proof of exclusive generation rights for one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationLease {
    pub campaign_id: Uuid,
    pub token: Uuid,
    /// Variant-set version observed when the lease was granted.
    pub base_version: u64,
    pub acquired_at: DateTime<Utc>,
}

/// Persistence-side contract for generation.
pub trait GenerationRepository: Send + Sync {
    /// Current pools of the campaign.
    fn load_pools(&self, campaign_id: Uuid) -> DcoResult<PoolSet>;

    /// Grant the campaign's generation lease, or fail with
    /// `ConcurrentGenerationConflict` while another lease is live.
    fn acquire_generation(&self, campaign_id: Uuid) -> DcoResult<GenerationLease>;

    /// Replace every pool-generated variant of the campaign with `variants`
    /// in one step and release the lease. Manual variants are untouched.
    /// Returns how many generated variants were replaced.
    fn commit_generation(&self, lease: &GenerationLease, variants: Vec<Variant>) -> DcoResult<usize>;

    /// Release a lease without writing anything.
    fn release_generation(&self, lease: &GenerationLease);
}

/// Runs preview and generation against a cap.
#[derive(Debug, Clone)]
pub struct PoolGenerator {
    cap: u64,
}

impl PoolGenerator {
    pub fn new(cap: u64) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// First `limit` combinations plus the total. Never writes.
    ///
    /// `limit` is clamped to the cap: nothing past it could be generated.
    pub fn preview(&self, pools: &PoolSet, limit: usize) -> PoolPreview {
        let limit = limit.min(usize::try_from(self.cap).unwrap_or(usize::MAX));
        let preview = pools.preview(limit);
        PoolPreview {
            total_combinations: pools.estimate(),
            showing: preview.len(),
            preview,
        }
    }

    /// Expand the campaign's pools into variants and replace the previous
    /// generated set.
    ///
    /// The cap is checked before any lease is taken, so an oversized request
    /// performs no writes at all.
    pub fn generate(
        &self,
        campaign_id: Uuid,
        repo: &dyn GenerationRepository,
    ) -> DcoResult<GenerationResult> {
        let pools = repo.load_pools(campaign_id)?;
        if pools.is_empty() {
            return Err(DcoError::NoPoolsDefined(campaign_id));
        }

        let estimated = pools.estimate();
        if estimated > self.cap {
            warn!(%campaign_id, estimated, cap = self.cap, "pool generation rejected by cap");
            metrics::counter!("dco.generation.rejected", "reason" => "cap").increment(1);
            return Err(DcoError::PoolGenerationLimitExceeded {
                estimated,
                cap: self.cap,
            });
        }

        let lease = repo.acquire_generation(campaign_id).map_err(|e| {
            if matches!(e, DcoError::ConcurrentGenerationConflict(_)) {
                metrics::counter!("dco.generation.rejected", "reason" => "conflict").increment(1);
            }
            e
        })?;

        let now = Utc::now();
        let variants: Vec<Variant> = pools
            .combinations()
            .enumerate()
            .map(|(i, combo)| generated_variant(campaign_id, i + 1, combo, now))
            .collect();
        let created_variant_ids: Vec<Uuid> = variants.iter().map(|v| v.id).collect();

        let replaced_count = match repo.commit_generation(&lease, variants) {
            Ok(n) => n,
            Err(e) => {
                repo.release_generation(&lease);
                return Err(e);
            }
        };

        info!(
            %campaign_id,
            created = created_variant_ids.len(),
            replaced = replaced_count,
            "generated variants from pools"
        );
        metrics::counter!("dco.generation.completed").increment(1);

        Ok(GenerationResult {
            campaign_id,
            combination_count: created_variant_ids.len() as u64,
            created_variant_ids,
            replaced_count,
        })
    }
}

fn generated_variant(
    campaign_id: Uuid,
    ordinal: usize,
    combo: Combination,
    now: DateTime<Utc>,
) -> Variant {
    Variant {
        id: Uuid::new_v4(),
        campaign_id,
        name: Some(format!("Generated #{ordinal}")),
        headline: combo.headline,
        body: combo.body,
        image_url: combo.image,
        cta_text: combo.cta_text,
        cta_url: combo.cta_url,
        weight: 1,
        is_default: false,
        provenance: Provenance::PoolGenerated,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dco_core::types::PoolSlot;
    use std::sync::Mutex;

    /// Minimal repository: one campaign, a flag for the lease.
    struct MemoryRepo {
        pools: PoolSet,
        variants: Mutex<Vec<Variant>>,
        leased: Mutex<bool>,
        fail_commit: bool,
    }

    impl MemoryRepo {
        fn new(pools: PoolSet, manual: Vec<Variant>) -> Self {
            Self {
                pools,
                variants: Mutex::new(manual),
                leased: Mutex::new(false),
                fail_commit: false,
            }
        }
    }

    impl GenerationRepository for MemoryRepo {
        fn load_pools(&self, _campaign_id: Uuid) -> DcoResult<PoolSet> {
            Ok(self.pools.clone())
        }

        fn acquire_generation(&self, campaign_id: Uuid) -> DcoResult<GenerationLease> {
            let mut leased = self.leased.lock().unwrap();
            if *leased {
                return Err(DcoError::ConcurrentGenerationConflict(campaign_id));
            }
            *leased = true;
            Ok(GenerationLease {
                campaign_id,
                token: Uuid::new_v4(),
                base_version: 0,
                acquired_at: Utc::now(),
            })
        }

        fn commit_generation(&self, _lease: &GenerationLease, variants: Vec<Variant>) -> DcoResult<usize> {
            if self.fail_commit {
                return Err(DcoError::Snapshot("store unavailable".into()));
            }
            let mut stored = self.variants.lock().unwrap();
            let before = stored.len();
            stored.retain(|v| !v.is_generated());
            let replaced = before - stored.len();
            stored.extend(variants);
            *self.leased.lock().unwrap() = false;
            Ok(replaced)
        }

        fn release_generation(&self, _lease: &GenerationLease) {
            *self.leased.lock().unwrap() = false;
        }
    }

    fn pools() -> PoolSet {
        PoolSet::new()
            .with(PoolSlot::Headline, ["A", "B"])
            .with(PoolSlot::Image, ["x.png", "y.png", "z.png"])
    }

    #[test]
    fn test_generate_creates_one_variant_per_combination() {
        let campaign = Uuid::new_v4();
        let repo = MemoryRepo::new(pools(), vec![]);
        let result = PoolGenerator::new(100).generate(campaign, &repo).unwrap();

        assert_eq!(result.combination_count, 6);
        assert_eq!(result.created_variant_ids.len(), 6);
        let stored = repo.variants.lock().unwrap();
        assert!(stored.iter().all(|v| v.is_generated() && v.weight == 1 && !v.is_default));
        assert_eq!(stored[0].name.as_deref(), Some("Generated #1"));
        assert_eq!(stored[0].headline.as_deref(), Some("A"));
        assert_eq!(stored[1].image_url.as_deref(), Some("y.png"));
        assert!(stored[0].body.is_none());
    }

    #[test]
    fn test_rerun_replaces_generated_and_keeps_manual() {
        let campaign = Uuid::new_v4();
        let mut manual = Variant::new(campaign);
        manual.headline = Some("Hand written".into());
        let repo = MemoryRepo::new(pools(), vec![manual.clone()]);
        let generator = PoolGenerator::new(100);

        generator.generate(campaign, &repo).unwrap();
        let first: Vec<Option<String>> = repo
            .variants
            .lock()
            .unwrap()
            .iter()
            .map(|v| v.headline.clone())
            .collect();

        let second_run = generator.generate(campaign, &repo).unwrap();
        assert_eq!(second_run.replaced_count, 6);

        let stored = repo.variants.lock().unwrap();
        assert_eq!(stored.len(), 7);
        assert_eq!(stored.iter().filter(|v| v.id == manual.id).count(), 1);
        let second: Vec<Option<String>> = stored.iter().map(|v| v.headline.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cap_is_checked_before_any_write() {
        let campaign = Uuid::new_v4();
        let repo = MemoryRepo::new(pools(), vec![]);
        let err = PoolGenerator::new(5).generate(campaign, &repo).unwrap_err();

        assert!(matches!(
            err,
            DcoError::PoolGenerationLimitExceeded { estimated: 6, cap: 5 }
        ));
        assert!(repo.variants.lock().unwrap().is_empty());
        assert!(!*repo.leased.lock().unwrap());
    }

    #[test]
    fn test_live_lease_rejects_second_generation() {
        let campaign = Uuid::new_v4();
        let repo = MemoryRepo::new(pools(), vec![]);
        let held = repo.acquire_generation(campaign).unwrap();

        let err = PoolGenerator::new(100).generate(campaign, &repo).unwrap_err();
        assert!(matches!(err, DcoError::ConcurrentGenerationConflict(id) if id == campaign));
        assert!(repo.variants.lock().unwrap().is_empty());

        repo.release_generation(&held);
        assert!(PoolGenerator::new(100).generate(campaign, &repo).is_ok());
    }

    #[test]
    fn test_failed_commit_releases_lease() {
        let campaign = Uuid::new_v4();
        let mut repo = MemoryRepo::new(pools(), vec![]);
        repo.fail_commit = true;

        assert!(PoolGenerator::new(100).generate(campaign, &repo).is_err());
        assert!(!*repo.leased.lock().unwrap());
    }

    #[test]
    fn test_no_pools_defined() {
        let campaign = Uuid::new_v4();
        let repo = MemoryRepo::new(PoolSet::new(), vec![]);
        assert!(matches!(
            PoolGenerator::new(100).generate(campaign, &repo),
            Err(DcoError::NoPoolsDefined(_))
        ));
    }

    #[test]
    fn test_preview_does_not_write() {
        let generator = PoolGenerator::new(100);
        let preview = generator.preview(&pools(), 4);
        assert_eq!(preview.total_combinations, 6);
        assert_eq!(preview.showing, 4);
        assert_eq!(preview.preview[3].headline.as_deref(), Some("B"));
    }

    #[test]
    fn test_preview_limit_clamped_to_cap() {
        let twenty: Vec<String> = (0..20).map(|i| format!("v{i}")).collect();
        let pools = PoolSlot::ALL
            .iter()
            .fold(PoolSet::new(), |set, slot| set.with(*slot, twenty.clone()));

        let preview = PoolGenerator::new(1000).preview(&pools, 500_000);
        assert_eq!(preview.total_combinations, 3_200_000);
        assert_eq!(preview.showing, 1000);
        assert_eq!(preview.preview.len(), 1000);
    }
}
