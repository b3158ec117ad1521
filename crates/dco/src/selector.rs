//! Variant selection by A/B mode: default, first matching rule, or a
//! weight-proportional draw.

use dco_core::rules::RuleSet;
use dco_core::signals::SignalContext;
use dco_core::sources::RandomSource;
use dco_core::types::{AbTestMode, Variant};

use crate::matcher::{match_rules, trace_rules};
use crate::types::{DecisionTrace, RuleMatch, SelectionPath, SelectionResult};

/// Pick a variant for one request according to the campaign's A/B mode.
///
/// The rule matcher runs only for `rules` and `rules_then_weighted`;
/// randomness is drawn only on the weighted branch.
pub fn select_variant<R: RandomSource + ?Sized>(
    mode: AbTestMode,
    variants: &[Variant],
    rules: &RuleSet,
    signals: &SignalContext,
    rng: &mut R,
) -> SelectionResult {
    select_with(mode, variants, || match_rules(rules, variants, signals), rng)
}

/// Same decision as [`select_variant`], plus the per-rule trace when rules
/// were consulted.
pub fn select_variant_traced<R: RandomSource + ?Sized>(
    mode: AbTestMode,
    variants: &[Variant],
    rules: &RuleSet,
    signals: &SignalContext,
    rng: &mut R,
) -> (SelectionResult, DecisionTrace) {
    let mut trace = DecisionTrace::default();
    let result = select_with(
        mode,
        variants,
        || {
            let (winner, rule_trace) = trace_rules(rules, variants, signals);
            trace = rule_trace;
            winner
        },
        rng,
    );
    (result, trace)
}

fn select_with<F, R>(
    mode: AbTestMode,
    variants: &[Variant],
    run_rules: F,
    rng: &mut R,
) -> SelectionResult
where
    F: FnOnce() -> Option<RuleMatch>,
    R: RandomSource + ?Sized,
{
    match mode {
        AbTestMode::Off => match default_variant(variants) {
            Some(v) => selected(mode, v, SelectionPath::DefaultVariant),
            None => SelectionResult::none(mode),
        },
        AbTestMode::Rules => match run_rules() {
            Some(m) => rule_selected(mode, m),
            None => SelectionResult::none(mode),
        },
        AbTestMode::Weighted => weighted(mode, variants, rng),
        AbTestMode::RulesThenWeighted => match run_rules() {
            Some(m) => rule_selected(mode, m),
            None => weighted(mode, variants, rng),
        },
    }
}

/// The variant flagged default, else the first in stored order.
pub fn default_variant(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .find(|v| v.is_default)
        .or_else(|| variants.first())
}

/// Weighted draw over variants with weight > 0.
///
/// Draws uniformly in `[0, total_weight)` and walks cumulative weights in
/// stored order, so a fixed order and a fixed draw give a fixed pick.
pub fn weighted_pick<'a, R: RandomSource + ?Sized>(
    variants: &'a [Variant],
    rng: &mut R,
) -> Option<&'a Variant> {
    let total: u64 = variants.iter().map(|v| u64::from(v.weight)).sum();
    if total == 0 {
        return None;
    }

    let draw = rng.draw(total);
    let mut cumulative = 0u64;
    for variant in variants.iter().filter(|v| v.weight > 0) {
        cumulative += u64::from(variant.weight);
        if draw < cumulative {
            return Some(variant);
        }
    }
    None
}

fn weighted<R: RandomSource + ?Sized>(
    mode: AbTestMode,
    variants: &[Variant],
    rng: &mut R,
) -> SelectionResult {
    match weighted_pick(variants, rng) {
        Some(v) => selected(mode, v, SelectionPath::WeightedDraw),
        None => SelectionResult::none(mode),
    }
}

fn rule_selected(mode: AbTestMode, m: RuleMatch) -> SelectionResult {
    SelectionResult {
        variant_id: Some(m.variant_id),
        matched_rule_id: Some(m.rule_id),
        mode_used: mode,
        path: SelectionPath::RuleMatch,
    }
}

fn selected(mode: AbTestMode, variant: &Variant, path: SelectionPath) -> SelectionResult {
    SelectionResult {
        variant_id: Some(variant.id),
        matched_rule_id: None,
        mode_used: mode,
        path,
    }
}
