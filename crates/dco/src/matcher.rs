//! Rule matching: first rule (ascending priority, then creation order) whose
//! condition holds and whose target variant exists wins.

use std::collections::HashSet;

use dco_core::rules::{ConditionOutcome, Rule, RuleSet};
use dco_core::signals::SignalContext;
use dco_core::types::Variant;
use uuid::Uuid;

use crate::types::{DecisionTrace, RuleMatch, RuleOutcome, RuleTrace};

/// Evaluate `rules` in order and return the first match. Stops early.
///
/// One pass over the variants to index their ids, then one pass over the
/// rules.
pub fn match_rules(
    rules: &RuleSet,
    variants: &[Variant],
    signals: &SignalContext,
) -> Option<RuleMatch> {
    if rules.is_empty() {
        return None;
    }
    let targets = variant_ids(variants);
    rules
        .iter()
        .find(|rule| classify(rule, &targets, signals) == RuleOutcome::Matched)
        .map(|rule| RuleMatch {
            rule_id: rule.id,
            variant_id: rule.variant_id,
        })
}

/// Evaluate every rule and record why each one did or did not win.
///
/// The winner is the same one [`match_rules`] returns; later rules whose
/// condition also holds are reported as shadowed.
pub fn trace_rules(
    rules: &RuleSet,
    variants: &[Variant],
    signals: &SignalContext,
) -> (Option<RuleMatch>, DecisionTrace) {
    let mut winner: Option<RuleMatch> = None;
    let mut trace = DecisionTrace {
        rules: Vec::with_capacity(rules.len()),
    };
    let targets = variant_ids(variants);

    for rule in rules {
        let mut outcome = classify(rule, &targets, signals);
        if outcome == RuleOutcome::Matched {
            if winner.is_some() {
                outcome = RuleOutcome::Shadowed;
            } else {
                winner = Some(RuleMatch {
                    rule_id: rule.id,
                    variant_id: rule.variant_id,
                });
            }
        }
        trace.rules.push(RuleTrace {
            rule_id: rule.id,
            priority: rule.priority,
            signal: rule.signal.clone(),
            operator: rule.operator,
            value: rule.value.clone(),
            observed: signals.get(&rule.signal).cloned(),
            variant_id: rule.variant_id,
            outcome,
        });
    }

    (winner, trace)
}

fn variant_ids(variants: &[Variant]) -> HashSet<Uuid> {
    variants.iter().map(|v| v.id).collect()
}

fn classify(rule: &Rule, targets: &HashSet<Uuid>, signals: &SignalContext) -> RuleOutcome {
    let Some(actual) = signals.get(&rule.signal) else {
        return RuleOutcome::SignalMissing;
    };
    match rule.condition.test(actual) {
        ConditionOutcome::NonNumeric => RuleOutcome::NonNumericSignal,
        ConditionOutcome::NotSatisfied => RuleOutcome::ConditionFailed,
        ConditionOutcome::Satisfied => {
            if targets.contains(&rule.variant_id) {
                RuleOutcome::Matched
            } else {
                RuleOutcome::TargetVariantMissing
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dco_core::rules::RuleDraft;
    use dco_core::signals::{SignalCatalog, SignalValue};
    use proptest::prelude::*;
    use uuid::Uuid;

    struct Fixture {
        campaign_id: Uuid,
        variants: Vec<Variant>,
        catalog: SignalCatalog,
        next_seq: u64,
    }

    impl Fixture {
        fn new(variant_count: usize) -> Self {
            let campaign_id = Uuid::new_v4();
            Self {
                campaign_id,
                variants: (0..variant_count).map(|_| Variant::new(campaign_id)).collect(),
                catalog: SignalCatalog::default(),
                next_seq: 0,
            }
        }

        fn rule(&mut self, signal: &str, op: &str, value: &str, priority: i32, target: usize) -> Rule {
            self.rule_for(signal, op, value, priority, self.variants[target].id)
        }

        fn rule_for(&mut self, signal: &str, op: &str, value: &str, priority: i32, variant_id: Uuid) -> Rule {
            let seq = self.next_seq;
            self.next_seq += 1;
            Rule::compile(
                Uuid::new_v4(),
                self.campaign_id,
                seq,
                RuleDraft {
                    variant_id,
                    signal: signal.to_string(),
                    operator: op.to_string(),
                    value: value.to_string(),
                    priority,
                },
                &self.catalog,
            )
            .unwrap()
        }
    }

    #[test]
    fn test_lowest_priority_wins() {
        let mut fx = Fixture::new(2);
        let late = fx.rule("geo_country", "equals", "US", 10, 0);
        let early = fx.rule("geo_country", "in", "US,CA", 1, 1);
        let rules = RuleSet::new(vec![late, early.clone()]);
        let signals = SignalContext::new().with("geo_country", "US");

        let m = match_rules(&rules, &fx.variants, &signals).unwrap();
        assert_eq!(m.rule_id, early.id);
        assert_eq!(m.variant_id, fx.variants[1].id);
    }

    #[test]
    fn test_ties_broken_by_creation_order() {
        let mut fx = Fixture::new(2);
        let first = fx.rule("daypart", "equals", "morning", 0, 0);
        let second = fx.rule("daypart", "equals", "morning", 0, 1);
        let rules = RuleSet::new(vec![second, first.clone()]);
        let signals = SignalContext::new().with("daypart", "morning");

        assert_eq!(match_rules(&rules, &fx.variants, &signals).unwrap().rule_id, first.id);
    }

    #[test]
    fn test_missing_signal_and_non_numeric_do_not_match() {
        let mut fx = Fixture::new(1);
        let rules = RuleSet::new(vec![
            fx.rule("weather_condition", "equals", "rainy", 0, 0),
            fx.rule("weather_temp", "gt", "25", 1, 0),
        ]);
        let signals = SignalContext::new().with("weather_temp", "unknown");

        assert!(match_rules(&rules, &fx.variants, &signals).is_none());

        let (winner, trace) = trace_rules(&rules, &fx.variants, &signals);
        assert!(winner.is_none());
        let outcomes: Vec<RuleOutcome> = trace.rules.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![RuleOutcome::SignalMissing, RuleOutcome::NonNumericSignal]);
        assert_eq!(trace.rules[1].observed, Some(SignalValue::from("unknown")));
    }

    #[test]
    fn test_rule_with_removed_target_is_skipped() {
        let mut fx = Fixture::new(1);
        let dangling = fx.rule_for("geo_country", "equals", "US", 0, Uuid::new_v4());
        let fallback = fx.rule("geo_country", "equals", "US", 5, 0);
        let rules = RuleSet::new(vec![dangling, fallback.clone()]);
        let signals = SignalContext::new().with("geo_country", "US");

        let (winner, trace) = trace_rules(&rules, &fx.variants, &signals);
        assert_eq!(winner.unwrap().rule_id, fallback.id);
        assert_eq!(trace.rules[0].outcome, RuleOutcome::TargetVariantMissing);
        assert_eq!(trace.rules[1].outcome, RuleOutcome::Matched);
    }

    #[test]
    fn test_many_dangling_rules_before_a_live_target() {
        let mut fx = Fixture::new(400);
        let mut rules: Vec<Rule> = (0..400)
            .map(|_| fx.rule_for("daypart", "equals", "evening", 0, Uuid::new_v4()))
            .collect();
        let live = fx.rule("daypart", "equals", "evening", 1, 399);
        rules.push(live.clone());
        let rules = RuleSet::new(rules);
        let signals = SignalContext::new().with("daypart", "evening");

        let m = match_rules(&rules, &fx.variants, &signals).unwrap();
        assert_eq!(m.rule_id, live.id);
        assert_eq!(m.variant_id, fx.variants[399].id);

        let (_, trace) = trace_rules(&rules, &fx.variants, &signals);
        let missing = trace
            .rules
            .iter()
            .filter(|r| r.outcome == RuleOutcome::TargetVariantMissing)
            .count();
        assert_eq!(missing, 400);
    }

    #[test]
    fn test_trace_reports_shadowed_rules() {
        let mut fx = Fixture::new(2);
        let rules = RuleSet::new(vec![
            fx.rule("weather_temp", "gte", "30", 0, 0),
            fx.rule("weather_temp", "gt", "10", 1, 1),
            fx.rule("weather_temp", "lt", "0", 2, 1),
        ]);
        let signals = SignalContext::new().with("weather_temp", 31.0);

        let (winner, trace) = trace_rules(&rules, &fx.variants, &signals);
        assert_eq!(winner, match_rules(&rules, &fx.variants, &signals));
        let outcomes: Vec<RuleOutcome> = trace.rules.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![RuleOutcome::Matched, RuleOutcome::Shadowed, RuleOutcome::ConditionFailed]
        );
        assert_eq!(trace.winner().map(|r| r.rule_id), winner.map(|w| w.rule_id));
    }

    #[test]
    fn test_empty_rule_set_is_no_match() {
        let fx = Fixture::new(1);
        assert!(match_rules(&RuleSet::default(), &fx.variants, &SignalContext::new()).is_none());
    }

    proptest! {
        #[test]
        fn prop_evaluation_order_is_priority_then_creation(priorities in prop::collection::vec(-5i32..5, 1..24)) {
            let mut fx = Fixture::new(1);
            let rules: Vec<Rule> = priorities
                .iter()
                .map(|p| fx.rule("geo_country", "equals", "US", *p, 0))
                .collect();
            let mut shuffled = rules.clone();
            shuffled.reverse();
            let set = RuleSet::new(shuffled);

            let signals = SignalContext::new().with("geo_country", "US");
            let (_, trace) = trace_rules(&set, &fx.variants, &signals);
            let keys: Vec<(i32, u64)> = set.iter().map(|r| (r.priority, r.sequence)).collect();
            for pair in keys.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }

            let min = *priorities.iter().min().unwrap();
            let expected = rules.iter().find(|r| r.priority == min).unwrap().id;
            prop_assert_eq!(trace.rules[0].rule_id, expected);
            prop_assert_eq!(match_rules(&set, &fx.variants, &signals).unwrap().rule_id, expected);
        }
    }
}
