//! Runs a rule set and aggregates the failures.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::board::Card;
use crate::pipeline::rules::{self, RuleFn};
use crate::pipeline::types::{RuleContext, RuleName, RuleResult, Verdict};

/// Message reported for a rule that crashed instead of returning a result.
pub const RULE_DEFECT_MESSAGE: &str =
    "This card could not be checked against one of the standards. An operator has been alerted.";

/// Run every rule (no short-circuit) and collect the failures in order.
pub fn execute(card: &Card, rules: &[RuleName], ctx: &RuleContext) -> Verdict {
    execute_with(card, rules, ctx, rules::evaluator)
}

/// Like [`execute`], with the rule lookup supplied by the caller.
pub(crate) fn execute_with<L>(card: &Card, rules: &[RuleName], ctx: &RuleContext, lookup: L) -> Verdict
where
    L: Fn(RuleName) -> RuleFn,
{
    let failures: Vec<RuleResult> = rules
        .iter()
        .map(|&rule| run_guarded(rule, lookup(rule), card, ctx))
        .filter(|result| !result.passed)
        .collect();

    debug!(
        card_id = %card.id,
        checked = rules.len(),
        failed = failures.len(),
        "Rules executed"
    );
    Verdict { failures }
}

/// Run one rule, converting a panic into a failing result.
fn run_guarded(rule: RuleName, eval: RuleFn, card: &Card, ctx: &RuleContext) -> RuleResult {
    match panic::catch_unwind(AssertUnwindSafe(|| eval(card, ctx))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                card_id = %card.id,
                rule = %rule,
                reason = %reason,
                "Rule evaluation defect"
            );
            RuleResult::fail(rule, RULE_DEFECT_MESSAGE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::selector::CREATE_RULES;

    #[test]
    fn collects_all_failures_in_selection_order() {
        let card = Card::new("c1", "fix bug").with_labels(["Bug"]).with_list("Task");
        let verdict = execute(&card, &CREATE_RULES, &RuleContext::default());

        assert!(!verdict.is_valid());
        assert_eq!(
            verdict.failed_rules(),
            vec![
                RuleName::TitleWordCount,
                RuleName::TitleTitleize,
                RuleName::DescriptionAvailability,
                RuleName::Labels,
            ]
        );
        assert!(verdict.failures.iter().all(|f| f.message.is_some()));
    }

    #[test]
    fn valid_card_yields_empty_verdict() {
        let card = Card::new("c1", "Add Login Page Validation")
            .with_description("details")
            .with_labels(["P2", "Feature"])
            .with_list("Task");
        let verdict = execute(&card, &CREATE_RULES, &RuleContext::default());
        assert!(verdict.is_valid());
    }

    #[test]
    fn empty_rule_set_is_valid() {
        let verdict = execute(&Card::new("c", "x"), &[], &RuleContext::default());
        assert!(verdict.is_valid());
    }

    fn exploding_rule(_card: &Card, _ctx: &RuleContext) -> RuleResult {
        panic!("rule blew up")
    }

    #[test]
    fn panicking_rule_becomes_failure_without_aborting_others() {
        let card = Card::new("c1", "fix bug");
        let selected = [RuleName::Labels, RuleName::TitleWordCount];
        let verdict = execute_with(&card, &selected, &RuleContext::default(), |rule| match rule {
            RuleName::Labels => exploding_rule as RuleFn,
            other => rules::evaluator(other),
        });

        assert_eq!(
            verdict.failed_rules(),
            vec![RuleName::Labels, RuleName::TitleWordCount]
        );
        assert_eq!(verdict.failures[0].message.as_deref(), Some(RULE_DEFECT_MESSAGE));
    }
}
