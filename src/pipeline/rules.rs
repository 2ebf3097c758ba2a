//! Card rule library.
//!
//! Each rule is a pure function of the card snapshot and the event
//! context. A failing rule renders its own message so the tracker can
//! hand the full list to the notifier unchanged.

use std::sync::LazyLock;

use regex::Regex;

use crate::board::Card;
use crate::pipeline::types::{RuleContext, RuleName, RuleResult};

/// Minimum number of words in a card title.
pub const MIN_TITLE_WORDS: usize = 3;

/// Minimum number of labels (one for priority, one for classification).
pub const MIN_LABELS: usize = 2;

/// List new cards must be created in.
pub const INTAKE_LIST: &str = "Task";

/// Words allowed in lowercase anywhere but the start of a title.
const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "from", "in", "into", "nor", "of", "on",
    "or", "the", "to", "vs", "via", "with",
];

static PULL_REQUEST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^https?://(www\.)?(github\.com/[^/\s]+/[^/\s]+/pull/\d+|gitlab\.com/\S+/-/merge_requests/\d+|bitbucket\.org/[^/\s]+/[^/\s]+/pull-requests/\d+)",
    )
    .unwrap()
});

/// Signature shared by every rule.
pub type RuleFn = fn(&Card, &RuleContext) -> RuleResult;

/// Look up the implementation of a rule.
pub fn evaluator(rule: RuleName) -> RuleFn {
    match rule {
        RuleName::TitleWordCount => title_word_count,
        RuleName::TitleTitleize => title_titleize,
        RuleName::DescriptionAvailability => description_availability,
        RuleName::Labels => labels,
        RuleName::DueDate => due_date,
        RuleName::Members => members,
        RuleName::ListOfNewCard => list_of_new_card,
        RuleName::InProgressListMembersRequired => in_progress_members_required,
        RuleName::CheckListItemStateCompletion => checklist_completion,
        RuleName::CheckPullRequestAttachment => pull_request_attachment,
    }
}

fn verdict(rule: RuleName, passed: bool, message: impl FnOnce() -> String) -> RuleResult {
    if passed {
        RuleResult::pass(rule)
    } else {
        RuleResult::fail(rule, message())
    }
}

fn title_word_count(card: &Card, _ctx: &RuleContext) -> RuleResult {
    let words = card.name.split_whitespace().count();
    verdict(RuleName::TitleWordCount, words >= MIN_TITLE_WORDS, || {
        format!("Describe the card title more fully: use at least {MIN_TITLE_WORDS} words.")
    })
}

fn title_titleize(card: &Card, _ctx: &RuleContext) -> RuleResult {
    verdict(RuleName::TitleTitleize, is_title_case(&card.name), || {
        "Card title is not in title case. Capitalize each major word.".to_string()
    })
}

/// Title case: every word starting with a letter starts uppercase, except
/// minor words after the first position. Words starting with digits or
/// symbols are left alone.
pub fn is_title_case(title: &str) -> bool {
    title.split_whitespace().enumerate().all(|(i, word)| {
        let Some(first) = word.chars().next() else {
            return true;
        };
        if !first.is_alphabetic() || first.is_uppercase() {
            return true;
        }
        i > 0 && MINOR_WORDS.contains(&word.to_lowercase().as_str())
    })
}

fn description_availability(card: &Card, _ctx: &RuleContext) -> RuleResult {
    verdict(
        RuleName::DescriptionAvailability,
        !card.description.trim().is_empty(),
        || "Card has no description. Add one.".to_string(),
    )
}

fn labels(card: &Card, _ctx: &RuleContext) -> RuleResult {
    verdict(RuleName::Labels, card.labels.len() >= MIN_LABELS, || {
        format!(
            "Card should have at least {MIN_LABELS} labels: one for priority and one for classification."
        )
    })
}

fn due_date(card: &Card, _ctx: &RuleContext) -> RuleResult {
    verdict(RuleName::DueDate, card.due.is_some(), || {
        "Card has no due date. Take ownership of the task and set one.".to_string()
    })
}

fn members(card: &Card, _ctx: &RuleContext) -> RuleResult {
    verdict(RuleName::Members, !card.id_members.is_empty(), || {
        "Assign the card to someone.".to_string()
    })
}

fn in_progress_members_required(card: &Card, ctx: &RuleContext) -> RuleResult {
    verdict(
        RuleName::InProgressListMembersRequired,
        !card.id_members.is_empty(),
        || {
            format!(
                "Card must be assigned to someone when it moves to *{}*.",
                target_list(ctx, "In Progress")
            )
        },
    )
}

fn list_of_new_card(card: &Card, ctx: &RuleContext) -> RuleResult {
    // The snapshot is fetched after the fact; the card may have moved since.
    // Without any list info the card cannot be judged.
    let list = ctx.list_of_origin.as_deref().or_else(|| card.list_name());
    let passed = list.is_none_or(|name| name.trim().eq_ignore_ascii_case(INTAKE_LIST));
    verdict(RuleName::ListOfNewCard, passed, || {
        format!("Cards should be created only in the '{INTAKE_LIST}' list.")
    })
}

fn checklist_completion(card: &Card, ctx: &RuleContext) -> RuleResult {
    let incomplete = card.incomplete_check_items();
    verdict(RuleName::CheckListItemStateCompletion, incomplete == 0, || {
        format!(
            "All checklist items should be complete when the card moves to *{}*. {incomplete} item(s) are not completed yet.",
            target_list(ctx, "In Review")
        )
    })
}

fn pull_request_attachment(card: &Card, ctx: &RuleContext) -> RuleResult {
    let has_pr = card
        .attachments
        .iter()
        .any(|a| PULL_REQUEST_URL.is_match(a.url.trim()));
    verdict(RuleName::CheckPullRequestAttachment, has_pr, || {
        format!(
            "Card should have a pull request attached when it moves to *{}*.",
            target_list(ctx, "In Review")
        )
    })
}

fn target_list<'a>(ctx: &'a RuleContext, fallback: &'a str) -> &'a str {
    ctx.list_after
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::model::Checklist;

    fn run(rule: RuleName, card: &Card) -> RuleResult {
        evaluator(rule)(card, &RuleContext::default())
    }

    fn good_card() -> Card {
        Card::new("c1", "Add Login Page Validation")
            .with_description("Validate email and password fields")
            .with_labels(["P1", "Feature"])
            .with_list("Task")
            .with_members(["m1"])
            .with_due(chrono::Utc::now())
    }

    #[test]
    fn every_rule_passes_a_well_formed_card() {
        let card = good_card()
            .with_checklist(Checklist::from_items("Done", [("tests", true)]))
            .with_attachment("https://github.com/acme/app/pull/42");
        for rule in RuleName::ALL {
            let result = run(rule, &card);
            assert!(result.passed, "{rule} should pass: {:?}", result.message);
            assert!(result.message.is_none());
            assert_eq!(result.rule, rule);
        }
    }

    #[test]
    fn short_title_fails_word_count() {
        let result = run(RuleName::TitleWordCount, &Card::new("c", "Fix Bug"));
        assert!(!result.passed);
        assert!(result.message.unwrap().contains('3'));
    }

    #[test]
    fn title_case_convention() {
        assert!(is_title_case("Add Login Page Validation"));
        assert!(is_title_case("Fix Crash on Startup"));
        assert!(is_title_case("Upgrade to 2.0 API"));
        assert!(is_title_case("Bump 3rd-Party Deps"));
        assert!(!is_title_case("fix bug"));
        assert!(!is_title_case("Fix login bug"));
        assert!(!is_title_case("the Login Page"));
    }

    #[test]
    fn blank_description_fails() {
        let card = good_card().with_description("   \n ");
        assert!(!run(RuleName::DescriptionAvailability, &card).passed);
    }

    #[test]
    fn single_label_fails() {
        let card = good_card().with_labels(["Bug"]);
        assert!(!run(RuleName::Labels, &card).passed);
    }

    #[test]
    fn missing_due_date_fails() {
        let mut card = good_card();
        card.due = None;
        assert!(!run(RuleName::DueDate, &card).passed);
    }

    #[test]
    fn unassigned_card_fails_member_rules() {
        let card = good_card().with_members(Vec::<String>::new());
        assert!(!run(RuleName::Members, &card).passed);
        assert!(!run(RuleName::InProgressListMembersRequired, &card).passed);
    }

    #[test]
    fn new_card_outside_intake_list_fails() {
        let card = good_card().with_list("Backlog");
        let result = run(RuleName::ListOfNewCard, &card);
        assert!(!result.passed);
        assert!(result.message.unwrap().contains("'Task'"));
        assert!(run(RuleName::ListOfNewCard, &good_card().with_list("task")).passed);
    }

    #[test]
    fn new_card_is_judged_by_list_it_was_created_in() {
        let rule = evaluator(RuleName::ListOfNewCard);
        let created_in = |list: &str| RuleContext {
            list_of_origin: Some(list.into()),
            ..Default::default()
        };

        let moved_on = good_card().with_list("In Progress");
        assert!(rule(&moved_on, &created_in("Task")).passed);

        let moved_to_intake = good_card().with_list("Task");
        assert!(!rule(&moved_to_intake, &created_in("Backlog")).passed);
    }

    #[test]
    fn checklist_message_embeds_incomplete_count() {
        let card = good_card().with_checklist(Checklist::from_items(
            "QA",
            [("a", false), ("b", true), ("c", false)],
        ));
        let ctx = RuleContext {
            list_after: Some("In Review".into()),
            ..Default::default()
        };
        let result = evaluator(RuleName::CheckListItemStateCompletion)(&card, &ctx);
        assert!(!result.passed);
        let message = result.message.unwrap();
        assert!(message.contains("2 item(s)"));
        assert!(message.contains("*In Review*"));
    }

    #[test]
    fn pull_request_must_match_known_hosts() {
        let ctx = RuleContext::default();
        let rule = evaluator(RuleName::CheckPullRequestAttachment);

        let design_doc = good_card().with_attachment("https://docs.example.com/design");
        assert!(!rule(&design_doc, &ctx).passed);

        let repo_link = good_card().with_attachment("https://github.com/acme/app");
        assert!(!rule(&repo_link, &ctx).passed);

        let gitlab = good_card().with_attachment("https://gitlab.com/acme/app/-/merge_requests/9");
        assert!(rule(&gitlab, &ctx).passed);
    }

    #[test]
    fn transition_messages_fall_back_to_default_list_name() {
        let card = good_card();
        let result = run(RuleName::CheckPullRequestAttachment, &card);
        assert!(result.message.unwrap().contains("*In Review*"));
    }
}
