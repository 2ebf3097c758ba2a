//! Rule selection — which rules apply to which event.

use tracing::debug;

use crate::pipeline::types::{Category, EventKind, RuleName, Transition};

/// Rules checked on card creation.
pub const CREATE_RULES: [RuleName; 5] = [
    RuleName::TitleWordCount,
    RuleName::TitleTitleize,
    RuleName::DescriptionAvailability,
    RuleName::Labels,
    RuleName::ListOfNewCard,
];

/// Rules re-checked by the periodic sweep. No list-transition rules
/// (nothing moved), and no intake-list rule (the card may have legitimately
/// moved on since creation).
pub const SWEEP_RULES: [RuleName; 4] = [
    RuleName::TitleWordCount,
    RuleName::TitleTitleize,
    RuleName::DescriptionAvailability,
    RuleName::Labels,
];

const LIST_IN_PROGRESS: &str = "in progress";
const LIST_IN_REVIEW: &str = "in review";

/// What the pipeline should do for an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSelection {
    /// Evaluate these rules, in order. Never empty.
    Apply(Vec<RuleName>),
    /// Remove any tracked violation without evaluating anything.
    DropRecord,
    /// No validation applies to this event.
    Nothing,
}

impl RuleSelection {
    fn from_rules(rules: Vec<RuleName>) -> Self {
        if rules.is_empty() {
            Self::Nothing
        } else {
            Self::Apply(rules)
        }
    }
}

/// Select the rules for an event.
///
/// `checklist_count` is the number of checklists on the card.
pub fn select_rules(kind: &EventKind, category: Category, checklist_count: usize) -> RuleSelection {
    let selection = match kind {
        EventKind::Create => RuleSelection::Apply(CREATE_RULES.to_vec()),
        EventKind::Update {
            transition: Transition::MovedBetweenLists { to, .. },
        } => RuleSelection::from_rules(list_move_rules(to, category, checklist_count)),
        EventKind::Update {
            transition: Transition::Other { .. },
        } => RuleSelection::Nothing,
        EventKind::Archive => RuleSelection::DropRecord,
        EventKind::Unhandled { .. } => RuleSelection::Nothing,
    };
    debug!(?kind, ?category, ?selection, "Selected rules");
    selection
}

/// Rules for a periodic re-check.
pub fn sweep_rules() -> Vec<RuleName> {
    SWEEP_RULES.to_vec()
}

fn list_move_rules(to: &str, category: Category, checklist_count: usize) -> Vec<RuleName> {
    let to = to.trim().to_lowercase();
    let mut rules = Vec::new();

    if to == LIST_IN_PROGRESS {
        rules.extend([RuleName::InProgressListMembersRequired, RuleName::DueDate]);
    }
    if to == LIST_IN_REVIEW && checklist_count > 0 {
        rules.push(RuleName::CheckListItemStateCompletion);
    }
    // Only development work produces pull requests.
    if to == LIST_IN_REVIEW && category == Category::Development {
        rules.push(RuleName::CheckPullRequestAttachment);
    }
    rules
}
