//! Shared types for the card validation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Inbound event ───────────────────────────────────────────────────

/// How a card changed, as reported by the card service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A card was created.
    Create,
    /// A card was updated; the transition says how.
    Update { transition: Transition },
    /// A card was archived or deleted.
    Archive,
    /// Any action type this service does not act on.
    Unhandled { action_type: String },
}

/// The kind of update applied to a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    /// The card moved from one list to another.
    MovedBetweenLists { from: String, to: String },
    /// Any other update (rename, description edit, label change, ...).
    Other { translation_key: String },
}

/// A classified inbound event for one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Action id from the card service (used for log correlation).
    pub id: String,
    pub card_id: String,
    pub kind: EventKind,
    /// Username of the member who triggered the action.
    pub actor: Option<String>,
    /// List the card was created in, as reported by the action itself.
    #[serde(default)]
    pub origin_list: Option<String>,
}

impl Event {
    pub fn new(id: impl Into<String>, card_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            card_id: card_id.into(),
            kind,
            actor: None,
            origin_list: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_origin_list(mut self, list: impl Into<String>) -> Self {
        self.origin_list = Some(list.into());
        self
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match &self.kind {
            EventKind::Create => "create",
            EventKind::Update {
                transition: Transition::MovedBetweenLists { .. },
            } => "move",
            EventKind::Update { .. } => "update",
            EventKind::Archive => "archive",
            EventKind::Unhandled { .. } => "unhandled",
        }
    }

    /// Destination list of a list-to-list move.
    pub fn destination_list(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Update {
                transition: Transition::MovedBetweenLists { to, .. },
            } => Some(to),
            _ => None,
        }
    }
}

// ── Webhook payload ─────────────────────────────────────────────────

const KEY_MOVE_BETWEEN_LISTS: &str = "action_move_card_from_list_to_list";
const KEY_ARCHIVED: &str = "action_archived_card";

/// Webhook body posted by the card service.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub action: ActionPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub data: ActionData,
    #[serde(default)]
    pub display: Option<ActionDisplay>,
    #[serde(default)]
    pub member_creator: Option<ActionMember>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    #[serde(default)]
    pub card: Option<ActionEntity>,
    #[serde(default)]
    pub list: Option<ActionEntity>,
    #[serde(default)]
    pub list_before: Option<ActionEntity>,
    #[serde(default)]
    pub list_after: Option<ActionEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionEntity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDisplay {
    #[serde(default)]
    pub translation_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionMember {
    #[serde(default)]
    pub username: String,
}

impl ActionPayload {
    /// Classify the raw action. Returns `None` when the action carries no card.
    pub fn into_event(self) -> Option<Event> {
        let card = self.data.card?;
        let translation_key = self
            .display
            .map(|d| d.translation_key)
            .unwrap_or_default();

        let origin_list = self
            .data
            .list
            .map(|l| l.name)
            .filter(|name| !name.trim().is_empty());

        let kind = match self.action_type.as_str() {
            "createCard" => EventKind::Create,
            "deleteCard" => EventKind::Archive,
            "updateCard" if translation_key == KEY_ARCHIVED => EventKind::Archive,
            "updateCard" if translation_key == KEY_MOVE_BETWEEN_LISTS => EventKind::Update {
                transition: Transition::MovedBetweenLists {
                    from: self.data.list_before.map(|l| l.name).unwrap_or_default(),
                    to: self.data.list_after.map(|l| l.name).unwrap_or_default(),
                },
            },
            "updateCard" => EventKind::Update {
                transition: Transition::Other { translation_key },
            },
            other => EventKind::Unhandled {
                action_type: other.to_string(),
            },
        };

        Some(Event {
            id: self.id,
            card_id: card.id,
            kind,
            actor: self
                .member_creator
                .map(|m| m.username)
                .filter(|u| !u.is_empty()),
            origin_list,
        })
    }
}

// ── Category ────────────────────────────────────────────────────────

/// Card category, derived from labels. Decides which rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Development,
    Other,
}

// ── Rules ───────────────────────────────────────────────────────────

/// Closed set of rule identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleName {
    TitleWordCount,
    TitleTitleize,
    DescriptionAvailability,
    Labels,
    DueDate,
    Members,
    ListOfNewCard,
    InProgressListMembersRequired,
    CheckListItemStateCompletion,
    CheckPullRequestAttachment,
}

impl RuleName {
    pub const ALL: [RuleName; 10] = [
        Self::TitleWordCount,
        Self::TitleTitleize,
        Self::DescriptionAvailability,
        Self::Labels,
        Self::DueDate,
        Self::Members,
        Self::ListOfNewCard,
        Self::InProgressListMembersRequired,
        Self::CheckListItemStateCompletion,
        Self::CheckPullRequestAttachment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TitleWordCount => "titleWordCount",
            Self::TitleTitleize => "titleTitleize",
            Self::DescriptionAvailability => "descriptionAvailability",
            Self::Labels => "labels",
            Self::DueDate => "dueDate",
            Self::Members => "members",
            Self::ListOfNewCard => "listOfNewCard",
            Self::InProgressListMembersRequired => "inProgressListMembersRequired",
            Self::CheckListItemStateCompletion => "checkListItemStateCompletion",
            Self::CheckPullRequestAttachment => "checkPullRequestAttachment",
        }
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event-specific data some rules need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleContext {
    /// Destination list of the triggering move, if any.
    pub list_after: Option<String>,
    /// List named by the triggering action. Preferred over the fetched
    /// snapshot, which may already reflect a later move.
    pub list_of_origin: Option<String>,
}

impl RuleContext {
    pub fn for_event(event: &Event) -> Self {
        Self {
            list_after: event.destination_list().map(str::to_string),
            list_of_origin: event.origin_list.clone(),
        }
    }
}

/// Outcome of one rule against one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule: RuleName,
    pub passed: bool,
    /// Rendered message, present when the rule failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RuleResult {
    pub fn pass(rule: RuleName) -> Self {
        Self {
            rule,
            passed: true,
            message: None,
        }
    }

    pub fn fail(rule: RuleName, message: impl Into<String>) -> Self {
        Self {
            rule,
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Aggregated outcome of a rule set. Valid iff there are no failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub failures: Vec<RuleResult>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the failing rules, in selection order.
    pub fn failed_rules(&self) -> Vec<RuleName> {
        self.failures.iter().map(|r| r.rule).collect()
    }
}

// ── Origin ──────────────────────────────────────────────────────────

/// What triggered a tracker decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A live webhook event, with the member who caused it.
    Event { actor: Option<String> },
    /// A periodic sweep pass.
    Sweep,
}

impl Origin {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Event { .. } => "event",
            Self::Sweep => "sweep",
        }
    }
}
