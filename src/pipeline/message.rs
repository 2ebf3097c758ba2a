//! Notification message formatting.

use crate::board::Card;
use crate::pipeline::types::RuleResult;

/// Which kind of notice to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice<'a> {
    /// A live event found violations; mentions the member who triggered it.
    FirstOffense { actor: Option<&'a str> },
    /// A sweep found the card still invalid.
    Escalation { warning_count: u32 },
}

/// Render a notification: header, card line, then one line per failure.
pub fn compose(notice: Notice<'_>, card: &Card, failures: &[RuleResult]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(failures.len() + 3);

    match notice {
        Notice::FirstOffense { actor } => {
            if let Some(actor) = actor.filter(|a| !a.is_empty()) {
                lines.push(format!("@{actor}"));
            }
            lines.push(":white_frowning_face: Looks like this card doesn't follow the board standards.".to_string());
        }
        Notice::Escalation { warning_count } => {
            lines.push(":sweat: Again! This card still has unresolved standard issues. Fix it or I will keep reminding you.".to_string());
            lines.push(format!("Warning number {warning_count}"));
        }
    }

    lines.push(card_line(card));
    lines.extend(
        failures
            .iter()
            .filter_map(|f| f.message.as_deref())
            .map(|m| format!("- {m}")),
    );

    lines.join("\n")
}

fn card_line(card: &Card) -> String {
    match card.short_url.as_deref() {
        Some(url) if !url.is_empty() => format!("Card: *{}* ({url})", card.name),
        _ => format!("Card: *{}*", card.name),
    }
}
