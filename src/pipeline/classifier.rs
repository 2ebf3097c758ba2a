//! Card category classification from labels.

use crate::board::Card;
use crate::pipeline::types::Category;

/// Label substring marking a card as non-development work.
const NON_DEV_MARKER: &str = "non-dev";

/// Derive a card's category. Any label containing the non-development
/// marker (case-insensitive) makes the card `Other`; otherwise it is
/// `Development`.
pub fn classify(card: &Card) -> Category {
    let non_dev = card
        .labels
        .iter()
        .any(|label| label.name.to_lowercase().contains(NON_DEV_MARKER));

    if non_dev {
        Category::Other
    } else {
        Category::Development
    }
}
