//! Card snapshot model — the subset of a board card the rules look at.
//!
//! Field names follow the card service's JSON so a fetched card
//! deserializes directly. Snapshots are read-only to the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A label attached to a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub id: String,
    /// Labels may be color-only, in which case the name is empty.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Completion state of a checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckItemState {
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: CheckItemState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub check_items: Vec<CheckItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// A board list (column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRef {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

/// Immutable card snapshot fetched for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    /// Card title.
    #[serde(default)]
    pub name: String,
    #[serde(rename = "desc", default)]
    pub description: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub id_members: Vec<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub checklists: Vec<Checklist>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// The list the card currently sits in (requires `list=true` on fetch).
    #[serde(default)]
    pub list: Option<ListRef>,
    #[serde(default)]
    pub short_url: Option<String>,
}

impl Card {
    /// Create a bare card with only an id and title.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            due: None,
            id_members: Vec::new(),
            labels: Vec::new(),
            checklists: Vec::new(),
            attachments: Vec::new(),
            list: None,
            short_url: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_labels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Label {
                id: format!("label-{i}"),
                name: name.into(),
                color: None,
            })
            .collect();
        self
    }

    pub fn with_list(mut self, name: impl Into<String>) -> Self {
        self.list = Some(ListRef {
            id: String::new(),
            name: name.into(),
        });
        self
    }

    pub fn with_members<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_members = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_checklist(mut self, checklist: Checklist) -> Self {
        self.checklists.push(checklist);
        self
    }

    pub fn with_attachment(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.attachments.push(Attachment {
            id: format!("att-{}", self.attachments.len()),
            name: url.clone(),
            url,
        });
        self
    }

    /// Number of checklist items not yet completed, across all checklists.
    pub fn incomplete_check_items(&self) -> usize {
        self.checklists
            .iter()
            .flat_map(|c| c.check_items.iter())
            .filter(|item| item.state == CheckItemState::Incomplete)
            .count()
    }

    /// Name of the list the card is in, if known.
    pub fn list_name(&self) -> Option<&str> {
        self.list.as_ref().map(|l| l.name.as_str())
    }
}

impl Checklist {
    /// Build a checklist from `(item name, completed)` pairs.
    pub fn from_items<'a, I>(name: &str, items: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        Self {
            id: String::new(),
            name: name.to_string(),
            check_items: items
                .into_iter()
                .map(|(item, done)| CheckItem {
                    id: String::new(),
                    name: item.to_string(),
                    state: if done {
                        CheckItemState::Complete
                    } else {
                        CheckItemState::Incomplete
                    },
                })
                .collect(),
        }
    }
}
