//! In-process doubles shared by the pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::board::{Card, CardFetcher, FetchOptions};
use crate::error::{FetchError, NotifyError};
use crate::notify::Notifier;

/// Serves cards from a map. Unknown ids are `NotFound`; ids in `transient` fail transiently.
#[derive(Default)]
pub struct StubFetcher {
    cards: Mutex<HashMap<String, Card>>,
    transient: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn with_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let stub = Self::default();
        for card in cards {
            stub.put(card);
        }
        stub
    }

    pub fn put(&self, card: Card) {
        self.cards.lock().unwrap().insert(card.id.clone(), card);
    }

    pub fn fail_transiently(&self, card_id: &str) {
        self.transient.lock().unwrap().push(card_id.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardFetcher for StubFetcher {
    async fn fetch_card(&self, card_id: &str, _options: FetchOptions) -> Result<Card, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient.lock().unwrap().iter().any(|id| id == card_id) {
            return Err(FetchError::Transient("connection reset".into()));
        }
        self.cards
            .lock()
            .unwrap()
            .get(card_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                card_id: card_id.to_string(),
            })
    }
}

/// Captures every published message.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, message: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Rejects every message.
#[derive(Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn publish(&self, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::SendFailed {
            sink: "failing".into(),
            reason: "sink offline".into(),
        })
    }
}

/// A card that passes every creation and sweep rule.
pub fn valid_card(id: &str) -> Card {
    Card::new(id, "Add Login Page Validation")
        .with_description("Validate the form before submit.")
        .with_labels(["Feature", "P2"])
        .with_list("Task")
}

/// Title "fix bug", no description, one label.
pub fn sloppy_card(id: &str) -> Card {
    Card::new(id, "fix bug").with_labels(["Bug"]).with_list("Task")
}
