//! Integration tests for the webhook receiver and admin endpoints.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory store, a stub card service and a recording notifier, and
//! exercises the real HTTP contract.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use board_warden::board::client::{RegisteredWebhook, WebhookSubscription};
use board_warden::board::{Card, CardFetcher, FetchOptions, WebhookRegistrar};
use board_warden::config::RenotifyPolicy;
use board_warden::error::{FetchError, NotifyError, WebhookError};
use board_warden::notify::Notifier;
use board_warden::pipeline::{EventProcessor, SweepProcessor, ViolationTracker};
use board_warden::store::{LibSqlBackend, ViolationStore};
use board_warden::webhook::{AppState, routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Card service stub serving snapshots from a mutable map.
#[derive(Default)]
struct StubBoard {
    cards: Mutex<HashMap<String, Card>>,
}

impl StubBoard {
    fn put(&self, card: Card) {
        self.cards.lock().unwrap().insert(card.id.clone(), card);
    }
}

#[async_trait]
impl CardFetcher for StubBoard {
    async fn fetch_card(&self, card_id: &str, _options: FetchOptions) -> Result<Card, FetchError> {
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

#[async_trait]
impl WebhookRegistrar for StubBoard {
    async fn register_webhook(
        &self,
        _subscription: &WebhookSubscription,
    ) -> Result<RegisteredWebhook, WebhookError> {
        Err(WebhookError::Registration("status 401: invalid token".into()))
    }
}

#[derive(Default)]
struct Inbox {
    messages: Mutex<Vec<String>>,
}

impl Inbox {
    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for Inbox {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn publish(&self, message: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

struct Server {
    base: String,
    board: Arc<StubBoard>,
    store: Arc<LibSqlBackend>,
    inbox: Arc<Inbox>,
}

async fn start_server() -> Server {
    let board = Arc::new(StubBoard::default());
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let inbox = Arc::new(Inbox::default());
    let tracker = Arc::new(ViolationTracker::new(
        store.clone(),
        inbox.clone(),
        RenotifyPolicy::Always,
    ));

    let app = routes(AppState {
        processor: Arc::new(EventProcessor::new(board.clone(), tracker.clone())),
        sweep: Arc::new(SweepProcessor::new(board.clone(), tracker, 2)),
        store: store.clone(),
        registrar: board.clone(),
        public_url: None,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Server {
        base: format!("http://127.0.0.1:{port}"),
        board,
        store,
        inbox,
    }
}

fn sloppy_card(id: &str) -> Card {
    Card::new(id, "fix bug").with_labels(["Bug"]).with_list("Task")
}

fn action(kind: &str, card_id: &str, translation_key: Option<&str>) -> Value {
    let mut action = json!({
        "id": format!("action-{card_id}"),
        "type": kind,
        "data": {"card": {"id": card_id, "name": "fix bug"}},
        "memberCreator": {"username": "alice"}
    });
    if let Some(key) = translation_key {
        action["display"] = json!({"translationKey": key});
    }
    json!({ "action": action })
}

/// Poll until the store matches `expect_present` for `card_id`.
async fn wait_for_record(store: &LibSqlBackend, card_id: &str, expect_present: bool) {
    loop {
        let present = store.find_by_card_id(card_id).await.unwrap().is_some();
        if present == expect_present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the inbox holds at least `count` messages.
async fn wait_for_messages(inbox: &Inbox, count: usize) {
    while inbox.messages().len() < count {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn health_and_probe_respond() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let health: Value = client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let probe = client.head(format!("{}/", server.base)).send().await.unwrap();
        assert_eq!(probe.status(), 200);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn created_card_is_flagged_swept_and_archived() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();
        server.board.put(sloppy_card("c1"));

        // Create: first offense.
        let resp = client
            .post(format!("{}/", server.base))
            .json(&action("createCard", "c1", None))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        wait_for_record(&server.store, "c1", true).await;
        wait_for_messages(&server.inbox, 1).await;

        let violations: Value = client
            .get(format!("{}/api/violations", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(violations[0]["card_id"], "c1");
        assert_eq!(violations[0]["warning_count"], 0);

        let first = server.inbox.messages();
        assert_eq!(first.len(), 1);
        assert!(first[0].starts_with("@alice"));

        // Sweep: still invalid, escalates.
        let report: Value = client
            .post(format!("{}/api/sweep", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["escalated"], 1);
        assert!(server.inbox.messages()[1].contains("Warning number 1"));

        // Archive: record dropped, no notice.
        client
            .post(format!("{}/", server.base))
            .json(&action("updateCard", "c1", Some("action_archived_card")))
            .send()
            .await
            .unwrap();
        wait_for_record(&server.store, "c1", false).await;
        assert_eq!(server.inbox.messages().len(), 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fixed_card_is_resolved_by_sweep() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();
        server.board.put(sloppy_card("c1"));

        client
            .post(format!("{}/", server.base))
            .json(&action("createCard", "c1", None))
            .send()
            .await
            .unwrap();
        wait_for_record(&server.store, "c1", true).await;

        server.board.put(
            Card::new("c1", "Fix Login Redirect Bug")
                .with_description("Redirect loops after SSO.")
                .with_labels(["Bug", "P1"]),
        );
        let report: Value = client
            .post(format!("{}/api/sweep", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["resolved"], 1);
        assert!(server.store.find_by_card_id("c1").await.unwrap().is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unparseable_and_unknown_actions_are_acknowledged() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let garbage = client
            .post(format!("{}/", server.base))
            .body("{{{")
            .send()
            .await
            .unwrap();
        assert_eq!(garbage.status(), 200);

        let comment = client
            .post(format!("{}/", server.base))
            .json(&action("commentCard", "c9", None))
            .send()
            .await
            .unwrap();
        assert_eq!(comment.status(), 200);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.store.list_all_invalid().await.unwrap().is_empty());
        assert!(server.inbox.messages().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn webhook_registration_errors_are_surfaced() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let missing_callback = client
            .post(format!("{}/api/webhooks", server.base))
            .json(&json!({"description": "board hook", "idModel": "b1"}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing_callback.status(), 422);

        let rejected = client
            .post(format!("{}/api/webhooks", server.base))
            .json(&json!({
                "description": "board hook",
                "idModel": "b1",
                "callbackURL": "https://warden.example.com/"
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), 502);
    })
    .await
    .expect("test timed out");
}
