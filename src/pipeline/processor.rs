//! Runs one webhook event through the pipeline.
//!
//! fetch → classify → select → execute → track. Nothing here returns an
//! error to the caller: failures are logged and reported in the outcome.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::board::{CardFetcher, FetchOptions};
use crate::error::{Error, FetchError, Result};
use crate::pipeline::classifier::classify;
use crate::pipeline::executor::execute;
use crate::pipeline::selector::{RuleSelection, select_rules};
use crate::pipeline::tracker::{TrackerOutcome, ViolationTracker};
use crate::pipeline::types::{Event, EventKind, Origin, RuleContext, Transition};

/// What happened to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// No validation applies.
    Ignored,
    /// Archive/delete: any record was dropped without evaluation.
    Resolved { removed: bool },
    /// Rules ran and the tracker acted on the verdict.
    Evaluated(TrackerOutcome),
    /// Fetch or store failure; no state was changed. `retryable` is set when
    /// a later delivery of the same event could succeed.
    Failed { reason: String, retryable: bool },
}

impl From<Error> for ProcessOutcome {
    fn from(e: Error) -> Self {
        Self::Failed {
            retryable: e.is_retryable(),
            reason: e.to_string(),
        }
    }
}

pub struct EventProcessor {
    fetcher: Arc<dyn CardFetcher>,
    tracker: Arc<ViolationTracker>,
}

impl EventProcessor {
    pub fn new(fetcher: Arc<dyn CardFetcher>, tracker: Arc<ViolationTracker>) -> Self {
        Self { fetcher, tracker }
    }

    pub async fn process(&self, event: &Event) -> ProcessOutcome {
        let outcome = self
            .process_inner(event)
            .await
            .unwrap_or_else(ProcessOutcome::from);
        match &outcome {
            ProcessOutcome::Failed { reason, retryable } => warn!(
                event_id = %event.id,
                card_id = %event.card_id,
                kind = event.label(),
                retryable,
                reason = %reason,
                "Event processing failed"
            ),
            other => debug!(
                event_id = %event.id,
                card_id = %event.card_id,
                kind = event.label(),
                outcome = ?other,
                "Event processed"
            ),
        }
        outcome
    }

    async fn process_inner(&self, event: &Event) -> Result<ProcessOutcome> {
        match &event.kind {
            // A deleted card cannot be fetched; its record goes regardless.
            EventKind::Archive => return self.resolve(&event.card_id).await,
            EventKind::Unhandled { action_type } => {
                debug!(action_type = %action_type, "Unhandled action type");
                return Ok(ProcessOutcome::Ignored);
            }
            // No rule set applies to renames, label edits and the like.
            EventKind::Update {
                transition: Transition::Other { translation_key },
            } => {
                debug!(translation_key = %translation_key, "Update carries no list move");
                return Ok(ProcessOutcome::Ignored);
            }
            EventKind::Create | EventKind::Update { .. } => {}
        }

        let card = match self.fetcher.fetch_card(&event.card_id, FetchOptions::FULL).await {
            Ok(card) => card,
            Err(e @ FetchError::NotFound { .. }) => {
                info!(card_id = %event.card_id, "Card no longer exists, event dropped");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let category = classify(&card);
        let rules = match select_rules(&event.kind, category, card.checklists.len()) {
            RuleSelection::Apply(rules) => rules,
            RuleSelection::DropRecord => return self.resolve(&card.id).await,
            RuleSelection::Nothing => return Ok(ProcessOutcome::Ignored),
        };

        let verdict = execute(&card, &rules, &RuleContext::for_event(event));
        let origin = Origin::Event {
            actor: event.actor.clone(),
        };

        let outcome = self.tracker.apply(&card, &verdict, &origin).await?;
        Ok(ProcessOutcome::Evaluated(outcome))
    }

    async fn resolve(&self, card_id: &str) -> Result<ProcessOutcome> {
        let removed = self.tracker.resolve(card_id).await?;
        if removed {
            info!(card_id, "Card archived, violation removed");
        }
        Ok(ProcessOutcome::Resolved { removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::model::Checklist;
    use crate::config::RenotifyPolicy;
    use crate::pipeline::testing::{RecordingNotifier, StubFetcher, sloppy_card, valid_card};
    use crate::pipeline::tracker::TrackerAction;
    use crate::pipeline::types::{RuleName, Transition};
    use crate::store::{LibSqlBackend, ViolationRecord, ViolationStore};

    struct Harness {
        processor: EventProcessor,
        fetcher: Arc<StubFetcher>,
        store: Arc<LibSqlBackend>,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness(cards: Vec<crate::board::Card>) -> Harness {
        let fetcher = Arc::new(StubFetcher::with_cards(cards));
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let tracker = Arc::new(ViolationTracker::new(
            store.clone(),
            notifier.clone(),
            RenotifyPolicy::Always,
        ));
        Harness {
            processor: EventProcessor::new(fetcher.clone(), tracker),
            fetcher,
            store,
            notifier,
        }
    }

    fn moved_to(card_id: &str, list: &str) -> Event {
        Event::new(
            "a1",
            card_id,
            EventKind::Update {
                transition: Transition::MovedBetweenLists {
                    from: "Task".into(),
                    to: list.into(),
                },
            },
        )
        .with_actor("alice")
    }

    #[tokio::test]
    async fn sloppy_new_card_is_flagged() {
        let h = harness(vec![sloppy_card("c1")]).await;
        let outcome = h
            .processor
            .process(&Event::new("a1", "c1", EventKind::Create).with_actor("alice"))
            .await;

        let ProcessOutcome::Evaluated(tracked) = outcome else {
            panic!("expected evaluation, got {outcome:?}");
        };
        assert_eq!(tracked.action, TrackerAction::Create);
        let record = h.store.find_by_card_id("c1").await.unwrap().unwrap();
        assert_eq!(
            record.last_failures,
            vec![
                RuleName::TitleWordCount,
                RuleName::TitleTitleize,
                RuleName::DescriptionAvailability,
                RuleName::Labels,
            ]
        );
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn valid_card_twice_leaves_no_record() {
        let h = harness(vec![valid_card("c1")]).await;
        let event = Event::new("a1", "c1", EventKind::Create);
        for _ in 0..2 {
            let outcome = h.processor.process(&event).await;
            assert!(matches!(
                outcome,
                ProcessOutcome::Evaluated(TrackerOutcome { action: TrackerAction::Noop, .. })
            ));
        }
        assert!(h.store.find_by_card_id("c1").await.unwrap().is_none());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn archive_deletes_without_fetch_or_notice() {
        let h = harness(vec![]).await;
        h.store
            .create(&ViolationRecord::new("c1", "fix bug", vec![RuleName::Labels]))
            .await
            .unwrap();

        let outcome = h
            .processor
            .process(&Event::new("a1", "c1", EventKind::Archive))
            .await;
        assert_eq!(outcome, ProcessOutcome::Resolved { removed: true });
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.store.find_by_card_id("c1").await.unwrap().is_none());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn move_to_in_progress_checks_members_and_due_date() {
        let h = harness(vec![valid_card("c1")]).await;
        h.processor.process(&moved_to("c1", "IN PROGRESS")).await;

        let record = h.store.find_by_card_id("c1").await.unwrap().unwrap();
        assert_eq!(
            record.last_failures,
            vec![RuleName::InProgressListMembersRequired, RuleName::DueDate]
        );
    }

    #[tokio::test]
    async fn move_to_review_reports_incomplete_items() {
        let card = valid_card("c1")
            .with_labels(["non-dev"])
            .with_checklist(Checklist::from_items("QA", [("one", true), ("two", false), ("three", false)]));
        let h = harness(vec![card]).await;
        h.processor.process(&moved_to("c1", "In Review")).await;

        let record = h.store.find_by_card_id("c1").await.unwrap().unwrap();
        assert_eq!(record.last_failures, vec![RuleName::CheckListItemStateCompletion]);
        assert!(h.notifier.messages()[0].contains("2 item"));
    }

    #[tokio::test]
    async fn other_updates_are_ignored() {
        let h = harness(vec![sloppy_card("c1")]).await;
        let event = Event::new(
            "a1",
            "c1",
            EventKind::Update {
                transition: Transition::Other {
                    translation_key: "action_renamed_card".into(),
                },
            },
        );
        assert_eq!(h.processor.process(&event).await, ProcessOutcome::Ignored);
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.store.find_by_card_id("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn card_moved_on_after_creation_in_intake_list_passes() {
        let h = harness(vec![valid_card("c1").with_list("In Progress")]).await;
        let event = Event::new("a1", "c1", EventKind::Create).with_origin_list("Task");

        let outcome = h.processor.process(&event).await;
        assert!(matches!(
            outcome,
            ProcessOutcome::Evaluated(TrackerOutcome { action: TrackerAction::Noop, .. })
        ));
        assert!(h.store.find_by_card_id("c1").await.unwrap().is_none());
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn card_created_outside_intake_list_is_flagged_after_moving_in() {
        let h = harness(vec![valid_card("c1")]).await;
        let event = Event::new("a1", "c1", EventKind::Create).with_origin_list("Backlog");

        h.processor.process(&event).await;
        let record = h.store.find_by_card_id("c1").await.unwrap().unwrap();
        assert_eq!(record.last_failures, vec![RuleName::ListOfNewCard]);
    }

    #[tokio::test]
    async fn fetch_failure_mutates_nothing() {
        let h = harness(vec![]).await;
        h.store
            .create(&ViolationRecord::new("c1", "fix bug", vec![RuleName::Labels]))
            .await
            .unwrap();
        h.fetcher.fail_transiently("c1");

        let outcome = h
            .processor
            .process(&Event::new("a1", "c1", EventKind::Create))
            .await;
        assert!(matches!(outcome, ProcessOutcome::Failed { retryable: true, .. }));
        assert!(h.store.find_by_card_id("c1").await.unwrap().is_some());
        assert!(h.notifier.messages().is_empty());

        let missing = h
            .processor
            .process(&Event::new("a2", "gone", EventKind::Create))
            .await;
        assert!(matches!(missing, ProcessOutcome::Failed { retryable: false, .. }));
    }
}
