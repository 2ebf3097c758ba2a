//! Per-card violation state machine over the violation store.
//!
//! A card is either untracked (`NoRecord`, meaning valid or never checked)
//! or `TrackedInvalid` with a warning count. [`decide`] is the pure
//! transition table; [`ViolationTracker`] applies it against the store,
//! serialized per card, and publishes the resulting notice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::board::Card;
use crate::config::RenotifyPolicy;
use crate::error::DatabaseError;
use crate::notify::Notifier;
use crate::pipeline::message::{self, Notice};
use crate::pipeline::types::{Origin, Verdict};
use crate::store::{ViolationRecord, ViolationStore};

/// Tracked state of one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViolationState {
    NoRecord,
    TrackedInvalid { warning_count: u32 },
}

impl ViolationState {
    pub fn of(record: Option<&ViolationRecord>) -> Self {
        match record {
            Some(r) => Self::TrackedInvalid {
                warning_count: r.warning_count,
            },
            None => Self::NoRecord,
        }
    }
}

/// What the tracker does for a (state, verdict, origin) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerAction {
    /// Card is valid again: remove the record, no notice.
    Delete,
    /// Nothing to do.
    Noop,
    /// First failure: insert a record with a zero warning count and notify.
    Create,
    /// Already flagged and a live event found it still invalid.
    Renotify,
    /// Sweep found it still invalid: bump the warning count and escalate.
    Escalate,
}

/// Transition table.
///
/// A sweep reaching `NoRecord` with an invalid card means the record vanished
/// between enumeration and the check; it falls back to `Create`.
pub fn decide(state: ViolationState, valid: bool, origin: &Origin) -> TrackerAction {
    match (state, valid, origin) {
        (ViolationState::TrackedInvalid { .. }, true, _) => TrackerAction::Delete,
        (ViolationState::NoRecord, true, _) => TrackerAction::Noop,
        (ViolationState::NoRecord, false, _) => TrackerAction::Create,
        (ViolationState::TrackedInvalid { .. }, false, Origin::Event { .. }) => TrackerAction::Renotify,
        (ViolationState::TrackedInvalid { .. }, false, Origin::Sweep) => TrackerAction::Escalate,
    }
}

/// Result of applying a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerOutcome {
    pub action: TrackerAction,
    /// State after the transition.
    pub state: ViolationState,
    /// Whether a notice was delivered.
    pub notified: bool,
}

/// Applies verdicts to the violation store and publishes notices.
pub struct ViolationTracker {
    store: Arc<dyn ViolationStore>,
    notifier: Arc<dyn Notifier>,
    renotify: RenotifyPolicy,
    /// Per-card critical sections. Entries die with their last holder.
    locks: Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl ViolationTracker {
    pub fn new(
        store: Arc<dyn ViolationStore>,
        notifier: Arc<dyn Notifier>,
        renotify: RenotifyPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            renotify,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ViolationStore> {
        &self.store
    }

    /// Run one read-decide-write step for `card`.
    ///
    /// Every state change is a single store write; a failure there is
    /// returned with the prior persisted state intact. Notification
    /// failures are logged and reported as `notified: false`.
    /// Refreshing the remembered failure set after a renotify is best effort.
    pub async fn apply(
        &self,
        card: &Card,
        verdict: &Verdict,
        origin: &Origin,
    ) -> Result<TrackerOutcome, DatabaseError> {
        let lock = self.lock_for(&card.id);
        let _guard = lock.lock().await;

        let record = self.store.find_by_card_id(&card.id).await?;
        let state = ViolationState::of(record.as_ref());
        let action = decide(state, verdict.is_valid(), origin);
        debug!(
            card_id = %card.id,
            origin = origin.label(),
            ?state,
            ?action,
            "Tracker decision"
        );

        match action {
            TrackerAction::Noop => Ok(TrackerOutcome {
                action,
                state,
                notified: false,
            }),
            TrackerAction::Delete => {
                self.store.delete(&card.id).await?;
                info!(card_id = %card.id, origin = origin.label(), "Card is valid again, violation cleared");
                Ok(TrackerOutcome {
                    action,
                    state: ViolationState::NoRecord,
                    notified: false,
                })
            }
            TrackerAction::Create => self.create(card, verdict, origin).await,
            TrackerAction::Renotify => {
                // decide() only yields Renotify for an existing record.
                let previous = record.map(|r| r.last_failures).unwrap_or_default();
                let current = verdict.failed_rules();
                let changed = previous != current;

                let notified = match self.renotify {
                    RenotifyPolicy::OnChange if !changed => {
                        debug!(card_id = %card.id, "Failure set unchanged, notice suppressed");
                        false
                    }
                    _ => {
                        let text = message::compose(first_offense(origin), card, &verdict.failures);
                        self.publish(&card.id, &text).await
                    }
                };

                // Only a delivered notice moves the baseline for OnChange.
                if changed && notified {
                    if let Err(e) = self.store.record_notified_failures(&card.id, &current).await {
                        warn!(card_id = %card.id, error = %e, "Failed to remember notified failures");
                    }
                }
                Ok(TrackerOutcome {
                    action,
                    state,
                    notified,
                })
            }
            TrackerAction::Escalate => {
                let updated = self
                    .store
                    .increment_warning(&card.id, &verdict.failed_rules())
                    .await?;
                info!(
                    card_id = %card.id,
                    warning_count = updated.warning_count,
                    "Card still invalid, escalating"
                );

                let text = message::compose(
                    Notice::Escalation {
                        warning_count: updated.warning_count,
                    },
                    card,
                    &verdict.failures,
                );
                let notified = self.publish(&card.id, &text).await;
                Ok(TrackerOutcome {
                    action,
                    state: ViolationState::TrackedInvalid {
                        warning_count: updated.warning_count,
                    },
                    notified,
                })
            }
        }
    }

    /// Drop any record for the card, whatever its state. Returns whether one existed.
    pub async fn resolve(&self, card_id: &str) -> Result<bool, DatabaseError> {
        let lock = self.lock_for(card_id);
        let _guard = lock.lock().await;
        self.store.delete(card_id).await
    }

    async fn create(
        &self,
        card: &Card,
        verdict: &Verdict,
        origin: &Origin,
    ) -> Result<TrackerOutcome, DatabaseError> {
        if matches!(origin, Origin::Sweep) {
            warn!(card_id = %card.id, "Sweep found no record for an invalid card, recreating");
        }

        let record = ViolationRecord::new(&card.id, &card.name, verdict.failed_rules());
        let inserted = self.store.create(&record).await?;
        let state = if inserted {
            info!(
                card_id = %card.id,
                failures = verdict.failures.len(),
                "New violation recorded"
            );
            ViolationState::TrackedInvalid { warning_count: 0 }
        } else {
            // Another writer got there first; report what is stored now.
            let existing = self.store.find_by_card_id(&card.id).await?;
            debug!(card_id = %card.id, "Violation already recorded by a concurrent writer");
            ViolationState::of(existing.as_ref())
        };

        let text = message::compose(first_offense(origin), card, &verdict.failures);
        let notified = self.publish(&card.id, &text).await;
        Ok(TrackerOutcome {
            action: TrackerAction::Create,
            state,
            notified,
        })
    }

    async fn publish(&self, card_id: &str, text: &str) -> bool {
        match self.notifier.publish(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(card_id, sink = self.notifier.name(), error = %e, "Notification failed");
                false
            }
        }
    }

    fn lock_for(&self, card_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = locks.get(card_id).and_then(Weak::upgrade) {
            return lock;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(card_id.to_string(), Arc::downgrade(&lock));
        lock
    }
}

fn first_offense(origin: &Origin) -> Notice<'_> {
    match origin {
        Origin::Event { actor } => Notice::FirstOffense {
            actor: actor.as_deref(),
        },
        Origin::Sweep => Notice::FirstOffense { actor: None },
    }
}
