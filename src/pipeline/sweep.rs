//! Periodic re-check of every flagged card.
//!
//! Passes never overlap: a run that finds another in flight returns a
//! skipped report. Cards are checked in parallel up to the configured
//! limit; one card failing does not abort the pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::board::{CardFetcher, FetchOptions};
use crate::pipeline::executor::execute;
use crate::pipeline::selector::sweep_rules;
use crate::pipeline::tracker::{TrackerAction, ViolationTracker};
use crate::pipeline::types::{Origin, RuleContext};

/// Sweep rules only read title, description and labels.
const SWEEP_FETCH: FetchOptions = FetchOptions {
    attachments: false,
    checklists: false,
    list: false,
    members: false,
};

/// Summary of one sweep pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    /// Another pass was already running; nothing was checked.
    pub skipped: bool,
    pub checked: usize,
    pub resolved: usize,
    pub escalated: usize,
    pub failed: usize,
}

impl SweepReport {
    fn empty(run_id: Uuid) -> Self {
        Self {
            run_id,
            skipped: false,
            checked: 0,
            resolved: 0,
            escalated: 0,
            failed: 0,
        }
    }
}

enum CardCheck {
    Resolved,
    Escalated,
    Unchanged,
    Failed,
}

pub struct SweepProcessor {
    fetcher: Arc<dyn CardFetcher>,
    tracker: Arc<ViolationTracker>,
    concurrency: usize,
    running: Mutex<()>,
}

impl SweepProcessor {
    pub fn new(fetcher: Arc<dyn CardFetcher>, tracker: Arc<ViolationTracker>, concurrency: usize) -> Self {
        Self {
            fetcher,
            tracker,
            concurrency: concurrency.max(1),
            running: Mutex::new(()),
        }
    }

    /// Run one pass over every tracked invalid card.
    pub async fn run(&self) -> SweepReport {
        let mut report = SweepReport::empty(Uuid::new_v4());

        let Ok(_guard) = self.running.try_lock() else {
            info!(run_id = %report.run_id, "Sweep already in progress, skipping");
            report.skipped = true;
            return report;
        };

        let records = match self.tracker.store().list_all_invalid().await {
            Ok(records) => records,
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Failed to enumerate violations");
                return report;
            }
        };
        info!(run_id = %report.run_id, cards = records.len(), "Sweep started");

        let checks: Vec<CardCheck> = stream::iter(records)
            .map(|record| async move { self.check(&record.card_id).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for check in checks {
            report.checked += 1;
            match check {
                CardCheck::Resolved => report.resolved += 1,
                CardCheck::Escalated => report.escalated += 1,
                CardCheck::Failed => report.failed += 1,
                CardCheck::Unchanged => {}
            }
        }

        info!(
            run_id = %report.run_id,
            checked = report.checked,
            resolved = report.resolved,
            escalated = report.escalated,
            failed = report.failed,
            "Sweep finished"
        );
        report
    }

    async fn check(&self, card_id: &str) -> CardCheck {
        let card = match self.fetcher.fetch_card(card_id, SWEEP_FETCH).await {
            Ok(card) => card,
            Err(e) => {
                warn!(card_id, error = %e, "Sweep fetch failed, card left as is");
                return CardCheck::Failed;
            }
        };

        let verdict = execute(&card, &sweep_rules(), &RuleContext::default());
        match self.tracker.apply(&card, &verdict, &Origin::Sweep).await {
            Ok(outcome) => match outcome.action {
                TrackerAction::Delete => CardCheck::Resolved,
                TrackerAction::Escalate => CardCheck::Escalated,
                _ => CardCheck::Unchanged,
            },
            Err(e) => {
                warn!(card_id, error = %e, "Sweep state update failed");
                CardCheck::Failed
            }
        }
    }
}

/// Run the sweep on every fire time of `schedule`, forever.
pub fn spawn_sweep_ticker(
    sweep: Arc<SweepProcessor>,
    schedule: cron::Schedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Sweep schedule has no upcoming fire time, ticker stopped");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "Next sweep scheduled");
            tokio::time::sleep(wait).await;

            let report = sweep.run().await;
            if report.skipped {
                debug!(run_id = %report.run_id, "Scheduled sweep skipped");
            }
        }
    })
}
