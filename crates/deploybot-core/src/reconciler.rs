//! Polls the GitOps control plane until an application has rolled out.
//!
//! Each poll is folded into a [`PollTally`] by the pure [`StatusReconciler::evaluate`];
//! [`StatusReconciler::reconcile`] drives the polls, sleeps and narration.
//!
//! Rules for one iteration:
//!
//! - The snapshot replaces everything seen before; nothing is diffed.
//! - Resources are walked in the order the control plane returned them.
//!   `OutOfSync` and `Unknown` are narrated only for their first
//!   [`NARRATION_GATE`] occurrences in the run; `Synced` is always narrated.
//!   Any other state, or a gated state past its limit, ends the walk for that
//!   iteration and the remaining resources go unnarrated.
//! - The iteration succeeds when the snapshot holds exactly
//!   [`CONSENSUS_THRESHOLD`] `Synced` resources.
//! - Otherwise the run gives up once `max_iterations` polls have been spent.

use crate::collab::{Narrator, StatusSource};
use crate::config::PollSettings;
use crate::error::DeployError;
use crate::types::{ResourceStatus, SyncState};
use std::sync::Arc;
use tracing::{info, warn};

/// Synced resources that stand for "application fully deployed": the web and
/// worker deployments.
pub const CONSENSUS_THRESHOLD: usize = 2;

/// `OutOfSync` / `Unknown` lines narrated per run before they are suppressed.
pub const NARRATION_GATE: u32 = 2;

// ---------------------------------------------------------------------------
// PollTally / Verdict
// ---------------------------------------------------------------------------

/// Counters owned by one run. They only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollTally {
    pub out_of_sync_seen: u32,
    pub unknown_seen: u32,
    pub synced_seen: u32,
    pub iteration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Success,
    GiveUp,
}

/// Result of folding one snapshot into a tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub tally: PollTally,
    /// Resource lines to post, in walk order.
    pub narrations: Vec<String>,
}

/// How a polling sub-run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub verdict: Verdict,
    pub tally: PollTally,
}

// ---------------------------------------------------------------------------
// StatusReconciler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StatusReconciler {
    source: Arc<dyn StatusSource>,
    settings: PollSettings,
}

impl StatusReconciler {
    pub fn new(source: Arc<dyn StatusSource>, settings: PollSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Fold one snapshot into `tally`. Pure: the input tally is not touched.
    pub fn evaluate(&self, tally: &PollTally, statuses: &[ResourceStatus]) -> Evaluation {
        let mut next = *tally;
        next.iteration += 1;
        let mut narrations = Vec::new();

        for resource in statuses {
            let line = format!("_{}: `{}`_", resource.name, resource.state);
            match resource.state {
                SyncState::OutOfSync => {
                    next.out_of_sync_seen += 1;
                    if next.out_of_sync_seen > NARRATION_GATE {
                        break;
                    }
                }
                SyncState::Unknown => {
                    next.unknown_seen += 1;
                    if next.unknown_seen > NARRATION_GATE {
                        break;
                    }
                }
                SyncState::Synced => next.synced_seen += 1,
                SyncState::Progressing => break,
            }
            narrations.push(line);
        }

        let synced = statuses
            .iter()
            .filter(|r| r.state == SyncState::Synced)
            .count();
        let verdict = self.verdict_for(next.iteration, synced == CONSENSUS_THRESHOLD);

        Evaluation {
            verdict,
            tally: next,
            narrations,
        }
    }

    /// A poll whose call failed still spends an iteration.
    pub fn record_poll_failure(&self, tally: &PollTally) -> (Verdict, PollTally) {
        let mut next = *tally;
        next.iteration += 1;
        (self.verdict_for(next.iteration, false), next)
    }

    fn verdict_for(&self, iteration: u32, converged: bool) -> Verdict {
        if converged {
            Verdict::Success
        } else if iteration >= self.settings.max_iterations {
            Verdict::GiveUp
        } else {
            Verdict::Continue
        }
    }

    /// Poll `app` until it converges or the iteration budget runs out,
    /// narrating as it goes. Starts from a fresh tally.
    pub async fn reconcile(&self, app: &str, narrator: &Narrator) -> ReconcileOutcome {
        tokio::time::sleep(self.settings.grace_delay).await;

        let mut tally = PollTally::default();
        loop {
            let verdict = match self.source.poll(app).await {
                Ok(statuses) => {
                    let eval = self.evaluate(&tally, &statuses);
                    for line in &eval.narrations {
                        narrator.say(line).await;
                    }
                    tally = eval.tally;
                    eval.verdict
                }
                Err(e) => {
                    warn!(app, iteration = tally.iteration + 1, error = %e, "status poll failed");
                    narrator
                        .say(&DeployError::PollTransport(e.to_string()).narration())
                        .await;
                    let (verdict, next) = self.record_poll_failure(&tally);
                    tally = next;
                    verdict
                }
            };
            info!(app, iteration = tally.iteration, ?verdict, "status poll evaluated");

            match verdict {
                Verdict::Success => {
                    narrator.say(&format!("_`{app}` Synced_")).await;
                    return ReconcileOutcome { verdict, tally };
                }
                Verdict::GiveUp => {
                    narrator
                        .say(&format!(
                            "_Potential `Sync` error in `{app}`, please investigate: {}_",
                            self.source.status_url(app)
                        ))
                        .await;
                    return ReconcileOutcome { verdict, tally };
                }
                Verdict::Continue => tokio::time::sleep(self.settings.interval).await,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
