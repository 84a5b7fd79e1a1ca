//! Parallel training of several difficulty tiers.
//!
//! Every tier runs as its own job on a dedicated rayon pool. Jobs report back
//! over a channel and the launcher waits for them up to a deadline:
//!
//! ```text
//! Orchestrator::run
//!     ├─ spawn job(beginner) ─┐
//!     ├─ spawn job(easy)     ─┤  (tier, outcome)
//!     ├─ ...                  ├──────────────────▶ recv_timeout until deadline
//!     └─ spawn job(expert)   ─┘
//! ```
//!
//! A failing or panicking job is recorded as [`TierOutcome::Failed`] and
//! does not disturb its siblings. Jobs still running at the deadline are
//! reported as [`TierOutcome::Unconfirmed`] and left to finish on their own;
//! they are never cancelled.

use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use log::{error, info, warn};
use serde::Serialize;
use skillnet_network::DifficultyTier;

use crate::{SearchConfig, Trainer, TrainingError, TrainingReport, Trajectory};

/// What each tier's worker does.
#[derive(Debug, Clone)]
pub enum TrainingJob {
    /// [`Trainer::train`] on the shared dataset.
    Train,
    /// [`Trainer::tune_and_train`], scoring candidates on `validation`.
    Tune {
        search: SearchConfig,
        validation: Arc<[Trajectory]>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, derive_more::IsVariant)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TierOutcome {
    Completed(TrainingReport),
    Failed { reason: String },
    /// The worker had not reported back when the wait timed out.
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestrationReport {
    pub outcomes: BTreeMap<DifficultyTier, TierOutcome>,
    pub timed_out: bool,
}

impl OrchestrationReport {
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.outcomes.values().all(TierOutcome::is_completed)
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    trainer: Arc<Trainer>,
    timeout: Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(trainer: Arc<Trainer>, timeout: Duration) -> Self {
        Self { trainer, timeout }
    }

    /// Runs `job` for every distinct tier in `tiers` and waits up to the
    /// timeout for the results.
    ///
    /// Only a failure to start the worker pool is returned as an error;
    /// per-tier problems end up in the report.
    pub fn run(
        &self,
        tiers: &[DifficultyTier],
        dataset: &Arc<[Trajectory]>,
        job: &TrainingJob,
    ) -> Result<OrchestrationReport, TrainingError> {
        let tiers: BTreeSet<DifficultyTier> = tiers.iter().copied().collect();
        let mut report = OrchestrationReport {
            outcomes: BTreeMap::new(),
            timed_out: false,
        };
        if tiers.is_empty() {
            return Ok(report);
        }

        let threads = thread::available_parallelism()
            .map_or(1, usize::from)
            .min(tiers.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("skillnet-train-{i}"))
            .build()?;
        info!(
            "training {} tiers on {threads} threads (timeout {:?})",
            tiers.len(),
            self.timeout
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        for &tier in &tiers {
            let tx = tx.clone();
            let trainer = Arc::clone(&self.trainer);
            let dataset = Arc::clone(dataset);
            let job = job.clone();
            pool.spawn(move || {
                let outcome = run_guarded(&trainer, tier, &dataset, &job);
                // the launcher may have stopped listening after a timeout
                let _ = tx.send((tier, outcome));
            });
        }
        drop(tx);

        // a timeout too large for `Instant` means waiting without a deadline
        let deadline = Instant::now().checked_add(self.timeout);
        while report.outcomes.len() < tiers.len() {
            let received = match deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((tier, outcome)) => {
                    report.outcomes.insert(tier, outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    report.timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for &tier in &tiers {
            if !report.outcomes.contains_key(&tier) {
                warn!("{tier}: completion could not be confirmed within {:?}", self.timeout);
                report.outcomes.insert(tier, TierOutcome::Unconfirmed);
            }
        }
        Ok(report)
    }
}

/// Runs one tier's job, turning errors and panics into a failed outcome.
fn run_guarded(
    trainer: &Trainer,
    tier: DifficultyTier,
    dataset: &[Trajectory],
    job: &TrainingJob,
) -> TierOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| match job {
        TrainingJob::Train => trainer.train(tier, dataset).map(|run| run.report),
        TrainingJob::Tune { search, validation } => trainer
            .tune_and_train(tier, dataset, validation, search)
            .map(|tuned| tuned.run.report),
    }));
    match result {
        Ok(Ok(report)) => {
            info!(
                "{tier}: finished after {} epochs on {} samples",
                report.epochs_run(),
                report.sample_count
            );
            TierOutcome::Completed(report)
        }
        Ok(Err(err)) => {
            error!("{tier}: training failed: {err}");
            TierOutcome::Failed {
                reason: err.to_string(),
            }
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("{tier}: training panicked: {message}");
            TierOutcome::Failed {
                reason: format!("panicked: {message}"),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else {
        "unknown panic".to_owned()
    }
}
