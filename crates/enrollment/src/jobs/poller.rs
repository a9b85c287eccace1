//! Two-tier job status resolution.
//!
//! Each tick checks the callback cache first and only then asks the backend's status
//! endpoint. Ticks run strictly one after another with a fixed sleep in between, and the
//! sequence ends at the first terminal reading or when the attempt budget is spent.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::domain::{JobId, JobUpdate, RemoteStatus};
use super::source::{CallbackSource, JobPollError, StatusSource};
use crate::config::PollingConfig;

/// Attempt bound and tick interval for one polling sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollBudget {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Read-only catalog and history queries.
    pub fn query(config: &PollingConfig) -> Self {
        Self::new(config.query_attempts, config.interval)
    }

    /// The seat request, which is heavier on the backend and gets a longer budget.
    pub fn submission(config: &PollingConfig) -> Self {
        Self::new(config.submission_attempts, config.interval)
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::query(&PollingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollPhase::Completed | PollPhase::Failed | PollPhase::TimedOut
        )
    }
}

/// Snapshot handed to progress observers after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub phase: PollPhase,
    pub attempt: u32,
    pub max_attempts: u32,
    pub percent: u8,
}

/// Terminal result of a polling sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed(String),
    TimedOut { attempts: u32 },
}

impl JobOutcome {
    fn phase(&self) -> PollPhase {
        match self {
            JobOutcome::Completed(_) => PollPhase::Completed,
            JobOutcome::Failed(_) => PollPhase::Failed,
            JobOutcome::TimedOut { .. } => PollPhase::TimedOut,
        }
    }
}

enum Tick {
    Resolved(JobOutcome),
    NotReady { percent: Option<u8> },
}

/// Drives status checks for submitted jobs.
///
/// Independent jobs can be polled concurrently; each call keeps its own counter.
/// There is no cancellation token: dropping the returned future abandons the sequence.
#[derive(Debug, Clone)]
pub struct JobPoller<C, S> {
    callbacks: C,
    status: S,
}

impl<C, S> JobPoller<C, S>
where
    C: CallbackSource,
    S: StatusSource,
{
    pub fn new(callbacks: C, status: S) -> Self {
        Self { callbacks, status }
    }

    #[instrument(skip_all, fields(job_id = %job_id, max_attempts = budget.max_attempts))]
    pub async fn poll<F>(
        &self,
        job_id: &JobId,
        budget: PollBudget,
        mut on_progress: F,
    ) -> Result<JobOutcome, JobPollError>
    where
        F: FnMut(&JobProgress) + Send,
    {
        let mut snapshot = JobProgress {
            job_id: job_id.clone(),
            phase: PollPhase::Submitted,
            attempt: 0,
            max_attempts: budget.max_attempts,
            percent: 0,
        };
        on_progress(&snapshot);
        info!("polling job");

        let mut attempts = 0;
        while attempts < budget.max_attempts {
            if attempts > 0 {
                sleep(budget.interval).await;
            }

            let tick = self.tick(job_id).await?;
            attempts += 1;
            snapshot.attempt = attempts;

            match tick {
                Tick::Resolved(outcome) => {
                    snapshot.phase = outcome.phase();
                    if matches!(outcome, JobOutcome::Completed(_)) {
                        snapshot.percent = 100;
                    }
                    on_progress(&snapshot);
                    info!(attempts, phase = ?snapshot.phase, "job resolved");
                    return Ok(outcome);
                }
                Tick::NotReady { percent } => {
                    if let Some(percent) = percent {
                        snapshot.percent = percent;
                    }
                    snapshot.phase = PollPhase::Polling;
                    on_progress(&snapshot);
                    debug!(attempts, percent = snapshot.percent, "job not ready");
                }
            }
        }

        snapshot.phase = PollPhase::TimedOut;
        on_progress(&snapshot);
        warn!(attempts, "job polling timed out");
        Ok(JobOutcome::TimedOut { attempts })
    }

    async fn tick(&self, job_id: &JobId) -> Result<Tick, JobPollError> {
        if let Some(notification) = self.callbacks.lookup(job_id).await? {
            match notification.terminal_update() {
                Some(JobUpdate::Completed { result }) => {
                    return Ok(Tick::Resolved(JobOutcome::Completed(result)))
                }
                Some(JobUpdate::Failed { message }) => {
                    return Ok(Tick::Resolved(JobOutcome::Failed(message)))
                }
                Some(JobUpdate::Pending { .. }) | None => {}
            }
        }

        let tick = match self.status.job_status(job_id).await? {
            RemoteStatus::Reported(JobUpdate::Completed { result }) => {
                Tick::Resolved(JobOutcome::Completed(result))
            }
            RemoteStatus::Reported(JobUpdate::Failed { message }) => {
                Tick::Resolved(JobOutcome::Failed(message))
            }
            RemoteStatus::Reported(JobUpdate::Pending { progress }) => Tick::NotReady {
                percent: Some(progress),
            },
            RemoteStatus::Indeterminate { raw } => {
                warn!(status = ?raw, "job status endpoint returned no recognisable status");
                Tick::NotReady { percent: None }
            }
            RemoteStatus::Unavailable { status } => {
                debug!(status, "job status endpoint unavailable this tick");
                Tick::NotReady { percent: None }
            }
        };
        Ok(tick)
    }
}
