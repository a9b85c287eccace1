//! Three-step enrollment sequence: choose courses, choose sections, see the result.
//!
//! The controller owns one attempt's selection and outcome. Backend queries that come back
//! as job tickets are resolved through the [`JobPoller`]; while a ticket is being polled its
//! progress is published on a watch channel so a front end can render it.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::backend::{BackendError, EnrollmentBackend};
use super::catalog::{flatten_sections, group_sections_by_course, CourseSections};
use super::domain::{BackendReply, CourseCatalog, EnrollmentOutcome, JobTicket, SeatRequest};
use super::history::EnrollmentHistory;
use crate::config::PollingConfig;
use crate::jobs::poller::{JobOutcome, JobPoller, JobProgress, PollBudget, PollPhase};
use crate::jobs::source::{CallbackSource, JobPollError, StatusSource};
use crate::schedule::{
    conflicting_sections, CourseId, EnrollmentSelection, SectionId, SelectionChange,
};

pub const SUBMISSION_TIMEOUT_MESSAGE: &str =
    "timed out waiting for the enrollment to be processed; check your enrollment status later";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    SelectCourses,
    SelectSections,
    Result,
}

/// A queued backend request currently being polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingJob {
    pub ticket: JobTicket,
    pub phase: PollPhase,
    pub attempt: u32,
    pub max_attempts: u32,
    pub percent: u8,
}

impl PendingJob {
    fn queued(ticket: JobTicket, budget: PollBudget) -> Self {
        Self {
            ticket,
            phase: PollPhase::Submitted,
            attempt: 0,
            max_attempts: budget.max_attempts,
            percent: 0,
        }
    }

    fn advance(&mut self, progress: &JobProgress) {
        self.phase = progress.phase;
        self.attempt = progress.attempt;
        self.max_attempts = progress.max_attempts;
        self.percent = progress.percent;
    }
}

pub struct EnrollmentWorkflow<B, C, S> {
    backend: B,
    poller: JobPoller<C, S>,
    polling: PollingConfig,
    step: WorkflowStep,
    catalog: Option<CourseCatalog>,
    chosen_courses: Vec<CourseId>,
    sections: Vec<CourseSections>,
    selection: EnrollmentSelection,
    conflicts: BTreeSet<SectionId>,
    outcome: Option<EnrollmentOutcome>,
    pending: watch::Sender<Option<PendingJob>>,
}

impl<B, C, S> EnrollmentWorkflow<B, C, S>
where
    B: EnrollmentBackend,
    C: CallbackSource,
    S: StatusSource,
{
    pub fn new(backend: B, poller: JobPoller<C, S>, polling: PollingConfig) -> Self {
        let (pending, _) = watch::channel(None);
        Self {
            backend,
            poller,
            polling,
            step: WorkflowStep::SelectCourses,
            catalog: None,
            chosen_courses: Vec::new(),
            sections: Vec::new(),
            selection: EnrollmentSelection::new(),
            conflicts: BTreeSet::new(),
            outcome: None,
            pending,
        }
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn catalog(&self) -> Option<&CourseCatalog> {
        self.catalog.as_ref()
    }

    pub fn chosen_courses(&self) -> &[CourseId] {
        &self.chosen_courses
    }

    pub fn sections(&self) -> &[CourseSections] {
        &self.sections
    }

    pub fn selection(&self) -> &EnrollmentSelection {
        &self.selection
    }

    pub fn conflicts(&self) -> &BTreeSet<SectionId> {
        &self.conflicts
    }

    pub fn outcome(&self) -> Option<&EnrollmentOutcome> {
        self.outcome.as_ref()
    }

    /// Snapshot of the job currently being polled, if any.
    pub fn pending_job(&self) -> Option<PendingJob> {
        self.pending.borrow().clone()
    }

    pub fn watch_pending(&self) -> watch::Receiver<Option<PendingJob>> {
        self.pending.subscribe()
    }

    /// Fetches the courses the student may enroll in and caches them for this attempt.
    pub async fn load_courses(&mut self) -> Result<&CourseCatalog, WorkflowError> {
        self.expect_step(WorkflowStep::SelectCourses, "load courses")?;
        let reply = self.backend.available_courses().await?;
        let catalog = self
            .resolve(reply, PollBudget::query(&self.polling))
            .await?;
        info!(
            courses = catalog.courses().count(),
            levels = catalog.by_level.len(),
            "course catalog loaded"
        );
        Ok(self.catalog.insert(catalog))
    }

    /// Adds or removes a course from the pending choice. Returns whether it is now chosen.
    pub fn toggle_course(&mut self, course: CourseId) -> Result<bool, WorkflowError> {
        self.expect_step(WorkflowStep::SelectCourses, "change courses")?;
        if let Some(index) = self.chosen_courses.iter().position(|id| *id == course) {
            self.chosen_courses.remove(index);
            return Ok(false);
        }
        self.chosen_courses.push(course);
        Ok(true)
    }

    /// Fixes the chosen courses and moves on to section selection.
    pub fn select_courses(
        &mut self,
        courses: impl IntoIterator<Item = CourseId>,
    ) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::SelectCourses, "select courses")?;
        let mut chosen = Vec::new();
        for course in courses {
            if !chosen.contains(&course) {
                chosen.push(course);
            }
        }
        if chosen.is_empty() {
            return Err(WorkflowError::Validation(
                "select at least one course".to_string(),
            ));
        }

        self.chosen_courses = chosen;
        self.sections.clear();
        self.selection.clear();
        self.conflicts.clear();
        self.step = WorkflowStep::SelectSections;
        Ok(())
    }

    /// [`select_courses`](Self::select_courses) with the list built by `toggle_course`.
    pub fn confirm_courses(&mut self) -> Result<(), WorkflowError> {
        let chosen = self.chosen_courses.clone();
        self.select_courses(chosen)
    }

    /// Fetches all offered sections and keeps those of the chosen courses.
    pub async fn load_sections(&mut self) -> Result<&[CourseSections], WorkflowError> {
        self.expect_step(WorkflowStep::SelectSections, "load sections")?;
        let reply = self.backend.available_sections().await?;
        let offered = self
            .resolve(reply, PollBudget::query(&self.polling))
            .await?;

        self.sections = group_sections_by_course(&self.chosen_courses, &offered);
        self.selection.clear();
        self.conflicts.clear();
        info!(
            courses = self.sections.len(),
            sections = self.sections.iter().map(|g| g.sections.len()).sum::<usize>(),
            "sections loaded"
        );
        Ok(&self.sections)
    }

    /// Toggles `section` for `course` and recomputes schedule conflicts.
    pub fn toggle_section(
        &mut self,
        course: CourseId,
        section: SectionId,
    ) -> Result<SelectionChange, WorkflowError> {
        self.expect_step(WorkflowStep::SelectSections, "change sections")?;
        let offered = self
            .sections
            .iter()
            .find(|group| group.course.id == course)
            .is_some_and(|group| group.sections.iter().any(|s| s.id == section));
        if !offered {
            return Err(WorkflowError::Validation(format!(
                "section {section} is not offered for course {course}"
            )));
        }

        let change = self.selection.toggle(course, section);
        self.conflicts = conflicting_sections(&self.selection, &flatten_sections(&self.sections));
        if !self.conflicts.is_empty() {
            warn!(conflicts = ?self.conflicts, "selected sections overlap");
        }
        Ok(change)
    }

    pub fn can_submit(&self) -> bool {
        self.step == WorkflowStep::SelectSections
            && !self.selection.is_empty()
            && self.conflicts.is_empty()
    }

    /// Returns from section selection to course selection, dropping the section selection
    /// and cached data. The chosen courses are kept.
    pub fn back(&mut self) -> Result<(), WorkflowError> {
        self.expect_step(WorkflowStep::SelectSections, "go back")?;
        self.clear_sections();
        Ok(())
    }

    /// Sends the seat request and waits for its outcome.
    ///
    /// Validation and conflict errors are returned before any network call. Every failure
    /// after that becomes a REJECTED outcome.
    #[instrument(skip(self), fields(sections = self.selection.len()))]
    pub async fn submit(&mut self) -> Result<&EnrollmentOutcome, WorkflowError> {
        self.expect_step(WorkflowStep::SelectSections, "submit")?;
        if self.selection.is_empty() {
            return Err(WorkflowError::Validation(
                "select at least one section before enrolling".to_string(),
            ));
        }
        if !self.conflicts.is_empty() {
            return Err(WorkflowError::ScheduleConflict {
                sections: self.conflicts.iter().copied().collect(),
            });
        }

        let request = SeatRequest {
            section_ids: self.selection.section_ids(),
        };
        let outcome = match self.backend.request_seat(&request).await {
            Ok(BackendReply::Ready(outcome)) => outcome,
            Ok(BackendReply::Queued(ticket)) => self.await_submission(ticket).await,
            Err(err) => {
                warn!(error = %err, "enrollment request failed");
                EnrollmentOutcome::rejected(err.to_string())
            }
        };

        info!(status = ?outcome.status, reason = ?outcome.reason, "enrollment finished");
        self.step = WorkflowStep::Result;
        Ok(self.outcome.insert(outcome))
    }

    /// Clears the whole attempt.
    pub fn reset(&mut self) {
        self.clear_sections();
        self.chosen_courses.clear();
        self.outcome = None;
        self.pending.send_replace(None);
    }

    /// Fetches the student's past enrollments. Independent of the current step.
    pub async fn fetch_history(&self) -> Result<EnrollmentHistory, WorkflowError> {
        let reply = self.backend.enrollment_history().await?;
        self.resolve(reply, PollBudget::query(&self.polling)).await
    }

    async fn await_submission(&self, ticket: JobTicket) -> EnrollmentOutcome {
        let budget = PollBudget::submission(&self.polling);
        match self.track(ticket, budget).await {
            Ok(JobOutcome::Completed(result)) => serde_json::from_value(result).unwrap_or_else(
                |err| EnrollmentOutcome::rejected(format!("unexpected enrollment result: {err}")),
            ),
            Ok(JobOutcome::Failed(message)) => EnrollmentOutcome::rejected(message),
            Ok(JobOutcome::TimedOut { .. }) => {
                EnrollmentOutcome::rejected(SUBMISSION_TIMEOUT_MESSAGE)
            }
            Err(err) => EnrollmentOutcome::rejected(err.to_string()),
        }
    }

    async fn resolve<T: DeserializeOwned>(
        &self,
        reply: BackendReply<T>,
        budget: PollBudget,
    ) -> Result<T, WorkflowError> {
        let ticket = match reply {
            BackendReply::Ready(payload) => return Ok(payload),
            BackendReply::Queued(ticket) => ticket,
        };

        match self.track(ticket, budget).await? {
            JobOutcome::Completed(result) => serde_json::from_value(result)
                .map_err(|err| WorkflowError::Backend(BackendError::Decode(err.to_string()))),
            JobOutcome::Failed(message) => Err(WorkflowError::JobFailed(message)),
            JobOutcome::TimedOut { attempts } => Err(WorkflowError::JobTimedOut { attempts }),
        }
    }

    /// Polls `ticket` to completion while mirroring progress into the pending channel.
    async fn track(
        &self,
        ticket: JobTicket,
        budget: PollBudget,
    ) -> Result<JobOutcome, JobPollError> {
        let job_id = ticket.job_id.clone();
        self.pending
            .send_replace(Some(PendingJob::queued(ticket, budget)));

        let pending = &self.pending;
        let result = self
            .poller
            .poll(&job_id, budget, |progress| {
                pending.send_modify(|slot| {
                    if let Some(job) = slot {
                        job.advance(progress);
                    }
                });
            })
            .await;

        self.pending.send_replace(None);
        result
    }

    fn clear_sections(&mut self) {
        self.step = WorkflowStep::SelectCourses;
        self.catalog = None;
        self.sections.clear();
        self.selection.clear();
        self.conflicts.clear();
    }

    fn expect_step(&self, step: WorkflowStep, action: &str) -> Result<(), WorkflowError> {
        if self.step == step {
            return Ok(());
        }
        Err(WorkflowError::Validation(format!(
            "cannot {action} while at step {:?}",
            self.step
        )))
    }
}

fn join_ids(ids: &[SectionId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("selected sections overlap in schedule: {}", join_ids(.sections))]
    ScheduleConflict { sections: Vec<SectionId> },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("job failed: {0}")]
    JobFailed(String),
    #[error("timed out after {attempts} status checks")]
    JobTimedOut { attempts: u32 },
    #[error(transparent)]
    Poll(#[from] JobPollError),
}
