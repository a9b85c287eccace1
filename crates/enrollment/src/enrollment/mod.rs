//! Enrollment backend access and the course/section/result workflow.

pub mod backend;
pub mod catalog;
pub mod domain;
pub mod history;
pub mod workflow;

pub use backend::{BackendClient, BackendError, EnrollmentBackend};
pub use catalog::{flatten_sections, group_sections_by_course, CourseSections};
pub use domain::{
    BackendReply, CatalogCourse, CourseCatalog, EnrollmentOutcome, EnrollmentRecord, JobTicket,
    OutcomeStatus, SeatRequest, Student,
};
pub use history::{
    CourseStanding, EnrollmentHistory, HistoryEntry, PastEnrollment, StandingSummary,
    PASSING_GRADE,
};
pub use workflow::{
    EnrollmentWorkflow, PendingJob, WorkflowError, WorkflowStep, SUBMISSION_TIMEOUT_MESSAGE,
};
