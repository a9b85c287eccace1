//! Asynchronous backend jobs: identifiers, status decoding and the poller.

pub mod domain;
pub mod poller;
pub mod source;

pub use domain::{JobId, JobStatusKind, JobUpdate, RemoteStatus, RemoteStatusBody};
pub use poller::{JobOutcome, JobPoller, JobProgress, PollBudget, PollPhase};
pub use source::{CallbackSource, HttpCallbackSource, JobPollError, LocalCallbacks, StatusSource};
