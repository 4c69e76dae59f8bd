use serde::Serialize;

use super::domain::CandidateRecord;
use super::executor::Persisted;
use super::service::IntakeError;

/// Terminal state of the pipeline before reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Persisted(Persisted),
    Cancelled,
}

impl From<Persisted> for Completion {
    fn from(value: Persisted) -> Self {
        Self::Persisted(value)
    }
}

/// The only shape callers ever see from a submission.
#[derive(Debug)]
pub enum SubmissionOutcome {
    Created(CandidateRecord),
    Updated(CandidateRecord),
    Cancelled,
    Failed(IntakeError),
}

impl SubmissionOutcome {
    pub fn report(result: Result<Completion, IntakeError>) -> Self {
        match result {
            Ok(Completion::Persisted(Persisted::Created(record))) => Self::Created(record),
            Ok(Completion::Persisted(Persisted::Updated(record))) => Self::Updated(record),
            Ok(Completion::Cancelled) => Self::Cancelled,
            Err(err) => Self::Failed(err),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            SubmissionOutcome::Created(_) => "created",
            SubmissionOutcome::Updated(_) => "updated",
            SubmissionOutcome::Cancelled => "cancelled",
            SubmissionOutcome::Failed(_) => "failed",
        }
    }

    pub fn record(&self) -> Option<&CandidateRecord> {
        match self {
            SubmissionOutcome::Created(record) | SubmissionOutcome::Updated(record) => Some(record),
            SubmissionOutcome::Cancelled | SubmissionOutcome::Failed(_) => None,
        }
    }

    pub fn view(&self) -> SubmissionView {
        SubmissionView {
            status: self.label(),
            record: self.record().cloned(),
            reason: match self {
                SubmissionOutcome::Failed(err) => Some(err.to_string()),
                _ => None,
            },
        }
    }
}

/// Serialisable projection used by the HTTP and CLI surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionView {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CandidateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
