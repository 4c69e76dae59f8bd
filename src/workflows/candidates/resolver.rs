use serde::Serialize;
use tracing::debug;

use super::domain::{CandidateRecord, CandidateSubmission, NaturalKey};
use super::service::IntakeError;
use super::store::CandidateStore;

/// How a submission relates to what the store already holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityResolution {
    NewEntity,
    ConfirmedEdit { record: CandidateRecord },
    AmbiguousMatch { record: CandidateRecord, matched_on: NaturalKey },
}

impl IdentityResolution {
    pub fn label(&self) -> &'static str {
        match self {
            IdentityResolution::NewEntity => "new_entity",
            IdentityResolution::ConfirmedEdit { .. } => "confirmed_edit",
            IdentityResolution::AmbiguousMatch { .. } => "ambiguous_match",
        }
    }
}

/// Natural keys consulted in create mode, in precedence order.
const LOOKUP_ORDER: [NaturalKey; 2] = [NaturalKey::GovernmentId, NaturalKey::Email];

/// Decide whether the submission is new, an explicit edit, or a probable duplicate.
///
/// An explicit id that does not resolve is fatal rather than a silent create. In
/// create mode the government ID is consulted first and its hit wins outright; the
/// email lookup only runs when the government ID is absent or unknown.
pub fn resolve<S>(
    store: &S,
    submission: &CandidateSubmission,
) -> Result<IdentityResolution, IntakeError>
where
    S: CandidateStore + ?Sized,
{
    if let Some(id) = &submission.id {
        let record = store
            .fetch_by_id(id)?
            .ok_or_else(|| IntakeError::NotFound { id: id.clone() })?;
        debug!(candidate_id = %record.id, "resolved explicit edit");
        return Ok(IdentityResolution::ConfirmedEdit { record });
    }

    for key in LOOKUP_ORDER {
        let Some(value) = submission_key(submission, key) else {
            continue;
        };
        if let Some(record) = store.fetch_by_field(key, value)? {
            debug!(candidate_id = %record.id, matched_on = %key, "submission matches existing candidate");
            return Ok(IdentityResolution::AmbiguousMatch {
                record,
                matched_on: key,
            });
        }
    }

    Ok(IdentityResolution::NewEntity)
}

fn submission_key(submission: &CandidateSubmission, key: NaturalKey) -> Option<&str> {
    match key {
        NaturalKey::GovernmentId => submission.government_id.as_deref(),
        NaturalKey::Email => submission.email.as_deref(),
    }
}
