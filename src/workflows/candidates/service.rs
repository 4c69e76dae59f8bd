use std::sync::Arc;

use tracing::{info, warn};

use super::arbitration::{arbitrate, Arbitration, ArbitrationDecision, Confirmation, ConflictPrompt};
use super::domain::{CandidateId, CandidateRecord, CandidateSubmission};
use super::executor::{execute_create, execute_update};
use super::normalizer::{IdentitySource, NormalizerDefaults, RawSubmission, SubmissionNormalizer};
use super::report::{Completion, SubmissionOutcome};
use super::resolver::{resolve, IdentityResolution};
use super::store::{CandidateStore, StoreError};

/// A normalised submission together with its identity resolution.
///
/// Produced by [`CandidateIntakeService::stage`] and consumed by
/// [`CandidateIntakeService::commit`]; staging never writes.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedSubmission {
    pub submission: CandidateSubmission,
    pub resolution: IdentityResolution,
}

impl StagedSubmission {
    /// The question an operator must answer before this can be committed, if any.
    pub fn conflict(&self) -> Option<ConflictPrompt> {
        match &self.resolution {
            IdentityResolution::AmbiguousMatch { record, matched_on } => {
                Some(ConflictPrompt::for_match(record, *matched_on))
            }
            _ => None,
        }
    }
}

/// Service composing the normalizer, resolver, arbitrator and executor.
pub struct CandidateIntakeService<S, I> {
    store: Arc<S>,
    identity: Arc<I>,
    normalizer: SubmissionNormalizer,
}

impl<S, I> CandidateIntakeService<S, I>
where
    S: CandidateStore + 'static,
    I: IdentitySource + 'static,
{
    pub fn new(store: Arc<S>, identity: Arc<I>, defaults: NormalizerDefaults) -> Self {
        Self {
            store,
            identity,
            normalizer: SubmissionNormalizer::new(defaults),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Phase one: normalise and resolve identity without touching the store's rows.
    pub fn stage(&self, raw: RawSubmission) -> Result<StagedSubmission, IntakeError> {
        let submission = self.normalizer.normalize(raw, self.identity.as_ref());
        let resolution = resolve(self.store.as_ref(), &submission)?;
        Ok(StagedSubmission {
            submission,
            resolution,
        })
    }

    /// Phase two: persist a staged submission.
    ///
    /// `decision` is only consulted for an ambiguous match; committing one without a
    /// decision fails with [`IntakeError::ArbitrationRequired`] and writes nothing.
    pub fn commit(
        &self,
        staged: StagedSubmission,
        decision: Option<ArbitrationDecision>,
    ) -> SubmissionOutcome {
        let outcome = SubmissionOutcome::report(self.execute(staged, decision));
        match &outcome {
            SubmissionOutcome::Failed(err) => warn!(error = %err, "candidate submission failed"),
            other => info!(outcome = other.label(), "candidate submission finished"),
        }
        outcome
    }

    /// Run the whole pipeline, asking `confirmation` when a probable duplicate is found.
    pub fn submit<C>(&self, raw: RawSubmission, confirmation: &C) -> SubmissionOutcome
    where
        C: Confirmation + ?Sized,
    {
        let staged = match self.stage(raw) {
            Ok(staged) => staged,
            Err(err) => return self.commit_failure(err),
        };
        let decision = staged
            .conflict()
            .map(|prompt| ArbitrationDecision::from(confirmation.confirm(&prompt)));
        self.commit(staged, decision)
    }

    pub fn get(&self, id: &CandidateId) -> Result<CandidateRecord, IntakeError> {
        self.store
            .fetch_by_id(id)?
            .ok_or_else(|| IntakeError::NotFound { id: id.clone() })
    }

    fn execute(
        &self,
        staged: StagedSubmission,
        decision: Option<ArbitrationDecision>,
    ) -> Result<Completion, IntakeError> {
        let now = self.identity.now();
        let StagedSubmission {
            submission,
            resolution,
        } = staged;

        let existing = match resolution {
            IdentityResolution::NewEntity => {
                return execute_create(self.store.as_ref(), &submission, now).map(Into::into);
            }
            IdentityResolution::ConfirmedEdit { record } => record,
            IdentityResolution::AmbiguousMatch { record, matched_on } => {
                let Some(decision) = decision else {
                    return Err(IntakeError::ArbitrationRequired {
                        prompt: ConflictPrompt::for_match(&record, matched_on),
                    });
                };
                info!(candidate_id = %record.id, decision = decision.label(), "arbitrated duplicate");
                match arbitrate(record, decision) {
                    Arbitration::UpdateExisting(record) => record,
                    Arbitration::Cancelled => return Ok(Completion::Cancelled),
                }
            }
        };

        execute_update(self.store.as_ref(), &existing, &submission, now).map(Into::into)
    }

    fn commit_failure(&self, err: IntakeError) -> SubmissionOutcome {
        warn!(error = %err, "candidate submission failed");
        SubmissionOutcome::Failed(err)
    }
}

/// Error raised by the intake workflow.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("candidate {id} not found")]
    NotFound { id: CandidateId },
    #[error("operator decision required: {prompt}")]
    ArbitrationRequired { prompt: ConflictPrompt },
    #[error(transparent)]
    Store(#[from] StoreError),
}
