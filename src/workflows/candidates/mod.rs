//! Candidate intake: reconcile a submitted profile against the record store.
//!
//! A submission flows through normalisation, identity resolution, optional operator
//! arbitration, and merge-and-persist before being collapsed into a
//! [`SubmissionOutcome`]. Arbitration is two-phase: [`CandidateIntakeService::stage`]
//! surfaces a probable duplicate and [`CandidateIntakeService::commit`] takes the
//! operator's decision, so nothing blocks while a human answers.

pub mod arbitration;
pub mod domain;
pub mod executor;
pub mod import;
pub mod normalizer;
pub mod report;
pub mod resolver;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use arbitration::{ArbitrationDecision, Confirmation, ConflictPrompt};
pub use domain::{
    Address, CandidateId, CandidatePayload, CandidateRecord, CandidateSubmission, CustomFields,
    EmergencyContact, NaturalKey, ShortCode, VehicleType,
};
pub use executor::{derive_vehicle, merge_custom_fields, Persisted};
pub use import::{CandidateCsvImporter, CandidateImportError, ImportFailure, ImportSummary};
pub use normalizer::{
    IdentitySource, NormalizerDefaults, RawSubmission, SubmissionNormalizer, SystemIdentity,
};
pub use report::{SubmissionOutcome, SubmissionView};
pub use resolver::IdentityResolution;
pub use router::candidate_router;
pub use service::{CandidateIntakeService, IntakeError, StagedSubmission};
pub use store::{CandidateStore, InMemoryCandidateStore, SnapshotError, StoreError, UniqueColumn};
