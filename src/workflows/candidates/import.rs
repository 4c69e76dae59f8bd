use std::io::Read;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::arbitration::ArbitrationDecision;
use super::normalizer::{IdentitySource, RawSubmission};
use super::report::SubmissionOutcome;
use super::service::CandidateIntakeService;
use super::store::CandidateStore;

#[derive(Debug)]
pub enum CandidateImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for CandidateImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateImportError::Io(err) => write!(f, "failed to read candidate import: {}", err),
            CandidateImportError::Csv(err) => write!(f, "invalid candidate CSV data: {}", err),
        }
    }
}

impl std::error::Error for CandidateImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CandidateImportError::Io(err) => Some(err),
            CandidateImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CandidateImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CandidateImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Per-row tally of a batch import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub cancelled: usize,
    pub failed: Vec<ImportFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// 1-based data row, not counting the header.
    pub row: usize,
    pub reason: String,
}

/// Non-interactive batch intake: every probable duplicate gets the same decision.
pub struct CandidateCsvImporter;

impl CandidateCsvImporter {
    pub fn from_path<P, S, I>(
        path: P,
        service: &CandidateIntakeService<S, I>,
        on_match: ArbitrationDecision,
    ) -> Result<ImportSummary, CandidateImportError>
    where
        P: AsRef<Path>,
        S: CandidateStore + 'static,
        I: IdentitySource + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, service, on_match)
    }

    /// Rows are parsed up front so malformed CSV aborts before any write.
    pub fn from_reader<R, S, I>(
        reader: R,
        service: &CandidateIntakeService<S, I>,
        on_match: ArbitrationDecision,
    ) -> Result<ImportSummary, CandidateImportError>
    where
        R: Read,
        S: CandidateStore + 'static,
        I: IdentitySource + 'static,
    {
        let submissions = parse_rows(reader)?;
        let mut summary = ImportSummary {
            rows: submissions.len(),
            ..ImportSummary::default()
        };

        for (index, raw) in submissions.into_iter().enumerate() {
            match service.submit(raw, &on_match) {
                SubmissionOutcome::Created(_) => summary.created += 1,
                SubmissionOutcome::Updated(_) => summary.updated += 1,
                SubmissionOutcome::Cancelled => summary.cancelled += 1,
                SubmissionOutcome::Failed(err) => summary.failed.push(ImportFailure {
                    row: index + 1,
                    reason: err.to_string(),
                }),
            }
        }

        info!(
            rows = summary.rows,
            created = summary.created,
            updated = summary.updated,
            cancelled = summary.cancelled,
            failed = summary.failed.len(),
            on_match = on_match.label(),
            "candidate import finished"
        );
        Ok(summary)
    }
}

fn parse_rows<R: Read>(reader: R) -> Result<Vec<RawSubmission>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, value)| !header.is_empty() && !value.is_empty())
            .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(RawSubmission(fields));
    }

    Ok(rows)
}
