use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::domain::{CandidateId, CandidateRecord, NaturalKey};

/// Operator answer to "a matching candidate exists, update it?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationDecision {
    Accept,
    Decline,
}

impl ArbitrationDecision {
    pub const fn label(self) -> &'static str {
        match self {
            ArbitrationDecision::Accept => "accept",
            ArbitrationDecision::Decline => "decline",
        }
    }
}

impl From<bool> for ArbitrationDecision {
    fn from(accepted: bool) -> Self {
        if accepted {
            Self::Accept
        } else {
            Self::Decline
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown arbitration decision '{0}' (expected accept or decline)")]
pub struct UnknownDecision(pub String);

impl FromStr for ArbitrationDecision {
    type Err = UnknownDecision;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accept" | "yes" | "update" => Ok(Self::Accept),
            "decline" | "no" | "skip" => Ok(Self::Decline),
            _ => Err(UnknownDecision(value.to_string())),
        }
    }
}

/// The single yes/no question put to an operator about a probable duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictPrompt {
    pub matched_record_id: CandidateId,
    pub matched_on: NaturalKey,
    pub message: String,
}

impl ConflictPrompt {
    pub fn for_match(record: &CandidateRecord, matched_on: NaturalKey) -> Self {
        Self {
            matched_record_id: record.id.clone(),
            matched_on,
            message: format!(
                "A candidate with this {} already exists. Do you want to update their details?",
                matched_on.label()
            ),
        }
    }
}

impl fmt::Display for ConflictPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Caller-supplied capability that answers a [`ConflictPrompt`].
pub trait Confirmation {
    fn confirm(&self, prompt: &ConflictPrompt) -> bool;
}

impl Confirmation for ArbitrationDecision {
    fn confirm(&self, _prompt: &ConflictPrompt) -> bool {
        matches!(self, ArbitrationDecision::Accept)
    }
}

impl<F> Confirmation for F
where
    F: Fn(&ConflictPrompt) -> bool,
{
    fn confirm(&self, prompt: &ConflictPrompt) -> bool {
        self(prompt)
    }
}

/// Where an ambiguous match goes once the operator has answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Arbitration {
    UpdateExisting(CandidateRecord),
    Cancelled,
}

pub fn arbitrate(record: CandidateRecord, decision: ArbitrationDecision) -> Arbitration {
    match decision {
        ArbitrationDecision::Accept => Arbitration::UpdateExisting(record),
        ArbitrationDecision::Decline => Arbitration::Cancelled,
    }
}
