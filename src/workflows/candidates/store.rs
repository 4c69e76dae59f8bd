use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use super::domain::{CandidateId, CandidatePayload, CandidateRecord, NaturalKey};

/// Keyed record store the intake workflow persists through.
///
/// Every call may fail independently; the workflow never retries except for the
/// single government-ID upsert after a lost insert race.
pub trait CandidateStore: Send + Sync {
    fn fetch_by_id(&self, id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError>;
    fn fetch_by_field(
        &self,
        key: NaturalKey,
        value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError>;
    fn insert(&self, payload: CandidatePayload) -> Result<CandidateRecord, StoreError>;
    fn update(
        &self,
        id: &CandidateId,
        payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError>;
    /// Insert, or overwrite the row already holding the payload's `conflict_target` value.
    fn upsert(
        &self,
        payload: CandidatePayload,
        conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError>;
}

impl<S: CandidateStore + ?Sized> CandidateStore for Arc<S> {
    fn fetch_by_id(&self, id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError> {
        (**self).fetch_by_id(id)
    }

    fn fetch_by_field(
        &self,
        key: NaturalKey,
        value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        (**self).fetch_by_field(key, value)
    }

    fn insert(&self, payload: CandidatePayload) -> Result<CandidateRecord, StoreError> {
        (**self).insert(payload)
    }

    fn update(
        &self,
        id: &CandidateId,
        payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError> {
        (**self).update(id, payload)
    }

    fn upsert(
        &self,
        payload: CandidatePayload,
        conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError> {
        (**self).upsert(payload, conflict_target)
    }
}

/// Columns carrying a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueColumn {
    Key(NaturalKey),
    ShortCode,
}

impl From<NaturalKey> for UniqueColumn {
    fn from(value: NaturalKey) -> Self {
        Self::Key(value)
    }
}

impl fmt::Display for UniqueColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueColumn::Key(key) => f.write_str(key.column()),
            UniqueColumn::ShortCode => f.write_str("short_code"),
        }
    }
}

/// Store-originated failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate value for unique column {key}: {message}")]
    UniqueViolation { key: UniqueColumn, message: String },
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_unique_violation_on(&self, target: impl Into<UniqueColumn>) -> bool {
        let target = target.into();
        matches!(self, StoreError::UniqueViolation { key, .. } if *key == target)
    }
}

/// Failure reading or writing a store snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid snapshot data: {0}")]
    Json(#[from] serde_json::Error),
}

/// Process-local store enforcing the government-ID and short-code uniqueness constraints.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCandidateStore {
    records: Arc<Mutex<HashMap<CandidateId, CandidateRecord>>>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        let map = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: Arc::new(Mutex::new(map)),
        }
    }

    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<CandidateRecord> = serde_json::from_reader(reader)?;
        Ok(Self::with_records(records))
    }

    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let records = self.snapshot();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &records)?;
        Ok(())
    }

    /// All rows ordered by creation time, then id.
    pub fn snapshot(&self) -> Vec<CandidateRecord> {
        let guard = match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut records: Vec<_> = guard.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CandidateId, CandidateRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("candidate table lock poisoned".to_string()))
    }
}

fn find_by_key<'a>(
    records: &'a HashMap<CandidateId, CandidateRecord>,
    key: NaturalKey,
    value: &str,
) -> Option<&'a CandidateRecord> {
    records
        .values()
        .find(|record| record.natural_key(key) == Some(value))
}

/// Government ID is checked before short code so a lost registration race is
/// always reported on the government ID.
fn ensure_unique(
    records: &HashMap<CandidateId, CandidateRecord>,
    payload: &CandidatePayload,
    except: Option<&CandidateId>,
) -> Result<(), StoreError> {
    let other = |record: &&CandidateRecord| Some(&record.id) != except;

    if let Some(value) = payload.government_id.as_deref() {
        let holder = records
            .values()
            .filter(other)
            .find(|record| record.government_id.as_deref() == Some(value));
        if let Some(existing) = holder {
            return Err(StoreError::UniqueViolation {
                key: NaturalKey::GovernmentId.into(),
                message: format!(
                    "government_id {value} already belongs to candidate {}",
                    existing.id
                ),
            });
        }
    }

    let code = &payload.short_code;
    if let Some(existing) = records
        .values()
        .filter(other)
        .find(|record| record.short_code == *code)
    {
        return Err(StoreError::UniqueViolation {
            key: UniqueColumn::ShortCode,
            message: format!("short_code {code} already belongs to candidate {}", existing.id),
        });
    }
    Ok(())
}

impl CandidateStore for InMemoryCandidateStore {
    fn fetch_by_id(&self, id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn fetch_by_field(
        &self,
        key: NaturalKey,
        value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(find_by_key(&guard, key, value).cloned())
    }

    fn insert(&self, payload: CandidatePayload) -> Result<CandidateRecord, StoreError> {
        let mut guard = self.lock()?;
        ensure_unique(&guard, &payload, None)?;
        let id = CandidateId(Uuid::new_v4().to_string());
        let record = CandidateRecord::from_payload(id.clone(), payload);
        guard.insert(id, record.clone());
        Ok(record)
    }

    fn update(
        &self,
        id: &CandidateId,
        payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError> {
        let mut guard = self.lock()?;
        ensure_unique(&guard, &payload, Some(id))?;
        let record = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        record.overwrite(payload);
        Ok(record.clone())
    }

    fn upsert(
        &self,
        payload: CandidatePayload,
        conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError> {
        let mut guard = self.lock()?;
        let existing_id = payload
            .natural_key(conflict_target)
            .and_then(|value| find_by_key(&guard, conflict_target, value))
            .map(|record| record.id.clone());

        match existing_id {
            Some(id) => {
                ensure_unique(&guard, &payload, Some(&id))?;
                let record = guard.get_mut(&id).ok_or(StoreError::NotFound)?;
                record.overwrite(payload);
                Ok(record.clone())
            }
            None => {
                ensure_unique(&guard, &payload, None)?;
                let id = CandidateId(Uuid::new_v4().to_string());
                let record = CandidateRecord::from_payload(id.clone(), payload);
                guard.insert(id, record.clone());
                Ok(record)
            }
        }
    }
}
