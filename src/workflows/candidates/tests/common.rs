use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::candidates::domain::{
    Address, CandidateId, CandidatePayload, CandidateRecord, CandidateSubmission, CustomFields,
    EmergencyContact, NaturalKey, ShortCode,
};
use crate::workflows::candidates::executor::build_insert_payload;
use crate::workflows::candidates::normalizer::{IdentitySource, NormalizerDefaults, RawSubmission};
use crate::workflows::candidates::service::CandidateIntakeService;
use crate::workflows::candidates::store::{CandidateStore, InMemoryCandidateStore, StoreError};

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Deterministic clock and short codes issued in sequence from `q12345`.
#[derive(Default)]
pub(crate) struct FixedIdentity {
    repeat: Option<&'static str>,
    issued: AtomicUsize,
}

impl FixedIdentity {
    /// Hands out the same code every time.
    pub(crate) fn repeating(code: &'static str) -> Self {
        Self {
            repeat: Some(code),
            issued: AtomicUsize::new(0),
        }
    }
}

impl IdentitySource for FixedIdentity {
    fn short_code(&self) -> ShortCode {
        let serial = self.issued.fetch_add(1, Ordering::SeqCst);
        match self.repeat {
            Some(code) => ShortCode(code.to_string()),
            None => ShortCode(format!("q{:05}", 12345 + serial)),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        fixed_now()
    }
}

pub(crate) fn raw(value: Value) -> RawSubmission {
    match value {
        Value::Object(map) => RawSubmission(map),
        other => panic!("raw submissions are objects, got {other}"),
    }
}

pub(crate) fn submission(
    name: &str,
    government_id: Option<&str>,
    email: Option<&str>,
) -> CandidateSubmission {
    CandidateSubmission {
        id: None,
        short_code: code_for(name),
        full_name: name.to_string(),
        government_id: government_id.map(str::to_string),
        email: email.map(str::to_string),
        phone_number: Some("+60123456789".to_string()),
        gender: Some("male".to_string()),
        date_of_birth: None,
        nationality: Some("Malaysian".to_string()),
        emergency_contact: EmergencyContact::default(),
        address_business: Address::default(),
        address_mailing: Address::default(),
        transportation: None,
        spoken_languages: Vec::new(),
        profile_photo: None,
        custom_fields: CustomFields::new(),
    }
}

/// Stable per-name code so seeded rows never share one.
fn code_for(name: &str) -> ShortCode {
    let hash = name
        .bytes()
        .fold(0u64, |acc, byte| acc.wrapping_mul(31).wrapping_add(u64::from(byte)));
    ShortCode(format!("t{:05}", hash % 100_000))
}

pub(crate) fn payload(
    name: &str,
    government_id: Option<&str>,
    email: Option<&str>,
) -> CandidatePayload {
    build_insert_payload(&submission(name, government_id, email), fixed_now())
}

pub(crate) fn stored_record(
    name: &str,
    government_id: Option<&str>,
    email: Option<&str>,
) -> CandidateRecord {
    let slug = name.to_ascii_lowercase().replace(' ', "-");
    CandidateRecord::from_payload(
        CandidateId(format!("cand-{slug}")),
        payload(name, government_id, email),
    )
}

pub(crate) fn build_service() -> (
    CandidateIntakeService<InMemoryCandidateStore, FixedIdentity>,
    Arc<InMemoryCandidateStore>,
) {
    let store = Arc::new(InMemoryCandidateStore::new());
    let service = CandidateIntakeService::new(
        store.clone(),
        Arc::new(FixedIdentity::default()),
        NormalizerDefaults::default(),
    );
    (service, store)
}

pub(crate) fn service_over<S: CandidateStore + 'static>(
    store: Arc<S>,
) -> CandidateIntakeService<S, FixedIdentity> {
    CandidateIntakeService::new(
        store,
        Arc::new(FixedIdentity::default()),
        NormalizerDefaults::default(),
    )
}

/// Counts every mutating call reaching the wrapped store.
#[derive(Default)]
pub(crate) struct CountingStore {
    pub(crate) inner: InMemoryCandidateStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn seeded(records: Vec<CandidateRecord>) -> Self {
        Self {
            inner: InMemoryCandidateStore::with_records(records),
            writes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CandidateStore for CountingStore {
    fn fetch_by_id(&self, id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError> {
        self.inner.fetch_by_id(id)
    }

    fn fetch_by_field(
        &self,
        key: NaturalKey,
        value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        self.inner.fetch_by_field(key, value)
    }

    fn insert(&self, payload: CandidatePayload) -> Result<CandidateRecord, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(payload)
    }

    fn update(
        &self,
        id: &CandidateId,
        payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, payload)
    }

    fn upsert(
        &self,
        payload: CandidatePayload,
        conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(payload, conflict_target)
    }
}

/// Lets a competing writer land a colliding row just before the first insert.
pub(crate) struct RacingStore {
    pub(crate) inner: InMemoryCandidateStore,
    competitor: CandidatePayload,
    raced: AtomicBool,
    pub(crate) upserts: AtomicUsize,
    fail_upsert: bool,
}

impl RacingStore {
    pub(crate) fn new(competitor: CandidatePayload) -> Self {
        Self {
            inner: InMemoryCandidateStore::new(),
            competitor,
            raced: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
            fail_upsert: false,
        }
    }

    pub(crate) fn failing_upsert(competitor: CandidatePayload) -> Self {
        Self {
            fail_upsert: true,
            ..Self::new(competitor)
        }
    }
}

impl CandidateStore for RacingStore {
    fn fetch_by_id(&self, id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError> {
        self.inner.fetch_by_id(id)
    }

    fn fetch_by_field(
        &self,
        key: NaturalKey,
        value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        self.inner.fetch_by_field(key, value)
    }

    fn insert(&self, payload: CandidatePayload) -> Result<CandidateRecord, StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.insert(self.competitor.clone())?;
        }
        self.inner.insert(payload)
    }

    fn update(
        &self,
        id: &CandidateId,
        payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError> {
        self.inner.update(id, payload)
    }

    fn upsert(
        &self,
        payload: CandidatePayload,
        conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert {
            return Err(StoreError::Unavailable("upsert rejected".to_string()));
        }
        self.inner.upsert(payload, conflict_target)
    }
}

pub(crate) struct UnavailableStore;

impl CandidateStore for UnavailableStore {
    fn fetch_by_id(&self, _id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn fetch_by_field(
        &self,
        _key: NaturalKey,
        _value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn insert(&self, _payload: CandidatePayload) -> Result<CandidateRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _id: &CandidateId,
        _payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn upsert(
        &self,
        _payload: CandidatePayload,
        _conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Empty store whose inserts always fail with the given error.
pub(crate) struct RejectingInsertStore {
    pub(crate) error: StoreError,
    pub(crate) upserts: AtomicUsize,
}

impl RejectingInsertStore {
    pub(crate) fn new(error: StoreError) -> Self {
        Self {
            error,
            upserts: AtomicUsize::new(0),
        }
    }
}

impl CandidateStore for RejectingInsertStore {
    fn fetch_by_id(&self, _id: &CandidateId) -> Result<Option<CandidateRecord>, StoreError> {
        Ok(None)
    }

    fn fetch_by_field(
        &self,
        _key: NaturalKey,
        _value: &str,
    ) -> Result<Option<CandidateRecord>, StoreError> {
        Ok(None)
    }

    fn insert(&self, _payload: CandidatePayload) -> Result<CandidateRecord, StoreError> {
        Err(self.error.clone())
    }

    fn update(
        &self,
        _id: &CandidateId,
        _payload: CandidatePayload,
    ) -> Result<CandidateRecord, StoreError> {
        Err(StoreError::NotFound)
    }

    fn upsert(
        &self,
        _payload: CandidatePayload,
        _conflict_target: NaturalKey,
    ) -> Result<CandidateRecord, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("unexpected upsert".to_string()))
    }
}
