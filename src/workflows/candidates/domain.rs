use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open-ended attribute bag for fields not promoted to first-class columns.
pub type CustomFields = Map<String, Value>;

/// Opaque, store-generated identifier for a persisted candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable short code shown to operators, e.g. `k04217`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(pub String);

impl ShortCode {
    /// One random lowercase letter followed by five zero-padded digits.
    ///
    /// Not globally unique; the store rejects collisions.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let prefix = char::from(b'a' + rng.random_range(0..26u8));
        let number: u32 = rng.random_range(0..100_000);
        Self(format!("{prefix}{number:05}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business-meaningful columns used to recognise the same real-world person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaturalKey {
    GovernmentId,
    Email,
}

impl NaturalKey {
    pub const fn column(self) -> &'static str {
        match self {
            NaturalKey::GovernmentId => "government_id",
            NaturalKey::Email => "email",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            NaturalKey::GovernmentId => "government ID",
            NaturalKey::Email => "email",
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.postcode.is_none()
            && self.country_code.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: Option<String>,
    pub number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleType {
    Car,
    Motorcycle,
}

impl VehicleType {
    /// Exact, case-sensitive match on the transportation mode.
    pub fn from_transportation(mode: &str) -> Option<Self> {
        match mode {
            "Car" => Some(Self::Car),
            "Motorcycle" => Some(Self::Motorcycle),
            _ => None,
        }
    }
}

/// Cleaned candidate profile ready for identity resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSubmission {
    /// Present only when editing a known record.
    pub id: Option<CandidateId>,
    pub short_code: ShortCode,
    pub full_name: String,
    pub government_id: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub emergency_contact: EmergencyContact,
    pub address_business: Address,
    pub address_mailing: Address,
    pub transportation: Option<String>,
    pub spoken_languages: Vec<String>,
    pub profile_photo: Option<String>,
    pub custom_fields: CustomFields,
}

impl CandidateSubmission {
    pub fn is_edit(&self) -> bool {
        self.id.is_some()
    }
}

/// Column set written by insert, update and upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub short_code: ShortCode,
    pub full_name: String,
    pub government_id: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub emergency_contact: EmergencyContact,
    pub address_business: Address,
    pub address_mailing: Address,
    pub profile_photo: Option<String>,
    pub custom_fields: CustomFields,
    pub has_vehicle: bool,
    pub vehicle_type: Option<VehicleType>,
    pub is_banned: bool,
    pub updated_at: DateTime<Utc>,
}

impl CandidatePayload {
    pub fn natural_key(&self, key: NaturalKey) -> Option<&str> {
        match key {
            NaturalKey::GovernmentId => self.government_id.as_deref(),
            NaturalKey::Email => self.email.as_deref(),
        }
    }
}

/// Persisted candidate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub short_code: ShortCode,
    pub full_name: String,
    pub government_id: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub emergency_contact: EmergencyContact,
    pub address_business: Address,
    pub address_mailing: Address,
    pub profile_photo: Option<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
    pub has_vehicle: bool,
    pub vehicle_type: Option<VehicleType>,
    #[serde(default)]
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateRecord {
    /// Materialise a new row from a payload.
    pub fn from_payload(id: CandidateId, payload: CandidatePayload) -> Self {
        let created_at = payload.updated_at;
        let mut record = Self {
            id,
            short_code: payload.short_code.clone(),
            full_name: String::new(),
            government_id: None,
            email: None,
            phone_number: None,
            gender: None,
            date_of_birth: None,
            nationality: None,
            emergency_contact: EmergencyContact::default(),
            address_business: Address::default(),
            address_mailing: Address::default(),
            profile_photo: None,
            custom_fields: CustomFields::new(),
            has_vehicle: false,
            vehicle_type: None,
            is_banned: payload.is_banned,
            created_at,
            updated_at: created_at,
        };
        record.overwrite(payload);
        record
    }

    /// Replace every payload column, leaving `id`, `created_at` and
    /// `is_banned` as stored.
    pub fn overwrite(&mut self, payload: CandidatePayload) {
        self.short_code = payload.short_code;
        self.full_name = payload.full_name;
        self.government_id = payload.government_id;
        self.email = payload.email;
        self.phone_number = payload.phone_number;
        self.gender = payload.gender;
        self.date_of_birth = payload.date_of_birth;
        self.nationality = payload.nationality;
        self.emergency_contact = payload.emergency_contact;
        self.address_business = payload.address_business;
        self.address_mailing = payload.address_mailing;
        self.profile_photo = payload.profile_photo;
        self.custom_fields = payload.custom_fields;
        self.has_vehicle = payload.has_vehicle;
        self.vehicle_type = payload.vehicle_type;
        self.updated_at = payload.updated_at;
    }

    pub fn natural_key(&self, key: NaturalKey) -> Option<&str> {
        match key {
            NaturalKey::GovernmentId => self.government_id.as_deref(),
            NaturalKey::Email => self.email.as_deref(),
        }
    }
}
