use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::domain::{
    Address, CandidateId, CandidateSubmission, CustomFields, EmergencyContact, ShortCode,
};

/// Raw, untrusted field map as submitted by a form, API client or CSV row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSubmission(pub Map<String, Value>);

impl RawSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
}

impl From<Map<String, Value>> for RawSubmission {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Source of generated short codes and timestamps.
pub trait IdentitySource: Send + Sync {
    fn short_code(&self) -> ShortCode;
    fn now(&self) -> DateTime<Utc>;
}

/// Thread-local RNG and the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentity;

impl IdentitySource for SystemIdentity {
    fn short_code(&self) -> ShortCode {
        ShortCode::generate(&mut rand::rng())
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Best-effort defaults applied when a submission leaves fields blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizerDefaults {
    pub country_code: String,
    pub nationality: String,
}

impl Default for NormalizerDefaults {
    fn default() -> Self {
        Self {
            country_code: "MY".to_string(),
            nationality: "Malaysian".to_string(),
        }
    }
}

const LANGUAGE_ALIASES: &[(&str, &str)] = &[("chinese", "Mandarin")];

const ADDRESS_PARTS: [&str; 5] = ["street", "city", "state", "postcode", "country_code"];

/// Keys pulled into first-class submission fields; anything else is a custom field.
const RECOGNISED_KEYS: &[&str] = &[
    "id",
    "short_code",
    "full_name",
    "government_id",
    "email",
    "phone_number",
    "gender",
    "date_of_birth",
    "nationality",
    "emergency_contact_name",
    "emergency_contact_number",
    "use_business_address",
    "transportation",
    "spoken_languages",
    "profile_photo",
    "full_body_photos",
    "half_body_photos",
];

/// Cleans and defaults raw submissions. Pure apart from the identity source.
#[derive(Debug, Clone, Default)]
pub struct SubmissionNormalizer {
    defaults: NormalizerDefaults,
}

impl SubmissionNormalizer {
    pub fn new(defaults: NormalizerDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &NormalizerDefaults {
        &self.defaults
    }

    pub fn normalize<I>(&self, raw: RawSubmission, identity: &I) -> CandidateSubmission
    where
        I: IdentitySource + ?Sized,
    {
        let mut fields = raw.0;

        let id = take_text(&mut fields, "id").map(CandidateId);
        let short_code = take_text(&mut fields, "short_code")
            .map(ShortCode)
            .unwrap_or_else(|| identity.short_code());
        let full_name = take_text(&mut fields, "full_name").unwrap_or_default();
        let government_id = take_text(&mut fields, "government_id")
            .as_deref()
            .and_then(clean_government_id);
        let email = take_text(&mut fields, "email");
        let phone_number = take_text(&mut fields, "phone_number");
        let gender = take_text(&mut fields, "gender");
        let date_of_birth = take_text(&mut fields, "date_of_birth")
            .and_then(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d").ok());
        let nationality = take_text(&mut fields, "nationality")
            .or_else(|| Some(self.defaults.nationality.clone()));
        let emergency_contact = EmergencyContact {
            name: take_text(&mut fields, "emergency_contact_name"),
            number: take_text(&mut fields, "emergency_contact_number"),
        };

        let use_business_address = take_flag(&mut fields, "use_business_address").unwrap_or(true);
        let address_business = self.take_address(&mut fields, "business");
        let mut address_mailing = self.take_address(&mut fields, "mailing");
        if use_business_address && address_mailing.is_empty() {
            address_mailing = address_business.clone();
        }

        let transportation = take_text(&mut fields, "transportation");
        let spoken_languages = fields
            .remove("spoken_languages")
            .map(|value| normalize_languages(&value))
            .unwrap_or_default();
        let profile_photo = take_text(&mut fields, "profile_photo");
        let full_body_photos = take_photo_list(&mut fields, "full_body_photos");
        let half_body_photos = take_photo_list(&mut fields, "half_body_photos");

        let mut custom_fields: CustomFields = fields
            .into_iter()
            .filter(|(key, value)| !value.is_null() && !RECOGNISED_KEYS.contains(&key.as_str()))
            .collect();
        // Always written, blank when omitted, to stay in step with the derived vehicle columns.
        custom_fields.insert(
            "transportation".to_string(),
            Value::from(transportation.clone().unwrap_or_default()),
        );
        if !spoken_languages.is_empty() {
            custom_fields.insert(
                "spoken_languages".to_string(),
                Value::from(spoken_languages.join(", ")),
            );
        }
        if !full_body_photos.is_empty() {
            custom_fields.insert("full_body_photos".to_string(), Value::from(full_body_photos));
        }
        if !half_body_photos.is_empty() {
            custom_fields.insert("half_body_photos".to_string(), Value::from(half_body_photos));
        }

        CandidateSubmission {
            id,
            short_code,
            full_name,
            government_id,
            email,
            phone_number,
            gender,
            date_of_birth,
            nationality,
            emergency_contact,
            address_business,
            address_mailing,
            transportation,
            spoken_languages,
            profile_photo,
            custom_fields,
        }
    }

    fn take_address(&self, fields: &mut Map<String, Value>, suffix: &str) -> Address {
        let [street, city, state, postcode, country_code] =
            ADDRESS_PARTS.map(|part| take_text(fields, &format!("{part}_{suffix}")));
        let mut address = Address {
            street,
            city,
            state,
            postcode,
            country_code,
        };
        if !address.is_empty() && address.country_code.is_none() {
            address.country_code = Some(self.defaults.country_code.clone());
        }
        address
    }
}

/// Drop separator characters; an ID that is blank afterwards is treated as absent.
pub fn clean_government_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' ' | '\t'))
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Split a comma-separated (or JSON array) language list and canonicalise aliases.
pub fn normalize_languages(value: &Value) -> Vec<String> {
    let entries: Vec<String> = match value {
        Value::String(text) => text.split(',').map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let mut languages: Vec<String> = Vec::new();
    for entry in entries {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        let canonical = LANGUAGE_ALIASES
            .iter()
            .find(|(alias, _)| trimmed.eq_ignore_ascii_case(alias))
            .map(|(_, canonical)| (*canonical).to_string())
            .unwrap_or_else(|| trimmed.to_string());
        if !languages.contains(&canonical) {
            languages.push(canonical);
        }
    }
    languages
}

fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    let text = match fields.remove(key)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn take_flag(fields: &mut Map<String, Value>, key: &str) -> Option<bool> {
    match fields.remove(key)? {
        Value::Bool(flag) => Some(flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn take_photo_list(fields: &mut Map<String, Value>, key: &str) -> Vec<String> {
    let items = match fields.remove(key) {
        Some(Value::Array(items)) => items,
        Some(Value::String(single)) => vec![Value::String(single)],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(url) if !url.trim().is_empty() => Some(url.trim().to_string()),
            _ => None,
        })
        .collect()
}
