use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::domain::{
    CandidatePayload, CandidateRecord, CandidateSubmission, CustomFields, NaturalKey, VehicleType,
};
use super::service::IntakeError;
use super::store::CandidateStore;

/// A successful write, before it is reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Created(CandidateRecord),
    Updated(CandidateRecord),
}

impl Persisted {
    pub fn record(&self) -> &CandidateRecord {
        match self {
            Persisted::Created(record) | Persisted::Updated(record) => record,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleProfile {
    pub has_vehicle: bool,
    pub vehicle_type: Option<VehicleType>,
}

/// Vehicle columns are derived, never taken from the submission directly.
pub fn derive_vehicle(transportation: Option<&str>) -> VehicleProfile {
    let vehicle_type = transportation.and_then(VehicleType::from_transportation);
    VehicleProfile {
        has_vehicle: vehicle_type.is_some(),
        vehicle_type,
    }
}

/// Shallow keywise overlay: submitted keys win, keys only on the stored record survive.
pub fn merge_custom_fields(
    existing: Option<&CustomFields>,
    submitted: &CustomFields,
) -> CustomFields {
    let mut merged = existing.cloned().unwrap_or_default();
    for (key, value) in submitted {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

pub fn build_insert_payload(
    submission: &CandidateSubmission,
    now: DateTime<Utc>,
) -> CandidatePayload {
    let vehicle = derive_vehicle(submission.transportation.as_deref());
    CandidatePayload {
        short_code: submission.short_code.clone(),
        full_name: submission.full_name.clone(),
        government_id: submission.government_id.clone(),
        email: submission.email.clone(),
        phone_number: submission.phone_number.clone(),
        gender: submission.gender.clone(),
        date_of_birth: submission.date_of_birth,
        nationality: submission.nationality.clone(),
        emergency_contact: submission.emergency_contact.clone(),
        address_business: submission.address_business.clone(),
        address_mailing: submission.address_mailing.clone(),
        profile_photo: submission.profile_photo.clone(),
        custom_fields: merge_custom_fields(None, &submission.custom_fields),
        has_vehicle: vehicle.has_vehicle,
        vehicle_type: vehicle.vehicle_type,
        is_banned: false,
        updated_at: now,
    }
}

/// Core columns come from the submission; the short code, ban flag and any photo
/// the submission leaves empty are kept from the stored record.
pub fn build_update_payload(
    existing: &CandidateRecord,
    submission: &CandidateSubmission,
    now: DateTime<Utc>,
) -> CandidatePayload {
    let vehicle = derive_vehicle(submission.transportation.as_deref());
    CandidatePayload {
        short_code: existing.short_code.clone(),
        full_name: submission.full_name.clone(),
        government_id: submission.government_id.clone(),
        email: submission.email.clone(),
        phone_number: submission.phone_number.clone(),
        gender: submission.gender.clone(),
        date_of_birth: submission.date_of_birth,
        nationality: submission.nationality.clone(),
        emergency_contact: submission.emergency_contact.clone(),
        address_business: submission.address_business.clone(),
        address_mailing: submission.address_mailing.clone(),
        profile_photo: submission
            .profile_photo
            .clone()
            .or_else(|| existing.profile_photo.clone()),
        custom_fields: merge_custom_fields(Some(&existing.custom_fields), &submission.custom_fields),
        has_vehicle: vehicle.has_vehicle,
        vehicle_type: vehicle.vehicle_type,
        is_banned: existing.is_banned,
        updated_at: now,
    }
}

/// Single update keyed by the stored record's id.
pub fn execute_update<S>(
    store: &S,
    existing: &CandidateRecord,
    submission: &CandidateSubmission,
    now: DateTime<Utc>,
) -> Result<Persisted, IntakeError>
where
    S: CandidateStore + ?Sized,
{
    let payload = build_update_payload(existing, submission, now);
    let record = store.update(&existing.id, payload)?;
    info!(candidate_id = %record.id, "candidate updated");
    Ok(Persisted::Updated(record))
}

/// Insert, converting a lost government-ID race into exactly one upsert.
///
/// Any other insert failure, including a uniqueness violation on another column or
/// on a submission without a government ID, is returned with the store's message.
pub fn execute_create<S>(
    store: &S,
    submission: &CandidateSubmission,
    now: DateTime<Utc>,
) -> Result<Persisted, IntakeError>
where
    S: CandidateStore + ?Sized,
{
    let payload = build_insert_payload(submission, now);
    match store.insert(payload.clone()) {
        Ok(record) => {
            info!(candidate_id = %record.id, short_code = %record.short_code, "candidate created");
            Ok(Persisted::Created(record))
        }
        Err(err)
            if err.is_unique_violation_on(NaturalKey::GovernmentId)
                && payload.government_id.is_some() =>
        {
            warn!(error = %err, "insert lost a government ID race, falling back to upsert");
            let record = store.upsert(payload, NaturalKey::GovernmentId)?;
            info!(candidate_id = %record.id, "candidate merged via upsert");
            Ok(Persisted::Updated(record))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::candidates::tests::common::{fixed_now, stored_record, submission};
    use serde_json::json;

    #[test]
    fn vehicle_derivation_only_recognises_car_and_motorcycle() {
        assert_eq!(
            derive_vehicle(Some("Car")),
            VehicleProfile {
                has_vehicle: true,
                vehicle_type: Some(VehicleType::Car)
            }
        );
        assert_eq!(
            derive_vehicle(Some("Motorcycle")).vehicle_type,
            Some(VehicleType::Motorcycle)
        );
        for other in [Some("Bicycle"), Some("car"), Some(""), None] {
            assert_eq!(
                derive_vehicle(other),
                VehicleProfile {
                    has_vehicle: false,
                    vehicle_type: None
                },
                "unexpected vehicle for {other:?}"
            );
        }
    }

    #[test]
    fn merge_keeps_keys_absent_from_submission() {
        let existing = json!({ "race": "Malay", "tshirt_size": "L" });
        let submitted = json!({ "tshirt_size": "M", "height": "172" });
        let merged = merge_custom_fields(
            existing.as_object(),
            submitted.as_object().expect("object"),
        );

        assert_eq!(
            serde_json::Value::Object(merged),
            json!({ "race": "Malay", "tshirt_size": "M", "height": "172" })
        );
    }

    #[test]
    fn merge_without_existing_bag_is_the_submission() {
        let submitted = json!({ "height": "172" });
        let merged = merge_custom_fields(None, submitted.as_object().expect("object"));
        assert_eq!(serde_json::Value::Object(merged), submitted);
    }

    #[test]
    fn update_payload_falls_back_to_stored_photo_and_short_code() {
        let mut existing = stored_record("Ali", Some("900101015555"), None);
        existing.profile_photo = Some("https://cdn.example.com/ali.jpg".to_string());
        existing.is_banned = true;

        let mut incoming = submission("Ali Bin Abu", Some("900101015555"), None);
        incoming.profile_photo = None;
        incoming.transportation = Some("Motorcycle".to_string());

        let payload = build_update_payload(&existing, &incoming, fixed_now());
        assert_eq!(payload.short_code, existing.short_code);
        assert_eq!(payload.profile_photo, existing.profile_photo);
        assert_eq!(payload.full_name, "Ali Bin Abu");
        assert!(payload.is_banned);
        assert!(payload.has_vehicle);
        assert_eq!(payload.vehicle_type, Some(VehicleType::Motorcycle));
    }

    #[test]
    fn update_payload_prefers_submitted_photo() {
        let mut existing = stored_record("Ali", Some("900101015555"), None);
        existing.profile_photo = Some("https://cdn.example.com/old.jpg".to_string());
        let mut incoming = submission("Ali", Some("900101015555"), None);
        incoming.profile_photo = Some("https://cdn.example.com/new.jpg".to_string());

        let payload = build_update_payload(&existing, &incoming, fixed_now());
        assert_eq!(
            payload.profile_photo.as_deref(),
            Some("https://cdn.example.com/new.jpg")
        );
    }

    #[test]
    fn insert_payload_is_never_banned() {
        let payload = build_insert_payload(&submission("Ali", None, None), fixed_now());
        assert!(!payload.is_banned);
        assert!(!payload.has_vehicle);
        assert_eq!(payload.updated_at, fixed_now());
    }
}
