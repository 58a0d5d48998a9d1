use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::verification::domain::{
    CandidateIdentity, CustomerId, NewRecord, RecordKind, SubmissionRecord,
};
use crate::workflows::verification::form::{
    AddressDetails, AddressVerificationForm, Authorization, ContactInfo, DocumentCollectionForm,
    Education, EmploymentEntry, FormPayload, IdProof, PersonalInfo, Reference,
};
use crate::workflows::verification::gaps::derive_gaps;
use crate::workflows::verification::memory::{
    InMemoryBlobStore, InMemoryVerificationRepository, RecordingNotifier,
};
use crate::workflows::verification::repository::{
    BlobError, BlobStore, CandidateNotice, CandidateNotifier, NotifyError, StoredBlob,
};
use crate::workflows::verification::service::{ServiceSettings, VerificationService};
use crate::workflows::verification::slots::FileUpload;

pub(super) type MemoryService =
    VerificationService<InMemoryVerificationRepository, InMemoryBlobStore, RecordingNotifier>;

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn customer() -> CustomerId {
    CustomerId("acme".to_string())
}

pub(super) fn new_record(kind: RecordKind, code: &str) -> NewRecord {
    NewRecord {
        kind,
        code: code.to_string(),
        customer_id: customer(),
        company_name: "Acme Corporation".to_string(),
        identity: CandidateIdentity {
            candidate_name: "Asha Rao".to_string(),
            phone: "+91 98450 00000".to_string(),
            email: "asha.rao@example.com".to_string(),
        },
    }
}

pub(super) fn record(kind: RecordKind) -> SubmissionRecord {
    SubmissionRecord::create(new_record(kind, "CASE-1"), fixed_now())
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn employment(id: &str, company: &str) -> EmploymentEntry {
    EmploymentEntry {
        id: id.to_string(),
        company_name: company.to_string(),
        designation: "Analyst".to_string(),
        period_from: Some(date(2018, 1, 1)),
        period_to: Some(date(2020, 12, 31)),
        employee_id: format!("{company}-42"),
        reason_for_leaving: "Growth".to_string(),
    }
}

pub(super) fn complete_collection_form(employments: Vec<EmploymentEntry>) -> DocumentCollectionForm {
    let mut gaps = derive_gaps(&employments, &[]);
    for gap in &mut gaps {
        gap.has_gap = Some(false);
    }

    DocumentCollectionForm {
        personal_info: PersonalInfo {
            full_name: "Asha Rao".to_string(),
            father_name: "Mohan Rao".to_string(),
            date_of_birth: Some(date(1994, 3, 12)),
            phone: "+91 98450 00000".to_string(),
            email: "asha.rao@example.com".to_string(),
            current_address: "14 MG Road, Bengaluru".to_string(),
            permanent_address: String::new(),
        },
        education: Education {
            qualification: "B.E.".to_string(),
            institution: "RVCE".to_string(),
            university: "VTU".to_string(),
            year_of_passing: Some(2016),
            grade: "First Class".to_string(),
        },
        employments,
        references: vec![Reference {
            name: "Priya Menon".to_string(),
            relationship: "Manager".to_string(),
            organization: "Globex".to_string(),
            phone: "+91 98860 11111".to_string(),
            email: String::new(),
        }],
        gaps,
        authorization: Authorization {
            consent_background_check: true,
            consent_data_sharing: true,
            declaration_accurate: true,
            title: "Ms".to_string(),
            name: "Asha Rao".to_string(),
            date: Some(date(2025, 3, 10)),
        },
    }
}

pub(super) fn complete_address_form() -> AddressVerificationForm {
    AddressVerificationForm {
        contact: ContactInfo {
            full_name: "Asha Rao".to_string(),
            phone: "+91 98450 00000".to_string(),
            email: "asha.rao@example.com".to_string(),
            alternate_phone: String::new(),
        },
        id_proof: IdProof {
            id_type: "aadhaar".to_string(),
            id_number: "1234 5678 9012".to_string(),
        },
        address: AddressDetails {
            line1: "14 MG Road".to_string(),
            line2: String::new(),
            landmark: "Near Metro".to_string(),
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560001".to_string(),
            residing_since: Some(date(2020, 6, 1)),
            ownership: "rented".to_string(),
        },
    }
}

pub(super) fn collection_payload(employments: Vec<EmploymentEntry>) -> FormPayload {
    FormPayload::DocumentCollection(complete_collection_form(employments))
}

pub(super) fn pdf(slot: &str) -> FileUpload {
    FileUpload::new(slot, format!("{slot}.pdf"), None, b"%PDF-1.4 test".to_vec())
}

pub(super) const COLLECTION_BASE_SLOTS: [&str; 6] = [
    "aadhaar",
    "pan",
    "degreeMarksheet",
    "addressProof",
    "cv",
    "signature",
];

pub(super) const EMPLOYMENT_SLOTS: [&str; 3] = ["relievingLetter", "paySlip", "offerLetter"];

pub(super) const ADDRESS_SLOTS: [&str; 6] = [
    "id_proof_one",
    "id_proof_two",
    "house_image_one",
    "house_image_two",
    "signature",
    "selfie",
];

pub(super) struct Harness {
    pub(super) service: Arc<MemoryService>,
    pub(super) repository: Arc<InMemoryVerificationRepository>,
    pub(super) blobs: Arc<InMemoryBlobStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
}

pub(super) fn harness() -> Harness {
    harness_at(fixed_now())
}

pub(super) fn harness_at(now: DateTime<Utc>) -> Harness {
    let repository = Arc::new(InMemoryVerificationRepository::default());
    let blobs = Arc::new(InMemoryBlobStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = VerificationService::new(
        repository.clone(),
        blobs.clone(),
        notifier.clone(),
        ServiceSettings::default(),
    )
    .with_clock(move || now);
    Harness {
        service: Arc::new(service),
        repository,
        blobs,
        notifier,
    }
}

/// Create a record and issue its link; returns (record, token).
pub(super) fn linked_record(harness: &Harness, kind: RecordKind, code: &str) -> (SubmissionRecord, String) {
    let record = harness
        .service
        .create_record(new_record(kind, code))
        .expect("record created");
    let link = harness.service.issue_link(&record.id).expect("link issued");
    (record, link.token)
}

/// Upload every slot a submission needs.
pub(super) async fn upload_required(
    harness: &Harness,
    kind: RecordKind,
    token: &str,
    with_employment_slots: bool,
) {
    let slots: Vec<&str> = match kind {
        RecordKind::AddressVerification => ADDRESS_SLOTS.to_vec(),
        RecordKind::DocumentCollection if with_employment_slots => COLLECTION_BASE_SLOTS
            .iter()
            .chain(EMPLOYMENT_SLOTS.iter())
            .copied()
            .collect(),
        RecordKind::DocumentCollection => COLLECTION_BASE_SLOTS.to_vec(),
    };
    for slot in slots {
        harness
            .service
            .upload_document(kind, token, pdf(slot))
            .await
            .expect("upload accepted");
    }
}

pub(super) fn later(hours: i64) -> DateTime<Utc> {
    fixed_now() + Duration::hours(hours)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) struct FailingNotifier;

impl CandidateNotifier for FailingNotifier {
    fn notify(&self, _notice: CandidateNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp offline".to_string()))
    }
}

pub(super) struct OfflineBlobStore;

#[async_trait]
impl BlobStore for OfflineBlobStore {
    async fn put(
        &self,
        _storage_key: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<StoredBlob, BlobError> {
        Err(BlobError::Unavailable("bucket unreachable".to_string()))
    }

    async fn delete(&self, storage_key: &str) -> Result<(), BlobError> {
        Err(BlobError::Missing(storage_key.to_string()))
    }
}
