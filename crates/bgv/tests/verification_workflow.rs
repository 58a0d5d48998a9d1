use std::sync::{Arc, Mutex};

use bgv::workflows::verification::form::{
    AddressDetails, Authorization, ContactInfo, Education, IdProof, PersonalInfo, Reference,
};
use bgv::workflows::verification::{
    AddressVerificationForm, CandidateIdentity, CustomerId, EmploymentEntry, FileUpload,
    FormPayload, GapAnswer, InMemoryBlobStore, InMemoryVerificationRepository, NewRecord,
    NoticeTemplate, OutcomeStatus, RecordKind, RecordingNotifier, ServiceSettings, StepUpdate,
    SubmissionMeta, VerificationService, VerificationServiceError, VerificationStatus,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

type Service =
    VerificationService<InMemoryVerificationRepository, InMemoryBlobStore, RecordingNotifier>;

fn started_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn build(now: DateTime<Utc>) -> (Service, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = VerificationService::new(
        Arc::new(InMemoryVerificationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
        notifier.clone(),
        ServiceSettings::default(),
    )
    .with_clock(move || now);
    (service, notifier)
}

fn new_record(kind: RecordKind, code: &str) -> NewRecord {
    NewRecord {
        kind,
        code: code.to_string(),
        customer_id: CustomerId("initech".to_string()),
        company_name: "Initech Services".to_string(),
        identity: CandidateIdentity {
            candidate_name: "Ravi Kumar".to_string(),
            phone: "+91 90000 12345".to_string(),
            email: "ravi.kumar@example.com".to_string(),
        },
    }
}

fn date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn job(company: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> EmploymentEntry {
    EmploymentEntry {
        company_name: company.to_string(),
        designation: "Engineer".to_string(),
        period_from: from,
        period_to: to,
        ..EmploymentEntry::default()
    }
}

fn pdf(slot: &str) -> FileUpload {
    FileUpload::new(slot, format!("{slot}.pdf"), None, b"%PDF-1.7".to_vec())
}

fn collection_gaps(form: &FormPayload) -> Vec<(String, String, Option<bool>, String)> {
    match form {
        FormPayload::DocumentCollection(form) => form
            .gaps
            .iter()
            .map(|gap| (gap.key.clone(), gap.label.clone(), gap.has_gap, gap.reason.clone()))
            .collect(),
        FormPayload::AddressVerification(_) => Vec::new(),
    }
}

fn employments(form: &FormPayload) -> Vec<EmploymentEntry> {
    match form {
        FormPayload::DocumentCollection(form) => form.employments.clone(),
        FormPayload::AddressVerification(_) => Vec::new(),
    }
}

#[tokio::test]
async fn document_collection_keeps_gap_answers_through_timeline_edits() {
    let (service, notifier) = build(started_at());
    let kind = RecordKind::DocumentCollection;
    let record = service
        .create_record(new_record(kind, "DC-900"))
        .expect("record created");
    let link = service.send_link(&record.id).expect("link sent");
    assert!(link.link.ends_with(&format!("/document-collections/{}", link.token)));
    assert_eq!(link.expires_at, started_at() + Duration::days(30));
    assert_eq!(notifier.events()[0].template, NoticeTemplate::LinkIssued);

    let token = link.token;
    let form = service
        .save_step(
            kind,
            &token,
            StepUpdate::Employment(vec![
                job("Globex", date(2016, 7, 1), date(2019, 5, 31)),
                job("Hooli", date(2019, 9, 1), None),
            ]),
        )
        .expect("employments saved");
    let saved = employments(&form);

    let form = service
        .save_step(
            kind,
            &token,
            StepUpdate::GapDetails(vec![
                GapAnswer {
                    key: "educationToEmp1".to_string(),
                    has_gap: Some(false),
                    ..GapAnswer::default()
                },
                GapAnswer {
                    key: "emp1ToEmp2".to_string(),
                    has_gap: Some(true),
                    duration: "3 months".to_string(),
                    reason: "Career break".to_string(),
                },
                GapAnswer {
                    key: "emp2ToCurrent".to_string(),
                    has_gap: Some(false),
                    ..GapAnswer::default()
                },
            ]),
        )
        .expect("gap answers saved");
    assert!(collection_gaps(&form).iter().all(|gap| gap.2.is_some()));

    // Rename the first employer; ids are echoed back as the client would.
    let mut renamed = saved.clone();
    renamed[0].company_name = "Globex India".to_string();
    let form = service
        .save_step(kind, &token, StepUpdate::Employment(renamed.clone()))
        .expect("rename saved");
    let gaps = collection_gaps(&form);
    assert_eq!(gaps[1].1, "Gap between Globex India and Hooli");
    assert_eq!(gaps[1].2, Some(true));
    assert_eq!(gaps[1].3, "Career break");

    // Appending a third employer only opens the new trailing gaps.
    let mut appended = renamed;
    appended.push(job("Umbrella", date(2023, 1, 9), None));
    appended[1].period_to = date(2022, 12, 31);
    let form = service
        .save_step(kind, &token, StepUpdate::Employment(appended))
        .expect("append saved");
    let gaps = collection_gaps(&form);
    assert_eq!(gaps.len(), 4);
    assert_eq!(gaps[1].3, "Career break");
    assert_eq!(gaps[2].0, "emp2ToEmp3");
    assert_eq!(gaps[2].2, None);
    assert_eq!(gaps[3].0, "emp3ToCurrent");

    let form = service
        .save_step(
            kind,
            &token,
            StepUpdate::GapDetails(vec![
                GapAnswer {
                    key: "emp2ToEmp3".to_string(),
                    has_gap: Some(false),
                    ..GapAnswer::default()
                },
                GapAnswer {
                    key: "emp3ToCurrent".to_string(),
                    has_gap: Some(false),
                    ..GapAnswer::default()
                },
            ]),
        )
        .expect("new gaps answered");

    for step in [
        StepUpdate::PersonalInfo(PersonalInfo {
            full_name: "Ravi Kumar".to_string(),
            date_of_birth: date(1992, 11, 4),
            phone: "+91 90000 12345".to_string(),
            email: "ravi.kumar@example.com".to_string(),
            current_address: "22 Residency Road, Bengaluru".to_string(),
            ..PersonalInfo::default()
        }),
        StepUpdate::Education(Education {
            qualification: "B.Tech".to_string(),
            institution: "NIT Trichy".to_string(),
            year_of_passing: Some(2016),
            ..Education::default()
        }),
        StepUpdate::References(vec![Reference {
            name: "Meera Iyer".to_string(),
            phone: "+91 90000 99999".to_string(),
            ..Reference::default()
        }]),
        StepUpdate::Authorization(Authorization {
            consent_background_check: true,
            consent_data_sharing: true,
            declaration_accurate: true,
            title: "Mr".to_string(),
            name: "Ravi Kumar".to_string(),
            date: date(2025, 6, 2),
        }),
    ] {
        service.save_step(kind, &token, step).expect("step saved");
    }

    let view = service.candidate_view(kind, &token).expect("view");
    assert!(view.required_slots.contains(&"relievingLetter".to_string()));
    let results = service
        .upload_documents(
            kind,
            &token,
            view.required_slots.iter().map(|slot| pdf(slot)).collect(),
        )
        .await;
    assert!(results.iter().all(|outcome| outcome.result.is_ok()));

    // The final payload is what the page holds after all the edits.
    let submitted = service
        .submit(kind, &token, view.form_data.clone(), SubmissionMeta::default())
        .expect("submission accepted");
    assert_eq!(submitted.verification_status, VerificationStatus::Completed);
    let gaps = collection_gaps(submitted.form.as_ref().expect("form stored"));
    assert_eq!(gaps, collection_gaps(&form));
    assert_eq!(gaps[1].3, "Career break");

    let approved = service
        .approve(&record.id, Some("Employment history verified"))
        .expect("approved");
    assert_eq!(approved.status, OutcomeStatus::Approved);
}

#[tokio::test]
async fn address_verification_fails_then_resubmits() {
    let (service, notifier) = build(started_at());
    let kind = RecordKind::AddressVerification;
    let record = service
        .create_record(new_record(kind, "AV-900"))
        .expect("record created");
    let first = service.issue_link(&record.id).expect("issued");
    assert_eq!(first.expires_at, started_at() + Duration::hours(24));

    let form = AddressVerificationForm {
        contact: ContactInfo {
            full_name: "Ravi Kumar".to_string(),
            phone: "+91 90000 12345".to_string(),
            ..ContactInfo::default()
        },
        id_proof: IdProof {
            id_type: "pan".to_string(),
            id_number: "ABCDE1234F".to_string(),
        },
        address: AddressDetails {
            line1: "22 Residency Road".to_string(),
            city: "Bengaluru".to_string(),
            state: "Karnataka".to_string(),
            pincode: "560025".to_string(),
            ..AddressDetails::default()
        },
    };

    let slots = [
        "id_proof_one",
        "id_proof_two",
        "house_image_one",
        "house_image_two",
        "signature",
        "selfie",
    ];
    let files = slots.iter().map(|slot| pdf(slot)).collect();
    service.upload_documents(kind, &first.token, files).await;
    service
        .submit(
            kind,
            &first.token,
            FormPayload::AddressVerification(form.clone()),
            SubmissionMeta::default(),
        )
        .expect("submitted");

    let failed = service
        .reject(&record.id, "House images do not match the address")
        .expect("failed");
    assert_eq!(failed.status, OutcomeStatus::Failed);

    let second = service.request_resubmission(&record.id).expect("reopened");
    let err = service
        .candidate_view(kind, &first.token)
        .expect_err("old link dead");
    assert_eq!(err.code(), "token_not_found");

    // Earlier uploads carry over; the candidate replaces only the flagged images.
    for slot in ["house_image_one", "house_image_two"] {
        service
            .upload_document(kind, &second.token, pdf(slot))
            .await
            .expect("replacement uploaded");
    }
    service
        .submit(
            kind,
            &second.token,
            FormPayload::AddressVerification(form),
            SubmissionMeta::default(),
        )
        .expect("resubmitted");
    let verified = service.approve(&record.id, None).expect("verified");
    assert_eq!(verified.status, OutcomeStatus::Verified);
    assert_eq!(verified.review.history.len(), 2);

    let templates: Vec<NoticeTemplate> = notifier
        .events()
        .into_iter()
        .map(|notice| notice.template)
        .collect();
    assert_eq!(
        templates,
        vec![
            NoticeTemplate::SubmissionRejected,
            NoticeTemplate::ResubmissionRequested
        ]
    );
}

#[test]
fn lapsed_links_expire_and_can_be_reissued() {
    let clock = Arc::new(Mutex::new(started_at()));
    let shared = Arc::clone(&clock);
    let service: Service = VerificationService::new(
        Arc::new(InMemoryVerificationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
        Arc::new(RecordingNotifier::default()),
        ServiceSettings::default(),
    )
    .with_clock(move || *shared.lock().expect("clock lock"));
    let advance = |hours: i64| {
        let mut now = clock.lock().expect("clock lock");
        *now = *now + Duration::hours(hours);
    };

    let kind = RecordKind::AddressVerification;
    let record = service
        .create_record(new_record(kind, "AV-901"))
        .expect("created");
    let first = service.issue_link(&record.id).expect("issued");
    service
        .save_step(
            kind,
            &first.token,
            StepUpdate::AddressDetails(AddressVerificationForm::default()),
        )
        .expect("draft saved");

    advance(30);
    assert_eq!(service.expire_stale_links().expect("sweep"), 1);
    let err = service
        .save_step(
            kind,
            &first.token,
            StepUpdate::AddressDetails(AddressVerificationForm::default()),
        )
        .expect_err("lapsed");
    assert!(matches!(err, VerificationServiceError::Token(_)));
    assert_eq!(err.code(), "token_expired");
    assert_eq!(
        service.get(&record.id).expect("stored").verification_status,
        VerificationStatus::Expired
    );

    let second = service.issue_link(&record.id).expect("reissued");
    assert_eq!(
        second.expires_at,
        started_at() + Duration::hours(30) + Duration::hours(24)
    );
    let view = service.candidate_view(kind, &second.token).expect("fresh link works");
    assert_eq!(view.record.verification_status, VerificationStatus::LinkSent);
    assert!(matches!(view.form_data, FormPayload::AddressVerification(_)));
}
