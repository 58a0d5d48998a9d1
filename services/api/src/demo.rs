use bgv::error::AppError;
use bgv::workflows::verification::form::{Authorization, Education, PersonalInfo, Reference};
use bgv::workflows::verification::{
    CandidateIdentity, CustomerId, EmploymentEntry, FileUpload, FormPayload, GapAnswer,
    InMemoryBlobStore, InMemoryVerificationRepository, NewRecord, RecordKind, RecordingNotifier,
    ServiceSettings, StepUpdate, SubmissionMeta, TokenError, VerificationService,
    VerificationServiceError,
};
use chrono::{Local, NaiveDate};
use clap::Args;
use std::sync::Arc;

type DemoService =
    VerificationService<InMemoryVerificationRepository, InMemoryBlobStore, RecordingNotifier>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Customer the demo records are created under.
    #[arg(long, default_value = "acme-corp")]
    pub(crate) customer_id: String,
    /// Reject the submission and reopen it instead of approving.
    #[arg(long)]
    pub(crate) reject: bool,
}

const REQUIRED_UPLOADS: [&str; 9] = [
    "aadhaar",
    "pan",
    "degreeMarksheet",
    "addressProof",
    "cv",
    "signature",
    "relievingLetter",
    "paySlip",
    "offerLetter",
];

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        customer_id,
        reject,
    } = args;
    let customer = CustomerId(customer_id);
    let notifier = Arc::new(RecordingNotifier::default());
    let service: DemoService = VerificationService::new(
        Arc::new(InMemoryVerificationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
        notifier.clone(),
        ServiceSettings::default(),
    );

    println!("Background verification demo ({})", customer);
    let bank_statement = service.add_document_type(&customer, "Bank Statement", false)?;
    println!(
        "- Custom document type '{}' registered as key '{}'",
        bank_statement.label, bank_statement.key
    );

    let primary = service.create_record(demo_record(
        &customer,
        "DC-1001",
        "Asha Rao",
        "asha.rao@example.com",
    ))?;
    let unreachable =
        service.create_record(demo_record(&customer, "DC-1002", "Vikram Shah", ""))?;
    println!(
        "- Created {} and {} ({})",
        primary.code,
        unreachable.code,
        primary.verification_status.label()
    );

    let report = service.send_all_links(&customer)?;
    println!(
        "- Bulk link send: {} sent, {} failed",
        report.sent_count, report.failed_count
    );
    for failure in &report.errors {
        println!("    - {} [{}]: {}", failure.record_id, failure.code, failure.reason);
    }

    let token = service
        .get(&primary.id)?
        .verification_token
        .ok_or(VerificationServiceError::Token(TokenError::NotFound))?;

    fill_form(&service, &token)?;
    upload_documents(&service, &token).await;

    let form_data = service
        .candidate_view(RecordKind::DocumentCollection, &token)?
        .form_data;
    let meta = SubmissionMeta {
        ip: Some("127.0.0.1".to_string()),
        user_agent: Some("bgv-api demo".to_string()),
    };
    let submitted = service.submit(RecordKind::DocumentCollection, &token, form_data, meta)?;
    println!(
        "- Candidate submitted: workflow {}",
        submitted.verification_status.label()
    );

    match service.save_step(
        RecordKind::DocumentCollection,
        &token,
        StepUpdate::References(Vec::new()),
    ) {
        Ok(_) => println!("  Unexpected: completed record accepted an edit"),
        Err(err) => println!("  Further candidate edits refused: {}", err),
    }

    if reject {
        let rejected = service.reject(&primary.id, "Pay slip is illegible, please re-upload")?;
        println!("- Reviewer decision: {}", rejected.status.label());
        let link = service.request_resubmission(&primary.id)?;
        println!("- Resubmission link issued: {}", link.link);
    } else {
        let approved = service.approve(&primary.id, Some("All documents verified"))?;
        println!("- Reviewer decision: {}", approved.status.label());
    }

    println!("\nCompany roll-up");
    for summary in service.company_summaries(None)? {
        println!(
            "- {} ({}): total {} | completed {} | approved {} | rejected {} | not initiated {}",
            summary.company_name,
            summary.customer_id,
            summary.total,
            summary.completed,
            summary.approved,
            summary.rejected,
            summary.not_initiated
        );
    }

    let events = notifier.events();
    if events.is_empty() {
        println!("\nCandidate notices: none dispatched");
    } else {
        println!("\nCandidate notices:");
        for notice in events {
            println!(
                "- {:?} -> {} ({})",
                notice.template, notice.recipient, notice.record_id
            );
        }
    }

    Ok(())
}

fn demo_record(customer: &CustomerId, code: &str, name: &str, email: &str) -> NewRecord {
    NewRecord {
        kind: RecordKind::DocumentCollection,
        code: code.to_string(),
        customer_id: customer.clone(),
        company_name: "Acme Corporation".to_string(),
        identity: CandidateIdentity {
            candidate_name: name.to_string(),
            phone: "+91 98450 00000".to_string(),
            email: email.to_string(),
        },
    }
}

fn fill_form(service: &DemoService, token: &str) -> Result<(), VerificationServiceError> {
    let kind = RecordKind::DocumentCollection;
    service.save_step(
        kind,
        token,
        StepUpdate::PersonalInfo(PersonalInfo {
            full_name: "Asha Rao".to_string(),
            father_name: "Mohan Rao".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1994, 3, 12),
            phone: "+91 98450 00000".to_string(),
            email: "asha.rao@example.com".to_string(),
            current_address: "14 MG Road, Bengaluru".to_string(),
            permanent_address: "14 MG Road, Bengaluru".to_string(),
        }),
    )?;
    service.save_step(
        kind,
        token,
        StepUpdate::Education(Education {
            qualification: "B.E. Computer Science".to_string(),
            institution: "RV College of Engineering".to_string(),
            university: "VTU".to_string(),
            year_of_passing: Some(2016),
            grade: "First Class".to_string(),
        }),
    )?;

    let form = service.save_step(
        kind,
        token,
        StepUpdate::Employment(vec![
            employment("Globex", "Analyst", (2016, 7, 1), Some((2019, 5, 31))),
            employment("Initech", "Senior Analyst", (2019, 8, 1), None),
        ]),
    )?;
    let gap_keys: Vec<String> = match &form {
        FormPayload::DocumentCollection(form) => {
            println!("- Derived employment gaps:");
            for gap in &form.gaps {
                println!("    - {} ({})", gap.label, gap.key);
            }
            form.gaps.iter().map(|gap| gap.key.clone()).collect()
        }
        FormPayload::AddressVerification(_) => Vec::new(),
    };

    let answers = gap_keys
        .into_iter()
        .map(|key| {
            let has_gap = key == "emp1ToEmp2";
            GapAnswer {
                key,
                has_gap: Some(has_gap),
                duration: if has_gap { "2 months".to_string() } else { String::new() },
                reason: if has_gap { "Relocation".to_string() } else { String::new() },
            }
        })
        .collect();
    service.save_step(kind, token, StepUpdate::GapDetails(answers))?;

    service.save_step(
        kind,
        token,
        StepUpdate::References(vec![Reference {
            name: "Priya Menon".to_string(),
            relationship: "Former manager".to_string(),
            organization: "Globex".to_string(),
            phone: "+91 98860 11111".to_string(),
            email: "priya.menon@example.com".to_string(),
        }]),
    )?;
    service.save_step(
        kind,
        token,
        StepUpdate::Authorization(Authorization {
            consent_background_check: true,
            consent_data_sharing: true,
            declaration_accurate: true,
            title: "Ms".to_string(),
            name: "Asha Rao".to_string(),
            date: Some(Local::now().date_naive()),
        }),
    )?;
    println!("- Candidate completed all form steps");
    Ok(())
}

fn employment(
    company: &str,
    designation: &str,
    from: (i32, u32, u32),
    to: Option<(i32, u32, u32)>,
) -> EmploymentEntry {
    EmploymentEntry {
        company_name: company.to_string(),
        designation: designation.to_string(),
        period_from: NaiveDate::from_ymd_opt(from.0, from.1, from.2),
        period_to: to.and_then(|(year, month, day)| NaiveDate::from_ymd_opt(year, month, day)),
        ..EmploymentEntry::default()
    }
}

async fn upload_documents(service: &DemoService, token: &str) {
    let mut files: Vec<FileUpload> = REQUIRED_UPLOADS
        .iter()
        .map(|slot| FileUpload::new(*slot, format!("{slot}.pdf"), None, b"%PDF-1.4 demo".to_vec()))
        .collect();
    files.push(FileUpload::new(
        "drivingLicence",
        "licence.png",
        None,
        vec![0x89, 0x50, 0x4e, 0x47],
    ));

    println!("- Uploading {} files concurrently", files.len());
    let results = service
        .upload_documents(RecordKind::DocumentCollection, token, files)
        .await;
    for outcome in results {
        match outcome.result {
            Ok(upload) => println!("    - {} stored at {}", outcome.slot_key, upload.url),
            Err(err) => println!("    - {} refused: {}", outcome.slot_key, err),
        }
    }
}
