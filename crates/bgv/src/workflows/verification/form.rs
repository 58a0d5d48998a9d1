use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{CandidateIdentity, RecordKind};
use super::errors::{FieldViolation, ValidationError};
use super::gaps::{apply_answers, derive_gaps, GapAnswer, GapEntry};

pub const MAX_EMPLOYMENTS: usize = 3;

/// Step payload for either form kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormPayload {
    AddressVerification(AddressVerificationForm),
    DocumentCollection(DocumentCollectionForm),
}

impl FormPayload {
    pub fn empty(kind: RecordKind) -> Self {
        match kind {
            RecordKind::AddressVerification => {
                Self::AddressVerification(AddressVerificationForm::default())
            }
            RecordKind::DocumentCollection => {
                Self::DocumentCollection(DocumentCollectionForm::default())
            }
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            FormPayload::AddressVerification(_) => RecordKind::AddressVerification,
            FormPayload::DocumentCollection(_) => RecordKind::DocumentCollection,
        }
    }

    pub fn employment_count(&self) -> usize {
        match self {
            FormPayload::AddressVerification(_) => 0,
            FormPayload::DocumentCollection(form) => form.employments.len(),
        }
    }

    /// Fill blank identity fields from admin-entered data. Non-blank candidate values win.
    pub fn prefill(mut self, identity: &CandidateIdentity) -> Self {
        let (name, phone, email) = match &mut self {
            FormPayload::AddressVerification(form) => (
                &mut form.contact.full_name,
                &mut form.contact.phone,
                &mut form.contact.email,
            ),
            FormPayload::DocumentCollection(form) => (
                &mut form.personal_info.full_name,
                &mut form.personal_info.phone,
                &mut form.personal_info.email,
            ),
        };
        fill_blank(name, &identity.candidate_name);
        fill_blank(phone, &identity.phone);
        fill_blank(email, &identity.email);
        self
    }
}

fn fill_blank(target: &mut String, fallback: &str) {
    if target.trim().is_empty() && !fallback.trim().is_empty() {
        *target = fallback.trim().to_string();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub alternate_phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdProof {
    pub id_type: String,
    pub id_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressDetails {
    pub line1: String,
    pub line2: String,
    pub landmark: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub residing_since: Option<NaiveDate>,
    pub ownership: String,
}

/// Address verification collects everything in a single step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressVerificationForm {
    #[serde(flatten)]
    pub contact: ContactInfo,
    #[serde(flatten)]
    pub id_proof: IdProof,
    #[serde(flatten)]
    pub address: AddressDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersonalInfo {
    pub full_name: String,
    pub father_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: String,
    pub email: String,
    pub current_address: String,
    pub permanent_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub qualification: String,
    pub institution: String,
    pub university: String,
    pub year_of_passing: Option<u16>,
    pub grade: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmploymentEntry {
    /// Stable identity; assigned by the server when blank.
    pub id: String,
    pub company_name: String,
    pub designation: String,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub employee_id: String,
    pub reason_for_leaving: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reference {
    pub name: String,
    pub relationship: String,
    pub organization: String,
    pub phone: String,
    pub email: String,
}

/// Letter of authorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Authorization {
    pub consent_background_check: bool,
    pub consent_data_sharing: bool,
    pub declaration_accurate: bool,
    pub title: String,
    pub name: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentCollectionForm {
    pub personal_info: PersonalInfo,
    pub education: Education,
    pub employments: Vec<EmploymentEntry>,
    pub references: Vec<Reference>,
    pub gaps: Vec<GapEntry>,
    pub authorization: Authorization,
}

impl DocumentCollectionForm {
    /// Replace the employment timeline and re-derive gaps in the same write.
    pub fn with_employments(mut self, employments: Vec<EmploymentEntry>) -> Self {
        self.employments = employments
            .into_iter()
            .map(|mut entry| {
                if entry.id.trim().is_empty() {
                    entry.id = Uuid::new_v4().to_string();
                }
                entry
            })
            .collect();
        self.gaps = derive_gaps(&self.employments, &self.gaps);
        self
    }

    fn ensure_gaps(&mut self) {
        if self.gaps.len() != self.employments.len() + 1 {
            self.gaps = derive_gaps(&self.employments, &self.gaps);
        }
    }
}

/// Addressable form steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormStep {
    AddressDetails,
    PersonalInfo,
    Education,
    Employment,
    References,
    GapDetails,
    Authorization,
}

impl FormStep {
    pub const ADDRESS_STEPS: [FormStep; 1] = [FormStep::AddressDetails];
    pub const COLLECTION_STEPS: [FormStep; 6] = [
        FormStep::PersonalInfo,
        FormStep::Education,
        FormStep::Employment,
        FormStep::References,
        FormStep::GapDetails,
        FormStep::Authorization,
    ];

    pub fn for_kind(kind: RecordKind) -> &'static [FormStep] {
        match kind {
            RecordKind::AddressVerification => &Self::ADDRESS_STEPS,
            RecordKind::DocumentCollection => &Self::COLLECTION_STEPS,
        }
    }

    pub const fn kind(self) -> RecordKind {
        match self {
            FormStep::AddressDetails => RecordKind::AddressVerification,
            _ => RecordKind::DocumentCollection,
        }
    }
}

/// A single-step edit from the candidate page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data", rename_all = "snake_case")]
pub enum StepUpdate {
    AddressDetails(AddressVerificationForm),
    PersonalInfo(PersonalInfo),
    Education(Education),
    Employment(Vec<EmploymentEntry>),
    References(Vec<Reference>),
    GapDetails(Vec<GapAnswer>),
    Authorization(Authorization),
}

impl StepUpdate {
    pub fn step(&self) -> FormStep {
        match self {
            StepUpdate::AddressDetails(_) => FormStep::AddressDetails,
            StepUpdate::PersonalInfo(_) => FormStep::PersonalInfo,
            StepUpdate::Education(_) => FormStep::Education,
            StepUpdate::Employment(_) => FormStep::Employment,
            StepUpdate::References(_) => FormStep::References,
            StepUpdate::GapDetails(_) => FormStep::GapDetails,
            StepUpdate::Authorization(_) => FormStep::Authorization,
        }
    }
}

/// Apply one step to the current payload. Structural limits are enforced here; required
/// fields are only checked at final submission.
pub fn apply_step(form: FormPayload, update: StepUpdate) -> Result<FormPayload, ValidationError> {
    match (form, update) {
        (FormPayload::AddressVerification(_), StepUpdate::AddressDetails(details)) => {
            Ok(FormPayload::AddressVerification(details))
        }
        (FormPayload::DocumentCollection(form), update)
            if update.step().kind() == RecordKind::DocumentCollection =>
        {
            apply_collection_step(form, update).map(FormPayload::DocumentCollection)
        }
        (form, update) => Err(ValidationError::single(
            "step",
            format!(
                "{:?} does not belong to a {} form",
                update.step(),
                form.kind().label()
            ),
        )),
    }
}

fn apply_collection_step(
    mut form: DocumentCollectionForm,
    update: StepUpdate,
) -> Result<DocumentCollectionForm, ValidationError> {
    match update {
        StepUpdate::PersonalInfo(info) => form.personal_info = info,
        StepUpdate::Education(education) => form.education = education,
        StepUpdate::Employment(employments) => {
            if employments.len() > MAX_EMPLOYMENTS {
                return Err(ValidationError::single(
                    "employments",
                    format!("at most {MAX_EMPLOYMENTS} entries are allowed"),
                ));
            }
            form = form.with_employments(employments);
        }
        StepUpdate::References(references) => form.references = references,
        StepUpdate::GapDetails(answers) => {
            form.ensure_gaps();
            form.gaps = apply_answers(&form.gaps, &answers);
        }
        StepUpdate::Authorization(authorization) => form.authorization = authorization,
        StepUpdate::AddressDetails(_) => {
            return Err(ValidationError::single(
                "step",
                "address details do not belong to a document collection form",
            ))
        }
    }
    Ok(form)
}

/// Rebuild derived data on a full payload. Employment ids are filled in and gaps are
/// re-derived from the payload's own timeline; an answer the client sent is kept only when
/// its key and anchors still match the derived entry.
pub fn normalize(form: FormPayload) -> FormPayload {
    match form {
        FormPayload::DocumentCollection(mut form) => {
            let employments = std::mem::take(&mut form.employments);
            FormPayload::DocumentCollection(form.with_employments(employments))
        }
        other => other,
    }
}

fn require(violations: &mut Vec<FieldViolation>, field: &str, value: &str) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::required(field));
    }
}

fn validate_email(violations: &mut Vec<FieldViolation>, field: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        violations.push(FieldViolation::required(field));
    } else if !value.contains('@') || value.starts_with('@') || value.ends_with('@') {
        violations.push(FieldViolation::new(field, "must be a valid email address"));
    }
}

/// Required-field policy for one step.
pub fn validate_step(form: &FormPayload, step: FormStep) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    match (form, step) {
        (FormPayload::AddressVerification(form), FormStep::AddressDetails) => {
            require(&mut violations, "fullName", &form.contact.full_name);
            require(&mut violations, "phone", &form.contact.phone);
            require(&mut violations, "idType", &form.id_proof.id_type);
            require(&mut violations, "idNumber", &form.id_proof.id_number);
            require(&mut violations, "line1", &form.address.line1);
            require(&mut violations, "city", &form.address.city);
            require(&mut violations, "state", &form.address.state);
            let pincode = form.address.pincode.trim();
            if pincode.is_empty() {
                violations.push(FieldViolation::required("pincode"));
            } else if pincode.len() != 6 || !pincode.chars().all(|c| c.is_ascii_digit()) {
                violations.push(FieldViolation::new("pincode", "must be 6 digits"));
            }
        }
        (FormPayload::DocumentCollection(form), step) => {
            validate_collection_step(form, step, &mut violations)
        }
        (FormPayload::AddressVerification(_), other) => violations.push(FieldViolation::new(
            "step",
            format!("{other:?} does not belong to an address verification form"),
        )),
    }

    violations
}

fn validate_collection_step(
    form: &DocumentCollectionForm,
    step: FormStep,
    violations: &mut Vec<FieldViolation>,
) {
    match step {
        FormStep::PersonalInfo => {
            let info = &form.personal_info;
            require(violations, "personalInfo.fullName", &info.full_name);
            require(violations, "personalInfo.phone", &info.phone);
            validate_email(violations, "personalInfo.email", &info.email);
            if info.date_of_birth.is_none() {
                violations.push(FieldViolation::required("personalInfo.dateOfBirth"));
            }
            require(violations, "personalInfo.currentAddress", &info.current_address);
        }
        FormStep::Education => {
            let education = &form.education;
            require(violations, "education.qualification", &education.qualification);
            require(violations, "education.institution", &education.institution);
            if education.year_of_passing.is_none() {
                violations.push(FieldViolation::required("education.yearOfPassing"));
            }
        }
        FormStep::Employment => {
            if form.employments.len() > MAX_EMPLOYMENTS {
                violations.push(FieldViolation::new(
                    "employments",
                    format!("at most {MAX_EMPLOYMENTS} entries are allowed"),
                ));
            }
            for (index, entry) in form.employments.iter().enumerate() {
                let prefix = format!("employments[{index}]");
                require(violations, &format!("{prefix}.companyName"), &entry.company_name);
                require(violations, &format!("{prefix}.designation"), &entry.designation);
                match (entry.period_from, entry.period_to) {
                    (None, _) => {
                        violations.push(FieldViolation::required(format!("{prefix}.periodFrom")))
                    }
                    (Some(from), Some(to)) if from > to => violations.push(FieldViolation::new(
                        format!("{prefix}.periodTo"),
                        "must not be before periodFrom",
                    )),
                    _ => {}
                }
            }
        }
        FormStep::References => {
            if form.references.is_empty() {
                violations.push(FieldViolation::new(
                    "references",
                    "at least one reference is required",
                ));
            }
            for (index, reference) in form.references.iter().enumerate() {
                let prefix = format!("references[{index}]");
                require(violations, &format!("{prefix}.name"), &reference.name);
                require(violations, &format!("{prefix}.phone"), &reference.phone);
            }
        }
        FormStep::GapDetails => {
            let gaps = if form.gaps.len() == form.employments.len() + 1 {
                form.gaps.clone()
            } else {
                derive_gaps(&form.employments, &form.gaps)
            };
            for gap in &gaps {
                let prefix = format!("gaps.{}", gap.key);
                match gap.has_gap {
                    None => violations.push(FieldViolation::new(
                        format!("{prefix}.hasGap"),
                        "must be answered",
                    )),
                    Some(true) => {
                        require(violations, &format!("{prefix}.duration"), &gap.duration);
                        require(violations, &format!("{prefix}.reason"), &gap.reason);
                    }
                    Some(false) => {}
                }
            }
        }
        FormStep::Authorization => {
            let loa = &form.authorization;
            if !loa.consent_background_check {
                violations.push(FieldViolation::new(
                    "authorization.consentBackgroundCheck",
                    "must be accepted",
                ));
            }
            if !loa.consent_data_sharing {
                violations.push(FieldViolation::new(
                    "authorization.consentDataSharing",
                    "must be accepted",
                ));
            }
            if !loa.declaration_accurate {
                violations.push(FieldViolation::new(
                    "authorization.declarationAccurate",
                    "must be accepted",
                ));
            }
            require(violations, "authorization.title", &loa.title);
            require(violations, "authorization.name", &loa.name);
            if loa.date.is_none() {
                violations.push(FieldViolation::required("authorization.date"));
            }
        }
        FormStep::AddressDetails => violations.push(FieldViolation::new(
            "step",
            "address details do not belong to a document collection form",
        )),
    }
}

/// Union of every step's required-field policy for the payload's kind.
pub fn validate(form: &FormPayload) -> Vec<FieldViolation> {
    FormStep::for_kind(form.kind())
        .iter()
        .flat_map(|step| validate_step(form, *step))
        .collect()
}
