use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::form::FormPayload;
use super::slots::DocumentSet;

/// Opaque record identifier. Never exposed on candidate-facing links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owning customer (company) of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two submission flows share record shape but differ in steps and slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    AddressVerification,
    DocumentCollection,
}

impl RecordKind {
    pub const fn label(self) -> &'static str {
        match self {
            RecordKind::AddressVerification => "address_verification",
            RecordKind::DocumentCollection => "document_collection",
        }
    }

    /// Path segment used for both candidate links and admin routes.
    pub const fn path_segment(self) -> &'static str {
        match self {
            RecordKind::AddressVerification => "address-verifications",
            RecordKind::DocumentCollection => "document-collections",
        }
    }

    pub const fn approved_status(self) -> OutcomeStatus {
        match self {
            RecordKind::AddressVerification => OutcomeStatus::Verified,
            RecordKind::DocumentCollection => OutcomeStatus::Approved,
        }
    }

    pub const fn rejected_status(self) -> OutcomeStatus {
        match self {
            RecordKind::AddressVerification => OutcomeStatus::Failed,
            RecordKind::DocumentCollection => OutcomeStatus::Rejected,
        }
    }

    pub fn allows(self, status: OutcomeStatus) -> bool {
        match self {
            RecordKind::AddressVerification => matches!(
                status,
                OutcomeStatus::Pending
                    | OutcomeStatus::Verified
                    | OutcomeStatus::Failed
                    | OutcomeStatus::Insufficiency
            ),
            RecordKind::DocumentCollection => matches!(
                status,
                OutcomeStatus::Pending | OutcomeStatus::Approved | OutcomeStatus::Rejected
            ),
        }
    }
}

/// Admin judgement on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Verified,
    Failed,
    Insufficiency,
    Approved,
    Rejected,
}

impl OutcomeStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "pending",
            OutcomeStatus::Verified => "verified",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Insufficiency => "insufficiency",
            OutcomeStatus::Approved => "approved",
            OutcomeStatus::Rejected => "rejected",
        }
    }

    /// Terminal outcomes may only be held while the workflow is completed.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OutcomeStatus::Verified
                | OutcomeStatus::Failed
                | OutcomeStatus::Approved
                | OutcomeStatus::Rejected
        )
    }

    pub const fn is_negative(self) -> bool {
        matches!(
            self,
            OutcomeStatus::Failed | OutcomeStatus::Rejected | OutcomeStatus::Insufficiency
        )
    }
}

/// Where in the candidate process a record currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotInitiated,
    LinkSent,
    InProgress,
    Completed,
    Expired,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::NotInitiated => "not_initiated",
            VerificationStatus::LinkSent => "link_sent",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Completed => "completed",
            VerificationStatus::Expired => "expired",
        }
    }

    /// States in which the candidate link still accepts writes.
    pub const fn accepts_candidate_writes(self) -> bool {
        matches!(
            self,
            VerificationStatus::LinkSent | VerificationStatus::InProgress
        )
    }
}

/// Identity fields an admin enters when creating a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateIdentity {
    pub candidate_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// Request metadata captured alongside a final submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAudit {
    pub submitted_at: DateTime<Utc>,
    pub meta: SubmissionMeta,
}

/// One admin decision, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub outcome: OutcomeStatus,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewData {
    pub verifier_comments: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<ReviewDecision>,
}

/// Input for admin record creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub kind: RecordKind,
    pub code: String,
    pub customer_id: CustomerId,
    pub company_name: String,
    #[serde(flatten)]
    pub identity: CandidateIdentity,
}

/// A single candidate case, either address verification or document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    pub code: String,
    pub customer_id: CustomerId,
    pub company_name: String,
    #[serde(flatten)]
    pub identity: CandidateIdentity,
    pub status: OutcomeStatus,
    pub verification_status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormPayload>,
    pub documents: DocumentSet,
    pub review: ReviewData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionAudit>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn create(new: NewRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::generate(),
            kind: new.kind,
            code: new.code.trim().to_string(),
            customer_id: new.customer_id,
            company_name: new.company_name.trim().to_string(),
            identity: new.identity,
            status: OutcomeStatus::Pending,
            verification_status: VerificationStatus::NotInitiated,
            verification_token: None,
            expires_at: None,
            form: None,
            documents: DocumentSet::default(),
            review: ReviewData::default(),
            submission: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_link_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| expiry <= now).unwrap_or(false)
    }

    /// Summary view safe to show to the candidate (no id, no token).
    pub fn candidate_summary(&self) -> CandidateSummary {
        CandidateSummary {
            kind: self.kind,
            code: self.code.clone(),
            company_name: self.company_name.clone(),
            candidate_name: self.identity.candidate_name.clone(),
            verification_status: self.verification_status,
            expires_at: self.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub kind: RecordKind,
    pub code: String,
    pub company_name: String,
    pub candidate_name: String,
    pub verification_status: VerificationStatus,
    pub expires_at: Option<DateTime<Utc>>,
}
