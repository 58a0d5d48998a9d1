use serde::Serialize;

use super::domain::{OutcomeStatus, RecordId, RecordKind, VerificationStatus};

/// One violated field, reported with a reason the candidate can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "is required")
    }
}

/// Form and input validation failures. Every variant enumerates all offending items.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid input: {}", summarize(.violations))]
    Invalid { violations: Vec<FieldViolation> },
    #[error("form incomplete: {}", summarize(.missing_fields))]
    IncompleteForm { missing_fields: Vec<FieldViolation> },
    #[error("missing documents: {}", .missing_slots.join(", "))]
    MissingDocuments { missing_slots: Vec<String> },
}

impl ValidationError {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            violations: vec![FieldViolation::new(field, reason)],
        }
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|violation| format!("{} {}", violation.field, violation.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("verification link not found or no longer valid")]
    NotFound,
    #[error("verification link has expired")]
    Expired,
    #[error("this submission has already been completed")]
    AlreadyCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("'{slot_key}' is not an accepted document type for this form")]
    InvalidSlot { slot_key: String },
    #[error("document type key '{key}' already exists")]
    DuplicateSlotKey { key: String },
    #[error("file is {size_bytes} bytes, the limit is {max_bytes} bytes")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },
    #[error("file type '{content_type}' is not accepted")]
    UnsupportedType { content_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateGuardError {
    #[error("a comment is required to reject a submission")]
    CommentRequired,
    #[error("record must be completed before a review decision (currently {})", .current.label())]
    NotCompleted { current: VerificationStatus },
    #[error("cannot move workflow from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: VerificationStatus,
        to: VerificationStatus,
    },
    #[error("status {} is not valid for {}", .status.label(), .kind.label())]
    OutcomeNotAllowed {
        kind: RecordKind,
        status: OutcomeStatus,
    },
    #[error("form payload does not match a {} record", .expected.label())]
    FormKindMismatch { expected: RecordKind },
    #[error("record is {}; only rejected or insufficient records can be reopened", .status.label())]
    NotReopenable { status: OutcomeStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFoundError {
    #[error("record {0} not found")]
    Record(RecordId),
    #[error("no records for customer {0}")]
    Customer(String),
    #[error("document type {key} not found for customer {customer_id}")]
    DocumentType { customer_id: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("record {0} was completed by a concurrent submission")]
    ConcurrentCompletion(RecordId),
    #[error("code '{code}' already exists for customer {customer_id}")]
    DuplicateCode { customer_id: String, code: String },
}
