use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CandidateIdentity, OutcomeStatus, ReviewDecision, SubmissionRecord, VerificationStatus,
};
use super::errors::StateGuardError;
use super::form::{self, FormPayload};

/// Legal workflow moves. Everything else is rejected.
pub fn transition_workflow(
    from: VerificationStatus,
    to: VerificationStatus,
) -> Result<VerificationStatus, StateGuardError> {
    use VerificationStatus::*;

    let allowed = matches!(
        (from, to),
        (NotInitiated, LinkSent)
            | (LinkSent, InProgress)
            | (InProgress, Completed)
            | (LinkSent, Expired)
            | (InProgress, Expired)
            | (Expired, LinkSent)
            | (Completed, LinkSent)
    ) || from == to;

    if allowed {
        Ok(to)
    } else {
        Err(StateGuardError::InvalidTransition { from, to })
    }
}

fn require_completed(record: &SubmissionRecord) -> Result<(), StateGuardError> {
    if record.verification_status == VerificationStatus::Completed {
        Ok(())
    } else {
        Err(StateGuardError::NotCompleted {
            current: record.verification_status,
        })
    }
}

fn require_comment(comment: &str) -> Result<String, StateGuardError> {
    let trimmed = comment.trim();
    if trimmed.is_empty() {
        Err(StateGuardError::CommentRequired)
    } else {
        Ok(trimmed.to_string())
    }
}

fn decide(
    mut record: SubmissionRecord,
    outcome: OutcomeStatus,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    if !record.kind.allows(outcome) {
        return Err(StateGuardError::OutcomeNotAllowed {
            kind: record.kind,
            status: outcome,
        });
    }
    require_completed(&record)?;

    record.status = outcome;
    record.verification_status = VerificationStatus::Completed;
    if comment.is_some() {
        record.review.verifier_comments = comment.clone();
    }
    record.review.verified_at = Some(now);
    record.review.history.push(ReviewDecision {
        outcome,
        comment,
        decided_at: now,
    });
    record.updated_at = now;
    Ok(record)
}

/// Approve a completed submission. A comment is optional.
pub fn approve(
    record: SubmissionRecord,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    let comment = comment
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    let outcome = record.kind.approved_status();
    decide(record, outcome, comment, now)
}

/// Reject a completed submission. The comment is mandatory and is what the candidate sees.
pub fn reject(
    record: SubmissionRecord,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    let comment = require_comment(comment)?;
    let outcome = record.kind.rejected_status();
    decide(record, outcome, Some(comment), now)
}

/// Mark an address verification as insufficient. Requires a comment like a rejection.
pub fn flag_insufficiency(
    record: SubmissionRecord,
    comment: &str,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    let comment = require_comment(comment)?;
    decide(record, OutcomeStatus::Insufficiency, Some(comment), now)
}

/// Route an explicit outcome to the matching decision.
pub fn apply_outcome(
    record: SubmissionRecord,
    outcome: OutcomeStatus,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    if !record.kind.allows(outcome) {
        return Err(StateGuardError::OutcomeNotAllowed {
            kind: record.kind,
            status: outcome,
        });
    }
    match outcome {
        OutcomeStatus::Verified | OutcomeStatus::Approved => approve(record, comment, now),
        OutcomeStatus::Failed | OutcomeStatus::Rejected => {
            reject(record, comment.unwrap_or_default(), now)
        }
        OutcomeStatus::Insufficiency => flag_insufficiency(record, comment.unwrap_or_default(), now),
        OutcomeStatus::Pending => {
            let mut record = record;
            record.status = OutcomeStatus::Pending;
            record.updated_at = now;
            Ok(record)
        }
    }
}

/// Put a negatively reviewed record back in front of the candidate. The caller issues the
/// new token; review history is kept.
pub fn reopen(
    mut record: SubmissionRecord,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    if !record.status.is_negative() {
        return Err(StateGuardError::NotReopenable {
            status: record.status,
        });
    }
    record.verification_status =
        transition_workflow(record.verification_status, VerificationStatus::LinkSent)?;
    record.status = OutcomeStatus::Pending;
    record.submission = None;
    record.updated_at = now;
    Ok(record)
}

/// Admin field corrections. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    pub code: Option<String>,
    pub company_name: Option<String>,
    pub candidate_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub form: Option<FormPayload>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &RecordPatch::default()
    }
}

/// Apply an admin correction at any workflow state. Never touches `status` or
/// `verification_status`. A replacement form has its gaps re-derived in the same write.
pub fn edit(
    mut record: SubmissionRecord,
    patch: RecordPatch,
    now: DateTime<Utc>,
) -> Result<SubmissionRecord, StateGuardError> {
    let RecordPatch {
        code,
        company_name,
        candidate_name,
        phone,
        email,
        form,
    } = patch;

    if let Some(code) = code {
        record.code = code.trim().to_string();
    }
    if let Some(company_name) = company_name {
        record.company_name = company_name.trim().to_string();
    }
    patch_identity(&mut record.identity, candidate_name, phone, email);
    if let Some(form) = form {
        if form.kind() != record.kind {
            return Err(StateGuardError::FormKindMismatch { expected: record.kind });
        }
        record.form = Some(form::normalize(form));
    }
    record.updated_at = now;
    Ok(record)
}

fn patch_identity(
    identity: &mut CandidateIdentity,
    candidate_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
) {
    if let Some(name) = candidate_name {
        identity.candidate_name = name.trim().to_string();
    }
    if let Some(phone) = phone {
        identity.phone = phone.trim().to_string();
    }
    if let Some(email) = email {
        identity.email = email.trim().to_string();
    }
}
