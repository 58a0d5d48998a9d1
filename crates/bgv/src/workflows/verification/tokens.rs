use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use super::domain::{RecordKind, SubmissionRecord, VerificationStatus};
use super::errors::TokenError;

const TOKEN_BYTES: usize = 32;
const DEFAULT_ADDRESS_TTL_HOURS: i64 = 24;
const DEFAULT_DOCUMENT_TTL_DAYS: i64 = 30;

/// Link validity windows and the public base URL links are built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPolicy {
    base_url: String,
    address_ttl: Duration,
    document_ttl: Duration,
}

impl LinkPolicy {
    pub fn new(base_url: impl Into<String>, address_ttl: Duration, document_ttl: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            address_ttl,
            document_ttl,
        }
    }

    pub fn ttl(&self, kind: RecordKind) -> Duration {
        match kind {
            RecordKind::AddressVerification => self.address_ttl,
            RecordKind::DocumentCollection => self.document_ttl,
        }
    }

    pub fn link_for(&self, kind: RecordKind, token: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.path_segment(), token)
    }
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self::new(
            "http://localhost:3000",
            Duration::hours(DEFAULT_ADDRESS_TTL_HOURS),
            Duration::days(DEFAULT_DOCUMENT_TTL_DAYS),
        )
    }
}

/// Token handed to the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedLink {
    pub token: String,
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

/// Whether the caller intends to mutate the record through the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAccess {
    Read,
    Write,
}

/// 256 bits from the OS CSPRNG, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Bind a fresh token to `record`. Any previously issued token is overwritten.
pub fn issue(
    mut record: SubmissionRecord,
    policy: &LinkPolicy,
    now: DateTime<Utc>,
) -> (SubmissionRecord, IssuedLink) {
    let token = generate_token();
    let expires_at = now + policy.ttl(record.kind);

    if matches!(
        record.verification_status,
        VerificationStatus::NotInitiated | VerificationStatus::Expired
    ) {
        record.verification_status = VerificationStatus::LinkSent;
    }
    record.verification_token = Some(token.clone());
    record.expires_at = Some(expires_at);
    record.updated_at = now;

    let link = IssuedLink {
        link: policy.link_for(record.kind, &token),
        token,
        expires_at,
    };
    (record, link)
}

/// Outcome of resolving a token against the record it was found on.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Record usable as-is.
    Ready(SubmissionRecord),
    /// Record changed workflow state as part of resolution and must be persisted.
    Transitioned(SubmissionRecord),
}

impl Resolution {
    pub fn into_record(self) -> SubmissionRecord {
        match self {
            Resolution::Ready(record) | Resolution::Transitioned(record) => record,
        }
    }
}

/// Check `record` (as found by its token) for the requested access. The first write moves
/// the workflow from `link_sent` to `in_progress`. A lapsed link yields `Expired`; callers
/// record the lapse with [`expire`].
pub fn resolve(
    record: Option<SubmissionRecord>,
    kind: RecordKind,
    access: TokenAccess,
    now: DateTime<Utc>,
) -> Result<Resolution, TokenError> {
    let mut record = match record {
        Some(record) if record.kind == kind => record,
        _ => return Err(TokenError::NotFound),
    };

    if record.verification_status == VerificationStatus::Completed {
        return match access {
            TokenAccess::Read => Ok(Resolution::Ready(record)),
            TokenAccess::Write => Err(TokenError::AlreadyCompleted),
        };
    }

    if record.verification_status == VerificationStatus::Expired || record.is_link_expired(now)
    {
        return Err(TokenError::Expired);
    }

    match (access, record.verification_status) {
        (TokenAccess::Write, VerificationStatus::LinkSent) => {
            record.verification_status = VerificationStatus::InProgress;
            record.updated_at = now;
            Ok(Resolution::Transitioned(record))
        }
        (TokenAccess::Write, VerificationStatus::InProgress) | (TokenAccess::Read, _) => {
            Ok(Resolution::Ready(record))
        }
        // A record that never had a link issued cannot be reached by token.
        (TokenAccess::Write, _) => Err(TokenError::NotFound),
    }
}

/// Move a record whose link lapsed to `expired`. Completed records are left untouched.
pub fn expire(mut record: SubmissionRecord, now: DateTime<Utc>) -> Option<SubmissionRecord> {
    let lapsed = record.verification_status.accepts_candidate_writes() && record.is_link_expired(now);
    if !lapsed {
        return None;
    }
    record.verification_status = VerificationStatus::Expired;
    record.updated_at = now;
    Some(record)
}
