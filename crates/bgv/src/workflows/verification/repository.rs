use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{CustomerId, RecordId, RecordKind, SubmissionRecord, VerificationStatus};
use super::slots::CustomDocumentType;

/// Selection criteria for listing records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub customer_id: Option<CustomerId>,
    pub verification_status: Option<VerificationStatus>,
}

impl RecordFilter {
    pub fn matches(&self, record: &SubmissionRecord) -> bool {
        self.kind.map_or(true, |kind| record.kind == kind)
            && self
                .customer_id
                .as_ref()
                .map_or(true, |customer| &record.customer_id == customer)
            && self
                .verification_status
                .map_or(true, |status| record.verification_status == status)
    }
}

/// Storage abstraction for records and per-company document catalogues.
pub trait VerificationRepository: Send + Sync {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, RepositoryError>;
    fn update(&self, record: SubmissionRecord) -> Result<(), RepositoryError>;
    /// Write `record` only if the stored copy still has `expected` workflow status.
    fn update_if_status(
        &self,
        record: SubmissionRecord,
        expected: VerificationStatus,
    ) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &RecordId) -> Result<Option<SubmissionRecord>, RepositoryError>;
    fn fetch_by_token(&self, token: &str) -> Result<Option<SubmissionRecord>, RepositoryError>;
    fn list(&self, filter: &RecordFilter) -> Result<Vec<SubmissionRecord>, RepositoryError>;
    fn delete(&self, id: &RecordId) -> Result<Option<SubmissionRecord>, RepositoryError>;
    fn document_types(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomDocumentType>, RepositoryError>;
    fn save_document_types(
        &self,
        customer_id: &CustomerId,
        types: Vec<CustomDocumentType>,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record changed concurrently (expected {expected:?}, found {found:?})")]
    StaleStatus {
        expected: VerificationStatus,
        found: VerificationStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Location of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub storage_key: String,
    pub url: String,
}

/// External binary storage (S3 or similar).
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        storage_key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, BlobError>;
    async fn delete(&self, storage_key: &str) -> Result<(), BlobError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
    #[error("blob {0} not found")]
    Missing(String),
}

/// Outbound candidate messaging (email, WhatsApp). Composition lives outside this crate.
pub trait CandidateNotifier: Send + Sync {
    fn notify(&self, notice: CandidateNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeTemplate {
    LinkIssued,
    SubmissionRejected,
    ResubmissionRequested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNotice {
    pub template: NoticeTemplate,
    pub record_id: RecordId,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
