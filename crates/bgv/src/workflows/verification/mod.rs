//! Candidate submission workflow for background-verification cases.
//!
//! Two record kinds share one lifecycle: an admin creates the record, a tokenized link is
//! issued to the candidate, the candidate fills the form and uploads documents, submits once,
//! and an admin reviews the result. Employment gaps are derived from the employment list and
//! keep candidate answers only while the surrounding employments are unchanged.

pub mod companies;
pub mod domain;
pub mod errors;
pub mod form;
pub mod gaps;
pub mod memory;
pub mod repository;
pub mod review;
pub mod router;
pub mod service;
pub mod slots;
pub mod tokens;

#[cfg(test)]
mod tests;

pub use companies::{BulkSendFailure, BulkSendReport, CompanySummary};
pub use domain::{
    CandidateIdentity, CandidateSummary, CustomerId, NewRecord, OutcomeStatus, RecordId,
    RecordKind, ReviewData, ReviewDecision, SubmissionAudit, SubmissionMeta, SubmissionRecord,
    VerificationStatus,
};
pub use errors::{
    ConflictError, FieldViolation, NotFoundError, SlotError, StateGuardError, TokenError,
    ValidationError,
};
pub use form::{
    AddressVerificationForm, DocumentCollectionForm, EmploymentEntry, FormPayload, FormStep,
    StepUpdate, MAX_EMPLOYMENTS,
};
pub use gaps::{derive_gaps, GapAnchor, GapAnswer, GapEntry};
pub use memory::{InMemoryBlobStore, InMemoryVerificationRepository, RecordingNotifier};
pub use repository::{
    BlobError, BlobStore, CandidateNotice, CandidateNotifier, NoticeTemplate, NotifyError,
    RecordFilter, RepositoryError, StoredBlob, VerificationRepository,
};
pub use router::verification_router;
pub use service::{
    AdminUpdate, CandidateView, ServiceSettings, SlotUploadResult, VerificationDataPatch,
    VerificationService, VerificationServiceError,
};
pub use slots::{
    CustomDocumentType, DocumentSet, DocumentUpload, FileUpload, SlotKey, UploadPolicy,
};
pub use tokens::{IssuedLink, LinkPolicy};
