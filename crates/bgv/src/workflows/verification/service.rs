use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::companies::{self, BulkSendReport, CompanySummary};
use super::domain::{
    CandidateSummary, CustomerId, NewRecord, OutcomeStatus, RecordId, RecordKind,
    SubmissionAudit, SubmissionMeta, SubmissionRecord, VerificationStatus,
};
use super::errors::{
    ConflictError, FieldViolation, NotFoundError, SlotError, StateGuardError, TokenError,
    ValidationError,
};
use super::form::{self, FormPayload, FormStep, StepUpdate};
use super::repository::{
    BlobError, BlobStore, CandidateNotice, CandidateNotifier, NoticeTemplate, NotifyError,
    RecordFilter, RepositoryError, VerificationRepository,
};
use super::review::{self, RecordPatch};
use super::slots::{
    self, CustomDocumentType, DocumentSet, DocumentTypeError, DocumentUpload, FileUpload,
    SlotKey, UploadPolicy,
};
use super::tokens::{self, IssuedLink, LinkPolicy, Resolution, TokenAccess};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Per-record mutual exclusion for read-modify-write cycles. Guards are only ever held inside
/// synchronous sections, never across an await.
#[derive(Default)]
struct RecordLocks {
    handles: Mutex<HashMap<RecordId, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    fn handle(&self, id: &RecordId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| RepositoryError::Unavailable("record lock table poisoned".to_string()))?;
        Ok(handles.entry(id.clone()).or_default().clone())
    }

    fn forget(&self, id: &RecordId) {
        if let Ok(mut handles) = self.handles.lock() {
            handles.remove(id);
        }
    }
}

fn guard(handle: &Mutex<()>) -> Result<MutexGuard<'_, ()>, RepositoryError> {
    handle
        .lock()
        .map_err(|_| RepositoryError::Unavailable("record lock poisoned".to_string()))
}

/// Policies the service applies on every request.
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub links: LinkPolicy,
    pub uploads: UploadPolicy,
}

/// Who is mutating a record's documents.
#[derive(Debug, Clone)]
enum Actor<'a> {
    Candidate { kind: RecordKind, token: &'a str },
    Admin,
}

/// Everything the candidate page needs after opening a link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateView {
    pub record: CandidateSummary,
    pub form_data: FormPayload,
    pub documents: DocumentSet,
    pub steps: Vec<FormStep>,
    pub accepted_slots: Vec<String>,
    pub required_slots: Vec<String>,
    pub read_only: bool,
}

/// Result of one file inside a multi-file upload.
#[derive(Debug)]
pub struct SlotUploadResult {
    pub slot_key: String,
    pub result: Result<DocumentUpload, VerificationServiceError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationDataPatch {
    pub verifier_comments: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Partial admin update: field corrections plus optional workflow/outcome changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminUpdate {
    #[serde(flatten)]
    pub patch: RecordPatch,
    pub status: Option<OutcomeStatus>,
    pub verification_status: Option<VerificationStatus>,
    pub verification_data: Option<VerificationDataPatch>,
}

/// Façade over tokens, forms, slots, review and roll-ups.
pub struct VerificationService<R, B, N> {
    repository: Arc<R>,
    blobs: Arc<B>,
    notifier: Arc<N>,
    settings: ServiceSettings,
    locks: RecordLocks,
    catalog: Mutex<()>,
    clock: Clock,
}

impl<R, B, N> VerificationService<R, B, N>
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    pub fn new(repository: Arc<R>, blobs: Arc<B>, notifier: Arc<N>, settings: ServiceSettings) -> Self {
        Self {
            repository,
            blobs,
            notifier,
            settings,
            locks: RecordLocks::default(),
            catalog: Mutex::new(()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, mainly for expiry scenarios.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn load(&self, id: &RecordId) -> Result<SubmissionRecord, VerificationServiceError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| NotFoundError::Record(id.clone()).into())
    }

    /// Run `mutate` on the freshest copy of a record while holding its lock, then persist.
    fn mutate_record<T, F>(&self, id: &RecordId, mutate: F) -> Result<T, VerificationServiceError>
    where
        F: FnOnce(SubmissionRecord) -> Result<(SubmissionRecord, T), VerificationServiceError>,
    {
        let handle = self.locks.handle(id)?;
        let _guard = guard(&handle)?;
        let record = self.load(id)?;
        let (updated, output) = mutate(record)?;
        self.repository.update(updated)?;
        Ok(output)
    }

    /// Resolve a candidate token for writing while holding the record lock. The `link_sent`
    /// to `in_progress` move is persisted before `mutate` runs.
    fn candidate_write<T, F>(
        &self,
        kind: RecordKind,
        token: &str,
        mutate: F,
    ) -> Result<T, VerificationServiceError>
    where
        F: FnOnce(SubmissionRecord) -> Result<(SubmissionRecord, T), VerificationServiceError>,
    {
        let id = self.token_record_id(token)?;
        let handle = self.locks.handle(&id)?;
        let _guard = guard(&handle)?;

        let record = self.resolve_locked(&id, kind, token)?;
        let (updated, output) = mutate(record)?;
        self.repository.update(updated)?;
        Ok(output)
    }

    fn token_record_id(&self, token: &str) -> Result<RecordId, VerificationServiceError> {
        self.repository
            .fetch_by_token(token)?
            .map(|record| record.id)
            .ok_or_else(|| TokenError::NotFound.into())
    }

    /// Token resolution for writes; caller must hold the record lock.
    fn resolve_locked(
        &self,
        id: &RecordId,
        kind: RecordKind,
        token: &str,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let now = self.now();
        let current = self
            .repository
            .fetch(id)?
            .filter(|record| record.verification_token.as_deref() == Some(token));

        match tokens::resolve(current.clone(), kind, TokenAccess::Write, now) {
            Ok(Resolution::Ready(record)) => Ok(record),
            Ok(Resolution::Transitioned(record)) => {
                self.repository
                    .update_if_status(record.clone(), VerificationStatus::LinkSent)?;
                info!(record_id = %record.id, "candidate started submission");
                Ok(record)
            }
            Err(TokenError::Expired) => {
                if let Some(expired) = current.and_then(|record| tokens::expire(record, now)) {
                    self.repository.update(expired)?;
                }
                Err(TokenError::Expired.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn custom_types(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomDocumentType>, VerificationServiceError> {
        Ok(self.repository.document_types(customer_id)?)
    }

    fn notify(
        &self,
        template: NoticeTemplate,
        record: &SubmissionRecord,
        details: BTreeMap<String, String>,
    ) -> Result<(), NotifyError> {
        self.notifier.notify(CandidateNotice {
            template,
            record_id: record.id.clone(),
            recipient: record.identity.email.clone(),
            details,
        })
    }

    // ---- admin record management ----

    /// Create a record in `pending` / `not_initiated`.
    pub fn create_record(
        &self,
        new: NewRecord,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let mut violations = Vec::new();
        if new.code.trim().is_empty() {
            violations.push(FieldViolation::required("code"));
        }
        if new.customer_id.0.trim().is_empty() {
            violations.push(FieldViolation::required("customerId"));
        }
        if new.company_name.trim().is_empty() {
            violations.push(FieldViolation::required("companyName"));
        }
        if new.identity.candidate_name.trim().is_empty() {
            violations.push(FieldViolation::required("candidateName"));
        }
        let email = new.identity.email.trim();
        if !email.is_empty() && !email.contains('@') {
            violations.push(FieldViolation::new("email", "must be a valid email address"));
        }
        if !violations.is_empty() {
            return Err(ValidationError::Invalid { violations }.into());
        }

        let _catalog = guard(&self.catalog)?;
        self.ensure_unique_code(&new.customer_id, new.kind, new.code.trim(), None)?;
        let record = SubmissionRecord::create(new, self.now());
        let stored = self.repository.insert(record)?;
        info!(record_id = %stored.id, kind = stored.kind.label(), code = %stored.code, "record created");
        Ok(stored)
    }

    fn ensure_unique_code(
        &self,
        customer_id: &CustomerId,
        kind: RecordKind,
        code: &str,
        except: Option<&RecordId>,
    ) -> Result<(), VerificationServiceError> {
        let filter = RecordFilter {
            kind: Some(kind),
            customer_id: Some(customer_id.clone()),
            ..RecordFilter::default()
        };
        let taken = self
            .repository
            .list(&filter)?
            .iter()
            .any(|record| record.code.eq_ignore_ascii_case(code) && Some(&record.id) != except);
        if taken {
            return Err(ConflictError::DuplicateCode {
                customer_id: customer_id.0.clone(),
                code: code.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn get(&self, id: &RecordId) -> Result<SubmissionRecord, VerificationServiceError> {
        self.load(id)
    }

    pub fn list(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<SubmissionRecord>, VerificationServiceError> {
        Ok(self.repository.list(filter)?)
    }

    /// Remove a record and, best effort, its stored files.
    pub async fn delete(&self, id: &RecordId) -> Result<SubmissionRecord, VerificationServiceError> {
        let removed = {
            let handle = self.locks.handle(id)?;
            let _guard = guard(&handle)?;
            self.repository
                .delete(id)?
                .ok_or_else(|| NotFoundError::Record(id.clone()))?
        };
        self.locks.forget(id);

        for upload in removed.documents.iter() {
            self.discard_blob(&upload.storage_key).await;
        }
        info!(record_id = %id, "record deleted");
        Ok(removed)
    }

    /// Admin field corrections; allowed at any workflow state.
    pub fn edit(
        &self,
        id: &RecordId,
        patch: RecordPatch,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        self.update(
            id,
            AdminUpdate {
                patch,
                ..AdminUpdate::default()
            },
        )
    }

    /// Apply a partial admin update. Workflow changes go through the transition table and
    /// outcome changes through the review guards. Moving a record back to `link_sent` mints
    /// a fresh token, so the previous link stops resolving.
    pub fn update(
        &self,
        id: &RecordId,
        update: AdminUpdate,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let AdminUpdate {
            patch,
            status,
            verification_status,
            verification_data,
        } = update;
        let now = self.now();
        let verification_data = verification_data.unwrap_or_default();
        let links = &self.settings.links;

        // Held across the record write so a concurrent create or edit cannot take the code.
        let _catalog = patch
            .code
            .is_some()
            .then(|| guard(&self.catalog))
            .transpose()?;

        self.mutate_record(id, |record| {
            if let Some(code) = patch.code.as_deref() {
                self.ensure_unique_code(&record.customer_id, record.kind, code.trim(), Some(id))?;
            }
            let mut record = review::edit(record, patch, now)?;

            if let Some(target) = verification_status {
                let current = record.verification_status;
                let next = review::transition_workflow(current, target)?;
                if next != VerificationStatus::Completed && record.status.is_terminal() {
                    record.status = OutcomeStatus::Pending;
                }
                record.verification_status = next;
                if next == VerificationStatus::LinkSent && current != VerificationStatus::LinkSent {
                    let (reissued, link) = tokens::issue(record, links, now);
                    info!(
                        record_id = %id,
                        expires_at = %link.expires_at,
                        "verification link reissued by admin"
                    );
                    record = reissued;
                }
            }

            if let Some(outcome) = status {
                let decided_at = verification_data.verified_at.unwrap_or(now);
                record = review::apply_outcome(
                    record,
                    outcome,
                    verification_data.verifier_comments.as_deref(),
                    decided_at,
                )?;
            } else {
                if let Some(verified_at) = verification_data.verified_at {
                    if record.status == OutcomeStatus::Pending {
                        return Err(ValidationError::single(
                            "verificationData.verifiedAt",
                            "can only be set on a decided record",
                        )
                        .into());
                    }
                    record.review.verified_at = Some(verified_at);
                }
                if let Some(comments) = verification_data.verifier_comments.clone() {
                    record.review.verifier_comments = Some(comments);
                }
            }

            Ok((record.clone(), record))
        })
    }

    // ---- links ----

    /// Mint a new token for a record, invalidating any previous one.
    pub fn issue_link(&self, id: &RecordId) -> Result<IssuedLink, VerificationServiceError> {
        let now = self.now();
        let link = self.mutate_record(id, |record| {
            if record.verification_status == VerificationStatus::Completed {
                return Err(StateGuardError::InvalidTransition {
                    from: VerificationStatus::Completed,
                    to: VerificationStatus::LinkSent,
                }
                .into());
            }
            Ok(tokens::issue(record, &self.settings.links, now))
        })?;
        info!(record_id = %id, expires_at = %link.expires_at, "verification link issued");
        Ok(link)
    }

    /// Issue a link and send it to the candidate.
    pub fn send_link(&self, id: &RecordId) -> Result<IssuedLink, VerificationServiceError> {
        let record = self.load(id)?;
        if record.identity.email.trim().is_empty() {
            return Err(ValidationError::single("email", "is required to send a link").into());
        }

        let link = self.issue_link(id)?;
        let mut details = BTreeMap::new();
        details.insert("link".to_string(), link.link.clone());
        details.insert("expires_at".to_string(), link.expires_at.to_rfc3339());
        details.insert("candidate_name".to_string(), record.identity.candidate_name.clone());
        self.notify(NoticeTemplate::LinkIssued, &record, details)?;
        Ok(link)
    }

    /// Reopen a failed/rejected/insufficient record with a fresh token.
    pub fn request_resubmission(
        &self,
        id: &RecordId,
    ) -> Result<IssuedLink, VerificationServiceError> {
        let now = self.now();
        let (record, link) = self.mutate_record(id, |record| {
            let reopened = review::reopen(record, now)?;
            let (issued, link) = tokens::issue(reopened, &self.settings.links, now);
            Ok((issued.clone(), (issued, link)))
        })?;

        let mut details = BTreeMap::new();
        details.insert("link".to_string(), link.link.clone());
        if let Some(comment) = &record.review.verifier_comments {
            details.insert("comment".to_string(), comment.clone());
        }
        if let Err(err) = self.notify(NoticeTemplate::ResubmissionRequested, &record, details) {
            warn!(record_id = %id, error = %err, "resubmission notice not delivered");
        }
        info!(record_id = %id, "resubmission requested");
        Ok(link)
    }

    /// Mark every lapsed, unfinished link as expired.
    pub fn expire_stale_links(&self) -> Result<usize, VerificationServiceError> {
        let now = self.now();
        let candidates = self.repository.list(&RecordFilter::default())?;
        let mut expired = 0;
        for record in candidates {
            if tokens::expire(record.clone(), now).is_none() {
                continue;
            }
            let changed = self.mutate_record(&record.id, |current| {
                match tokens::expire(current.clone(), now) {
                    Some(lapsed) => Ok((lapsed, true)),
                    None => Ok((current, false)),
                }
            })?;
            if changed {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "stale verification links expired");
        }
        Ok(expired)
    }

    // ---- candidate surface ----

    /// Read access through a token; allowed after completion.
    pub fn candidate_view(
        &self,
        kind: RecordKind,
        token: &str,
    ) -> Result<CandidateView, VerificationServiceError> {
        let now = self.now();
        let found = self.repository.fetch_by_token(token)?;
        let record = match tokens::resolve(found.clone(), kind, TokenAccess::Read, now) {
            Ok(resolution) => resolution.into_record(),
            Err(TokenError::Expired) => {
                if let Some(record) = found {
                    let id = record.id.clone();
                    self.mutate_record(&id, |current| match tokens::expire(current.clone(), now) {
                        Some(lapsed) => Ok((lapsed, ())),
                        None => Ok((current, ())),
                    })?;
                }
                return Err(TokenError::Expired.into());
            }
            Err(err) => return Err(err.into()),
        };

        let custom = self.custom_types(&record.customer_id)?;
        let form_data = record
            .form
            .clone()
            .unwrap_or_else(|| FormPayload::empty(record.kind))
            .prefill(&record.identity);
        let required = slots::required_slots(record.kind, Some(&form_data), &custom);

        Ok(CandidateView {
            record: record.candidate_summary(),
            steps: FormStep::for_kind(record.kind).to_vec(),
            accepted_slots: slots::accepted_slots(record.kind, &custom)
                .iter()
                .map(|slot| slot.as_str().to_string())
                .collect(),
            required_slots: required.iter().map(|slot| slot.as_str().to_string()).collect(),
            read_only: record.verification_status == VerificationStatus::Completed,
            documents: record.documents,
            form_data,
        })
    }

    /// Save one form step. Employment edits re-derive gaps in the same write.
    pub fn save_step(
        &self,
        kind: RecordKind,
        token: &str,
        update: StepUpdate,
    ) -> Result<FormPayload, VerificationServiceError> {
        let now = self.now();
        self.candidate_write(kind, token, |mut record| {
            let current = record
                .form
                .clone()
                .unwrap_or_else(|| FormPayload::empty(record.kind));
            let updated = form::apply_step(current, update)?;
            record.form = Some(updated.clone());
            record.updated_at = now;
            Ok((record, updated))
        })
    }

    /// Final candidate submission. Completes iff the record is still `in_progress`.
    pub fn submit(
        &self,
        kind: RecordKind,
        token: &str,
        form_data: FormPayload,
        meta: SubmissionMeta,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let now = self.now();
        let id = self.token_record_id(token)?;
        let handle = self.locks.handle(&id)?;
        let _guard = guard(&handle)?;

        let mut record = self.resolve_locked(&id, kind, token)?;
        if form_data.kind() != record.kind {
            return Err(StateGuardError::FormKindMismatch {
                expected: record.kind,
            }
            .into());
        }

        let form_data = form::normalize(form_data);
        let missing_fields = form::validate(&form_data);
        if !missing_fields.is_empty() {
            return Err(ValidationError::IncompleteForm { missing_fields }.into());
        }

        let custom = self.custom_types(&record.customer_id)?;
        let required = slots::required_slots(record.kind, Some(&form_data), &custom);
        let missing_slots = slots::missing_slots(&required, &record.documents);
        if !missing_slots.is_empty() {
            return Err(ValidationError::MissingDocuments { missing_slots }.into());
        }

        record.verification_status =
            review::transition_workflow(record.verification_status, VerificationStatus::Completed)?;
        record.form = Some(form_data);
        record.submission = Some(SubmissionAudit {
            submitted_at: now,
            meta,
        });
        record.updated_at = now;

        match self
            .repository
            .update_if_status(record.clone(), VerificationStatus::InProgress)
        {
            Ok(()) => {}
            Err(RepositoryError::StaleStatus {
                found: VerificationStatus::Completed,
                ..
            }) => return Err(TokenError::AlreadyCompleted.into()),
            Err(RepositoryError::StaleStatus { .. }) => {
                return Err(ConflictError::ConcurrentCompletion(id).into())
            }
            Err(err) => return Err(err.into()),
        }

        info!(record_id = %record.id, kind = record.kind.label(), "submission completed");
        Ok(record)
    }

    // ---- documents ----

    pub async fn upload_document(
        &self,
        kind: RecordKind,
        token: &str,
        file: FileUpload,
    ) -> Result<DocumentUpload, VerificationServiceError> {
        let id = self.token_record_id(token)?;
        self.store_document(&id, Actor::Candidate { kind, token }, file)
            .await
    }

    /// Upload several files concurrently. Each slot succeeds or fails on its own.
    pub async fn upload_documents(
        &self,
        kind: RecordKind,
        token: &str,
        files: Vec<FileUpload>,
    ) -> Vec<SlotUploadResult> {
        let uploads = files.into_iter().map(|file| async move {
            let slot_key = file.slot_key.clone();
            let result = self.upload_document(kind, token, file).await;
            SlotUploadResult { slot_key, result }
        });
        join_all(uploads).await
    }

    pub async fn remove_document(
        &self,
        kind: RecordKind,
        token: &str,
        slot_key: &str,
    ) -> Result<Option<DocumentUpload>, VerificationServiceError> {
        let id = self.token_record_id(token)?;
        self.clear_document(&id, Actor::Candidate { kind, token }, slot_key)
            .await
    }

    pub async fn admin_upload_document(
        &self,
        id: &RecordId,
        file: FileUpload,
    ) -> Result<DocumentUpload, VerificationServiceError> {
        self.store_document(id, Actor::Admin, file).await
    }

    pub async fn admin_remove_document(
        &self,
        id: &RecordId,
        slot_key: &str,
    ) -> Result<Option<DocumentUpload>, VerificationServiceError> {
        self.clear_document(id, Actor::Admin, slot_key).await
    }

    /// Validate against the current record, hand back the resolved slot.
    fn prepare_upload(
        &self,
        id: &RecordId,
        actor: &Actor<'_>,
        file: &FileUpload,
    ) -> Result<(SubmissionRecord, SlotKey), VerificationServiceError> {
        let record = match actor {
            Actor::Candidate { kind, token } => {
                let found = self
                    .repository
                    .fetch(id)?
                    .filter(|record| record.verification_token.as_deref() == Some(*token));
                tokens::resolve(found, *kind, TokenAccess::Write, self.now())?.into_record()
            }
            Actor::Admin => self.load(id)?,
        };
        let custom = self.custom_types(&record.customer_id)?;
        let slot = SlotKey::parse(record.kind, &file.slot_key, &custom)?;
        self.settings
            .uploads
            .check(&file.content_type, file.size_bytes())?;
        Ok((record, slot))
    }

    /// Put the slot's new descriptor in place under the record lock; returns the displaced one.
    fn commit_upload(
        &self,
        id: &RecordId,
        actor: &Actor<'_>,
        slot: &SlotKey,
        upload: DocumentUpload,
    ) -> Result<Option<DocumentUpload>, VerificationServiceError> {
        let now = self.now();
        let apply = |mut record: SubmissionRecord| {
            let previous = record.documents.replace(slot, upload);
            record.updated_at = now;
            Ok((record, previous))
        };
        match actor {
            Actor::Candidate { kind, token } => self.candidate_write(*kind, token, apply),
            Actor::Admin => self.mutate_record(id, apply),
        }
    }

    async fn store_document(
        &self,
        id: &RecordId,
        actor: Actor<'_>,
        file: FileUpload,
    ) -> Result<DocumentUpload, VerificationServiceError> {
        let (record, slot) = self.prepare_upload(id, &actor, &file)?;
        let storage_key =
            slots::storage_key_for(record.kind, &record.id.0, &slot, &file.original_name);
        let size_bytes = file.size_bytes();
        let FileUpload {
            original_name,
            content_type,
            bytes,
            ..
        } = file;

        let stored = self.blobs.put(&storage_key, &content_type, bytes).await?;
        let upload = DocumentUpload {
            slot_key: slot.as_str().to_string(),
            original_name,
            storage_key: stored.storage_key,
            url: stored.url,
            content_type,
            size_bytes,
            uploaded_at: self.now(),
        };

        match self.commit_upload(id, &actor, &slot, upload.clone()) {
            Ok(previous) => {
                if let Some(previous) = previous {
                    self.discard_blob(&previous.storage_key).await;
                }
                info!(record_id = %id, slot = %slot, "document stored");
                Ok(upload)
            }
            Err(err) => {
                self.discard_blob(&upload.storage_key).await;
                Err(err)
            }
        }
    }

    async fn clear_document(
        &self,
        id: &RecordId,
        actor: Actor<'_>,
        slot_key: &str,
    ) -> Result<Option<DocumentUpload>, VerificationServiceError> {
        let now = self.now();
        let custom = {
            let record = self.load(id)?;
            self.custom_types(&record.customer_id)?
        };
        let clear = |mut record: SubmissionRecord| {
            let slot = match SlotKey::parse(record.kind, slot_key, &custom) {
                Ok(slot) => slot,
                Err(_) if record.documents.custom.contains_key(slot_key.trim()) => {
                    SlotKey::Custom(slot_key.trim().to_string())
                }
                Err(err) => return Err(VerificationServiceError::from(err)),
            };
            let removed = record.documents.clear(&slot);
            if removed.is_some() {
                record.updated_at = now;
            }
            Ok((record, removed))
        };
        let removed = match actor {
            Actor::Candidate { kind, token } => self.candidate_write(kind, token, clear)?,
            Actor::Admin => self.mutate_record(id, clear)?,
        };

        if let Some(upload) = &removed {
            self.discard_blob(&upload.storage_key).await;
            info!(record_id = %id, slot = %upload.slot_key, "document removed");
        }
        Ok(removed)
    }

    async fn discard_blob(&self, storage_key: &str) {
        if let Err(err) = self.blobs.delete(storage_key).await {
            warn!(storage_key, error = %err, "failed to delete stored document");
        }
    }

    // ---- review ----

    pub fn approve(
        &self,
        id: &RecordId,
        comment: Option<&str>,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let now = self.now();
        let record = self.mutate_record(id, |record| {
            let approved = review::approve(record, comment, now)?;
            Ok((approved.clone(), approved))
        })?;
        info!(record_id = %id, status = record.status.label(), "submission approved");
        Ok(record)
    }

    /// Reject with a mandatory comment and tell the candidate why.
    pub fn reject(
        &self,
        id: &RecordId,
        comment: &str,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let now = self.now();
        let record = self.mutate_record(id, |record| {
            let rejected = review::reject(record, comment, now)?;
            Ok((rejected.clone(), rejected))
        })?;

        let mut details = BTreeMap::new();
        details.insert("comment".to_string(), comment.trim().to_string());
        if let Err(err) = self.notify(NoticeTemplate::SubmissionRejected, &record, details) {
            warn!(record_id = %id, error = %err, "rejection notice not delivered");
        }
        info!(record_id = %id, status = record.status.label(), "submission rejected");
        Ok(record)
    }

    pub fn flag_insufficiency(
        &self,
        id: &RecordId,
        comment: &str,
    ) -> Result<SubmissionRecord, VerificationServiceError> {
        let now = self.now();
        self.mutate_record(id, |record| {
            let flagged = review::flag_insufficiency(record, comment, now)?;
            Ok((flagged.clone(), flagged))
        })
    }

    // ---- companies ----

    pub fn company_summaries(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<CompanySummary>, VerificationServiceError> {
        let filter = RecordFilter {
            kind: Some(RecordKind::DocumentCollection),
            ..RecordFilter::default()
        };
        let records = self.repository.list(&filter)?;
        Ok(companies::summarize(&records, search))
    }

    /// Issue and send a link for every unsent document collection record of a customer.
    pub fn send_all_links(
        &self,
        customer_id: &CustomerId,
    ) -> Result<BulkSendReport, VerificationServiceError> {
        let filter = RecordFilter {
            kind: Some(RecordKind::DocumentCollection),
            customer_id: Some(customer_id.clone()),
            ..RecordFilter::default()
        };
        let records = self.repository.list(&filter)?;
        if records.is_empty() {
            return Err(NotFoundError::Customer(customer_id.0.clone()).into());
        }

        let mut report = BulkSendReport::default();
        for record in companies::unsent(&records) {
            match self.send_link(&record.id) {
                Ok(_) => report.record_success(),
                Err(err) => {
                    warn!(record_id = %record.id, error = %err, "bulk link send failed");
                    report.record_failure(record.id.clone(), err.code(), err.to_string());
                }
            }
        }
        info!(
            customer_id = %customer_id,
            sent = report.sent_count,
            failed = report.failed_count,
            "bulk link send finished"
        );
        Ok(report)
    }

    // ---- custom document types ----

    pub fn document_types(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomDocumentType>, VerificationServiceError> {
        self.custom_types(customer_id)
    }

    pub fn add_document_type(
        &self,
        customer_id: &CustomerId,
        label: &str,
        required: bool,
    ) -> Result<CustomDocumentType, VerificationServiceError> {
        let _catalog = guard(&self.catalog)?;
        let existing = self.custom_types(customer_id)?;
        let updated = slots::add_custom_type(&existing, label, required)?;
        let added = updated
            .last()
            .cloned()
            .ok_or_else(|| ValidationError::single("label", "could not be added"))?;
        self.repository.save_document_types(customer_id, updated)?;
        info!(customer_id = %customer_id, key = %added.key, "custom document type added");
        Ok(added)
    }

    pub fn set_document_type_enabled(
        &self,
        customer_id: &CustomerId,
        key: &str,
        enabled: bool,
    ) -> Result<CustomDocumentType, VerificationServiceError> {
        let _catalog = guard(&self.catalog)?;
        let mut types = self.custom_types(customer_id)?;
        let entry = types
            .iter_mut()
            .find(|doc_type| doc_type.key == key)
            .ok_or_else(|| NotFoundError::DocumentType {
                customer_id: customer_id.0.clone(),
                key: key.to_string(),
            })?;
        entry.enabled = enabled;
        let changed = entry.clone();
        self.repository.save_document_types(customer_id, types)?;
        Ok(changed)
    }
}

/// Error raised by the verification service.
#[derive(Debug, thiserror::Error)]
pub enum VerificationServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    StateGuard(#[from] StateGuardError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl From<DocumentTypeError> for VerificationServiceError {
    fn from(value: DocumentTypeError) -> Self {
        match value {
            DocumentTypeError::Validation(err) => Self::Validation(err),
            DocumentTypeError::Slot(err) => Self::Slot(err),
        }
    }
}

impl VerificationServiceError {
    /// Stable machine-readable code for API payloads and bulk reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::Invalid { .. }) => "validation_error",
            Self::Validation(ValidationError::IncompleteForm { .. }) => "incomplete_form",
            Self::Validation(ValidationError::MissingDocuments { .. }) => "missing_documents",
            Self::Token(TokenError::NotFound) => "token_not_found",
            Self::Token(TokenError::Expired) => "token_expired",
            Self::Token(TokenError::AlreadyCompleted) => "already_completed",
            Self::Slot(SlotError::InvalidSlot { .. }) => "invalid_slot",
            Self::Slot(SlotError::DuplicateSlotKey { .. }) => "duplicate_slot_key",
            Self::Slot(SlotError::FileTooLarge { .. }) => "file_too_large",
            Self::Slot(SlotError::UnsupportedType { .. }) => "unsupported_type",
            Self::StateGuard(StateGuardError::CommentRequired) => "comment_required",
            Self::StateGuard(_) => "state_guard",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Repository(RepositoryError::NotFound) => "not_found",
            Self::Repository(RepositoryError::Conflict | RepositoryError::StaleStatus { .. }) => {
                "conflict"
            }
            Self::Repository(RepositoryError::Unavailable(_)) => "repository_unavailable",
            Self::Blob(_) => "storage_unavailable",
            Self::Notify(_) => "notification_failed",
        }
    }
}
