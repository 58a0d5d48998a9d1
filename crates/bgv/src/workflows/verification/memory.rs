//! In-process adapters used by the API binary, the demo and the tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::domain::{CustomerId, RecordId, SubmissionRecord, VerificationStatus};
use super::repository::{
    BlobError, BlobStore, CandidateNotice, CandidateNotifier, NotifyError, RecordFilter,
    RepositoryError, StoredBlob, VerificationRepository,
};
use super::slots::CustomDocumentType;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
}

#[derive(Default, Clone)]
pub struct InMemoryVerificationRepository {
    records: Arc<Mutex<HashMap<RecordId, SubmissionRecord>>>,
    document_types: Arc<Mutex<HashMap<CustomerId, Vec<CustomDocumentType>>>>,
}

impl VerificationRepository for InMemoryVerificationRepository {
    fn insert(&self, record: SubmissionRecord) -> Result<SubmissionRecord, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: SubmissionRecord) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.contains_key(&record.id) {
            guard.insert(record.id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn update_if_status(
        &self,
        record: SubmissionRecord,
        expected: VerificationStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        let found = guard
            .get(&record.id)
            .map(|stored| stored.verification_status)
            .ok_or(RepositoryError::NotFound)?;
        if found != expected {
            return Err(RepositoryError::StaleStatus { expected, found });
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &RecordId) -> Result<Option<SubmissionRecord>, RepositoryError> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    fn fetch_by_token(&self, token: &str) -> Result<Option<SubmissionRecord>, RepositoryError> {
        Ok(lock(&self.records)?
            .values()
            .find(|record| record.verification_token.as_deref() == Some(token))
            .cloned())
    }

    fn list(&self, filter: &RecordFilter) -> Result<Vec<SubmissionRecord>, RepositoryError> {
        let mut records: Vec<SubmissionRecord> = lock(&self.records)?
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(records)
    }

    fn delete(&self, id: &RecordId) -> Result<Option<SubmissionRecord>, RepositoryError> {
        Ok(lock(&self.records)?.remove(id))
    }

    fn document_types(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CustomDocumentType>, RepositoryError> {
        Ok(lock(&self.document_types)?
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    fn save_document_types(
        &self,
        customer_id: &CustomerId,
        types: Vec<CustomDocumentType>,
    ) -> Result<(), RepositoryError> {
        lock(&self.document_types)?.insert(customer_id.clone(), types);
        Ok(())
    }
}

/// Object held by [`InMemoryBlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct InMemoryBlobStore {
    base_url: String,
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
}

impl InMemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Arc::default(),
        }
    }

    pub fn contains(&self, storage_key: &str) -> bool {
        self.objects
            .lock()
            .map(|guard| guard.contains_key(storage_key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        storage_key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredBlob, BlobError> {
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| BlobError::Unavailable("blob mutex poisoned".to_string()))?;
        guard.insert(
            storage_key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(StoredBlob {
            storage_key: storage_key.to_string(),
            url: format!("{}/{}", self.base_url, storage_key),
        })
    }

    async fn delete(&self, storage_key: &str) -> Result<(), BlobError> {
        let mut guard = self
            .objects
            .lock()
            .map_err(|_| BlobError::Unavailable("blob mutex poisoned".to_string()))?;
        guard
            .remove(storage_key)
            .map(|_| ())
            .ok_or_else(|| BlobError::Missing(storage_key.to_string()))
    }
}

/// Notifier that keeps every notice in memory.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<CandidateNotice>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<CandidateNotice> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl CandidateNotifier for RecordingNotifier {
    fn notify(&self, notice: CandidateNotice) -> Result<(), NotifyError> {
        self.events
            .lock()
            .map_err(|_| NotifyError::Transport("notifier mutex poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}
