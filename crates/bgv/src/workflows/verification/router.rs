use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{
    CandidateIdentity, CustomerId, NewRecord, RecordId, RecordKind, SubmissionMeta,
    SubmissionRecord, VerificationStatus,
};
use super::errors::{NotFoundError, SlotError, StateGuardError, TokenError, ValidationError};
use super::form::{AddressVerificationForm, DocumentCollectionForm, FormPayload, StepUpdate};
use super::repository::{
    BlobStore, CandidateNotifier, RecordFilter, RepositoryError, VerificationRepository,
};
use super::service::{AdminUpdate, VerificationService, VerificationServiceError};
use super::slots::FileUpload;

/// Shared handler state: the service plus the record kind a route family serves.
struct KindState<R, B, N> {
    service: Arc<VerificationService<R, B, N>>,
    kind: RecordKind,
}

impl<R, B, N> Clone for KindState<R, B, N> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            kind: self.kind,
        }
    }
}

const MULTIPART_FILES_PER_REQUEST: usize = 12;
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

fn candidate_prefix(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::AddressVerification => "/verification-by-token",
        RecordKind::DocumentCollection => "/document-collection-by-token",
    }
}

/// Router exposing the candidate token surface and the admin case-management surface for
/// both record kinds.
pub fn verification_router<R, B, N>(service: Arc<VerificationService<R, B, N>>) -> Router
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let shared = Router::new()
        .route(
            "/document-collections/send-all-links",
            post(send_all_links_handler::<R, B, N>),
        )
        .route(
            "/document-collections/companies",
            get(companies_handler::<R, B, N>),
        )
        .route(
            "/companies/:customer_id/document-types",
            get(list_document_types_handler::<R, B, N>).post(add_document_type_handler::<R, B, N>),
        )
        .route(
            "/companies/:customer_id/document-types/:key",
            put(toggle_document_type_handler::<R, B, N>),
        )
        .with_state(Arc::clone(&service));

    // Room for a handful of files per multipart request on top of the per-file cap.
    let body_limit = usize::try_from(service.settings().uploads.max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_mul(MULTIPART_FILES_PER_REQUEST)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    [RecordKind::AddressVerification, RecordKind::DocumentCollection]
        .into_iter()
        .fold(shared, |router, kind| {
            router.merge(kind_routes(KindState {
                service: Arc::clone(&service),
                kind,
            }))
        })
        .layer(DefaultBodyLimit::max(body_limit))
}

fn kind_routes<R, B, N>(state: KindState<R, B, N>) -> Router
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let token = candidate_prefix(state.kind);
    let admin = format!("/{}", state.kind.path_segment());

    Router::new()
        .route(&format!("{token}/:token"), get(candidate_view_handler::<R, B, N>))
        .route(&format!("{token}/:token/steps"), put(save_step_handler::<R, B, N>))
        .route(
            &format!("{token}/:token/documents"),
            post(candidate_upload_handler::<R, B, N>),
        )
        .route(
            &format!("{token}/:token/documents/:slot_key"),
            axum::routing::delete(candidate_remove_handler::<R, B, N>),
        )
        .route(&format!("{token}/:token/submit"), post(submit_handler::<R, B, N>))
        .route(
            &admin,
            post(create_handler::<R, B, N>).get(list_handler::<R, B, N>),
        )
        .route(
            &format!("{admin}/:id"),
            get(get_handler::<R, B, N>)
                .put(update_handler::<R, B, N>)
                .delete(delete_handler::<R, B, N>),
        )
        .route(&format!("{admin}/:id/links"), post(send_link_handler::<R, B, N>))
        .route(
            &format!("{admin}/:id/resubmission"),
            post(resubmission_handler::<R, B, N>),
        )
        .route(
            &format!("{admin}/:id/documents/:slot_key"),
            post(admin_upload_handler::<R, B, N>).delete(admin_remove_handler::<R, B, N>),
        )
        .with_state(state)
}

/// Status code for each failure the service can raise.
pub fn status_for(error: &VerificationServiceError) -> StatusCode {
    use VerificationServiceError as E;

    match error {
        E::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        E::Token(TokenError::NotFound) => StatusCode::NOT_FOUND,
        E::Token(TokenError::Expired) => StatusCode::GONE,
        E::Token(TokenError::AlreadyCompleted) => StatusCode::CONFLICT,
        E::Slot(SlotError::InvalidSlot { .. }) => StatusCode::BAD_REQUEST,
        E::Slot(SlotError::DuplicateSlotKey { .. }) => StatusCode::CONFLICT,
        E::Slot(SlotError::FileTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
        E::Slot(SlotError::UnsupportedType { .. }) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        E::StateGuard(StateGuardError::CommentRequired) => StatusCode::BAD_REQUEST,
        E::StateGuard(StateGuardError::FormKindMismatch { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        E::StateGuard(_) => StatusCode::CONFLICT,
        E::NotFound(_) | E::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        E::Conflict(_)
        | E::Repository(RepositoryError::Conflict | RepositoryError::StaleStatus { .. }) => {
            StatusCode::CONFLICT
        }
        E::Repository(RepositoryError::Unavailable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        E::Blob(_) | E::Notify(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_body(error: &VerificationServiceError) -> Value {
    let mut payload = json!({
        "error": error.code(),
        "message": error.to_string(),
    });
    let details = match error {
        VerificationServiceError::Validation(ValidationError::Invalid { violations }) => {
            Some(("violations", json!(violations)))
        }
        VerificationServiceError::Validation(ValidationError::IncompleteForm { missing_fields }) => {
            Some(("missingFields", json!(missing_fields)))
        }
        VerificationServiceError::Validation(ValidationError::MissingDocuments {
            missing_slots,
        }) => Some(("missingSlots", json!(missing_slots))),
        VerificationServiceError::Slot(SlotError::InvalidSlot { slot_key }) => {
            Some(("slotKey", json!(slot_key)))
        }
        VerificationServiceError::Slot(SlotError::FileTooLarge { max_bytes, .. }) => {
            Some(("maxBytes", json!(max_bytes)))
        }
        _ => None,
    };
    if let (Some((key, value)), Some(object)) = (details, payload.as_object_mut()) {
        object.insert(key.to_string(), value);
    }
    payload
}

fn error_response(error: VerificationServiceError) -> Response {
    if status_for(&error).is_server_error() {
        tracing::error!(error = %error, "verification request failed");
    }
    (status_for(&error), Json(error_body(&error))).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    let payload = json!({
        "error": "bad_request",
        "message": message.into(),
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

fn submission_meta(headers: &HeaderMap) -> SubmissionMeta {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    SubmissionMeta {
        ip: header_value("x-forwarded-for")
            .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header_value("x-real-ip")),
        user_agent: header_value(header::USER_AGENT.as_str()),
    }
}

/// Pull every file part out of a multipart body. A `file` part takes its slot from the most
/// recent `docType` field; any other named part carrying a file name is keyed by field name.
async fn read_uploads(
    mut multipart: Multipart,
    fixed_slot: Option<&str>,
) -> Result<Vec<FileUpload>, Response> {
    let mut uploads = Vec::new();
    let mut pending_slot: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(bad_request(format!("malformed multipart body: {err}"))),
        };
        let name = field.name().unwrap_or_default().to_string();

        if name == "docType" {
            let value = field
                .text()
                .await
                .map_err(|err| bad_request(format!("unreadable docType field: {err}")))?;
            pending_slot = Some(value.trim().to_string());
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let slot_key = match (fixed_slot, name.as_str()) {
            (Some(slot), _) => slot.to_string(),
            (None, "file") => match pending_slot.take() {
                Some(slot) => slot,
                None => return Err(bad_request("file part must follow a docType field")),
            },
            (None, other) => other.to_string(),
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| bad_request(format!("unreadable file part: {err}")))?;

        uploads.push(FileUpload::new(slot_key, file_name, content_type, bytes.to_vec()));
    }

    if uploads.is_empty() {
        return Err(bad_request("no file parts found in upload"));
    }
    Ok(uploads)
}

// ---- candidate handlers ----

async fn candidate_view_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(token): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match state.service.candidate_view(state.kind, &token) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn save_step_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(token): Path<String>,
    Json(update): Json<StepUpdate>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let step = update.step();
    match state.service.save_step(state.kind, &token, update) {
        Ok(form_data) => {
            let payload = json!({ "step": step, "formData": form_data });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn candidate_upload_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(token): Path<String>,
    multipart: Multipart,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let uploads = match read_uploads(multipart, None).await {
        Ok(uploads) => uploads,
        Err(response) => return response,
    };

    let mut results = state
        .service
        .upload_documents(state.kind, &token, uploads)
        .await;
    if results.len() == 1 {
        return match results.remove(0).result {
            Ok(upload) => (StatusCode::CREATED, Json(upload)).into_response(),
            Err(err) => error_response(err),
        };
    }

    let mut documents = Vec::new();
    let mut errors = Vec::new();
    for outcome in results {
        match outcome.result {
            Ok(upload) => documents.push(json!(upload)),
            Err(err) => {
                let mut body = error_body(&err);
                if let Some(object) = body.as_object_mut() {
                    object.insert("slotKey".to_string(), json!(outcome.slot_key));
                }
                errors.push(body);
            }
        }
    }
    let status = if errors.is_empty() {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    (status, Json(json!({ "documents": documents, "errors": errors }))).into_response()
}

async fn candidate_remove_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path((token, slot_key)): Path<(String, String)>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match state
        .service
        .remove_document(state.kind, &token, &slot_key)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionSubmitBody {
    form_data: DocumentCollectionForm,
}

async fn submit_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let form_data = match state.kind {
        RecordKind::AddressVerification => serde_json::from_value::<AddressVerificationForm>(body)
            .map(FormPayload::AddressVerification),
        RecordKind::DocumentCollection => serde_json::from_value::<CollectionSubmitBody>(body)
            .map(|body| FormPayload::DocumentCollection(body.form_data)),
    };
    let form_data = match form_data {
        Ok(form_data) => form_data,
        Err(err) => return bad_request(format!("invalid submission body: {err}")),
    };

    let meta = submission_meta(&headers);
    match state.service.submit(state.kind, &token, form_data, meta) {
        Ok(record) => {
            let payload = json!({
                "verificationStatus": record.verification_status,
                "submittedAt": record.submission.as_ref().map(|audit| audit.submitted_at),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

// ---- admin handlers ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecordBody {
    code: String,
    customer_id: String,
    company_name: String,
    candidate_name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
}

async fn create_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Json(body): Json<CreateRecordBody>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let new = NewRecord {
        kind: state.kind,
        code: body.code,
        customer_id: CustomerId(body.customer_id),
        company_name: body.company_name,
        identity: CandidateIdentity {
            candidate_name: body.candidate_name,
            phone: body.phone,
            email: body.email,
        },
    };
    match state.service.create_record(new) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    customer_id: Option<String>,
    verification_status: Option<VerificationStatus>,
}

async fn list_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let filter = RecordFilter {
        kind: Some(state.kind),
        customer_id: query.customer_id.map(CustomerId),
        verification_status: query.verification_status,
    };
    match state.service.list(&filter) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Load a record and make sure it belongs to the route family it was addressed through.
fn scoped_record<R, B, N>(
    state: &KindState<R, B, N>,
    id: &RecordId,
) -> Result<SubmissionRecord, VerificationServiceError>
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let record = state.service.get(id)?;
    if record.kind != state.kind {
        return Err(NotFoundError::Record(id.clone()).into());
    }
    Ok(record)
}

async fn get_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match scoped_record(&state, &RecordId(id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn update_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(id): Path<String>,
    Json(update): Json<AdminUpdate>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let id = RecordId(id);
    let result = scoped_record(&state, &id).and_then(|_| state.service.update(&id, update));
    match result {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let id = RecordId(id);
    if let Err(err) = scoped_record(&state, &id) {
        return error_response(err);
    }
    match state.service.delete(&id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn send_link_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let id = RecordId(id);
    let result = scoped_record(&state, &id).and_then(|_| state.service.send_link(&id));
    match result {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn resubmission_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path(id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let id = RecordId(id);
    let result = scoped_record(&state, &id).and_then(|_| state.service.request_resubmission(&id));
    match result {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn admin_upload_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path((id, slot_key)): Path<(String, String)>,
    multipart: Multipart,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let id = RecordId(id);
    if let Err(err) = scoped_record(&state, &id) {
        return error_response(err);
    }
    let mut uploads = match read_uploads(multipart, Some(&slot_key)).await {
        Ok(uploads) => uploads,
        Err(response) => return response,
    };
    if uploads.len() != 1 {
        return bad_request("admin uploads carry exactly one file");
    }

    match state.service.admin_upload_document(&id, uploads.remove(0)).await {
        Ok(upload) => (StatusCode::CREATED, Json(upload)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn admin_remove_handler<R, B, N>(
    State(state): State<KindState<R, B, N>>,
    Path((id, slot_key)): Path<(String, String)>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    let id = RecordId(id);
    if let Err(err) = scoped_record(&state, &id) {
        return error_response(err);
    }
    match state.service.admin_remove_document(&id, &slot_key).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

// ---- company handlers ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomerQuery {
    customer_id: String,
}

async fn send_all_links_handler<R, B, N>(
    State(service): State<Arc<VerificationService<R, B, N>>>,
    Query(query): Query<CustomerQuery>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match service.send_all_links(&CustomerId(query.customer_id)) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    search: Option<String>,
}

async fn companies_handler<R, B, N>(
    State(service): State<Arc<VerificationService<R, B, N>>>,
    Query(query): Query<SearchQuery>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match service.company_summaries(query.search.as_deref()) {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_document_types_handler<R, B, N>(
    State(service): State<Arc<VerificationService<R, B, N>>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match service.document_types(&CustomerId(customer_id)) {
        Ok(types) => (StatusCode::OK, Json(types)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct NewDocumentTypeBody {
    label: String,
    #[serde(default)]
    required: bool,
}

async fn add_document_type_handler<R, B, N>(
    State(service): State<Arc<VerificationService<R, B, N>>>,
    Path(customer_id): Path<String>,
    Json(body): Json<NewDocumentTypeBody>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match service.add_document_type(&CustomerId(customer_id), &body.label, body.required) {
        Ok(doc_type) => (StatusCode::CREATED, Json(doc_type)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ToggleDocumentTypeBody {
    enabled: bool,
}

async fn toggle_document_type_handler<R, B, N>(
    State(service): State<Arc<VerificationService<R, B, N>>>,
    Path((customer_id, key)): Path<(String, String)>,
    Json(body): Json<ToggleDocumentTypeBody>,
) -> Response
where
    R: VerificationRepository + 'static,
    B: BlobStore + 'static,
    N: CandidateNotifier + 'static,
{
    match service.set_document_type_enabled(&CustomerId(customer_id), &key, body.enabled) {
        Ok(doc_type) => (StatusCode::OK, Json(doc_type)).into_response(),
        Err(err) => error_response(err),
    }
}
