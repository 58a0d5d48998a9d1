use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;

use crate::workflows::verification::domain::{
    RecordId, RecordKind, SubmissionMeta, VerificationStatus,
};
use crate::workflows::verification::errors::{SlotError, StateGuardError, TokenError};
use crate::workflows::verification::form::FormPayload;
use crate::workflows::verification::repository::{BlobError, RepositoryError, VerificationRepository};
use crate::workflows::verification::router::{status_for, verification_router};
use crate::workflows::verification::service::{
    ServiceSettings, VerificationService, VerificationServiceError,
};

const BOUNDARY: &str = "bgv-test-boundary";

fn router(harness: &Harness) -> Router {
    verification_router(Arc::clone(&harness.service))
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.expect("router responds")
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("json body")))
        .expect("request")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("multipart request")
}

fn pdf_part<'a>(name: &'a str, file_name: &'a str) -> Part<'a> {
    Part::File {
        name,
        file_name,
        content_type: "application/pdf",
        bytes: b"%PDF-1.4 route",
    }
}

fn create_body(code: &str) -> Value {
    json!({
        "code": code,
        "customerId": "acme",
        "companyName": "Acme Corporation",
        "candidateName": "Asha Rao",
        "phone": "+91 98450 00000",
        "email": "asha.rao@example.com",
    })
}

async fn create_and_link(router: &Router, kind: RecordKind, code: &str) -> (String, String) {
    let admin = format!("/{}", kind.path_segment());
    let created = send(router, json_request(Method::POST, &admin, create_body(code))).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let id = read_json_body(created).await["id"]
        .as_str()
        .expect("record id")
        .to_string();

    let linked = send(router, empty_request(Method::POST, &format!("{admin}/{id}/links"))).await;
    assert_eq!(linked.status(), StatusCode::CREATED);
    let token = read_json_body(linked).await["token"]
        .as_str()
        .expect("token")
        .to_string();
    (id, token)
}

#[tokio::test]
async fn admin_create_returns_the_new_record() {
    let h = harness();
    let router = router(&h);

    let response = send(
        &router,
        json_request(Method::POST, "/address-verifications", create_body("AV-1")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "address_verification");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["verificationStatus"], "not_initiated");
    assert_eq!(body["candidateName"], "Asha Rao");

    let duplicate = send(
        &router,
        json_request(Method::POST, "/address-verifications", create_body("AV-1")),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(duplicate).await["error"], "conflict");
}

#[tokio::test]
async fn admin_create_lists_violations() {
    let h = harness();
    let router = router(&h);
    let mut body = create_body("");
    body["candidateName"] = json!("");

    let response = send(&router, json_request(Method::POST, "/document-collections", body)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["violations"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn admin_routes_are_scoped_to_their_kind() {
    let h = harness();
    let router = router(&h);
    let (id, _) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;

    let wrong = send(
        &router,
        empty_request(Method::GET, &format!("/address-verifications/{id}")),
    )
    .await;
    assert_eq!(wrong.status(), StatusCode::NOT_FOUND);

    let right = send(
        &router,
        empty_request(Method::GET, &format!("/document-collections/{id}")),
    )
    .await;
    assert_eq!(right.status(), StatusCode::OK);
    assert_eq!(read_json_body(right).await["verificationStatus"], "link_sent");

    let listed = send(
        &router,
        empty_request(
            Method::GET,
            "/document-collections?customerId=acme&verificationStatus=link_sent",
        ),
    )
    .await;
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(read_json_body(listed).await.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn candidate_view_hides_internal_identifiers() {
    let h = harness();
    let router = router(&h);
    let (id, token) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;

    let response = send(
        &router,
        empty_request(Method::GET, &format!("/document-collection-by-token/{token}")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["readOnly"], false);
    assert_eq!(body["record"]["code"], "DC-1");
    assert!(body["record"].get("id").is_none());
    assert!(!body.to_string().contains(&id));
    assert_eq!(body["formData"]["kind"], "document_collection");
    assert_eq!(body["formData"]["personalInfo"]["fullName"], "Asha Rao");
}

#[tokio::test]
async fn unknown_and_lapsed_tokens_map_to_404_and_410() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::AddressVerification, "AV-1").await;

    let missing = send(
        &router,
        empty_request(Method::GET, "/verification-by-token/not-a-real-token"),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json_body(missing).await["error"], "token_not_found");

    let later_service = VerificationService::new(
        h.repository.clone(),
        h.blobs.clone(),
        h.notifier.clone(),
        ServiceSettings::default(),
    )
    .with_clock(|| later(48));
    let later_router = verification_router(Arc::new(later_service));
    let lapsed = send(
        &later_router,
        empty_request(Method::GET, &format!("/verification-by-token/{token}")),
    )
    .await;
    assert_eq!(lapsed.status(), StatusCode::GONE);
    assert_eq!(read_json_body(lapsed).await["error"], "token_expired");
}

#[tokio::test]
async fn saving_the_employment_step_returns_derived_gaps() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;

    let response = send(
        &router,
        json_request(
            Method::PUT,
            &format!("/document-collection-by-token/{token}/steps"),
            json!({
                "step": "employment",
                "data": [
                    { "companyName": "Globex", "designation": "Analyst", "periodFrom": "2018-01-01" },
                ],
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["step"], "employment");
    let gaps = body["formData"]["gaps"].as_array().expect("gaps");
    assert_eq!(gaps.len(), 2);
    assert_eq!(gaps[0]["key"], "educationToEmp1");
    assert_eq!(gaps[0]["label"], "Gap between education and Globex");
    assert!(body["formData"]["employments"][0]["id"]
        .as_str()
        .is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn address_steps_are_refused_on_collection_links() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;

    let response = send(
        &router,
        json_request(
            Method::PUT,
            &format!("/document-collection-by-token/{token}/steps"),
            json!({ "step": "address_details", "data": { "line1": "14 MG Road" } }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn single_file_upload_returns_created_descriptor() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;
    let uri = format!("/document-collection-by-token/{token}/documents");

    let response = send(
        &router,
        multipart_request(&uri, &[Part::Text("docType", "pan"), pdf_part("file", "pan.pdf")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["slotKey"], "pan");
    assert_eq!(body["contentType"], "application/pdf");
    assert_eq!(body["originalName"], "pan.pdf");
    assert_eq!(h.blobs.len(), 1);

    let removed = send(
        &router,
        empty_request(
            Method::DELETE,
            &format!("/document-collection-by-token/{token}/documents/pan"),
        ),
    )
    .await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    assert!(h.blobs.is_empty());
}

#[tokio::test]
async fn upload_errors_carry_specific_statuses() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::AddressVerification, "AV-1").await;
    let uri = format!("/verification-by-token/{token}/documents");

    let invalid = send(&router, multipart_request(&uri, &[pdf_part("aadhaar", "a.pdf")])).await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(invalid).await;
    assert_eq!(body["error"], "invalid_slot");
    assert_eq!(body["slotKey"], "aadhaar");

    let unsupported = send(
        &router,
        multipart_request(
            &uri,
            &[Part::File {
                name: "selfie",
                file_name: "selfie.gif",
                content_type: "image/gif",
                bytes: b"GIF89a",
            }],
        ),
    )
    .await;
    assert_eq!(unsupported.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let orphan = send(&router, multipart_request(&uri, &[pdf_part("file", "x.pdf")])).await;
    assert_eq!(orphan.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(orphan).await["error"], "bad_request");
}

#[tokio::test]
async fn multi_file_upload_reports_partial_failure() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::AddressVerification, "AV-1").await;
    let uri = format!("/verification-by-token/{token}/documents");

    let all_good = send(
        &router,
        multipart_request(
            &uri,
            &[pdf_part("id_proof_one", "one.pdf"), pdf_part("id_proof_two", "two.pdf")],
        ),
    )
    .await;
    assert_eq!(all_good.status(), StatusCode::CREATED);
    assert_eq!(
        read_json_body(all_good).await["documents"]
            .as_array()
            .map(Vec::len),
        Some(2)
    );

    let mixed = send(
        &router,
        multipart_request(
            &uri,
            &[pdf_part("selfie", "me.pdf"), pdf_part("cv", "cv.pdf")],
        ),
    )
    .await;
    assert_eq!(mixed.status(), StatusCode::MULTI_STATUS);
    let body = read_json_body(mixed).await;
    assert_eq!(body["documents"][0]["slotKey"], "selfie");
    assert_eq!(body["errors"][0]["slotKey"], "cv");
    assert_eq!(body["errors"][0]["error"], "invalid_slot");
}

#[tokio::test]
async fn collection_submission_round_trip() {
    let h = harness();
    let router = router(&h);
    let (id, token) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;
    upload_required(&h, RecordKind::DocumentCollection, &token, false).await;
    let uri = format!("/document-collection-by-token/{token}/submit");

    let mut incomplete = complete_collection_form(vec![]);
    incomplete.references.clear();
    let rejected = send(
        &router,
        json_request(Method::POST, &uri, json!({ "formData": incomplete })),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(rejected).await;
    assert_eq!(body["error"], "incomplete_form");
    assert_eq!(body["missingFields"][0]["field"], "references");

    let request = Request::builder()
        .method(Method::POST)
        .uri(&uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .header(header::USER_AGENT, "route-test")
        .body(Body::from(
            serde_json::to_vec(&json!({ "formData": complete_collection_form(vec![]) }))
                .expect("json"),
        ))
        .expect("request");
    let accepted = send(&router, request).await;
    assert_eq!(accepted.status(), StatusCode::OK);
    let body = read_json_body(accepted).await;
    assert_eq!(body["verificationStatus"], "completed");
    assert!(body["submittedAt"].is_string());

    let stored = h
        .repository
        .fetch(&RecordId(id))
        .expect("readable")
        .expect("stored");
    let audit = stored.submission.expect("audit");
    assert_eq!(audit.meta.ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(audit.meta.user_agent.as_deref(), Some("route-test"));
    assert_eq!(stored.verification_status, VerificationStatus::Completed);

    let again = send(
        &router,
        json_request(
            Method::POST,
            &uri,
            json!({ "formData": complete_collection_form(vec![]) }),
        ),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(again).await["error"], "already_completed");
}

#[tokio::test]
async fn address_submission_reports_missing_slots() {
    let h = harness();
    let router = router(&h);
    let (_, token) = create_and_link(&router, RecordKind::AddressVerification, "AV-1").await;
    let form = serde_json::to_value(complete_address_form()).expect("form json");

    let response = send(
        &router,
        json_request(Method::POST, &format!("/verification-by-token/{token}/submit"), form),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "missing_documents");
    assert_eq!(body["missingSlots"].as_array().map(Vec::len), Some(6));
}

#[tokio::test]
async fn admin_review_through_update_requires_comment_for_rejection() {
    let h = harness();
    let router = router(&h);
    let (id, token) = create_and_link(&router, RecordKind::AddressVerification, "AV-1").await;
    upload_required(&h, RecordKind::AddressVerification, &token, false).await;
    h.service
        .submit(
            RecordKind::AddressVerification,
            &token,
            FormPayload::AddressVerification(complete_address_form()),
            SubmissionMeta::default(),
        )
        .expect("submitted");
    let uri = format!("/address-verifications/{id}");

    let missing_comment = send(
        &router,
        json_request(Method::PUT, &uri, json!({ "status": "failed" })),
    )
    .await;
    assert_eq!(missing_comment.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(missing_comment).await["error"], "comment_required");

    let failed = send(
        &router,
        json_request(
            Method::PUT,
            &uri,
            json!({
                "status": "failed",
                "verificationData": { "verifierComments": "Door locked on both visits" },
            }),
        ),
    )
    .await;
    assert_eq!(failed.status(), StatusCode::OK);
    let body = read_json_body(failed).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["review"]["verifierComments"], "Door locked on both visits");

    let reopened = send(
        &router,
        empty_request(Method::POST, &format!("{uri}/resubmission")),
    )
    .await;
    assert_eq!(reopened.status(), StatusCode::CREATED);
    let new_token = read_json_body(reopened).await["token"]
        .as_str()
        .expect("token")
        .to_string();
    assert_ne!(new_token, token);
}

#[tokio::test]
async fn admin_document_routes_upload_and_remove() {
    let h = harness();
    let router = router(&h);
    let (id, _) = create_and_link(&router, RecordKind::DocumentCollection, "DC-1").await;
    let uri = format!("/document-collections/{id}/documents/cv");

    let uploaded = send(&router, multipart_request(&uri, &[pdf_part("file", "cv.pdf")])).await;
    assert_eq!(uploaded.status(), StatusCode::CREATED);
    assert_eq!(read_json_body(uploaded).await["slotKey"], "cv");

    let removed = send(&router, empty_request(Method::DELETE, &uri)).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);

    let deleted = send(
        &router,
        empty_request(Method::DELETE, &format!("/document-collections/{id}")),
    )
    .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn company_routes_cover_bulk_send_and_document_types() {
    let h = harness();
    let router = router(&h);
    for code in ["DC-1", "DC-2"] {
        let created = send(
            &router,
            json_request(Method::POST, "/document-collections", create_body(code)),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
    }

    let report = send(
        &router,
        empty_request(
            Method::POST,
            "/document-collections/send-all-links?customerId=acme",
        ),
    )
    .await;
    assert_eq!(report.status(), StatusCode::OK);
    let body = read_json_body(report).await;
    assert_eq!(body["sentCount"], 2);
    assert_eq!(body["failedCount"], 0);
    assert_eq!(h.notifier.events().len(), 2);

    let unknown = send(
        &router,
        empty_request(
            Method::POST,
            "/document-collections/send-all-links?customerId=nobody",
        ),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let companies = send(
        &router,
        empty_request(Method::GET, "/document-collections/companies?search=acme"),
    )
    .await;
    assert_eq!(companies.status(), StatusCode::OK);
    let body = read_json_body(companies).await;
    assert_eq!(body[0]["customerId"], "acme");
    assert_eq!(body[0]["total"], 2);

    let added = send(
        &router,
        json_request(
            Method::POST,
            "/companies/acme/document-types",
            json!({ "label": "Bank Statement", "required": true }),
        ),
    )
    .await;
    assert_eq!(added.status(), StatusCode::CREATED);
    assert_eq!(read_json_body(added).await["key"], "bankStatement");

    let duplicate = send(
        &router,
        json_request(
            Method::POST,
            "/companies/acme/document-types",
            json!({ "label": "bank statement" }),
        ),
    )
    .await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let toggled = send(
        &router,
        json_request(
            Method::PUT,
            "/companies/acme/document-types/bankStatement",
            json!({ "enabled": false }),
        ),
    )
    .await;
    assert_eq!(toggled.status(), StatusCode::OK);
    assert_eq!(read_json_body(toggled).await["enabled"], false);

    let listed = send(&router, empty_request(Method::GET, "/companies/acme/document-types")).await;
    assert_eq!(read_json_body(listed).await.as_array().map(Vec::len), Some(1));
}

#[test]
fn status_mapping_covers_infrastructure_failures() {
    assert_eq!(
        status_for(&VerificationServiceError::Repository(
            RepositoryError::Unavailable("down".to_string())
        )),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(
        status_for(&VerificationServiceError::Blob(BlobError::Unavailable(
            "down".to_string()
        ))),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&VerificationServiceError::Slot(SlotError::FileTooLarge {
            size_bytes: 11,
            max_bytes: 10
        })),
        StatusCode::PAYLOAD_TOO_LARGE
    );
    assert_eq!(
        status_for(&VerificationServiceError::Token(TokenError::AlreadyCompleted)),
        StatusCode::CONFLICT
    );
    assert_eq!(
        status_for(&VerificationServiceError::StateGuard(
            StateGuardError::NotCompleted {
                current: VerificationStatus::InProgress
            }
        )),
        StatusCode::CONFLICT
    );
}
