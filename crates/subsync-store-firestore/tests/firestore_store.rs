// Integration tests for `FirestoreStore` against a mock Firestore REST API.

use serde_json::{Value, json};
use subsync_core::{DocumentStore, SitePatch};
use subsync_store_firestore::{FirestoreStore, TokenSource};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

const DOCS: &str = "/v1/projects/acme-prod/databases/(default)/documents/sites";
const COMMIT: &str = "/v1/projects/acme-prod/databases/(default)/documents:commit";

fn store(server: &MockServer, auth: TokenSource) -> FirestoreStore {
    FirestoreStore::with_endpoint(&server.uri(), "acme-prod", "(default)", auth).unwrap()
}

fn document(id: &str, fields: Value) -> Value {
    json!({
        "name": format!("projects/acme-prod/databases/(default)/documents/sites/{}", id),
        "fields": fields,
        "createTime": "2025-01-01T00:00:00Z",
        "updateTime": "2025-01-02T00:00:00Z",
    })
}

// ── Listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn lists_and_decodes_documents() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .and(query_param("pageSize", "300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [document("acme", json!({
                "Client": {"stringValue": "Acme Realty"},
                "apiKey": {"stringValue": "k-acme"},
                "subscriptionID": {"integerValue": "4021"},
                "availableUsers": {"mapValue": {"fields": {"u1": {"stringValue": "Alice"}}}},
                "allowedAdminUserIds": {"arrayValue": {"values": [{"stringValue": "ext-1"}]}},
            }))]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sites = store(&server, TokenSource::None).list_sites("sites").await.unwrap();

    assert_eq!(sites.len(), 1);
    let site = &sites[0];
    assert_eq!(site.id, "acme");
    assert_eq!(site.client.as_deref(), Some("Acme Realty"));
    assert_eq!(site.api_key.as_deref(), Some("k-acme"));
    assert_eq!(site.subscription_id.as_deref(), Some("4021"));
    assert_eq!(site.allowed_admin_user_ids, vec!["ext-1"]);
    assert_eq!(
        site.available_users.as_ref().unwrap().get("u1"),
        Some(&json!("Alice"))
    );
}

#[tokio::test]
async fn follows_page_tokens() {
    let server = MockServer::start().await;

    // Second page first: the more specific matcher must win
    Mock::given(method("GET"))
        .and(path(DOCS))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [document("b", json!({}))]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [document("a", json!({}))],
            "nextPageToken": "page-2",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sites = store(&server, TokenSource::None).list_sites("sites").await.unwrap();

    let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn empty_collection_lists_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    assert!(store(&server, TokenSource::None).list_sites("sites").await.unwrap().is_empty());
}

#[tokio::test]
async fn list_error_carries_firestore_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let err = store(&server, TokenSource::None).list_sites("sites").await.unwrap_err();
    let text = err.to_string();
    assert!(text.contains("403"), "error was: {}", text);
    assert!(text.contains("Missing or insufficient permissions."), "error was: {}", text);
}

// ── Commit ──────────────────────────────────────────────────────────

#[tokio::test]
async fn resubscribed_commits_masked_update() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMIT))
        .and(body_partial_json(json!({
            "writes": [{
                "update": {
                    "name": "projects/acme-prod/databases/(default)/documents/sites/acme",
                    "fields": {
                        "subscriptionID": {"stringValue": "s-2"},
                        "new_subscription": {"booleanValue": true},
                    },
                },
                "updateMask": {"fieldPaths": ["subscriptionID", "new_subscription"]},
                "currentDocument": {"exists": true},
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"writeResults": [{}]})))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, TokenSource::None)
        .update_site(
            "sites",
            "acme",
            &SitePatch::Resubscribed {
                subscription_id: "s-2".to_string(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn grant_commits_union_transform() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMIT))
        .and(body_partial_json(json!({
            "writes": [{
                "updateMask": {"fieldPaths": ["availableUsers.`ext-1`"]},
                "updateTransforms": [{
                    "fieldPath": "allowedAdminUserIds",
                    "appendMissingElements": {"values": [{"stringValue": "ext-1"}]},
                }],
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"writeResults": [{}]})))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, TokenSource::None)
        .update_site(
            "sites",
            "acme",
            &SitePatch::GrantAdmin {
                user_id: "ext-1".to_string(),
                name: "Alice".to_string(),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn commit_on_missing_document_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMMIT))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "No document to update", "status": "NOT_FOUND"}
        })))
        .mount(&server)
        .await;

    let err = store(&server, TokenSource::None)
        .update_site(
            "sites",
            "ghost",
            &SitePatch::Resubscribed {
                subscription_id: "s-2".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No document to update"));
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn static_token_is_sent_as_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .and(header("Authorization", "Bearer ya29.static"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    store(&server, TokenSource::Static("ya29.static".to_string()))
        .list_sites("sites")
        .await
        .unwrap();
}

#[tokio::test]
async fn emulator_requests_carry_no_authorization() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    store(&server, TokenSource::None).list_sites("sites").await.unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn metadata_token_is_fetched_once_and_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.from-metadata",
            "expires_in": 3599,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(DOCS))
        .and(header("Authorization", "Bearer ya29.from-metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let auth = TokenSource::metadata_at(format!("{}/token", server.uri()));
    let store = store(&server, auth);

    store.list_sites("sites").await.unwrap();
    store.list_sites("sites").await.unwrap();
}

#[tokio::test]
async fn metadata_failure_fails_the_read() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let auth = TokenSource::metadata_at(format!("{}/token", server.uri()));
    let err = store(&server, auth).list_sites("sites").await.unwrap_err();

    assert!(err.to_string().contains("Metadata server"));
}
