//! Integration tests for the API client against a mock backend.
//!
//! These tests verify bearer token injection, the 401/403 session reset
//! and the pass-through behavior of the endpoint wrappers.

use std::sync::{Arc, Mutex};

use commonroom_core::api::{ApiClient, ApiError, ResourceUpload};
use commonroom_core::auth::{CredentialStore, FileStore, MemoryStore, Navigator, AUTH_KEY};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_string());
    }
}

impl RecordingNavigator {
    fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

/// Store that counts removals so "cleared exactly once" can be checked.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    removals: Mutex<usize>,
}

impl CredentialStore for CountingStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        *self.removals.lock().unwrap() += 1;
        self.inner.remove(key)
    }
}

struct Harness {
    server: MockServer,
    client: ApiClient,
    store: Arc<CountingStore>,
    navigator: Arc<RecordingNavigator>,
}

async fn harness(stored: Option<&str>) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(CountingStore::default());
    if let Some(raw) = stored {
        store.set(AUTH_KEY, raw).unwrap();
    }
    let navigator = Arc::new(RecordingNavigator::default());
    let client = ApiClient::new(
        &format!("{}/api", server.uri()),
        store.clone(),
        navigator.clone(),
    )
    .unwrap();
    Harness {
        server,
        client,
        store,
        navigator,
    }
}

fn api_error(err: &anyhow::Error) -> &ApiError {
    err.downcast_ref::<ApiError>()
        .expect("error chain should carry an ApiError")
}

#[tokio::test]
async fn test_bearer_token_attached_when_stored() {
    let h = harness(Some(r#"{"token":"abc123","user":{"name":"Ada"}}"#)).await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ada"})))
        .expect(1)
        .mount(&h.server)
        .await;

    let me = h.client.get_current_user().await.unwrap();
    assert_eq!(me, json!({"name": "Ada"}));
}

#[tokio::test]
async fn test_no_authorization_without_credential() {
    let h = harness(None).await;
    Mock::given(method("GET"))
        .and(path("/api/anonymous-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;

    h.client.get_anonymous_messages().await.unwrap();

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_corrupt_credential_removed_and_request_proceeds() {
    let h = harness(Some("{this is not json")).await;
    Mock::given(method("GET"))
        .and(path("/api/resources/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"slug": "notes"}])))
        .mount(&h.server)
        .await;

    let categories = h.client.get_categories().await.unwrap();
    assert_eq!(categories, json!([{"slug": "notes"}]));

    let requests = h.server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
    assert_eq!(h.store.get(AUTH_KEY).unwrap(), None);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_forbidden_clears_session_and_redirects_once() {
    let h = harness(Some(r#"{"token":"stale"}"#)).await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Invalid token"})))
        .mount(&h.server)
        .await;

    let err = h.client.get_current_user().await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::AccessDenied(body) if body.contains("Invalid token")));

    assert_eq!(h.store.get(AUTH_KEY).unwrap(), None);
    assert_eq!(*h.store.removals.lock().unwrap(), 1);
    assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_unauthorized_clears_session() {
    let h = harness(Some(r#"{"token":"stale"}"#)).await;
    Mock::given(method("PUT"))
        .and(path("/api/messages/seen/m1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h.client.mark_message_as_seen("m1").await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Unauthorized(_)));
    assert_eq!(h.store.get(AUTH_KEY).unwrap(), None);
    assert_eq!(h.navigator.redirects().len(), 1);
}

#[tokio::test]
async fn test_login_failure_keeps_session_and_does_not_redirect() {
    let stored = r#"{"token":"still-valid"}"#;
    let h = harness(Some(stored)).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/register"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&h.server)
        .await;

    let creds = json!({"email": "ada@example.org", "password": "wrong"});
    let err = h.client.login(&creds).await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Unauthorized(_)));
    let err = h.client.register(&creds).await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::AccessDenied(_)));

    assert_eq!(h.store.get(AUTH_KEY).unwrap().as_deref(), Some(stored));
    assert_eq!(*h.store.removals.lock().unwrap(), 0);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_other_errors_propagate_without_touching_session() {
    let h = harness(Some(r#"{"token":"abc"}"#)).await;
    Mock::given(method("DELETE"))
        .and(path("/api/resources/r9"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&h.server)
        .await;

    let err = h.client.delete_resource("r9").await.unwrap_err();
    let api = api_error(&err);
    assert!(matches!(api, ApiError::ServerError { .. }));
    assert_eq!(api.status().map(|s| s.as_u16()), Some(500));
    assert!(h.store.get(AUTH_KEY).unwrap().is_some());
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_get_user_by_id_swallows_errors() {
    let h = harness(None).await;
    Mock::given(method("GET"))
        .and(path("/api/users/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "u1"})))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    assert_eq!(h.client.get_user_by_id("u1").await, Some(json!({"_id": "u1"})));
    assert_eq!(h.client.get_user_by_id("missing").await, None);
}

#[tokio::test]
async fn test_get_user_by_id_unreachable_backend() {
    let store = Arc::new(MemoryStore::new());
    let navigator = Arc::new(RecordingNavigator::default());
    // Nothing listens on port 9 (discard) on test machines
    let client = ApiClient::new("http://127.0.0.1:9/api", store, navigator).unwrap();
    assert_eq!(client.get_user_by_id(42).await, None);
}

#[tokio::test]
async fn test_search_users_encodes_query() {
    let h = harness(None).await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("search", "ada lovelace"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Ada Lovelace"}])))
        .expect(1)
        .mount(&h.server)
        .await;

    let found = h.client.search_users("ada lovelace").await.unwrap();
    assert_eq!(found[0]["name"], "Ada Lovelace");
}

#[tokio::test]
async fn test_get_resources_with_params() {
    let h = harness(None).await;
    Mock::given(method("GET"))
        .and(path("/api/resources"))
        .and(query_param("category", "notes"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resources": [], "page": 2})))
        .expect(1)
        .mount(&h.server)
        .await;

    let page = h
        .client
        .get_resources(&[("category", "notes"), ("page", "2")])
        .await
        .unwrap();
    assert_eq!(page["page"], 2);
}

#[tokio::test]
async fn test_json_payloads_passed_through() {
    let h = harness(Some(r#"{"token":"abc"}"#)).await;
    let profile = json!({"name": "Ada", "bio": "Analyst"});
    Mock::given(method("PUT"))
        .and(path("/api/users/profile"))
        .and(header("content-type", "application/json"))
        .and(body_json(&profile))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updated": true})))
        .expect(1)
        .mount(&h.server)
        .await;
    let message = json!({"receiverId": "u2", "content": "hi"});
    Mock::given(method("POST"))
        .and(path("/api/messages/send"))
        .and(body_json(&message))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "m1"})))
        .expect(1)
        .mount(&h.server)
        .await;

    assert_eq!(h.client.update_profile(&profile).await.unwrap(), json!({"updated": true}));
    assert_eq!(h.client.send_message(&message).await.unwrap(), json!({"_id": "m1"}));
}

#[tokio::test]
async fn test_path_parameters() {
    let h = harness(None).await;
    for p in [
        "/api/messages/history/u1/u2",
        "/api/messages/unseen/u1",
        "/api/resources/categories/lecture-notes",
        "/api/resources/r1",
    ] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"path": p})))
            .expect(1)
            .mount(&h.server)
            .await;
    }

    assert_eq!(
        h.client.get_chat_history("u1", "u2").await.unwrap()["path"],
        "/api/messages/history/u1/u2"
    );
    assert_eq!(
        h.client.get_unseen_messages("u1").await.unwrap()["path"],
        "/api/messages/unseen/u1"
    );
    assert_eq!(
        h.client.get_category_by_slug("lecture-notes").await.unwrap()["path"],
        "/api/resources/categories/lecture-notes"
    );
    assert_eq!(
        h.client.get_resource_by_id("r1").await.unwrap()["path"],
        "/api/resources/r1"
    );
}

#[tokio::test]
async fn test_empty_and_text_bodies() {
    let h = harness(None).await;
    Mock::given(method("PUT"))
        .and(path("/api/resources/r1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/anonymous-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Message posted"))
        .mount(&h.server)
        .await;

    let updated = h.client.update_resource("r1", &json!({"title": "New"})).await.unwrap();
    assert_eq!(updated, Value::Null);
    let posted = h.client.send_anonymous_message(&json!({"content": "hello"})).await.unwrap();
    assert_eq!(posted, json!("Message posted"));
}

#[tokio::test]
async fn test_create_resource_sends_multipart() {
    let h = harness(Some(r#"{"token":"abc"}"#)).await;
    Mock::given(method("POST"))
        .and(path("/api/resources"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "r1"})))
        .expect(1)
        .mount(&h.server)
        .await;

    let upload = ResourceUpload::new()
        .text("title", "Week 1 notes")
        .file("file", "notes.txt", b"hello".to_vec(), Some("text/plain"));
    let created = h.client.create_resource(upload).await.unwrap();
    assert_eq!(created, json!({"_id": "r1"}));

    let requests = h.server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data"), "got {}", content_type);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("Week 1 notes"));
    assert!(body.contains("filename=\"notes.txt\""));
}

#[tokio::test]
async fn test_sign_in_persists_token_for_later_requests() {
    let h = harness(None).await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "fresh", "user": {"_id": "u1", "name": "Ada"}})),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/users/change-password"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "changed"})))
        .expect(1)
        .mount(&h.server)
        .await;

    h.client
        .sign_in(&json!({"email": "ada@example.org", "password": "secret"}))
        .await
        .unwrap();
    let record = h.client.session().load().unwrap().unwrap();
    assert_eq!(record.bearer_token(), Some("fresh"));
    assert_eq!(record.display_name().as_deref(), Some("Ada"));

    h.client
        .change_password(&json!({"currentPassword": "secret", "newPassword": "better"}))
        .await
        .unwrap();

    h.client.sign_out().unwrap();
    assert!(h.client.session().load().unwrap().is_none());
}

#[tokio::test]
async fn test_sign_up_without_token_stores_nothing() {
    let h = harness(None).await;
    Mock::given(method("POST"))
        .and(path("/api/users/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"message": "Check your email"})))
        .mount(&h.server)
        .await;

    let body = h.client.sign_up(&json!({"name": "Ada"})).await.unwrap();
    assert_eq!(body["message"], "Check your email");
    assert!(h.store.get(AUTH_KEY).unwrap().is_none());
}

#[tokio::test]
async fn test_numeric_token_sent_and_record_kept() {
    let stored = r#"{"token":12345,"user":{"name":"Ada"}}"#;
    let h = harness(Some(stored)).await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(header("authorization", "Bearer 12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Ada"})))
        .expect(1)
        .mount(&h.server)
        .await;

    h.client.get_current_user().await.unwrap();
    assert_eq!(h.store.get(AUTH_KEY).unwrap().as_deref(), Some(stored));
    assert_eq!(*h.store.removals.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_get_resources_without_filters_has_no_query() {
    let h = harness(None).await;
    Mock::given(method("GET"))
        .and(path("/api/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&h.server)
        .await;

    let no_filters: &[(&str, &str)] = &[];
    h.client.get_resources(no_filters).await.unwrap();

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.path(), "/api/resources");
    assert_eq!(requests[0].url.query(), None);
    assert!(!requests[0].url.as_str().ends_with('?'));
}

#[tokio::test]
async fn test_unauthorized_search_clears_session() {
    let h = harness(Some(r#"{"token":"stale"}"#)).await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(query_param("search", "ada"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let err = h.client.search_users("ada").await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Unauthorized(_)));
    assert_eq!(h.store.get(AUTH_KEY).unwrap(), None);
    assert_eq!(*h.store.removals.lock().unwrap(), 1);
    assert_eq!(h.navigator.redirects(), vec!["/login".to_string()]);
}

#[tokio::test]
async fn test_file_store_session_survives_new_client() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let base_url = format!("{}/api", server.uri());
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "from-disk"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/me"))
        .and(header("authorization", "Bearer from-disk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "u1"})))
        .expect(1)
        .mount(&server)
        .await;

    let first = ApiClient::new(
        &base_url,
        Arc::new(FileStore::new(dir.path().to_path_buf())),
        Arc::new(RecordingNavigator::default()),
    )
    .unwrap();
    first
        .sign_in(&json!({"email": "ada@example.org", "password": "secret"}))
        .await
        .unwrap();
    drop(first);

    let second = ApiClient::new(
        &base_url,
        Arc::new(FileStore::new(dir.path().to_path_buf())),
        Arc::new(RecordingNavigator::default()),
    )
    .unwrap();
    assert_eq!(second.get_current_user().await.unwrap(), json!({"_id": "u1"}));
}

#[tokio::test]
async fn test_content_type_only_on_json_bodies() {
    let h = harness(None).await;
    Mock::given(method("GET"))
        .and(path("/api/anonymous-messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/messages/seen/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"seen": true})))
        .mount(&h.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/resources/r1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/anonymous-messages"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.server)
        .await;

    h.client.get_anonymous_messages().await.unwrap();
    h.client.mark_message_as_seen("m1").await.unwrap();
    h.client.delete_resource("r1").await.unwrap();
    h.client
        .send_anonymous_message(&json!({"content": "hello"}))
        .await
        .unwrap();

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
    for request in &requests[..3] {
        assert!(
            !request.headers.contains_key("content-type"),
            "{} {} carried a Content-Type",
            request.method,
            request.url
        );
    }
}
