//! API client for the Commonroom REST backend.
//!
//! Every endpoint is a thin wrapper: build the path, send the payload,
//! return the decoded body. Authentication is handled once, by the
//! [`AuthInterceptor`] wrapped around every request.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthRecord, CredentialStore, Navigator, Session};
use crate::config::{Config, DEFAULT_TIMEOUT_SECS};

use super::{ApiError, AuthInterceptor, ResourceUpload};

/// API client for Commonroom.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    interceptor: AuthInterceptor,
}

impl ApiClient {
    /// Create a client for `base_url` using the default timeout.
    pub fn new(
        base_url: &str,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        Self::with_timeout(
            base_url,
            store,
            navigator,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        Self::with_timeout(
            &config.api_url,
            store,
            navigator,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn with_timeout(
        base_url: &str,
        store: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
        timeout: Duration,
    ) -> Result<Self> {
        // Content-Type is set per request: `.json()` and `.multipart()` add
        // their own, bodyless requests carry none
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            interceptor: AuthInterceptor::new(Session::new(store), navigator),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The stored session credential.
    pub fn session(&self) -> &Session {
        self.interceptor.session()
    }

    // ===== Request plumbing =====

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, path, "Sending request");
        self.interceptor.on_request(self.client.request(method, url))
    }

    /// Send the request, run the response hook on failures and decode the body.
    async fn execute(&self, path: &str, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to send request to {}", path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(ApiError::from)
            .with_context(|| format!("Failed to read response body from {}", path))?;
        debug!(path, %status, "Response received");

        if !status.is_success() {
            self.interceptor.on_error_status(path, status, &text);
            return Err(ApiError::from_status(status, &text).into());
        }

        Ok(decode_body(&text))
    }

    async fn get(&self, path: &str) -> Result<Value> {
        self.execute(path, self.request(Method::GET, path)).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.execute(path, self.request(Method::DELETE, path)).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.execute(path, self.request(Method::POST, path).json(body))
            .await
    }

    async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        self.execute(path, self.request(Method::PUT, path).json(body))
            .await
    }

    // ===== Users =====

    pub async fn register<B: Serialize + ?Sized>(&self, user_data: &B) -> Result<Value> {
        self.post("/users/register", user_data).await
    }

    pub async fn login<B: Serialize + ?Sized>(&self, credentials: &B) -> Result<Value> {
        self.post("/users/login", credentials).await
    }

    pub async fn get_current_user(&self) -> Result<Value> {
        self.get("/users/me").await
    }

    /// Fetch a user by id. Failures are logged and reported as `None`.
    pub async fn get_user_by_id(&self, user_id: impl Display) -> Option<Value> {
        match self.get(&format!("/users/{}", user_id)).await {
            Ok(user) => Some(user),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Error fetching user");
                None
            }
        }
    }

    pub async fn search_users(&self, query: &str) -> Result<Value> {
        let path = "/users";
        let request = self.request(Method::GET, path).query(&[("search", query)]);
        self.execute(path, request).await
    }

    pub async fn update_profile<B: Serialize + ?Sized>(&self, profile_data: &B) -> Result<Value> {
        self.put("/users/profile", profile_data).await
    }

    pub async fn change_password<B: Serialize + ?Sized>(&self, password_data: &B) -> Result<Value> {
        self.put("/users/change-password", password_data).await
    }

    // ===== Resources =====

    /// List resources. `params` is encoded as the query string (filters,
    /// paging); pass an empty slice for no filters.
    pub async fn get_resources<Q: Serialize + ?Sized>(&self, params: &Q) -> Result<Value> {
        let path = "/resources";
        let request = self.request(Method::GET, path).query(params);
        self.execute(path, request).await
    }

    pub async fn get_resource_by_id(&self, id: impl Display) -> Result<Value> {
        self.get(&format!("/resources/{}", id)).await
    }

    /// Create a resource from a multipart form (text fields plus files).
    pub async fn create_resource(&self, upload: ResourceUpload) -> Result<Value> {
        let path = "/resources";
        let form = upload.into_form()?;
        let request = self.request(Method::POST, path).multipart(form);
        self.execute(path, request).await
    }

    pub async fn update_resource<B: Serialize + ?Sized>(
        &self,
        id: impl Display,
        resource_data: &B,
    ) -> Result<Value> {
        self.put(&format!("/resources/{}", id), resource_data).await
    }

    pub async fn delete_resource(&self, id: impl Display) -> Result<Value> {
        self.delete(&format!("/resources/{}", id)).await
    }

    pub async fn get_categories(&self) -> Result<Value> {
        self.get("/resources/categories").await
    }

    pub async fn get_category_by_slug(&self, slug: &str) -> Result<Value> {
        self.get(&format!("/resources/categories/{}", slug)).await
    }

    // ===== Messages =====

    pub async fn send_message<B: Serialize + ?Sized>(&self, message_data: &B) -> Result<Value> {
        self.post("/messages/send", message_data).await
    }

    pub async fn get_chat_history(&self, user1_id: impl Display, user2_id: impl Display) -> Result<Value> {
        self.get(&format!("/messages/history/{}/{}", user1_id, user2_id))
            .await
    }

    pub async fn get_unseen_messages(&self, user_id: impl Display) -> Result<Value> {
        self.get(&format!("/messages/unseen/{}", user_id)).await
    }

    /// Mark a message as seen. The request carries no body.
    pub async fn mark_message_as_seen(&self, message_id: impl Display) -> Result<Value> {
        let path = format!("/messages/seen/{}", message_id);
        self.execute(&path, self.request(Method::PUT, &path)).await
    }

    // ===== Anonymous messages =====

    pub async fn get_anonymous_messages(&self) -> Result<Value> {
        self.get("/anonymous-messages").await
    }

    pub async fn send_anonymous_message<B: Serialize + ?Sized>(&self, message_data: &B) -> Result<Value> {
        self.post("/anonymous-messages", message_data).await
    }

    // ===== Session helpers =====

    /// Log in and persist the returned credential.
    pub async fn sign_in<B: Serialize + ?Sized>(&self, credentials: &B) -> Result<Value> {
        let body = self.login(credentials).await?;
        self.store_session(&body)?;
        Ok(body)
    }

    /// Register and persist the returned credential.
    pub async fn sign_up<B: Serialize + ?Sized>(&self, user_data: &B) -> Result<Value> {
        let body = self.register(user_data).await?;
        self.store_session(&body)?;
        Ok(body)
    }

    /// Forget the stored credential.
    pub fn sign_out(&self) -> Result<()> {
        self.session().clear()?;
        info!("Signed out");
        Ok(())
    }

    fn store_session(&self, body: &Value) -> Result<()> {
        match AuthRecord::from_response(body) {
            Some(record) => {
                self.session()
                    .save(&record)
                    .context("Failed to persist session credential")?;
                info!(user = ?record.display_name(), "Session stored");
            }
            None => warn!("Auth response carried no token, session not stored"),
        }
        Ok(())
    }
}

/// Empty bodies decode to null; bodies that are not JSON are kept as text.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
