//! Request/response hooks shared by every call the client makes.
//!
//! Outgoing requests pick up the bearer token from the stored session.
//! A 401/403 answer clears the session and sends the user to the login
//! page, except while logging in or registering.

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use tracing::{error, warn};

use crate::auth::{AuthRecord, Navigator, Session, LOGIN_PATH};

/// Endpoints whose auth failures mean "wrong credentials", not "stale session".
pub const AUTH_EXEMPT_PATHS: [&str; 2] = ["/users/login", "/users/register"];

/// Longest slice of an error body copied into the log
const MAX_LOGGED_BODY: usize = 200;

#[derive(Clone)]
pub struct AuthInterceptor {
    session: Session,
    navigator: Arc<dyn Navigator>,
}

impl AuthInterceptor {
    pub fn new(session: Session, navigator: Arc<dyn Navigator>) -> Self {
        Self { session, navigator }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Attach `Authorization: Bearer <token>` when a usable credential is stored.
    pub fn on_request(&self, request: RequestBuilder) -> RequestBuilder {
        match self.stored_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Token from the stored record. A record that fails to parse is
    /// deleted; no failure here stops the request.
    pub fn stored_token(&self) -> Option<String> {
        let raw = match self.session.raw() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                return None;
            }
        };

        match AuthRecord::from_json(&raw) {
            Ok(record) => record.bearer_token().map(str::to_string),
            Err(e) => {
                error!(error = %e, "Error parsing auth token, discarding stored credential");
                if let Err(e) = self.session.clear() {
                    warn!(error = %e, "Failed to remove corrupt credential");
                }
                None
            }
        }
    }

    /// Handle a non-success response. Returns true when the session was
    /// cleared and a redirect issued.
    pub fn on_error_status(&self, path: &str, status: StatusCode, body: &str) -> bool {
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN {
            return false;
        }

        let logged: String = body.chars().take(MAX_LOGGED_BODY).collect();
        error!(%status, path, body = %logged, "Authentication error");

        if is_auth_endpoint(path) {
            return false;
        }

        if let Err(e) = self.session.clear() {
            warn!(error = %e, "Failed to clear rejected credential");
        }
        self.navigator.redirect(LOGIN_PATH);
        true
    }
}

/// True for the login and register endpoints, ignoring any query string.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    AUTH_EXEMPT_PATHS.contains(&path)
}
