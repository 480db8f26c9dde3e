//! REST API client module for the Commonroom backend.
//!
//! This module provides the `ApiClient` for talking to the users,
//! resources, messages and anonymous-message endpoints.
//!
//! Requests carry a JWT bearer token read from the stored session; a
//! rejected token clears the session and triggers a login redirect.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod upload;

pub use client::ApiClient;
pub use error::ApiError;
pub use interceptor::{is_auth_endpoint, AuthInterceptor, AUTH_EXEMPT_PATHS};
pub use upload::ResourceUpload;
