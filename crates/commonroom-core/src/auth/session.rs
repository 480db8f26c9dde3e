use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::CredentialStore;

/// Storage key holding the session credential.
pub const AUTH_KEY: &str = "auth";

const TOKEN_FIELD: &str = "token";
const SAVED_AT_FIELD: &str = "saved_at";

/// The persisted session credential.
///
/// Everything the backend returned alongside the token is kept in
/// `profile` so identity data round-trips unmodified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl AuthRecord {
    /// Parse a stored record. Only text that is not JSON, or JSON `null`,
    /// is rejected; any other value yields a record, possibly without a token.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).context("Stored credential is not JSON")?;
        match value {
            Value::Null => Err(anyhow::anyhow!("Stored credential is null")),
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Ok(Self::from_map(Map::new())),
        }
    }

    /// Build a record from a login/register response body.
    /// Returns `None` when the body carries no usable token.
    pub fn from_response(body: &Value) -> Option<Self> {
        let mut record = Self::from_map(body.as_object()?.clone());
        record.bearer_token()?;
        record.saved_at = Some(Utc::now());
        Some(record)
    }

    /// Pull the token and timestamp out of a JSON object. Numeric tokens
    /// are kept as text; fields that cannot be read stay in `profile`.
    fn from_map(mut profile: Map<String, Value>) -> Self {
        let token = match profile.get(TOKEN_FIELD) {
            Some(Value::String(t)) => Some(t.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        if token.is_some() {
            profile.remove(TOKEN_FIELD);
        }

        let saved_at = profile
            .get(SAVED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|at| at.with_timezone(&Utc));
        if saved_at.is_some() {
            profile.remove(SAVED_AT_FIELD);
        }

        Self {
            token,
            saved_at,
            profile,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The token, if present and non-empty.
    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Best-effort human label for the signed-in user.
    pub fn display_name(&self) -> Option<String> {
        let user = self
            .profile
            .get("user")
            .and_then(Value::as_object)
            .unwrap_or(&self.profile);
        ["name", "username", "email"]
            .iter()
            .find_map(|field| user.get(*field).and_then(Value::as_str))
            .map(str::to_string)
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.saved_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let Some(minutes) = self.age_minutes() else {
            return "unknown".to_string();
        };
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// The session credential as seen through a [`CredentialStore`].
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn CredentialStore>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Raw stored value, unparsed
    pub fn raw(&self) -> Result<Option<String>> {
        self.store.get(AUTH_KEY)
    }

    /// Load and parse the stored record.
    pub fn load(&self) -> Result<Option<AuthRecord>> {
        match self.raw()? {
            Some(raw) => AuthRecord::from_json(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn save(&self, record: &AuthRecord) -> Result<()> {
        self.store.set(AUTH_KEY, &record.to_json()?)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(AUTH_KEY)
    }
}
