use serde::{Deserialize, Serialize};
use url::Url;

use crate::OAuthError;

/// Body of `POST /oauth`. Absent fields deserialize as empty strings.
#[derive(Clone, Default, Deserialize)]
pub struct OAuthRequest {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl OAuthRequest {
    pub fn validate(&self) -> Result<(), OAuthError> {
        let fields = [&self.brand, &self.country, &self.email, &self.password];
        if fields.iter().any(|field| field.is_empty()) {
            return Err(OAuthError::MissingFields);
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

impl std::fmt::Debug for OAuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthRequest")
            .field("brand", &self.brand)
            .field("country", &self.country)
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub redirect_uri: String,
    pub redirect_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
}

impl AuthorizationResponse {
    /// Returns `None` when `url` does not target the custom scheme at all.
    pub fn from_redirect(url: &str, redirect_prefix: &str) -> Option<Result<Self, OAuthError>> {
        if !url.starts_with(redirect_prefix) {
            return None;
        }
        Some(Self::from_url(url))
    }

    pub fn from_url(callback_url: &str) -> Result<Self, OAuthError> {
        let url = Url::parse(callback_url)?;
        let mut code = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" if code.is_none() && !value.is_empty() => code = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        match (code, error) {
            (Some(code), _) => Ok(Self { code }),
            (None, Some(error)) => Err(OAuthError::AuthorizationDenied { error, description }),
            (None, None) => Err(OAuthError::MissingAuthorizationCode),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<OAuthData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthData {
    pub code: String,
}

impl OAuthResponse {
    pub fn success(code: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(OAuthData { code: code.into() }),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Progress { message: String },
    Success { code: String },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

impl From<Result<String, OAuthError>> for StreamEvent {
    fn from(result: Result<String, OAuthError>) -> Self {
        match result {
            Ok(code) => Self::Success { code },
            Err(err) => Self::Error {
                message: err.to_string(),
            },
        }
    }
}
