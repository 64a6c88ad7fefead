use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("All fields are required")]
    MissingFields,

    #[error("unknown brand: {0}")]
    UnknownBrand(String),

    #[error("unknown country for brand {brand}: {country}")]
    UnknownCountry { brand: String, country: String },

    #[error("failed to parse configs: {0}")]
    InvalidConfig(String),

    #[error("failed to fetch configs from {url}: {message}")]
    ConfigFetch { url: String, message: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("login form not found{}", suffix(.detail))]
    LoginFormNotFound { detail: Option<String> },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("authentication failed - invalid credentials or portal error")]
    CredentialsRejected,

    #[error("authorization denied: {error}{}", suffix(.description))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("missing authorization code in redirect url")]
    MissingAuthorizationCode,

    #[error("too many redirects (max {max})")]
    TooManyRedirects { max: usize },

    #[error("authentication failed - could not retrieve OAuth code")]
    CodeNotFound,

    #[error("authentication timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

fn suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|detail| format!(" ({detail})"))
        .unwrap_or_default()
}

impl OAuthError {
    /// Errors caused by the caller's input rather than the portal or the host.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingFields | Self::UnknownBrand(_) | Self::UnknownCountry { .. }
        )
    }

    pub fn is_config_source(&self) -> bool {
        matches!(self, Self::ConfigFetch { .. } | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::OAuthError;

    #[test]
    fn validation_messages_name_the_input() {
        assert_eq!(
            OAuthError::UnknownBrand("MyFiat".to_string()).to_string(),
            "unknown brand: MyFiat"
        );
        assert_eq!(
            OAuthError::UnknownCountry {
                brand: "MyPeugeot".to_string(),
                country: "ZZ".to_string(),
            }
            .to_string(),
            "unknown country for brand MyPeugeot: ZZ"
        );
        assert!(OAuthError::MissingFields.is_validation());
        assert!(!OAuthError::CodeNotFound.is_validation());
    }

    #[test]
    fn optional_details_are_appended() {
        let err = OAuthError::LoginFormNotFound { detail: None };
        assert_eq!(err.to_string(), "login form not found");

        let err = OAuthError::LoginFormNotFound {
            detail: Some("login page error".to_string()),
        };
        assert_eq!(err.to_string(), "login form not found (login page error)");

        let err = OAuthError::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "authorization denied: access_denied");
    }
}
