mod automator;
#[cfg(feature = "browser")]
mod browser;
mod form;
mod http;

use std::fmt;
use std::str::FromStr;

pub use automator::LoginAutomator;
#[cfg(feature = "browser")]
pub use browser::BrowserLogin;
pub use form::{extract_form_action, extract_hidden_fields, extract_script_redirect, looks_like_error};
pub use http::{HttpLogin, MAX_REDIRECTS};

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Which automator backs the `/oauth` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    #[cfg(feature = "browser")]
    Browser,
    Http,
}

impl Default for LoginMode {
    #[cfg(feature = "browser")]
    fn default() -> Self {
        Self::Browser
    }

    #[cfg(not(feature = "browser"))]
    fn default() -> Self {
        Self::Http
    }
}

impl fmt::Display for LoginMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "browser")]
            Self::Browser => f.write_str("browser"),
            Self::Http => f.write_str("http"),
        }
    }
}

impl FromStr for LoginMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            #[cfg(feature = "browser")]
            "browser" | "chromium" => Ok(Self::Browser),
            "http" | "manual" => Ok(Self::Http),
            other => Err(format!("unsupported login mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LoginMode;

    #[test]
    fn parses_login_modes() {
        assert_eq!("HTTP".parse::<LoginMode>(), Ok(LoginMode::Http));
        assert_eq!("manual".parse::<LoginMode>(), Ok(LoginMode::Http));
        assert!("selenium".parse::<LoginMode>().is_err());
        assert_eq!(LoginMode::Http.to_string(), "http");
    }

    #[cfg(feature = "browser")]
    #[test]
    fn browser_is_the_default_when_available() {
        assert_eq!(LoginMode::default(), LoginMode::Browser);
        assert_eq!("browser".parse::<LoginMode>(), Ok(LoginMode::Browser));
    }
}
