//! Retrieve OAuth 2.0 authorization codes from the Stellantis brand portals.
//!
//! The portals only issue codes to their mobile apps, by redirecting to a custom URL
//! scheme. This crate drives the login page (through a headless browser or by
//! replaying the form over HTTP) and picks the code out of that redirect.

mod authorize;
mod capture;
mod client;
mod config;
mod error;
mod login;
mod progress;
mod types;
#[cfg(feature = "server")]
mod web;

pub use authorize::{authorization_request, redirect_uri};
pub use capture::CodeCapture;
pub use client::{OAuthClient, OAuthClientConfig, PreparedLogin};
pub use config::{BrandConfig, ConfigProvider, ConfigSnapshot, ConfigSource, CountryConfig};
pub use error::OAuthError;
#[cfg(feature = "browser")]
pub use login::BrowserLogin;
pub use login::{
    HttpLogin, LoginAutomator, LoginMode, MAX_REDIRECTS, extract_form_action,
    extract_hidden_fields, extract_script_redirect, looks_like_error,
};
pub use progress::Progress;
pub use types::{
    AuthorizationRequest, AuthorizationResponse, Credentials, OAuthData, OAuthRequest,
    OAuthResponse, StreamEvent,
};
#[cfg(feature = "server")]
pub use web::{ServerConfig, router, serve};
