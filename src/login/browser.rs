//! Headless Chromium login over the DevTools protocol.
//!
//! The portal redirects to the brand's custom scheme once the user is authorized.
//! Chromium cannot load that URL, but the request still shows up on the network
//! domain, which is where the code is picked up.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventRequestWillBeSent,
};
use chromiumoxide::handler::Handler;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::CodeCapture;
use crate::{AuthorizationRequest, AuthorizationResponse, Credentials, OAuthError, Progress};

use super::USER_AGENT;
use super::automator::LoginAutomator;

// Gigya login form used across the Stellantis portals.
const EMAIL_SELECTOR: &str = r#"#gigya-login-form input[name="username"]"#;
const PASSWORD_SELECTOR: &str = r#"#gigya-login-form input[name="password"]"#;
const SUBMIT_SELECTOR: &str = r#"#gigya-login-form input[type="submit"]"#;
const AUTHORIZE_SELECTOR: &str = r#"#cvs_from input[type="submit"]"#;

const ERROR_PROBE: &str = r#"(function() {
    var error = document.querySelector('.gigya-error-msg, .error-message, [class*="error"]');
    if (error && error.textContent.trim()) {
        return error.textContent.trim();
    }
    return '';
})()"#;

const LAUNCH_ARGS: &[&str] = &[
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
    "--disable-extensions",
    "--no-first-run",
    "--no-default-browser-check",
];

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const LOGIN_FORM_TIMEOUT: Duration = Duration::from_secs(30);
const AUTHORIZE_TIMEOUT: Duration = Duration::from_secs(10);
const FILL_SETTLE: Duration = Duration::from_millis(500);
const SUBMIT_SETTLE: Duration = Duration::from_secs(5);
const AUTHORIZE_SETTLE: Duration = Duration::from_secs(3);
const FINAL_SETTLE: Duration = Duration::from_secs(5);

/// Logs in through a real (headless) browser, one isolated process per run.
#[derive(Debug, Clone, Default)]
pub struct BrowserLogin {
    executable: Option<PathBuf>,
}

impl BrowserLogin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific Chrome/Chromium binary instead of auto-detection.
    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }

    async fn run(
        &self,
        session: &mut BrowserSession,
        request: &AuthorizationRequest,
        credentials: &Credentials,
        progress: &Progress,
    ) -> Result<String, OAuthError> {
        let prefix = request.redirect_prefix.as_str();
        let page = session.browser.new_page("about:blank").await.map_err(browser_error)?;
        page.execute(EnableParams::default())
            .await
            .map_err(browser_error)?;

        let capture = CodeCapture::new();
        session.listen(&page, capture.clone(), prefix).await?;

        progress.report("Loading login page...");
        page.goto(request.authorization_url.as_str())
            .await
            .map_err(|err| OAuthError::Browser(format!("failed to navigate: {err}")))?;
        page.find_element("body")
            .await
            .map_err(|err| OAuthError::Browser(format!("page never became ready: {err}")))?;

        progress.report("Waiting for login form...");
        if !wait_visible(&page, EMAIL_SELECTOR, LOGIN_FORM_TIMEOUT).await {
            let html = page.content().await.unwrap_or_default();
            debug!(length = html.len(), "login form did not appear");
            let detail = html
                .to_lowercase()
                .contains("error")
                .then(|| "login page error".to_string());
            return Err(OAuthError::LoginFormNotFound { detail });
        }

        progress.report("Entering credentials...");
        if !wait_visible(&page, PASSWORD_SELECTOR, POLL_INTERVAL * 4).await {
            return Err(OAuthError::Browser(
                "failed to fill credentials: password field not visible".to_string(),
            ));
        }
        set_value(&page, EMAIL_SELECTOR, &credentials.email).await?;
        set_value(&page, PASSWORD_SELECTOR, &credentials.password).await?;
        tokio::time::sleep(FILL_SETTLE).await;

        progress.report("Submitting login...");
        click(&page, SUBMIT_SELECTOR)
            .await
            .map_err(|err| OAuthError::Browser(format!("failed to submit login: {err}")))?;
        if let Some(result) = capture.wait_for(SUBMIT_SETTLE).await {
            return finish(result, progress);
        }

        let error_text: String = match page.evaluate(ERROR_PROBE).await {
            Ok(result) => result.into_value().unwrap_or_default(),
            Err(err) => {
                debug!(error = %err, "error probe failed");
                String::new()
            }
        };
        if !error_text.is_empty() {
            return Err(OAuthError::AuthenticationFailed(error_text));
        }

        progress.report("Waiting for authorization...");
        if wait_visible(&page, AUTHORIZE_SELECTOR, AUTHORIZE_TIMEOUT).await {
            progress.report("Confirming authorization...");
            if let Err(err) = click(&page, AUTHORIZE_SELECTOR).await {
                warn!(error = %err, "failed to confirm authorization");
            }
            capture.wait_for(AUTHORIZE_SETTLE).await;
        }

        if let Some(result) = capture.wait_for(FINAL_SETTLE).await {
            return finish(result, progress);
        }

        let current = page.url().await.ok().flatten().unwrap_or_default();
        debug!(url = %current, "no redirect captured, checking current url");
        finish(code_from_url(&current, prefix), progress)
    }
}

#[async_trait]
impl LoginAutomator for BrowserLogin {
    fn id(&self) -> &'static str {
        "browser"
    }

    async fn login(
        &self,
        request: &AuthorizationRequest,
        credentials: &Credentials,
        progress: &Progress,
    ) -> Result<String, OAuthError> {
        progress.report("Starting browser...");
        let mut session = BrowserSession::launch(self.executable.as_deref()).await?;
        let result = self.run(&mut session, request, credentials, progress).await;
        session.close().await;
        result
    }
}

/// One browser process with its own throwaway profile.
///
/// Dropping the session (for instance when the surrounding timeout fires) stops the
/// event tasks; the browser process is killed by `Browser`'s own drop and the profile
/// directory is removed afterwards.
struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    _profile: TempDir,
}

impl BrowserSession {
    async fn launch(executable: Option<&Path>) -> Result<Self, OAuthError> {
        let profile = tempfile::Builder::new()
            .prefix("stellantis-oauth-")
            .tempdir()?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .no_sandbox()
            .args(LAUNCH_ARGS.iter().copied())
            .arg(format!("--user-agent={USER_AGENT}"));
        if let Some(executable) = executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|err| OAuthError::Browser(format!("failed to configure browser: {err}")))?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|err| OAuthError::Browser(format!("failed to launch browser: {err}")))?;
        info!(profile = %profile.path().display(), "browser started");

        Ok(Self {
            browser,
            handler_task: tokio::spawn(drive(handler)),
            listeners: Vec::new(),
            _profile: profile,
        })
    }

    async fn listen(
        &mut self,
        page: &Page,
        capture: CodeCapture,
        redirect_prefix: &str,
    ) -> Result<(), OAuthError> {
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(browser_error)?;
        let mut failures = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(browser_error)?;

        let request_capture = capture.clone();
        let prefix = redirect_prefix.to_string();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                request_capture.observe(&event.request.url, &prefix);
            }
        }));

        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = failures.next().await {
                if capture.get().is_none() {
                    debug!(error = %event.error_text, "network loading failed");
                }
            }
        }));
        Ok(())
    }

    async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "failed to close browser");
        }
        if let Err(err) = self.browser.wait().await {
            warn!(error = %err, "failed to wait for browser exit");
        }
        debug!("browser closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
        self.handler_task.abort();
    }
}

async fn drive(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if let Err(err) = event {
            debug!(error = %err, "browser handler error");
        }
    }
}

fn code_from_url(url: &str, redirect_prefix: &str) -> Result<String, OAuthError> {
    match AuthorizationResponse::from_redirect(url, redirect_prefix) {
        Some(Ok(response)) => Ok(response.code),
        Some(Err(err @ OAuthError::AuthorizationDenied { .. })) => Err(err),
        _ => Err(OAuthError::CodeNotFound),
    }
}

fn finish(result: Result<String, OAuthError>, progress: &Progress) -> Result<String, OAuthError> {
    if result.is_ok() {
        progress.report("Authentication successful!");
    }
    result
}

fn browser_error(err: impl Display) -> OAuthError {
    OAuthError::Browser(err.to_string())
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn visibility_script(selector: &str) -> String {
    format!(
        r#"(function() {{
    var el = document.querySelector({selector});
    if (!el) {{
        return false;
    }}
    var style = window.getComputedStyle(el);
    var rect = el.getBoundingClientRect();
    return style.visibility !== 'hidden' && style.display !== 'none' && (rect.width > 0 || rect.height > 0);
}})()"#,
        selector = js_string(selector)
    )
}

// Assigning the value directly is more reliable than typing into the SPA's inputs.
fn set_value_script(selector: &str, value: &str) -> String {
    format!(
        r#"(function() {{
    var el = document.querySelector({selector});
    if (!el) {{
        return false;
    }}
    el.focus();
    el.value = {value};
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#,
        selector = js_string(selector),
        value = js_string(value)
    )
}

async fn wait_visible(page: &Page, selector: &str, timeout: Duration) -> bool {
    let script = visibility_script(selector);
    let deadline = Instant::now() + timeout;
    loop {
        match page.evaluate(script.as_str()).await {
            Ok(result) => {
                if result.into_value::<bool>().unwrap_or(false) {
                    return true;
                }
            }
            Err(err) => debug!(selector, error = %err, "visibility check failed"),
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn set_value(page: &Page, selector: &str, value: &str) -> Result<(), OAuthError> {
    let filled = page
        .evaluate(set_value_script(selector, value))
        .await
        .map_err(|err| OAuthError::Browser(format!("failed to fill credentials: {err}")))?
        .into_value::<bool>()
        .unwrap_or(false);
    if !filled {
        return Err(OAuthError::Browser(format!(
            "failed to fill credentials: {selector} not found"
        )));
    }
    Ok(())
}

async fn click(page: &Page, selector: &str) -> Result<(), OAuthError> {
    page.find_element(selector)
        .await
        .map_err(browser_error)?
        .click()
        .await
        .map_err(browser_error)?;
    Ok(())
}
