use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, header::LOCATION, redirect::Policy};
use tracing::{debug, info, warn};

use crate::{AuthorizationRequest, AuthorizationResponse, Credentials, OAuthError, Progress};

use super::USER_AGENT;
use super::automator::LoginAutomator;
use super::form;

pub const MAX_REDIRECTS: usize = 10;

/// Replays the login form over plain HTTP, inspecting every redirect by hand.
#[derive(Debug, Clone)]
pub struct HttpLogin {
    max_redirects: usize,
    request_timeout: Option<Duration>,
    user_agent: String,
}

impl Default for HttpLogin {
    fn default() -> Self {
        Self {
            max_redirects: MAX_REDIRECTS,
            request_timeout: None,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

enum Landing {
    Code(String),
    Page { url: String, body: String },
}

impl HttpLogin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// A fresh client per run so cookies never leak between logins.
    fn client(&self) -> Result<Client, OAuthError> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .user_agent(self.user_agent.clone());
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    async fn follow(
        &self,
        client: &Client,
        first: RequestBuilder,
        redirect_prefix: &str,
        follow_scripts: bool,
    ) -> Result<Landing, OAuthError> {
        let mut response = first.send().await?;
        let mut hops = 0;

        loop {
            let target = match next_target(response, redirect_prefix, follow_scripts).await? {
                Step::Code(code) => return Ok(Landing::Code(code)),
                Step::Rest { url, body } => return Ok(Landing::Page { url, body }),
                Step::Follow(target) => target,
            };

            if hops >= self.max_redirects {
                warn!(max = self.max_redirects, "redirect chain exhausted");
                return Err(OAuthError::TooManyRedirects {
                    max: self.max_redirects,
                });
            }
            hops += 1;
            debug!(hop = hops, url = %target, "following redirect");
            response = client.get(&target).send().await?;
        }
    }
}

enum Step {
    Code(String),
    Follow(String),
    Rest { url: String, body: String },
}

async fn next_target(
    response: Response,
    redirect_prefix: &str,
    follow_scripts: bool,
) -> Result<Step, OAuthError> {
    let current = response.url().to_string();
    let status = response.status();
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if let Some(location) = location {
        let target = form::resolve(&current, &location).unwrap_or(location);
        if let Some(result) = AuthorizationResponse::from_redirect(&target, redirect_prefix) {
            return result.map(|response| Step::Code(response.code));
        }
        if status.is_redirection() {
            return Ok(Step::Follow(target));
        }
    }

    let body = response.text().await?;
    if follow_scripts {
        if let Some(target) = form::extract_script_redirect(&body) {
            let target = form::resolve(&current, &target).unwrap_or(target);
            if let Some(result) = AuthorizationResponse::from_redirect(&target, redirect_prefix) {
                return result.map(|response| Step::Code(response.code));
            }
            return Ok(Step::Follow(target));
        }
    }

    Ok(Step::Rest { url: current, body })
}

#[async_trait]
impl LoginAutomator for HttpLogin {
    fn id(&self) -> &'static str {
        "http"
    }

    async fn login(
        &self,
        request: &AuthorizationRequest,
        credentials: &Credentials,
        progress: &Progress,
    ) -> Result<String, OAuthError> {
        let client = self.client()?;
        let prefix = request.redirect_prefix.as_str();

        progress.report("Loading login page...");
        let get = client.get(&request.authorization_url);
        let (page_url, page) = match self.follow(&client, get, prefix, false).await? {
            Landing::Code(code) => {
                info!("portal redirected straight to the app scheme");
                return Ok(code);
            }
            Landing::Page { url, body } => (url, body),
        };

        progress.report("Looking for login form...");
        let action = form::extract_form_action(&page, &page_url)
            .ok_or(OAuthError::LoginFormNotFound { detail: None })?;

        let mut fields = form::extract_hidden_fields(&page);
        debug!(action = %action, hidden = fields.len(), "login form found");
        fields.push(("username".to_string(), credentials.email.clone()));
        fields.push(("password".to_string(), credentials.password.clone()));
        fields.push(("rememberMe".to_string(), "true".to_string()));

        progress.report("Submitting login...");
        let post = client.post(&action).form(&fields);
        match self.follow(&client, post, prefix, true).await? {
            Landing::Code(code) => {
                progress.report("Authentication successful!");
                Ok(code)
            }
            Landing::Page { url, body } => {
                debug!(url = %url, length = body.len(), "login ended without a code");
                if form::looks_like_error(&body) {
                    Err(OAuthError::CredentialsRejected)
                } else {
                    Err(OAuthError::CodeNotFound)
                }
            }
        }
    }
}
