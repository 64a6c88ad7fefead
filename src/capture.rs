use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::{AuthorizationResponse, OAuthError};

/// Set-once slot for the outcome of the redirect seen on the wire during one login
/// run: either the authorization code or the portal's denial.
///
/// Clones share the same slot; the first outcome written wins.
#[derive(Debug, Clone, Default)]
pub struct CodeCapture {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    outcome: OnceLock<Outcome>,
    notify: Notify,
}

#[derive(Debug, Clone)]
enum Outcome {
    Code(String),
    Denied {
        error: String,
        description: Option<String>,
    },
}

impl Outcome {
    fn into_result(self) -> Result<String, OAuthError> {
        match self {
            Self::Code(code) => Ok(code),
            Self::Denied { error, description } => {
                Err(OAuthError::AuthorizationDenied { error, description })
            }
        }
    }
}

impl CodeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, code: impl Into<String>) -> bool {
        self.store(Outcome::Code(code.into()))
    }

    pub fn deny(&self, error: impl Into<String>, description: Option<String>) -> bool {
        self.store(Outcome::Denied {
            error: error.into(),
            description,
        })
    }

    fn store(&self, outcome: Outcome) -> bool {
        let stored = self.inner.outcome.set(outcome).is_ok();
        if stored {
            self.inner.notify.notify_waiters();
        }
        stored
    }

    pub fn get(&self) -> Option<Result<String, OAuthError>> {
        self.inner.outcome.get().cloned().map(Outcome::into_result)
    }

    pub fn observe(&self, url: &str, redirect_prefix: &str) -> bool {
        match AuthorizationResponse::from_redirect(url, redirect_prefix) {
            Some(Ok(response)) => {
                let stored = self.set(response.code);
                if stored {
                    info!("captured oauth code from redirect request");
                }
                stored
            }
            Some(Err(OAuthError::AuthorizationDenied { error, description })) => {
                warn!(error = %error, "portal denied authorization");
                self.deny(error, description)
            }
            _ => false,
        }
    }

    pub async fn wait(&self) -> Result<String, OAuthError> {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(result) = self.get() {
                return result;
            }
            notified.await;
        }
    }

    pub async fn wait_for(&self, delay: Duration) -> Option<Result<String, OAuthError>> {
        tokio::time::timeout(delay, self.wait()).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::CodeCapture;
    use crate::OAuthError;

    #[test]
    fn first_code_wins() {
        let capture = CodeCapture::new();
        assert!(capture.observe("mymap://oauth2redirect/gb?code=abc123", "mymap://"));
        assert!(!capture.observe("mymap://oauth2redirect/gb?code=later", "mymap://"));
        assert_eq!(capture.get().unwrap().unwrap(), "abc123");
    }

    #[test]
    fn ignores_unrelated_requests() {
        let capture = CodeCapture::new();
        assert!(!capture.observe("https://idpcvs.peugeot.com/am/login?code=nope", "mymap://"));
        assert!(!capture.observe("mymap://oauth2redirect/gb?state=xyz", "mymap://"));
        assert!(capture.get().is_none());
    }

    #[tokio::test]
    async fn denied_redirect_ends_the_wait() {
        let capture = CodeCapture::new();
        assert!(capture.observe(
            "mymap://oauth2redirect/gb?error=access_denied&error_description=User%20cancelled",
            "mymap://"
        ));
        assert!(!capture.observe("mymap://oauth2redirect/gb?code=late", "mymap://"));

        let err = capture
            .wait_for(Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, OAuthError::AuthorizationDenied { ref error, .. } if error == "access_denied"));
        assert_eq!(err.to_string(), "authorization denied: access_denied (User cancelled)");
    }

    #[tokio::test]
    async fn wait_resolves_once_set() {
        let capture = CodeCapture::new();
        let writer = capture.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.set("abc123");
        });

        let code = tokio::time::timeout(Duration::from_secs(2), capture.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, "abc123");
    }

    #[tokio::test]
    async fn wait_for_gives_up_after_delay() {
        let capture = CodeCapture::new();
        assert!(capture.wait_for(Duration::from_millis(10)).await.is_none());
        capture.set("abc123");
        assert_eq!(
            capture.wait_for(Duration::from_millis(10)).await.unwrap().unwrap(),
            "abc123"
        );
    }
}
