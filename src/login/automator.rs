use async_trait::async_trait;

use crate::{AuthorizationRequest, Credentials, OAuthError, Progress};

/// Drives a portal login page until the redirect to the brand's custom scheme
/// reveals an authorization code.
///
/// Implementations own every resource they allocate for a run and must release
/// it when the returned future completes or is dropped.
#[async_trait]
pub trait LoginAutomator: Send + Sync {
    fn id(&self) -> &'static str;

    async fn login(
        &self,
        request: &AuthorizationRequest,
        credentials: &Credentials,
        progress: &Progress,
    ) -> Result<String, OAuthError>;
}
