use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::authorize::authorization_request;
use crate::config::ConfigProvider;
use crate::login::LoginAutomator;
use crate::{AuthorizationRequest, Credentials, OAuthError, OAuthRequest, Progress};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub timeout: Duration,
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl OAuthClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PreparedLogin {
    pub brand: String,
    pub country: String,
    pub authorization: AuthorizationRequest,
    credentials: Credentials,
}

/// Resolves brand configuration and runs one login per request under a deadline.
#[derive(Clone)]
pub struct OAuthClient {
    configs: Arc<ConfigProvider>,
    automator: Arc<dyn LoginAutomator>,
    config: OAuthClientConfig,
}

impl OAuthClient {
    pub fn new<A>(configs: ConfigProvider, automator: A, config: OAuthClientConfig) -> Self
    where
        A: LoginAutomator + 'static,
    {
        Self::with_shared(Arc::new(configs), Arc::new(automator), config)
    }

    pub fn with_shared(
        configs: Arc<ConfigProvider>,
        automator: Arc<dyn LoginAutomator>,
        config: OAuthClientConfig,
    ) -> Self {
        Self {
            configs,
            automator,
            config,
        }
    }

    pub fn configs(&self) -> &ConfigProvider {
        &self.configs
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    pub async fn prepare(&self, request: &OAuthRequest) -> Result<PreparedLogin, OAuthError> {
        request.validate()?;
        let snapshot = self.configs.snapshot().await?;
        let (brand, country) = snapshot.lookup(&request.brand, &request.country)?;
        let authorization = authorization_request(brand, country, &request.country)?;

        Ok(PreparedLogin {
            brand: request.brand.clone(),
            country: request.country.clone(),
            authorization,
            credentials: request.credentials(),
        })
    }

    pub async fn run(
        &self,
        prepared: PreparedLogin,
        progress: &Progress,
    ) -> Result<String, OAuthError> {
        progress.report("Preparing authentication...");
        let PreparedLogin {
            brand,
            country,
            authorization,
            credentials,
        } = prepared;
        info!(
            brand = %brand,
            country = %country,
            automator = self.automator.id(),
            "starting oauth flow"
        );

        let timeout = self.config.timeout;
        let login = self.automator.login(&authorization, &credentials, progress);
        match tokio::time::timeout(timeout, login).await {
            Ok(Ok(code)) => {
                info!(brand = %brand, country = %country, "oauth flow succeeded");
                Ok(code)
            }
            Ok(Err(err)) => {
                warn!(brand = %brand, country = %country, error = %err, "oauth flow failed");
                Err(err)
            }
            Err(_) => {
                warn!(brand = %brand, country = %country, ?timeout, "oauth flow timed out");
                Err(OAuthError::Timeout { timeout })
            }
        }
    }

    pub async fn authorize(
        &self,
        request: &OAuthRequest,
        progress: &Progress,
    ) -> Result<String, OAuthError> {
        let prepared = self.prepare(request).await?;
        self.run(prepared, progress).await
    }
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("configs", &self.configs.source())
            .field("automator", &self.automator.id())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{OAuthClient, OAuthClientConfig};
    use crate::config::ConfigProvider;
    use crate::login::LoginAutomator;
    use crate::{AuthorizationRequest, Credentials, OAuthError, OAuthRequest, Progress};

    #[derive(Debug, Default)]
    pub(crate) struct StubAutomator {
        pub(crate) calls: AtomicUsize,
        pub(crate) completed: AtomicUsize,
        pub(crate) delay: Option<Duration>,
    }

    #[async_trait]
    impl LoginAutomator for StubAutomator {
        fn id(&self) -> &'static str {
            "stub"
        }

        async fn login(
            &self,
            request: &AuthorizationRequest,
            credentials: &Credentials,
            progress: &Progress,
        ) -> Result<String, OAuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            progress.report("Submitting login...");
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            if credentials.password == "wrong" {
                return Err(OAuthError::CredentialsRejected);
            }
            assert_eq!(request.redirect_prefix, "mymap://");
            Ok("abc123".to_string())
        }
    }

    pub(crate) fn stub_client(automator: Arc<StubAutomator>) -> OAuthClient {
        OAuthClient::with_shared(
            Arc::new(ConfigProvider::embedded()),
            automator,
            OAuthClientConfig::new().with_timeout(Duration::from_millis(200)),
        )
    }

    pub(crate) fn peugeot_request() -> OAuthRequest {
        OAuthRequest {
            brand: "MyPeugeot".to_string(),
            country: "GB".to_string(),
            email: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn authorize_returns_code_and_reports_progress() {
        let automator = Arc::new(StubAutomator::default());
        let client = stub_client(automator.clone());

        let steps = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = steps.clone();
        let progress = Progress::new(move |step| sink.lock().unwrap().push(step.to_string()));

        let code = client.authorize(&peugeot_request(), &progress).await.unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(
            *steps.lock().unwrap(),
            vec!["Preparing authentication...", "Submitting login..."]
        );
        assert_eq!(automator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_happens_before_automation() {
        let automator = Arc::new(StubAutomator::default());
        let client = stub_client(automator.clone());

        let mut request = peugeot_request();
        request.password.clear();
        let err = client.authorize(&request, &Progress::silent()).await.unwrap_err();
        assert!(matches!(err, OAuthError::MissingFields));

        let mut request = peugeot_request();
        request.brand = "MyFiat".to_string();
        let err = client.authorize(&request, &Progress::silent()).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown brand: MyFiat");

        let mut request = peugeot_request();
        request.country = "JP".to_string();
        let err = client.authorize(&request, &Progress::silent()).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown country for brand MyPeugeot: JP");

        assert_eq!(automator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn prepare_builds_authorize_url() {
        let client = stub_client(Arc::new(StubAutomator::default()));
        let prepared = client.prepare(&peugeot_request()).await.unwrap();
        assert_eq!(prepared.authorization.redirect_uri, "mymap://oauth2redirect/gb");
        assert!(
            prepared
                .authorization
                .authorization_url
                .contains("response_type=code")
        );
    }

    #[tokio::test]
    async fn slow_automation_times_out() {
        let automator = Arc::new(StubAutomator {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let client = stub_client(automator);

        let err = client
            .authorize(&peugeot_request(), &Progress::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::Timeout { timeout } if timeout == Duration::from_millis(200)));
    }
}
