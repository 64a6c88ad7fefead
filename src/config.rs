use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::OAuthError;

pub(crate) const EMBEDDED_CONFIGS: &str = include_str!("../configs.json");

const DEFAULT_REMOTE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandConfig {
    pub oauth_url: String,
    #[serde(default)]
    pub realm: String,
    pub scheme: String,
    #[serde(default)]
    pub configs: BTreeMap<String, CountryConfig>,
}

impl BrandConfig {
    pub fn redirect_prefix(&self) -> String {
        format!("{}://", self.scheme)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct CountryConfig {
    pub locale: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl std::fmt::Debug for CountryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountryConfig")
            .field("locale", &self.locale)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    raw: String,
    brands: BTreeMap<String, BrandConfig>,
}

impl ConfigSnapshot {
    pub fn parse(raw: impl Into<String>) -> Result<Self, OAuthError> {
        let raw = raw.into();
        let brands = serde_json::from_str(&raw)
            .map_err(|err| OAuthError::InvalidConfig(err.to_string()))?;
        Ok(Self { raw, brands })
    }

    pub fn embedded() -> Result<Self, OAuthError> {
        Self::parse(EMBEDDED_CONFIGS)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn brands(&self) -> impl Iterator<Item = &str> {
        self.brands.keys().map(String::as_str)
    }

    pub fn brand(&self, brand: &str) -> Result<&BrandConfig, OAuthError> {
        self.brands
            .get(brand)
            .ok_or_else(|| OAuthError::UnknownBrand(brand.to_string()))
    }

    pub fn countries(&self, brand: &str) -> Result<impl Iterator<Item = &str>, OAuthError> {
        Ok(self.brand(brand)?.configs.keys().map(String::as_str))
    }

    pub fn hint(&self, err: &OAuthError) -> Option<String> {
        match err {
            OAuthError::UnknownBrand(_) => Some(format!(
                "known brands: {}",
                self.brands().collect::<Vec<_>>().join(", ")
            )),
            OAuthError::UnknownCountry { brand, .. } => Some(format!(
                "known countries for {brand}: {}",
                self.countries(brand).ok()?.collect::<Vec<_>>().join(", ")
            )),
            _ => None,
        }
    }

    pub fn lookup(
        &self,
        brand: &str,
        country: &str,
    ) -> Result<(&BrandConfig, &CountryConfig), OAuthError> {
        let brand_config = self.brand(brand)?;
        let country_config =
            brand_config
                .configs
                .get(country)
                .ok_or_else(|| OAuthError::UnknownCountry {
                    brand: brand.to_string(),
                    country: country.to_string(),
                })?;
        Ok((brand_config, country_config))
    }
}

#[derive(Debug, Clone)]
pub enum ConfigSource {
    Embedded,
    Remote { url: String, ttl: Duration },
}

impl ConfigSource {
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            ttl: DEFAULT_REMOTE_TTL,
        }
    }

    pub fn with_ttl(self, ttl: Duration) -> Self {
        match self {
            Self::Remote { url, .. } => Self::Remote { url, ttl },
            Self::Embedded => Self::Embedded,
        }
    }
}

type CachedSnapshot = Option<(Instant, Arc<ConfigSnapshot>)>;

/// Hands out configuration snapshots, caching remote documents for their TTL.
#[derive(Debug)]
pub struct ConfigProvider {
    source: ConfigSource,
    http: Client,
    cache: RwLock<CachedSnapshot>,
}

impl ConfigProvider {
    pub fn new(source: ConfigSource) -> Self {
        Self::with_http_client(source, Client::new())
    }

    pub fn embedded() -> Self {
        Self::new(ConfigSource::Embedded)
    }

    pub fn with_http_client(source: ConfigSource, http: Client) -> Self {
        Self {
            source,
            http,
            cache: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    pub async fn snapshot(&self) -> Result<Arc<ConfigSnapshot>, OAuthError> {
        let ttl = match &self.source {
            ConfigSource::Embedded => None,
            ConfigSource::Remote { ttl, .. } => Some(*ttl),
        };

        if let Some((loaded_at, snapshot)) = self.cache.read().await.as_ref() {
            if ttl.is_none_or(|ttl| loaded_at.elapsed() < ttl) {
                return Ok(snapshot.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let Some((loaded_at, snapshot)) = cache.as_ref() {
            if ttl.is_none_or(|ttl| loaded_at.elapsed() < ttl) {
                return Ok(snapshot.clone());
            }
        }

        let snapshot = Arc::new(self.load().await?);
        *cache = Some((Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }

    async fn load(&self) -> Result<ConfigSnapshot, OAuthError> {
        match &self.source {
            ConfigSource::Embedded => ConfigSnapshot::embedded(),
            ConfigSource::Remote { url, .. } => {
                info!(url = %url, "fetching remote configs");
                let fetch_error = |message: String| OAuthError::ConfigFetch {
                    url: url.clone(),
                    message,
                };

                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|err| fetch_error(err.to_string()))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(fetch_error(format!("http status {}", status.as_u16())));
                }
                let body = response
                    .text()
                    .await
                    .map_err(|err| fetch_error(err.to_string()))?;
                let snapshot = ConfigSnapshot::parse(body)?;
                debug!(brands = snapshot.brands.len(), "remote configs loaded");
                Ok(snapshot)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ConfigProvider, ConfigSnapshot, ConfigSource};
    use crate::OAuthError;

    const SAMPLE: &str = r#"{
        "MyPeugeot": {
            "oauth_url": "https://idpcvs.peugeot.com",
            "realm": "clientsB2CPeugeot",
            "scheme": "mymap",
            "configs": {
                "GB": { "locale": "en-GB", "client_id": "cid", "client_secret": "secret" }
            }
        }
    }"#;

    #[test]
    fn embedded_configs_parse() {
        let snapshot = ConfigSnapshot::embedded().unwrap();
        assert!(snapshot.brands().any(|brand| brand == "MyPeugeot"));
        let (brand, country) = snapshot.lookup("MyPeugeot", "FR").unwrap();
        assert_eq!(brand.scheme, "mymap");
        assert_eq!(country.locale, "fr-FR");
    }

    #[test]
    fn lookup_reports_unknown_brand_and_country() {
        let snapshot = ConfigSnapshot::parse(SAMPLE).unwrap();

        let err = snapshot.lookup("MyFiat", "GB").unwrap_err();
        assert!(matches!(err, OAuthError::UnknownBrand(ref brand) if brand == "MyFiat"));

        let err = snapshot.lookup("MyPeugeot", "ZZ").unwrap_err();
        assert_eq!(err.to_string(), "unknown country for brand MyPeugeot: ZZ");
    }

    #[test]
    fn hints_list_sorted_brands_and_countries() {
        let snapshot = ConfigSnapshot::embedded().unwrap();

        let err = snapshot.lookup("MyFiat", "GB").unwrap_err();
        assert_eq!(
            snapshot.hint(&err).as_deref(),
            Some("known brands: MyCitroen, MyDS, MyOpel, MyPeugeot, MyVauxhall")
        );

        let err = snapshot.lookup("MyPeugeot", "ZZ").unwrap_err();
        assert_eq!(
            snapshot.hint(&err).as_deref(),
            Some("known countries for MyPeugeot: DE, FR, GB")
        );

        assert_eq!(snapshot.hint(&OAuthError::MissingFields), None);
    }

    #[test]
    fn country_debug_hides_secret() {
        let snapshot = ConfigSnapshot::parse(SAMPLE).unwrap();
        let (_, country) = snapshot.lookup("MyPeugeot", "GB").unwrap();
        let debug = format!("{country:?}");
        assert!(!debug.contains("secret\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn rejects_malformed_document() {
        let err = ConfigSnapshot::parse("[1, 2").unwrap_err();
        assert!(matches!(err, OAuthError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn remote_configs_are_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/configs.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE))
            .expect(1)
            .mount(&server)
            .await;

        let source = ConfigSource::remote(format!("{}/configs.json", server.uri()))
            .with_ttl(Duration::from_secs(60));
        let provider = ConfigProvider::new(source);

        let first = provider.snapshot().await.unwrap();
        let second = provider.snapshot().await.unwrap();
        assert_eq!(first.raw(), SAMPLE);
        assert!(second.lookup("MyPeugeot", "GB").is_ok());
    }

    #[tokio::test]
    async fn remote_failures_are_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let provider = ConfigProvider::new(ConfigSource::remote(server.uri()));
        for _ in 0..2 {
            let err = provider.snapshot().await.unwrap_err();
            assert!(matches!(err, OAuthError::ConfigFetch { .. }));
        }
    }
}
