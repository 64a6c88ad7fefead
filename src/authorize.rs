use url::Url;

use crate::{AuthorizationRequest, BrandConfig, CountryConfig, OAuthError};

const AUTHORIZE_PATH: &str = "/am/oauth2/authorize";
const SCOPE: &str = "openid profile email";

/// `<scheme>://oauth2redirect/<country>`, the URI the brand's mobile app registers.
pub fn redirect_uri(brand: &BrandConfig, country: &str) -> String {
    format!(
        "{}oauth2redirect/{}",
        brand.redirect_prefix(),
        country.to_lowercase()
    )
}

/// Builds the portal's authorize URL for a public client. The client secret never
/// leaves the configuration.
pub fn authorization_request(
    brand: &BrandConfig,
    country_config: &CountryConfig,
    country: &str,
) -> Result<AuthorizationRequest, OAuthError> {
    let redirect_uri = redirect_uri(brand, country);
    let base = brand.oauth_url.trim_end_matches('/');

    let mut url = Url::parse(&format!("{base}{AUTHORIZE_PATH}"))?;
    url.query_pairs_mut()
        .append_pair("client_id", &country_config.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &redirect_uri)
        .append_pair("scope", SCOPE)
        .append_pair("locale", &country_config.locale);

    Ok(AuthorizationRequest {
        authorization_url: url.to_string(),
        redirect_uri,
        redirect_prefix: brand.redirect_prefix(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use url::Url;

    use super::authorization_request;
    use crate::config::ConfigSnapshot;

    #[test]
    fn authorization_url_includes_required_params() {
        let snapshot = ConfigSnapshot::embedded().unwrap();
        for brand_name in snapshot.brands() {
            let brand = snapshot.brand(brand_name).unwrap();
            for (country, country_config) in &brand.configs {
                let auth = authorization_request(brand, country_config, country).unwrap();
                let url = Url::parse(&auth.authorization_url).unwrap();
                let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

                assert_eq!(url.path(), "/am/oauth2/authorize");
                assert_eq!(pairs.get("client_id"), Some(&country_config.client_id));
                assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
                assert_eq!(pairs.get("locale"), Some(&country_config.locale));
                assert_eq!(
                    pairs.get("scope").map(String::as_str),
                    Some("openid profile email")
                );

                let expected_prefix = format!("{}://oauth2redirect/", brand.scheme);
                let redirect = pairs.get("redirect_uri").unwrap();
                assert!(redirect.starts_with(&expected_prefix));
                assert_eq!(redirect, &auth.redirect_uri);
                assert!(
                    auth.authorization_url
                        .contains(&format!("redirect_uri={}%3A%2F%2Foauth2redirect%2F", brand.scheme)),
                    "redirect_uri should be url encoded: {}",
                    auth.authorization_url
                );
                assert!(!pairs.contains_key("client_secret"));
                assert!(!auth.authorization_url.contains(&country_config.client_secret));
            }
        }
    }

    #[test]
    fn redirect_uri_lowercases_country() {
        let snapshot = ConfigSnapshot::embedded().unwrap();
        let (brand, country_config) = snapshot.lookup("MyPeugeot", "GB").unwrap();
        let auth = authorization_request(brand, country_config, "GB").unwrap();
        assert_eq!(auth.redirect_uri, "mymap://oauth2redirect/gb");
        assert_eq!(auth.redirect_prefix, "mymap://");
        assert!(
            auth.authorization_url
                .starts_with("https://idpcvs.peugeot.com/am/oauth2/authorize?")
        );
    }
}
