//! OAuth2 authorization flows for the Kiva CRM identity provider.
//!
//! Three flows are supported, all speaking the provider's token protocol
//! (form-encoded POST, JSON response with a truthy `success` field):
//!
//! - [`AuthorizationCode`]: confidential clients with a redirect URI
//! - [`AuthorizationCodePkce`]: public clients, no secret, S256 challenge
//! - [`ClientCredentials`]: machine-to-machine, no redirect
//!
//! The flows share one flat capability (build an authorization URI, execute
//! the flow into a [`Token`], refresh a token) dispatched through
//! [`AuthFlow`]. Flow-specific knobs live on the individual types.

mod callback;
mod client_credentials;
mod code;
mod error;
mod pkce;
mod token;

use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::Value;
use tracing::debug;
use url::Url;

pub use self::client_credentials::ClientCredentials;
pub use self::code::AuthorizationCode;
pub use self::error::AuthError;
pub use self::pkce::AuthorizationCodePkce;
pub use self::token::Token;

use super::result::is_truthy;
use super::secret::SecureString;
use super::store::TokenStore;

/// OAuth2 endpoints derived from the client's API base URL.
#[derive(Debug, Clone)]
pub struct OAuth2Endpoints {
    authorize_url: Url,
    token_url: Url,
}

impl OAuth2Endpoints {
    /// Derives the endpoints from a versioned API URL
    /// (e.g. `https://app.kivacrm.com/api/v2`).
    pub(crate) fn from_api_url(api_url: &Url) -> Result<Self, url::ParseError> {
        let authorize_url = Url::parse(&format!("{api_url}/oauth2/authorize"))?;
        let token_url = Url::parse(&format!("{api_url}/oauth2/token"))?;
        Ok(Self {
            authorize_url,
            token_url,
        })
    }

    /// The authorization page users are redirected to.
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// The token endpoint all grants are exchanged against.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }
}

/// A configured authorization flow.
///
/// The variants expose one flat capability; which operations are meaningful
/// depends on the flow (client credentials has no authorization URI, code
/// flows require a callback URL).
#[derive(Debug, Clone, derive_more::From)]
pub enum AuthFlow {
    /// Authorization-code flow for confidential clients.
    AuthorizationCode(AuthorizationCode),
    /// Authorization-code flow with PKCE for public clients.
    AuthorizationCodePkce(AuthorizationCodePkce),
    /// Client-credentials flow for machine-to-machine access.
    ClientCredentials(ClientCredentials),
}

impl AuthFlow {
    pub(crate) fn authorization_uri(
        &self,
        endpoints: &OAuth2Endpoints,
        store: &dyn TokenStore,
    ) -> Result<Url, AuthError> {
        match self {
            Self::AuthorizationCode(flow) => flow.authorization_uri(endpoints, store),
            Self::AuthorizationCodePkce(flow) => flow.authorization_uri(endpoints, store),
            Self::ClientCredentials(_) => Err(AuthError::NoAuthorizationUri),
        }
    }

    pub(crate) async fn execute(
        &self,
        http: &reqwest::Client,
        endpoints: &OAuth2Endpoints,
        store: &dyn TokenStore,
        callback_url: Option<&str>,
    ) -> Result<Token, AuthError> {
        match self {
            Self::AuthorizationCode(flow) => {
                flow.execute(http, endpoints, store, callback_url).await
            }
            Self::AuthorizationCodePkce(flow) => {
                flow.execute(http, endpoints, store, callback_url).await
            }
            Self::ClientCredentials(flow) => flow.execute(http, endpoints).await,
        }
    }

    pub(crate) async fn refresh(
        &self,
        http: &reqwest::Client,
        endpoints: &OAuth2Endpoints,
        refresh_token: Option<&str>,
    ) -> Result<Token, AuthError> {
        match self {
            Self::AuthorizationCode(flow) => flow.refresh(http, endpoints, refresh_token).await,
            Self::AuthorizationCodePkce(flow) => flow.refresh(http, endpoints, refresh_token).await,
            Self::ClientCredentials(flow) => flow.refresh(http, endpoints).await,
        }
    }
}

/// Generates a random alphanumeric token (state nonces, code verifiers).
pub(crate) fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Performs a form-encoded token exchange against the token endpoint.
///
/// The provider signals the outcome through a truthy `success` field rather
/// than the HTTP status; a response without it fails with the raw body
/// attached.
pub(crate) async fn exchange_token(
    http: &reqwest::Client,
    token_url: &Url,
    form: &[(&str, &str)],
) -> Result<Token, AuthError> {
    let grant_type = form
        .iter()
        .find(|(key, _)| *key == "grant_type")
        .map_or("?", |(_, value)| *value);
    debug!(url = %token_url, grant_type, "exchanging token");

    let response = http.post(token_url.clone()).form(form).send().await?;
    let text = response.text().await?;
    let body = match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    };

    if !body.get("success").is_some_and(is_truthy) {
        return Err(AuthError::ExchangeFailed { body });
    }
    match serde_json::from_value::<Token>(body.clone()) {
        Ok(token) => Ok(token),
        Err(_) => Err(AuthError::ExchangeFailed { body }),
    }
}

/// Performs the shared `refresh_token` grant used by both code flows.
pub(crate) async fn refresh_grant(
    http: &reqwest::Client,
    token_url: &Url,
    client_id: &str,
    client_secret: Option<&SecureString>,
    refresh_token: Option<&str>,
) -> Result<Token, AuthError> {
    let refresh_token = refresh_token.ok_or(AuthError::MissingRefreshToken)?;
    let mut form: Vec<(&str, &str)> = vec![
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret.as_str()));
    }
    form.push(("refresh_token", refresh_token));
    exchange_token(http, token_url, &form).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_derive_endpoints_from_api_url() {
        let api_url = Url::parse("https://app.kivacrm.com/api/v2").unwrap();
        let endpoints = OAuth2Endpoints::from_api_url(&api_url).unwrap();
        assert_eq!(
            endpoints.authorize_url().as_str(),
            "https://app.kivacrm.com/api/v2/oauth2/authorize"
        );
        assert_eq!(
            endpoints.token_url().as_str(),
            "https://app.kivacrm.com/api/v2/oauth2/token"
        );
    }

    #[test]
    fn should_generate_alphanumeric_tokens() {
        let token = random_token(16);
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn should_generate_distinct_tokens() {
        assert_ne!(random_token(32), random_token(32));
    }
}
