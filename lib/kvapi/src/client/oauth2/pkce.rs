//! Authorization-code flow with PKCE (RFC 7636) for public clients.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use url::Url;

use super::callback::parse_callback;
use super::error::AuthError;
use super::{OAuth2Endpoints, Token, exchange_token, random_token, refresh_grant};
use crate::client::store::{CODE_VERIFIER_KEY, STATE_KEY, TokenStore};

/// Default length of a generated code verifier.
const DEFAULT_VERIFIER_LENGTH: usize = 64;

/// Length of a generated anti-CSRF state nonce.
const STATE_LENGTH: usize = 16;

/// Authorization-code flow with Proof Key for Code Exchange.
///
/// Meant for public clients that cannot hold a secret: the token exchange
/// proves flow continuity with a `code_verifier` instead of a
/// `client_secret`. The verifier and the state are persisted through the
/// [`TokenStore`] across the redirect round trip, because the process that
/// handles the callback is usually not the one that built the URL.
///
/// The callback URL is an explicit argument to
/// [`authorize`](crate::client::ApiClient::authorize); there is no ambient
/// "current page" default.
#[derive(Debug, Clone)]
pub struct AuthorizationCodePkce {
    client_id: String,
    redirect_uri: Url,
    state: Option<String>,
    scope: Vec<String>,
    verifier_length: usize,
}

impl AuthorizationCodePkce {
    /// Creates a flow for the given public client and redirect URI.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::InvalidRedirectUri`] when the redirect URI
    /// cannot be parsed.
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl AsRef<str>,
    ) -> Result<Self, AuthError> {
        let redirect_uri =
            Url::parse(redirect_uri.as_ref()).map_err(|error| AuthError::InvalidRedirectUri {
                url: redirect_uri.as_ref().to_owned(),
                reason: error.to_string(),
            })?;
        Ok(Self {
            client_id: client_id.into(),
            redirect_uri,
            state: None,
            scope: Vec::new(),
            verifier_length: DEFAULT_VERIFIER_LENGTH,
        })
    }

    /// Presets the anti-CSRF state instead of generating one.
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Adds a scope.
    #[must_use]
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope.push(scope.into());
        self
    }

    /// Overrides the generated code-verifier length (default 64).
    #[must_use]
    pub fn with_verifier_length(mut self, length: usize) -> Self {
        self.verifier_length = length;
        self
    }

    pub(crate) fn authorization_uri(
        &self,
        endpoints: &OAuth2Endpoints,
        store: &dyn TokenStore,
    ) -> Result<Url, AuthError> {
        let verifier = random_token(self.verifier_length);
        let challenge = compute_challenge(&verifier);
        store.save(CODE_VERIFIER_KEY, &verifier)?;

        let state = match &self.state {
            Some(state) => state.clone(),
            None => random_token(STATE_LENGTH),
        };
        store.save(STATE_KEY, &state)?;

        let mut url = endpoints.authorize_url().clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("response_type", "code");
            pairs.append_pair("client_id", &self.client_id);
            pairs.append_pair("redirect_uri", self.redirect_uri.as_str());
            pairs.append_pair("state", &state);
            pairs.append_pair("code_challenge", &challenge);
            pairs.append_pair("code_challenge_method", "S256");
            for scope in &self.scope {
                pairs.append_pair("scope[]", scope);
            }
        }
        Ok(url)
    }

    pub(crate) async fn execute(
        &self,
        http: &reqwest::Client,
        endpoints: &OAuth2Endpoints,
        store: &dyn TokenStore,
        callback_url: Option<&str>,
    ) -> Result<Token, AuthError> {
        let callback_url = callback_url.ok_or(AuthError::MissingCallbackUrl)?;
        let params = parse_callback(callback_url, &self.redirect_uri)?;
        let Some(code) = params.code else {
            return Err(AuthError::MissingAuthCode {
                callback_url: callback_url.to_owned(),
            });
        };

        let expected = match &self.state {
            Some(state) => Some(state.clone()),
            None => store.take(STATE_KEY)?,
        };
        if params.state.as_deref() != expected.as_deref() {
            return Err(AuthError::StateMismatch);
        }

        let verifier = store
            .take(CODE_VERIFIER_KEY)?
            .ok_or(AuthError::MissingCodeVerifier)?;

        // public client: code_verifier replaces client_secret entirely
        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
            ("code", code.as_str()),
        ];
        exchange_token(http, endpoints.token_url(), &form).await
    }

    pub(crate) async fn refresh(
        &self,
        http: &reqwest::Client,
        endpoints: &OAuth2Endpoints,
        refresh_token: Option<&str>,
    ) -> Result<Token, AuthError> {
        refresh_grant(
            http,
            endpoints.token_url(),
            &self.client_id,
            None,
            refresh_token,
        )
        .await
    }
}

/// Computes the S256 code challenge for a verifier:
/// `base64url(SHA-256(verifier))` without padding.
pub(crate) fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::store::MemoryStore;

    fn endpoints() -> OAuth2Endpoints {
        let api_url = Url::parse("http://localhost/api/v2").unwrap();
        OAuth2Endpoints::from_api_url(&api_url).unwrap()
    }

    fn demo_flow() -> AuthorizationCodePkce {
        AuthorizationCodePkce::new("demo", "http://localhost/cb")
            .unwrap()
            .with_state("xyz")
    }

    #[test]
    fn should_compute_known_challenge() {
        // SHA-256("hello"), base64url without padding
        assert_eq!(
            compute_challenge("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn should_produce_url_safe_challenges() {
        let challenge = compute_challenge(&random_token(64));
        // 32 hash bytes encode to 43 unpadded base64url characters
        assert_eq!(challenge.len(), 43);
        assert!(
            challenge
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn should_persist_verifier_and_state_for_the_round_trip() {
        let store = MemoryStore::default();
        let uri = demo_flow().authorization_uri(&endpoints(), &store).unwrap();

        let verifier = store
            .load(CODE_VERIFIER_KEY)
            .unwrap()
            .expect("verifier persisted");
        assert_eq!(verifier.len(), 64);
        assert_eq!(store.load(STATE_KEY).unwrap().as_deref(), Some("xyz"));

        let challenge = compute_challenge(&verifier);
        assert!(uri.as_str().contains(&format!("code_challenge={challenge}")));
        assert!(uri.as_str().contains("code_challenge_method=S256"));
        assert!(!uri.as_str().contains("client_secret"));
    }

    #[test]
    fn should_honor_custom_verifier_length() {
        let store = MemoryStore::default();
        demo_flow()
            .with_verifier_length(96)
            .authorization_uri(&endpoints(), &store)
            .unwrap();
        let verifier = store.load(CODE_VERIFIER_KEY).unwrap().unwrap();
        assert_eq!(verifier.len(), 96);
    }

    #[tokio::test]
    async fn should_fail_without_stored_verifier() {
        let result = demo_flow()
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &MemoryStore::default(),
                Some("http://localhost/cb?code=abc&state=xyz"),
            )
            .await;
        assert!(matches!(result, Err(AuthError::MissingCodeVerifier)));
    }

    #[tokio::test]
    async fn should_reject_state_mismatch_before_reading_verifier() {
        let store = MemoryStore::default();
        store.save(CODE_VERIFIER_KEY, "verifier").unwrap();

        let result = demo_flow()
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &store,
                Some("http://localhost/cb?code=abc&state=wrong"),
            )
            .await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
        // verifier is untouched by the failed attempt
        assert!(store.load(CODE_VERIFIER_KEY).unwrap().is_some());
    }
}
