//! Authorization-code flow for confidential clients.

use url::Url;

use super::callback::parse_callback;
use super::error::AuthError;
use super::{OAuth2Endpoints, Token, exchange_token, random_token, refresh_grant};
use crate::client::secret::SecureString;
use crate::client::store::{STATE_KEY, TokenStore};

/// Length of a generated anti-CSRF state nonce.
const STATE_LENGTH: usize = 16;

/// The standard authorization-code flow.
///
/// The user visits the URL from
/// [`authorization_uri`](crate::client::ApiClient::authorization_uri), grants
/// access, and is redirected back to the configured redirect URI with a
/// `code` and `state`. Passing that callback URL to
/// [`authorize`](crate::client::ApiClient::authorize) exchanges the code for
/// a [`Token`].
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    client_id: String,
    client_secret: SecureString,
    redirect_uri: Url,
    state: Option<String>,
    scope: Vec<String>,
}

impl AuthorizationCode {
    /// Creates a flow for the given client credentials and redirect URI.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::InvalidRedirectUri`] when the redirect URI
    /// cannot be parsed.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<SecureString>,
        redirect_uri: impl AsRef<str>,
    ) -> Result<Self, AuthError> {
        let redirect_uri =
            Url::parse(redirect_uri.as_ref()).map_err(|error| AuthError::InvalidRedirectUri {
                url: redirect_uri.as_ref().to_owned(),
                reason: error.to_string(),
            })?;
        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            state: None,
            scope: Vec::new(),
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

    /// Adds multiple scopes.
    #[must_use]
    pub fn add_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scope.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub(crate) fn authorization_uri(
        &self,
        endpoints: &OAuth2Endpoints,
        store: &dyn TokenStore,
    ) -> Result<Url, AuthError> {
        let state = self.resolve_or_generate_state(store)?;
        let mut url = endpoints.authorize_url().clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("response_type", "code");
            pairs.append_pair("client_id", &self.client_id);
            pairs.append_pair("redirect_uri", self.redirect_uri.as_str());
            pairs.append_pair("state", &state);
            pairs.append_pair("client_secret", self.client_secret.as_str());
            for scope in &self.scope {
                pairs.append_pair("scope[]", scope);
            }
        }
        Ok(url)
    }

    /// Returns the preset state, or generates one and persists it for the
    /// redirect round trip.
    fn resolve_or_generate_state(&self, store: &dyn TokenStore) -> Result<String, AuthError> {
        match &self.state {
            Some(state) => Ok(state.clone()),
            None => {
                let generated = random_token(STATE_LENGTH);
                store.save(STATE_KEY, &generated)?;
                Ok(generated)
            }
        }
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

        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
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
            Some(&self.client_secret),
            refresh_token,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::client::store::MemoryStore;

    fn endpoints() -> OAuth2Endpoints {
        let api_url = Url::parse("http://localhost/api/v2").unwrap();
        OAuth2Endpoints::from_api_url(&api_url).unwrap()
    }

    fn demo_flow() -> AuthorizationCode {
        AuthorizationCode::new("demo", "demo-secret", "http://localhost/cb")
            .unwrap()
            .with_state("xyz")
    }

    #[test]
    fn should_reject_invalid_redirect_uri() {
        let result = AuthorizationCode::new("demo", "secret", "not a url");
        assert!(matches!(result, Err(AuthError::InvalidRedirectUri { .. })));
    }

    #[test]
    fn should_build_authorization_uri_with_preset_state() {
        let store = MemoryStore::default();
        let uri = demo_flow()
            .add_scope("contacts")
            .authorization_uri(&endpoints(), &store)
            .unwrap();

        insta::assert_snapshot!(
            uri.as_str(),
            @"http://localhost/api/v2/oauth2/authorize?response_type=code&client_id=demo&redirect_uri=http%3A%2F%2Flocalhost%2Fcb&state=xyz&client_secret=demo-secret&scope%5B%5D=contacts"
        );

        // preset state is not persisted
        assert!(store.load(STATE_KEY).unwrap().is_none());
    }

    #[test]
    fn should_generate_and_persist_state_when_unset() {
        let store = MemoryStore::default();
        let flow = AuthorizationCode::new("demo", "demo-secret", "http://localhost/cb").unwrap();
        let uri = flow.authorization_uri(&endpoints(), &store).unwrap();

        let state = store.load(STATE_KEY).unwrap().expect("state persisted");
        assert_eq!(state.len(), 16);
        assert!(uri.as_str().contains(&format!("state={state}")));
    }

    #[tokio::test]
    async fn should_reject_redirect_uri_mismatch_without_network() {
        let result = demo_flow()
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &MemoryStore::default(),
                Some("http://localhost/other?code=abc&state=xyz"),
            )
            .await;
        assert!(matches!(result, Err(AuthError::RedirectUriMismatch { .. })));
    }

    #[tokio::test]
    async fn should_reject_missing_code_without_network() {
        let result = demo_flow()
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &MemoryStore::default(),
                Some("http://localhost/cb?state=xyz"),
            )
            .await;
        assert!(matches!(result, Err(AuthError::MissingAuthCode { .. })));
    }

    #[tokio::test]
    async fn should_reject_state_mismatch_without_network() {
        let result = demo_flow()
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &MemoryStore::default(),
                Some("http://localhost/cb?code=abc&state=nope"),
            )
            .await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn should_require_a_callback_url() {
        let result = demo_flow()
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &MemoryStore::default(),
                None,
            )
            .await;
        assert!(matches!(result, Err(AuthError::MissingCallbackUrl)));
    }

    #[tokio::test]
    async fn should_check_state_against_stored_value() {
        let store = MemoryStore::default();
        let flow = AuthorizationCode::new("demo", "demo-secret", "http://localhost/cb").unwrap();
        flow.authorization_uri(&endpoints(), &store).unwrap();
        let stored = store.load(STATE_KEY).unwrap().expect("state persisted");

        // a state that differs from the generated one is rejected
        let result = flow
            .execute(
                &reqwest::Client::new(),
                &endpoints(),
                &store,
                Some(&format!("http://localhost/cb?code=abc&state=not-{stored}")),
            )
            .await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }
}
