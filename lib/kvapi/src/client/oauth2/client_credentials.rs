//! Client-credentials flow for machine-to-machine access.

use super::error::AuthError;
use super::{OAuth2Endpoints, Token, exchange_token};
use crate::client::secret::SecureString;

/// The client-credentials flow.
///
/// There is no redirect and no authorization page: the client exchanges its
/// id and secret directly for a token.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: SecureString,
    scope: Vec<String>,
}

impl ClientCredentials {
    /// Creates a flow for the given client credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<SecureString>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: Vec::new(),
        }
    }

    /// Adds a scope.
    #[must_use]
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope.push(scope.into());
        self
    }

    pub(crate) async fn execute(
        &self,
        http: &reqwest::Client,
        endpoints: &OAuth2Endpoints,
    ) -> Result<Token, AuthError> {
        let scope = self.scope.join(" ");
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        exchange_token(http, endpoints.token_url(), &form).await
    }

    /// Refreshes by running the client-credentials exchange again.
    ///
    /// This flow has no `refresh_token` grant; re-exchanging the credentials
    /// is the refresh operation. The equivalence is intentional.
    pub(crate) async fn refresh(
        &self,
        http: &reqwest::Client,
        endpoints: &OAuth2Endpoints,
    ) -> Result<Token, AuthError> {
        self.execute(http, endpoints).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::client::oauth2::AuthFlow;
    use crate::client::store::MemoryStore;

    fn endpoints_for(server: &MockServer) -> OAuth2Endpoints {
        let api_url = Url::parse(&format!("{}/api/v2", server.uri())).unwrap();
        OAuth2Endpoints::from_api_url(&api_url).unwrap()
    }

    #[test]
    fn should_have_no_authorization_uri() {
        let flow = AuthFlow::from(ClientCredentials::new("cid", "secret"));
        let api_url = Url::parse("http://localhost/api/v2").unwrap();
        let endpoints = OAuth2Endpoints::from_api_url(&api_url).unwrap();
        let result = flow.authorization_uri(&endpoints, &MemoryStore::default());
        assert!(matches!(result, Err(AuthError::NoAuthorizationUri)));
    }

    #[tokio::test]
    async fn should_exchange_credentials_for_a_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=cid"))
            .and(body_string_contains("scope=contacts+deals"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "access_token": "cc-token",
                "refresh_token": "cc-refresh",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let flow = ClientCredentials::new("cid", "secret")
            .add_scope("contacts")
            .add_scope("deals");
        let token = flow
            .execute(&reqwest::Client::new(), &endpoints_for(&server))
            .await
            .unwrap();
        assert_eq!(token.access_token(), "cc-token");
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn should_refresh_by_re_running_the_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "access_token": "cc-token",
                "expires_in": 3600,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let flow = ClientCredentials::new("cid", "secret");
        let endpoints = endpoints_for(&server);
        let http = reqwest::Client::new();
        flow.execute(&http, &endpoints).await.unwrap();
        // refresh performs the same exchange; the mock's expect(2) verifies it
        flow.refresh(&http, &endpoints).await.unwrap();
    }

    #[tokio::test]
    async fn should_surface_rejected_exchange_with_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "invalid_client",
            })))
            .mount(&server)
            .await;

        let flow = ClientCredentials::new("cid", "wrong");
        let result = flow
            .execute(&reqwest::Client::new(), &endpoints_for(&server))
            .await;
        match result {
            Err(AuthError::ExchangeFailed { body }) => {
                assert_eq!(body["error"], "invalid_client");
            }
            other => panic!("expected ExchangeFailed, got {other:?}"),
        }
    }
}
