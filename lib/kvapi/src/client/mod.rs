use std::fmt;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use http::Method;
use tokio::sync::Mutex;
use url::Url;

mod builder;
pub use self::builder::ApiClientBuilder;

mod error;
pub use self::error::Error;

mod middleware;
pub use self::middleware::{AfterHook, BeforeHook, CallInfo, HookAction};
use self::middleware::MiddlewareRegistry;

mod params;
pub use self::params::{Params, Part};

mod result;
pub use self::result::{ApiResult, ResponseStatus};

mod secret;
pub use self::secret::SecureString;

mod store;
pub use self::store::{
    CODE_VERIFIER_KEY, MemoryStore, STATE_KEY, StoreError, TOKEN_KEY, TokenStore,
};

pub mod oauth2;
pub use self::oauth2::{
    AuthError, AuthFlow, AuthorizationCode, AuthorizationCodePkce, ClientCredentials,
    OAuth2Endpoints, Token,
};

mod dispatch;


/// Endpoint used for token revocation.
const REVOKE_ENDPOINT: &str = "/oauth2/revoke";

/// Mutable token state shared by all clones of a client.
#[derive(Debug, Default)]
pub(crate) struct TokenState {
    pub(crate) token: Option<Token>,
    pub(crate) standalone_refresh_token: Option<String>,
    pub(crate) invalid_token_count: u8,
    pub(crate) refresh_pending: bool,
}

/// Client for the Kiva CRM REST API.
///
/// The client owns the current [`Token`] and guarantees that every request
/// carries a valid one: expired tokens are refreshed before dispatch, new
/// requests queue behind an in-flight refresh, and an `INVALID_TOKEN` API
/// response triggers exactly one refresh-and-retry cycle.
///
/// Cloning is cheap and clones share token state, the refresh gate and the
/// middleware registry, so a clone can be moved into another task.
///
/// # Example
///
/// ```rust,no_run
/// use kvapi::{ApiClient, ClientCredentials};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::builder()
///     .with_auth_flow(ClientCredentials::new("client-id", "client-secret"))
///     .build()?;
///
/// client.authorize(None).await?;
///
/// let contacts = client.get("/contacts", json!({ "page": 1 })).await?;
/// if contacts.is_success() {
///     println!("{}", contacts.response);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) http: reqwest::Client,
    pub(crate) api_url: Url,
    pub(crate) endpoints: OAuth2Endpoints,
    pub(crate) flow: Option<AuthFlow>,
    pub(crate) store: Arc<dyn TokenStore>,
    pub(crate) state: Arc<Mutex<TokenState>>,
    pub(crate) refresh_gate: Arc<Mutex<()>>,
    pub(crate) middleware: Arc<std::sync::RwLock<MiddlewareRegistry>>,
    pub(crate) refresh_wait: Duration,
}

impl ApiClient {
    /// Starts building a client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// The versioned API URL all endpoints are resolved against.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// The OAuth2 endpoints derived from the API URL.
    pub fn endpoints(&self) -> &OAuth2Endpoints {
        &self.endpoints
    }

    pub(crate) fn store(&self) -> &dyn TokenStore {
        self.store.as_ref()
    }
}

// Authorization.
impl ApiClient {
    /// Builds the provider authorization URL for the configured flow.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoAuthFlow`] when no flow is configured, and with
    /// [`AuthError::NoAuthorizationUri`] for the client-credentials flow.
    pub fn authorization_uri(&self) -> Result<Url, Error> {
        let flow = self.flow.as_ref().ok_or(Error::NoAuthFlow)?;
        Ok(flow.authorization_uri(&self.endpoints, self.store.as_ref())?)
    }

    /// Runs the configured flow to completion and adopts the produced token.
    ///
    /// Code flows require the callback URL captured after the provider
    /// redirect; the client-credentials flow ignores it.
    pub async fn authorize(&self, callback_url: Option<&str>) -> Result<Token, Error> {
        let flow = self.flow.as_ref().ok_or(Error::NoAuthFlow)?;
        let token = flow
            .execute(&self.http, &self.endpoints, self.store.as_ref(), callback_url)
            .await?;
        self.set_token(token.clone()).await?;
        Ok(token)
    }
}

// Token management.
impl ApiClient {
    /// Adopts `token` as the current token and persists it.
    ///
    /// The token's refresh token (when present) also becomes the standalone
    /// refresh token used by [`refresh`](Self::refresh).
    pub async fn set_token(&self, token: Token) -> Result<(), Error> {
        self.store.save(TOKEN_KEY, &serde_json::to_string(&token)?)?;
        let mut state = self.state.lock().await;
        if let Some(refresh_token) = token.refresh_token() {
            state.standalone_refresh_token = Some(refresh_token.to_owned());
        }
        state.token = Some(token);
        Ok(())
    }

    /// Returns a snapshot of the current in-memory token.
    pub async fn token(&self) -> Option<Token> {
        self.state.lock().await.token.clone()
    }

    /// Sets a standalone refresh token for when no full token is at hand.
    pub async fn set_refresh_token(&self, refresh_token: impl Into<String>) {
        self.state.lock().await.standalone_refresh_token = Some(refresh_token.into());
    }

    /// Drops the current token from memory and from the store.
    pub async fn clear_token(&self) -> Result<(), Error> {
        self.store.clear(TOKEN_KEY)?;
        let mut state = self.state.lock().await;
        state.token = None;
        state.standalone_refresh_token = None;
        Ok(())
    }

    /// Revokes the current access token and clears local token state.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::TokenNotFound`] when there is no current token.
    pub async fn revoke(&self) -> Result<ApiResult, Error> {
        let Some(token) = self.token().await else {
            return Err(Error::TokenNotFound);
        };
        let result = self
            .post(
                REVOKE_ENDPOINT,
                serde_json::json!({ "token": token.access_token() }),
            )
            .await?;
        self.clear_token().await?;
        Ok(result)
    }

    /// Revokes the current refresh token and clears local token state.
    pub async fn revoke_refresh_token(&self) -> Result<ApiResult, Error> {
        let Some(token) = self.token().await else {
            return Err(Error::TokenNotFound);
        };
        let Some(refresh_token) = token.refresh_token() else {
            return Err(Error::Auth(AuthError::MissingRefreshToken));
        };
        let result = self
            .post(REVOKE_ENDPOINT, serde_json::json!({ "token": refresh_token }))
            .await?;
        self.clear_token().await?;
        Ok(result)
    }
}

// Middleware.
impl ApiClient {
    /// Registers a hook that runs before each request is dispatched.
    ///
    /// Returning [`HookAction::Cancel`] resolves the call with the
    /// cancelled-result marker instead of sending anything.
    pub fn before_request<F>(&self, hook: F)
    where
        F: Fn(&CallInfo) -> HookAction + Send + Sync + 'static,
    {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_before(Box::new(hook));
    }

    /// Registers a hook that observes each fully resolved result.
    pub fn after_request<F>(&self, hook: F)
    where
        F: Fn(bool, &ApiResult, &CallInfo) + Send + Sync + 'static,
    {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_after(Box::new(hook));
    }

    pub(crate) fn run_before(&self, call: &CallInfo) -> HookAction {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .run_before(call)
    }

    pub(crate) fn run_after(&self, success: bool, result: &ApiResult, call: &CallInfo) {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .run_after(success, result, call);
    }
}

// REST verbs.
impl ApiClient {
    /// Sends a `GET` request; parameters are query-string encoded.
    pub async fn get(
        &self,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        self.request(Method::GET, endpoint, params).await
    }

    /// Sends a `POST` request.
    pub async fn post(
        &self,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        self.request(Method::POST, endpoint, params).await
    }

    /// Sends a `PUT` request.
    pub async fn put(
        &self,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        self.request(Method::PUT, endpoint, params).await
    }

    /// Sends a `PATCH` request.
    pub async fn patch(
        &self,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        self.request(Method::PATCH, endpoint, params).await
    }

    /// Sends a `DELETE` request.
    pub async fn delete(
        &self,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        self.request(Method::DELETE, endpoint, params).await
    }

    /// Sends a `HEAD` request; parameters are query-string encoded.
    pub async fn head(
        &self,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        self.request(Method::HEAD, endpoint, params).await
    }

    /// Resolves an endpoint path against the API URL.
    pub(crate) fn endpoint_url(&self, endpoint: &str) -> Result<Url, Error> {
        let endpoint = endpoint.strip_prefix('/').unwrap_or(endpoint);
        Ok(Url::parse(&format!("{}/{endpoint}", self.api_url))?)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("api_url", &self.api_url)
            .field("flow", &self.flow)
            .field("refresh_wait", &self.refresh_wait)
            .finish_non_exhaustive()
    }
}
