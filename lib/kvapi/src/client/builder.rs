//! Builder for [`ApiClient`] instances.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use url::Url;

use super::middleware::MiddlewareRegistry;
use super::oauth2::{AuthFlow, OAuth2Endpoints, Token};
use super::store::{MemoryStore, TOKEN_KEY, TokenStore};
use super::{ApiClient, Error, TokenState};

/// Default Kiva CRM installation.
const DEFAULT_BASE_URL: &str = "https://app.kivacrm.com";

/// Default REST API version.
const DEFAULT_API_VERSION: &str = "2";

/// Upper bound on how long a request waits for an in-flight token refresh.
const DEFAULT_REFRESH_WAIT: Duration = Duration::from_secs(10);

/// Builder for creating [`ApiClient`] instances.
///
/// # Example
///
/// ```rust
/// use kvapi::{ApiClient, ClientCredentials};
///
/// # fn example() -> Result<(), kvapi::Error> {
/// let client = ApiClient::builder()
///     .with_base_url("https://acme.kivacrm.com")
///     .with_api_version("2")
///     .with_auth_flow(ClientCredentials::new("client-id", "client-secret"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ApiClientBuilder {
    base_url: String,
    version: String,
    http: reqwest::Client,
    flow: Option<AuthFlow>,
    store: Option<Arc<dyn TokenStore>>,
    refresh_wait: Duration,
    token: Option<Token>,
}

impl fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClientBuilder")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("flow", &self.flow)
            .field("refresh_wait", &self.refresh_wait)
            .finish_non_exhaustive()
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            version: DEFAULT_API_VERSION.to_string(),
            http: reqwest::Client::new(),
            flow: None,
            store: None,
            refresh_wait: DEFAULT_REFRESH_WAIT,
            token: None,
        }
    }
}

impl ApiClientBuilder {
    /// Sets the CRM installation base URL (default `https://app.kivacrm.com`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the REST API version segment (default `2`).
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the authorization flow used for exchanges and refreshes.
    #[must_use]
    pub fn with_auth_flow(mut self, flow: impl Into<AuthFlow>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Supplies the persistence backend for tokens and PKCE round-trip
    /// values (default: process-local [`MemoryStore`]).
    #[must_use]
    pub fn with_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Supplies a pre-configured `reqwest` client (proxies, timeouts, TLS).
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Bounds how long a request waits for an in-flight refresh before
    /// failing with [`Error::RefreshWaitTimeout`] (default 10 seconds).
    #[must_use]
    pub fn with_refresh_wait(mut self, refresh_wait: Duration) -> Self {
        self.refresh_wait = refresh_wait;
        self
    }

    /// Adopts an initial token (persisted at build time).
    #[must_use]
    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidBaseUrl`] when the base URL cannot be
    /// parsed or has no host, and with store/serialization errors when an
    /// initial token cannot be persisted.
    pub fn build(self) -> Result<ApiClient, Error> {
        let Self {
            base_url,
            version,
            http,
            flow,
            store,
            refresh_wait,
            token,
        } = self;

        let trimmed = base_url.trim_end_matches('/');
        let parsed = Url::parse(trimmed).map_err(|error| Error::InvalidBaseUrl {
            url: base_url.clone(),
            reason: error.to_string(),
        })?;
        if parsed.host().is_none() {
            return Err(Error::InvalidBaseUrl {
                url: base_url.clone(),
                reason: "missing host".to_string(),
            });
        }

        let api_url = Url::parse(&format!("{trimmed}/api/v{version}")).map_err(|error| {
            Error::InvalidBaseUrl {
                url: base_url.clone(),
                reason: error.to_string(),
            }
        })?;
        let endpoints = OAuth2Endpoints::from_api_url(&api_url)?;

        let store = store.unwrap_or_else(|| Arc::new(MemoryStore::default()));

        let mut state = TokenState::default();
        if let Some(token) = token {
            store.save(TOKEN_KEY, &serde_json::to_string(&token)?)?;
            state.standalone_refresh_token = token.refresh_token().map(str::to_owned);
            state.token = Some(token);
        }

        Ok(ApiClient {
            http,
            api_url,
            endpoints,
            flow,
            store,
            state: Arc::new(Mutex::new(state)),
            refresh_gate: Arc::new(Mutex::new(())),
            middleware: Arc::new(std::sync::RwLock::new(MiddlewareRegistry::default())),
            refresh_wait,
        })
    }
}
