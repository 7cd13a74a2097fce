//! # kvapi
//!
//! Rust client SDK for the Kiva CRM REST API.
//!
//! The crate wraps the CRM's OAuth2 surface (Authorization Code,
//! Authorization Code with PKCE, and Client Credentials) behind an
//! [`ApiClient`] that manages the whole token lifecycle: acquisition,
//! caching through a pluggable [`TokenStore`], transparent refresh of
//! expired tokens, and revocation. Every REST call carries a valid bearer
//! token; requests issued while a refresh is in flight queue behind it, and
//! an `INVALID_TOKEN` API response triggers exactly one refresh-and-retry
//! cycle.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kvapi::{ApiClient, ClientCredentials};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::builder()
//!     .with_base_url("https://acme.kivacrm.com")
//!     .with_auth_flow(ClientCredentials::new("client-id", "client-secret"))
//!     .build()?;
//!
//! // machine-to-machine: no redirect, authorize directly
//! client.authorize(None).await?;
//!
//! let contacts = client.get("/contacts", json!({ "page": 1 })).await?;
//! println!("{}", contacts.response);
//! # Ok(())
//! # }
//! ```
//!
//! ## Browser-style flows
//!
//! For the code flows, send the user to
//! [`ApiClient::authorization_uri`], then hand the callback URL the
//! provider redirects to back to [`ApiClient::authorize`]:
//!
//! ```rust,no_run
//! use kvapi::{ApiClient, AuthorizationCodePkce};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::builder()
//!     .with_auth_flow(AuthorizationCodePkce::new(
//!         "client-id",
//!         "https://my.app/callback",
//!     )?)
//!     .build()?;
//!
//! let visit = client.authorization_uri()?;
//! // ... user grants access, provider redirects to the callback ...
//! let token = client
//!     .authorize(Some("https://my.app/callback?code=abc&state=xyz"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Results, not exceptions
//!
//! API-level failures, transport failures and hook cancellations all
//! resolve to an [`ApiResult`] with `success: false`; [`Error`] is reserved
//! for calls that could not be attempted at all. See [`ApiResult`] and
//! [`Error`] for the exact split.

mod client;

pub use client::{
    AfterHook, ApiClient, ApiClientBuilder, ApiResult, AuthError, AuthFlow, AuthorizationCode,
    AuthorizationCodePkce, BeforeHook, CODE_VERIFIER_KEY, CallInfo, ClientCredentials, Error,
    HookAction, MemoryStore, OAuth2Endpoints, Params, Part, ResponseStatus, STATE_KEY,
    SecureString, StoreError, TOKEN_KEY, Token, TokenStore,
};
