//! Authorization-flow error types.

use crate::client::store::StoreError;

/// Errors raised by the authorization flows and token exchanges.
///
/// These reject the in-progress authorization or refresh; they are never
/// retried internally. API-level failures on normal requests are reported
/// through the result envelope instead (see
/// [`ApiResult`](crate::client::result::ApiResult)).
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum AuthError {
    /// Transport failure while talking to the token endpoint.
    Transport(reqwest::Error),

    /// Token store failure while persisting or reading a round-trip value.
    Store(StoreError),

    /// The callback URL does not point back at the configured redirect URI.
    #[display("callback URL '{callback_url}' does not match the configured redirect URI")]
    #[from(skip)]
    RedirectUriMismatch {
        /// The callback URL that was handed to `execute`.
        callback_url: String,
    },

    /// The callback URL carries no authorization code.
    #[display("callback URL '{callback_url}' carries no authorization code")]
    #[from(skip)]
    MissingAuthCode {
        /// The callback URL that was handed to `execute`.
        callback_url: String,
    },

    /// The state echoed by the provider differs from the state that was sent.
    #[display("state returned by the provider does not match the state sent")]
    #[from(skip)]
    StateMismatch,

    /// The token endpoint answered without a truthy `success` field.
    #[display("token exchange rejected by the provider: {body}")]
    #[from(skip)]
    ExchangeFailed {
        /// Raw response body returned by the token endpoint.
        body: serde_json::Value,
    },

    /// No PKCE code verifier is stored for this round trip.
    #[display("no PKCE code verifier in the store; build the authorization URI first")]
    #[from(skip)]
    MissingCodeVerifier,

    /// The flow needs the callback URL captured after the provider redirect.
    #[display("this flow requires the callback URL captured after the provider redirect")]
    #[from(skip)]
    MissingCallbackUrl,

    /// The client credentials flow never visits an authorization page.
    #[display("the client credentials flow has no authorization URI")]
    #[from(skip)]
    NoAuthorizationUri,

    /// No refresh token is available to perform a refresh.
    #[display("no refresh token available")]
    #[from(skip)]
    MissingRefreshToken,

    /// The configured redirect URI cannot be parsed.
    #[display("invalid redirect URI '{url}': {reason}")]
    #[from(skip)]
    InvalidRedirectUri {
        /// The rejected redirect URI.
        url: String,
        /// Why the URI is invalid.
        reason: String,
    },

    /// The callback URL cannot be parsed.
    #[display("invalid callback URL '{url}': {reason}")]
    #[from(skip)]
    InvalidCallbackUrl {
        /// The rejected callback URL.
        url: String,
        /// Why the URL is invalid.
        reason: String,
    },
}
