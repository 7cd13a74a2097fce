//! Client configuration and dispatch error types.

use std::time::Duration;

use http::Method;

use super::oauth2::AuthError;
use super::store::StoreError;

/// Errors that mean a request could not be attempted.
///
/// API-level failures ("the operation completed but the API said no") never
/// surface here; they come back as [`ApiResult`](super::result::ApiResult)
/// values with `success: false`. This enum covers configuration problems and
/// the pre-flight stages of dispatch.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum Error {
    /// Authorization-flow or token-exchange failure.
    Auth(AuthError),

    /// Token store failure.
    Store(StoreError),

    /// URL construction failure.
    Url(url::ParseError),

    /// Token (de)serialization failure.
    Json(serde_json::Error),

    /// Request-building failure in the HTTP layer.
    Http(reqwest::Error),

    /// No token is available in memory or in the store.
    #[display("no token available: authorize first or supply one with set_token")]
    #[from(skip)]
    TokenNotFound,

    /// An in-flight refresh did not finish within the configured bound.
    #[display("timed out after {waited:?} waiting for an in-flight token refresh")]
    #[from(skip)]
    RefreshWaitTimeout {
        /// How long the request waited before giving up.
        waited: Duration,
    },

    /// The client was built without an authorization flow.
    #[display("no authorization flow configured")]
    #[from(skip)]
    NoAuthFlow,

    /// The configured base URL cannot be used.
    #[display("invalid base URL '{url}': {reason}")]
    #[from(skip)]
    InvalidBaseUrl {
        /// The rejected base URL.
        url: String,
        /// Why the URL is invalid.
        reason: String,
    },

    /// Multipart payloads cannot be encoded into a query string.
    #[display("multipart payloads cannot be encoded into a {method} query string")]
    #[from(skip)]
    UnsupportedQueryParams {
        /// The query-string method the multipart payload was given to.
        method: Method,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn should_display_token_not_found() {
        assert_eq!(
            Error::TokenNotFound.to_string(),
            "no token available: authorize first or supply one with set_token"
        );
    }

    #[test]
    fn should_display_refresh_wait_timeout() {
        let error = Error::RefreshWaitTimeout {
            waited: Duration::from_secs(10),
        };
        assert_eq!(
            error.to_string(),
            "timed out after 10s waiting for an in-flight token refresh"
        );
    }

    #[test]
    fn should_wrap_auth_errors() {
        let error = Error::from(AuthError::StateMismatch);
        assert!(matches!(error, Error::Auth(AuthError::StateMismatch)));
    }
}
