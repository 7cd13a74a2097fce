//! The request-dispatch engine.
//!
//! Every call funnels through [`ApiClient::request`]:
//!
//! 1. wait (bounded) for any in-flight token refresh,
//! 2. run before-hooks, which may cancel the call,
//! 3. resolve a valid token (memory → store → refresh when expired),
//! 4. build and send the HTTP request with a bearer header,
//! 5. normalize the response into an [`ApiResult`],
//! 6. on an `INVALID_TOKEN` API error, refresh and retry exactly once,
//! 7. run after-hooks on the fully resolved result.
//!
//! Transport failures are folded into the result shape rather than raised,
//! so callers have one uniform success check; only pre-flight problems
//! (no token, refresh failure, timeout) surface as [`Error`].

use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use mime::Mime;
use serde_json::json;
use tracing::{debug, warn};

use super::middleware::{CallInfo, HookAction};
use super::oauth2::Token;
use super::params::{Params, append_query, multipart_form};
use super::result::{ApiResult, ResponseStatus};
use super::store::TOKEN_KEY;
use super::{ApiClient, Error};

/// API error code that triggers the refresh-and-retry cycle.
const INVALID_TOKEN_ERROR: &str = "INVALID_TOKEN";

/// Refresh-and-retry cycles allowed per client lifetime between successes.
const MAX_INVALID_TOKEN_RETRIES: u8 = 3;

impl ApiClient {
    /// Sends a request and resolves it to the uniform result envelope.
    ///
    /// # Errors
    ///
    /// Only conditions that prevent the request from being attempted are
    /// errors: no token anywhere ([`Error::TokenNotFound`]), a refresh that
    /// fails or takes longer than the configured bound, or invalid request
    /// ingredients. An API-level `success: false`, including after an
    /// exhausted retry budget, is an `Ok` result.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: impl Into<Params>,
    ) -> Result<ApiResult, Error> {
        let call = CallInfo {
            method,
            endpoint: endpoint.to_owned(),
            params: params.into(),
        };

        self.wait_for_refresh().await?;

        if self.run_before(&call) == HookAction::Cancel {
            debug!(endpoint = %call.endpoint, "request cancelled by before-hook");
            let result = ApiResult::cancelled();
            self.run_after(false, &result, &call);
            return Ok(result);
        }

        let mut resent = false;
        let result = loop {
            let token = self.valid_token().await?;
            let result = self.send_once(&call, &token).await?;

            if result.is_success() {
                self.note_success().await;
                break result;
            }

            if result.error_code() == Some(INVALID_TOKEN_ERROR) && !resent {
                if self.begin_invalid_token_cycle().await {
                    warn!(
                        endpoint = %call.endpoint,
                        "access token rejected, refreshing and retrying once"
                    );
                    let refreshed = self.refresh(None).await;
                    self.end_invalid_token_cycle().await;
                    refreshed?;
                    resent = true;
                    continue;
                }
                warn!(
                    endpoint = %call.endpoint,
                    "invalid-token retry budget exhausted, returning failure"
                );
            }
            break result;
        };

        self.run_after(result.is_success(), &result, &call);
        Ok(result)
    }

    /// Refreshes the current token through the configured flow.
    ///
    /// The refresh token is resolved in priority order: the explicit
    /// argument, the standalone refresh token, the current token's own. The
    /// refresh gate is held for the duration, so new requests queue until
    /// the replacement token is adopted.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<Token, Error> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_with_gate_held(refresh_token).await
    }

    async fn refresh_with_gate_held(&self, explicit: Option<&str>) -> Result<Token, Error> {
        let resolved = {
            let state = self.state.lock().await;
            explicit
                .map(str::to_owned)
                .or_else(|| state.standalone_refresh_token.clone())
                .or_else(|| {
                    state
                        .token
                        .as_ref()
                        .and_then(|token| token.refresh_token().map(str::to_owned))
                })
        };
        let flow = self.flow.as_ref().ok_or(Error::NoAuthFlow)?;
        debug!("refreshing access token");
        let token = flow
            .refresh(&self.http, &self.endpoints, resolved.as_deref())
            .await?;
        self.set_token(token.clone()).await?;
        Ok(token)
    }

    /// Bounded wait for an in-flight refresh to release the gate.
    async fn wait_for_refresh(&self) -> Result<(), Error> {
        match tokio::time::timeout(self.refresh_wait, self.refresh_gate.lock()).await {
            Ok(gate) => {
                drop(gate);
                Ok(())
            }
            Err(_elapsed) => Err(Error::RefreshWaitTimeout {
                waited: self.refresh_wait,
            }),
        }
    }

    /// Resolves a usable token: memory, then the store, refreshing when
    /// expired.
    async fn valid_token(&self) -> Result<Token, Error> {
        let cached = { self.state.lock().await.token.clone() };
        let token = match cached {
            Some(token) => token,
            None => {
                let Some(stored) = self.load_stored_token()? else {
                    return Err(Error::TokenNotFound);
                };
                let mut state = self.state.lock().await;
                if state.standalone_refresh_token.is_none() {
                    state.standalone_refresh_token =
                        stored.refresh_token().map(str::to_owned);
                }
                state.token = Some(stored.clone());
                drop(state);
                stored
            }
        };

        if !token.is_expired() {
            return Ok(token);
        }

        debug!("cached token expired");
        let _gate = self.refresh_gate.lock().await;
        // another request queued here may have refreshed already
        if let Some(current) = self.state.lock().await.token.clone()
            && !current.is_expired()
        {
            return Ok(current);
        }
        self.refresh_with_gate_held(None).await
    }

    fn load_stored_token(&self) -> Result<Option<Token>, Error> {
        let Some(raw) = self.store.load(TOKEN_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Ok(Some(token)),
            Err(error) => {
                warn!(%error, "ignoring unreadable cached token");
                Ok(None)
            }
        }
    }

    async fn note_success(&self) {
        let mut state = self.state.lock().await;
        state.invalid_token_count = 0;
        state.refresh_pending = false;
    }

    /// Claims the invalid-token cycle if the budget allows and none is
    /// already running.
    async fn begin_invalid_token_cycle(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.refresh_pending || state.invalid_token_count >= MAX_INVALID_TOKEN_RETRIES {
            return false;
        }
        state.refresh_pending = true;
        state.invalid_token_count += 1;
        true
    }

    async fn end_invalid_token_cycle(&self) {
        self.state.lock().await.refresh_pending = false;
    }

    /// Builds and sends one attempt, normalizing the outcome.
    async fn send_once(&self, call: &CallInfo, token: &Token) -> Result<ApiResult, Error> {
        let is_query = call.method == Method::GET || call.method == Method::HEAD;

        let mut url = self.endpoint_url(&call.endpoint)?;
        if is_query {
            match &call.params {
                Params::Empty => {}
                Params::Json(value) => append_query(&mut url, value),
                Params::Multipart(_) => {
                    return Err(Error::UnsupportedQueryParams {
                        method: call.method.clone(),
                    });
                }
            }
        }

        let mut request = self
            .http
            .request(call.method.clone(), url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.access_token()));
        if !is_query {
            request = match &call.params {
                Params::Empty => request,
                Params::Json(value) => request.json(value),
                Params::Multipart(parts) => request.multipart(multipart_form(parts)?),
            };
        }

        debug!(method = %call.method, %url, "sending request");
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "transport failure");
                return Ok(ApiResult::transport_failure(&error));
            }
        };
        debug!(status = %response.status(), "received response");
        Ok(interpret_response(response).await)
    }
}

/// Normalizes an HTTP response into the result envelope.
///
/// A 204, a non-JSON content type or an empty body yields a synthetic
/// `{"success": <status ok>}` body; otherwise the JSON body is parsed.
async fn interpret_response(response: reqwest::Response) -> ApiResult {
    let status = response.status();
    let headers = response.headers().clone();
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Mime>().ok())
        .is_some_and(|mime| mime.essence_str() == mime::APPLICATION_JSON.essence_str());
    let response_status = ResponseStatus {
        code: status.as_u16(),
        message: status.canonical_reason().unwrap_or_default().to_owned(),
    };

    let body = if status == StatusCode::NO_CONTENT || !is_json {
        json!({ "success": status.is_success() })
    } else {
        match response.text().await {
            Ok(text) if text.is_empty() => json!({ "success": status.is_success() }),
            Ok(text) => serde_json::from_str(&text)
                .unwrap_or_else(|error| json!({ "success": false, "error": error.to_string() })),
            Err(error) => return ApiResult::transport_failure(&error),
        }
    };

    ApiResult {
        response: body,
        headers,
        status: Some(response_status),
    }
}
