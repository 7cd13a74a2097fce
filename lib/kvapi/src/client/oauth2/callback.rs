//! Callback URL parsing shared by the authorization-code flows.

use url::Url;

use super::error::AuthError;

/// Query parameters extracted from a provider callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackParams {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
}

/// Parses a provider callback URL against the configured redirect URI.
///
/// The callback stripped of its query and fragment must equal the redirect
/// URI exactly; anything else is treated as a different destination and
/// rejected before any network activity.
pub(crate) fn parse_callback(
    callback_url: &str,
    redirect_uri: &Url,
) -> Result<CallbackParams, AuthError> {
    let parsed = Url::parse(callback_url).map_err(|error| AuthError::InvalidCallbackUrl {
        url: callback_url.to_owned(),
        reason: error.to_string(),
    })?;

    let mut stripped = parsed.clone();
    stripped.set_query(None);
    stripped.set_fragment(None);
    if stripped != *redirect_uri {
        return Err(AuthError::RedirectUriMismatch {
            callback_url: callback_url.to_owned(),
        });
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(CallbackParams { code, state })
}
