//! Access token value object.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Safety margin subtracted from `expires_in` so a token is treated as
/// expired slightly before the provider rejects it.
const EXPIRY_MARGIN_SECS: i64 = 5;

/// An access token issued by the Kiva CRM identity provider.
///
/// Tokens are immutable: a refresh produces a replacement, never a mutation.
/// The expiry instant is always set: taken from the provider's absolute
/// `expires_at` when present, otherwise derived from the relative
/// `expires_in` with a small safety margin.
///
/// Serialization round-trips through the plain wire mapping
/// `{access_token, refresh_token, expires_in, expires_at}` (epoch
/// milliseconds), the same shape used by the token endpoint and by the
/// persisted cache.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Token {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Creates a token expiring `expires_in` seconds from now, minus the
    /// safety margin.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in: Some(expires_in),
            expires_at: expiry_from_delta(expires_in),
        }
    }

    /// Creates a token with an explicit expiry instant.
    ///
    /// The instant is truncated to millisecond precision so the token
    /// survives a serialization round trip unchanged.
    pub fn with_expires_at(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let expires_at =
            DateTime::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at);
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in: None,
            expires_at,
        }
    }

    /// Returns the access token value.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token if the provider issued one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns the instant at which this token stops being usable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Checks if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

fn expiry_from_delta(expires_in: u64) -> DateTime<Utc> {
    let delta_millis = i64::try_from(expires_in)
        .unwrap_or(i64::MAX)
        .saturating_sub(EXPIRY_MARGIN_SECS)
        .saturating_mul(1000);
    DateTime::from_timestamp_millis(Utc::now().timestamp_millis().saturating_add(delta_millis))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Wire shape shared by token-endpoint responses and the persisted cache.
#[derive(Serialize, Deserialize)]
struct TokenWire {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

impl Serialize for Token {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        TokenWire {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_in: self.expires_in,
            expires_at: Some(self.expires_at.timestamp_millis()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = TokenWire::deserialize(deserializer)?;
        let expires_at = match wire.expires_at {
            Some(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| D::Error::custom("expires_at is out of range"))?,
            None => expiry_from_delta(wire.expires_in.unwrap_or(0)),
        };
        Ok(Self {
            access_token: wire.access_token,
            refresh_token: wire.refresh_token,
            expires_in: wire.expires_in,
            expires_at,
        })
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
