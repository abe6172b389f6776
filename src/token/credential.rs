use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Access token plus optional refresh token, persisted as JSON.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "accessToken", alias = "auth")]
    auth: String,
    #[serde(
        rename = "refreshToken",
        alias = "refresh",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    refresh: Option<String>,
}

impl Token {
    pub fn new(auth: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            auth: auth.into(),
            refresh,
        }
    }

    pub fn bearer(auth: impl Into<String>) -> Self {
        Self::new(auth, None)
    }

    pub fn auth(&self) -> &str {
        &self.auth
    }

    pub fn refresh(&self) -> Option<&str> {
        self.refresh.as_deref()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Credential(format!("stored token is not valid JSON: {}", e)))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("auth", &format_args!("<{} chars>", self.auth.len()))
            .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
