//! Signing secret custody.

use crate::error::{TokenError, TokenResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use std::fmt;
use tracing::warn;

/// Environment variable holding a shared base64url secret.
pub const SECRET_ENV_VAR: &str = "TENURE_WRITE_TOKEN_SECRET_B64";

/// Minimum secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Where the active secret came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecretSource {
    Environment,
    Provided,
    /// Fresh per-process secret. Restart invalidates outstanding tokens.
    Ephemeral,
}

/// HMAC key bytes. Never printed.
#[derive(Clone)]
pub struct SigningSecret {
    bytes: Vec<u8>,
    source: SecretSource,
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("len", &self.bytes.len())
            .field("source", &self.source)
            .finish()
    }
}

impl SigningSecret {
    /// A fresh random secret.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            bytes,
            source: SecretSource::Ephemeral,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> TokenResult<Self> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(TokenError::InvalidSecret(format!(
                "secret is {} bytes, need at least {MIN_SECRET_LEN}",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes,
            source: SecretSource::Provided,
        })
    }

    /// Decode a base64url secret, padded or not.
    pub fn from_b64(encoded: &str) -> TokenResult<Self> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| TokenError::InvalidSecret(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// Read [`SECRET_ENV_VAR`], falling back to a random secret.
    ///
    /// A missing variable is normal for single-instance use. An invalid one
    /// is almost certainly a deployment mistake, so both cases warn.
    pub fn from_env_or_generate() -> Self {
        match std::env::var(SECRET_ENV_VAR) {
            Ok(value) => match Self::from_b64(&value) {
                Ok(mut secret) => {
                    secret.source = SecretSource::Environment;
                    secret
                }
                Err(e) => {
                    warn!(
                        var = SECRET_ENV_VAR,
                        error = %e,
                        "Ignoring invalid write-token secret; using ephemeral secret"
                    );
                    Self::generate()
                }
            },
            Err(_) => {
                warn!(
                    var = SECRET_ENV_VAR,
                    "No shared write-token secret; using ephemeral secret (tokens do not survive restart)"
                );
                Self::generate()
            }
        }
    }

    pub fn source(&self) -> SecretSource {
        self.source
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}
