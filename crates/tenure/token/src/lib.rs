//! Tenure Token - short-lived write tokens bound to one exact patch.
//!
//! A token authorizes applying one diff to one base text of one file, for one
//! operation at one capability tier:
//!
//! ```text
//! base64url(canonical JSON payload) "." base64url(HMAC-SHA256(secret, encoded payload))
//! ```
//!
//! The payload carries `{v, op, ru, iat, exp, nonce, fn, base_hash, diff_hash}`
//! with keys in sorted order and no whitespace. Tokens are never stored;
//! validity is recomputed from the payload and the secret on every
//! verification. The optional single-use guard is the only state kept.

#![deny(unsafe_code)]

mod authority;
mod error;
mod secret;

pub use authority::{MintedToken, TokenBinding, TokenTarget, VerifiedToken, WriteTokenAuthority, TOKEN_VERSION};
pub use error::{TokenError, TokenRejection, TokenResult};
pub use secret::{SecretSource, SigningSecret, MIN_SECRET_LEN, SECRET_ENV_VAR};
