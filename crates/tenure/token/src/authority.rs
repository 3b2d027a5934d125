use crate::error::{TokenError, TokenRejection, TokenResult};
use crate::secret::SigningSecret;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tenure_types::{sha256_hex, CapabilityTier};
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_VERSION: u32 = 1;

const NONCE_LEN: usize = 12;

/// Wire payload. Fields are declared in sorted key order so serde emits
/// canonical JSON.
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    base_hash: String,
    diff_hash: String,
    exp: i64,
    #[serde(rename = "fn")]
    filename: String,
    iat: i64,
    nonce: String,
    op: String,
    ru: String,
    v: u32,
}

/// The exact request a token is bound to.
#[derive(Clone, Copy, Debug)]
pub struct TokenBinding<'a> {
    pub op: &'a str,
    pub required_unlock: CapabilityTier,
    pub filename: &'a str,
    pub base_text: &'a str,
    pub diff_text: &'a str,
}

/// The binding in digest form, safe to echo back to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTarget {
    pub op: String,
    pub required_unlock: CapabilityTier,
    pub filename: String,
    pub base_hash: String,
    pub diff_hash: String,
}

impl TokenBinding<'_> {
    pub fn target(&self) -> TokenTarget {
        TokenTarget {
            op: self.op.to_string(),
            required_unlock: self.required_unlock,
            filename: self.filename.to_string(),
            base_hash: sha256_hex(self.base_text),
            diff_hash: sha256_hex(self.diff_text),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MintedToken {
    pub token: String,
    pub ttl_seconds: u64,
    pub issued_at: i64,
    pub expires_at: i64,
    pub target: TokenTarget,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedToken {
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Mints and verifies write tokens.
///
/// The secret sits behind its own lock, independent of any progress state.
/// Rotation invalidates every outstanding token.
#[derive(Debug)]
pub struct WriteTokenAuthority {
    secret: RwLock<SigningSecret>,
    single_use: AtomicBool,
    /// nonce -> expiry, for single-use enforcement.
    used_nonces: Mutex<HashMap<String, i64>>,
}

impl WriteTokenAuthority {
    pub fn new(secret: SigningSecret) -> Self {
        Self {
            secret: RwLock::new(secret),
            single_use: AtomicBool::new(false),
            used_nonces: Mutex::new(HashMap::new()),
        }
    }

    /// Builder-style toggle for the single-use guard.
    pub fn with_single_use(self, enabled: bool) -> Self {
        self.set_single_use(enabled);
        self
    }

    pub fn set_single_use(&self, enabled: bool) {
        self.single_use.store(enabled, Ordering::SeqCst);
    }

    pub fn single_use(&self) -> bool {
        self.single_use.load(Ordering::SeqCst)
    }

    /// Replace the signing secret.
    pub fn rotate(&self, secret: SigningSecret) -> TokenResult<()> {
        let mut guard = self.secret.write().map_err(|_| TokenError::LockError)?;
        *guard = secret;
        info!(source = ?guard.source(), "Write-token secret rotated");
        Ok(())
    }

    pub fn mint(&self, binding: &TokenBinding<'_>, ttl_seconds: u64) -> TokenResult<MintedToken> {
        self.mint_at(binding, ttl_seconds, chrono::Utc::now().timestamp())
    }

    /// Mint with an explicit clock, in unix seconds.
    pub fn mint_at(&self, binding: &TokenBinding<'_>, ttl_seconds: u64, now: i64) -> TokenResult<MintedToken> {
        let target = binding.target();
        let expires_at = now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX));

        let payload = Payload {
            base_hash: target.base_hash.clone(),
            diff_hash: target.diff_hash.clone(),
            exp: expires_at,
            filename: target.filename.clone(),
            iat: now,
            nonce: fresh_nonce(),
            op: target.op.clone(),
            ru: target.required_unlock.as_str().to_string(),
            v: TOKEN_VERSION,
        };
        let raw = serde_json::to_vec(&payload)?;
        let token = self.seal(&raw)?;

        debug!(
            op = binding.op,
            required_unlock = %binding.required_unlock,
            filename = binding.filename,
            expires_at,
            "Minted write token"
        );

        Ok(MintedToken {
            token,
            ttl_seconds,
            issued_at: now,
            expires_at,
            target,
        })
    }

    pub fn verify(&self, token: &str, binding: &TokenBinding<'_>) -> TokenResult<VerifiedToken> {
        self.verify_at(token, binding, chrono::Utc::now().timestamp())
    }

    /// Verify with an explicit clock. A token is valid through its `exp`
    /// second inclusive.
    pub fn verify_at(&self, token: &str, binding: &TokenBinding<'_>, now: i64) -> TokenResult<VerifiedToken> {
        let result = self.check(token, binding, now);
        if let Err(TokenError::Rejected(reason)) = &result {
            debug!(
                reason = %reason,
                op = binding.op,
                filename = binding.filename,
                "Write token rejected"
            );
        }
        result
    }

    fn check(&self, token: &str, binding: &TokenBinding<'_>, now: i64) -> TokenResult<VerifiedToken> {
        let (payload_part, sig_part) = token
            .split_once('.')
            .filter(|(p, s)| !p.is_empty() && !s.is_empty())
            .ok_or(TokenRejection::Malformed)?;

        let payload_raw = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| TokenRejection::BadBase64)?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| TokenRejection::BadBase64)?;

        // Constant-time comparison.
        self.mac(payload_part.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenRejection::BadSignature)?;

        let value: serde_json::Value =
            serde_json::from_slice(&payload_raw).map_err(|_| TokenRejection::BadPayload)?;
        if value.get("v").and_then(serde_json::Value::as_u64) != Some(u64::from(TOKEN_VERSION)) {
            return Err(TokenRejection::BadVersion.into());
        }
        let payload: Payload = serde_json::from_value(value).map_err(|_| TokenRejection::BadPayload)?;

        if payload.op != binding.op {
            return Err(TokenRejection::WrongOp.into());
        }
        if payload.ru != binding.required_unlock.as_str() {
            return Err(TokenRejection::WrongUnlock.into());
        }
        if payload.filename != binding.filename {
            return Err(TokenRejection::WrongFilename.into());
        }
        if payload.base_hash != sha256_hex(binding.base_text) {
            return Err(TokenRejection::WrongBase.into());
        }
        if payload.diff_hash != sha256_hex(binding.diff_text) {
            return Err(TokenRejection::WrongDiff.into());
        }
        if now > payload.exp {
            return Err(TokenRejection::Expired.into());
        }
        if self.single_use() {
            self.consume_nonce(&payload.nonce, payload.exp, now)?;
        }

        Ok(VerifiedToken {
            issued_at: payload.iat,
            expires_at: payload.exp,
        })
    }

    fn consume_nonce(&self, nonce: &str, expires_at: i64, now: i64) -> TokenResult<()> {
        let mut used = self.used_nonces.lock().map_err(|_| TokenError::LockError)?;
        used.retain(|_, exp| *exp >= now);
        if used.contains_key(nonce) {
            return Err(TokenRejection::Replayed.into());
        }
        used.insert(nonce.to_string(), expires_at);
        Ok(())
    }

    fn mac(&self, message: &[u8]) -> TokenResult<HmacSha256> {
        let secret = self.secret.read().map_err(|_| TokenError::LockError)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| TokenError::InvalidSecret(e.to_string()))?;
        mac.update(message);
        Ok(mac)
    }

    /// `encode(raw) "." encode(hmac(encode(raw)))`
    fn seal(&self, raw: &[u8]) -> TokenResult<String> {
        let payload_b64 = URL_SAFE_NO_PAD.encode(raw);
        let signature = self.mac(payload_b64.as_bytes())?.finalize().into_bytes();
        Ok(format!("{payload_b64}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

fn fresh_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
