//! Handshake authentication
//!
//! Permission keys have the form `<role>-<identity>-<secret-hex>`. The
//! handshake sends a base64 JSON payload naming the identity, the combined
//! role letters and a timestamp, plus a signature: the byte-wise XOR of one
//! HMAC-SHA256 of the payload per key, hex encoded. The server can then check
//! that the caller holds every key it claims without seeing any secret.

use crate::error::{PubSubError, Result};
use crate::session::SessionCell;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use hypersockets::{HeaderProvider, Headers, HyperSocketError};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Handshake header carrying the base64 payload
pub const PAYLOAD_HEADER: &str = "X-Auth-Payload";

/// Handshake header carrying the hex signature
pub const SIGNATURE_HEADER: &str = "X-Auth-Signature";

/// Length of an HMAC-SHA256 digest
const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Read,
    Write,
    Admin,
}

impl Role {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "R" => Some(Role::Read),
            "W" => Some(Role::Write),
            "A" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Role::Read => 'R',
            Role::Write => 'W',
            Role::Admin => 'A',
        }
    }
}

/// One parsed permission key
#[derive(Clone)]
pub struct PermissionKey {
    role: Role,
    identity: String,
    secret: Vec<u8>,
}

impl PermissionKey {
    /// Parse `<role>-<identity>-<secret-hex>`
    ///
    /// The identity is everything between the first and the last `-`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (role, rest) = raw
            .split_once('-')
            .ok_or_else(|| PubSubError::Crypto("key is not <role>-<identity>-<secret>".into()))?;
        let (identity, secret_hex) = rest
            .rsplit_once('-')
            .ok_or_else(|| PubSubError::Crypto("key is not <role>-<identity>-<secret>".into()))?;

        let role = Role::from_letter(role)
            .ok_or_else(|| PubSubError::Crypto(format!("unknown key role '{}'", role)))?;
        if identity.is_empty() {
            return Err(PubSubError::Crypto("key has an empty identity".into()));
        }
        if secret_hex.is_empty() {
            return Err(PubSubError::Crypto("key has an empty secret".into()));
        }
        let secret = hex::decode(secret_hex)
            .map_err(|e| PubSubError::Crypto(format!("key secret is not valid hex: {}", e)))?;

        Ok(Self {
            role,
            identity: identity.to_string(),
            secret,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn mac(&self, payload: &str) -> Result<[u8; DIGEST_LEN]> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PubSubError::Crypto(format!("HMAC error: {}", e)))?;
        mac.update(payload.as_bytes());
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&mac.finalize().into_bytes());
        Ok(digest)
    }
}

impl std::fmt::Debug for PermissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionKey")
            .field("role", &self.role)
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// An ordered, non-empty set of keys sharing one identity
#[derive(Debug, Clone)]
pub struct PermissionKeys {
    keys: Vec<PermissionKey>,
}

impl PermissionKeys {
    pub fn parse<I, S>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = raw
            .into_iter()
            .map(|k| PermissionKey::parse(k.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let first = keys
            .first()
            .ok_or_else(|| PubSubError::Crypto("at least one permission key is required".into()))?;
        if let Some(other) = keys.iter().find(|k| k.identity != first.identity) {
            return Err(PubSubError::Crypto(format!(
                "keys belong to different identities ('{}' and '{}')",
                first.identity, other.identity
            )));
        }

        Ok(Self { keys })
    }

    pub fn identity(&self) -> &str {
        &self.keys[0].identity
    }

    /// Role letters in key order, e.g. `"RWA"`
    pub fn permissions(&self) -> String {
        self.keys.iter().map(|k| k.role.letter()).collect()
    }
}

#[derive(Serialize)]
struct AuthPayload<'a> {
    identity: &'a str,
    permissions: String,
    security_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
}

/// Signed handshake material for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMaterial {
    /// Base64 of the JSON payload
    pub payload: String,
    /// Lowercase hex of the XOR-combined HMACs
    pub signature: String,
}

impl AuthMaterial {
    /// Sign with the current time
    pub fn sign(keys: &PermissionKeys, session: Option<Uuid>) -> Result<Self> {
        Self::sign_at(keys, session, Utc::now())
    }

    /// Sign with an explicit timestamp; deterministic for equal inputs
    pub fn sign_at(
        keys: &PermissionKeys,
        session: Option<Uuid>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        let body = AuthPayload {
            identity: keys.identity(),
            permissions: keys.permissions(),
            security_timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            uuid: session.map(|u| u.to_string()),
        };
        let json = serde_json::to_string(&body)
            .map_err(|e| PubSubError::Crypto(format!("failed to encode auth payload: {}", e)))?;
        let payload = STANDARD.encode(json.as_bytes());
        let signature = sign_payload(&payload, keys)?;

        Ok(Self { payload, signature })
    }

    pub fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert(PAYLOAD_HEADER.to_string(), self.payload.clone());
        headers.insert(SIGNATURE_HEADER.to_string(), self.signature.clone());
        headers
    }
}

/// XOR of every key's HMAC-SHA256 over `payload`, hex encoded
pub fn sign_payload(payload: &str, keys: &PermissionKeys) -> Result<String> {
    let mut accumulator = [0u8; DIGEST_LEN];
    for key in &keys.keys {
        let digest = key.mac(payload)?;
        for (acc, byte) in accumulator.iter_mut().zip(digest.iter()) {
            *acc ^= byte;
        }
    }
    Ok(hex::encode(accumulator))
}

/// Header provider that signs fresh material on every connection attempt
///
/// The session cell is read each time, so a reconnect asks the server to
/// resume whatever session the handle saw last.
pub struct AuthHeaders {
    keys: PermissionKeys,
    session: SessionCell,
}

impl AuthHeaders {
    pub fn new(keys: PermissionKeys, session: SessionCell) -> Self {
        Self { keys, session }
    }
}

#[async_trait]
impl HeaderProvider for AuthHeaders {
    async fn get_headers(&self) -> hypersockets::Result<Headers> {
        AuthMaterial::sign(&self.keys, self.session.get())
            .map(|material| material.headers())
            .map_err(|e| match e {
                PubSubError::Crypto(reason) => HyperSocketError::AuthenticationFailed(reason),
                other => HyperSocketError::AuthenticationFailed(other.to_string()),
            })
    }
}
