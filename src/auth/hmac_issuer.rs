//! HMAC-SHA256 credential issuer.
//!
//! Token format: `v1.<claims>.<mac>`, both parts base64url without padding.
//! The MAC covers `v1.<claims>`. Identity and relay tokens use separate keys,
//! so a relay token can never be replayed as an identity token.

use super::{AuthError, CredentialIssuer, RelayRole};
use crate::clock::Clock;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use huddle_proto::{Identity, IdentityKind};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

const VERSION: &str = "v1";

#[derive(Debug, Serialize, Deserialize)]
struct IdentityClaims {
    sub: String,
    name: String,
    kind: IdentityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelayClaims {
    app: String,
    ch: String,
    acct: String,
    role: RelayRole,
    exp: i64,
}

pub struct HmacIssuer {
    identity_key: Zeroizing<Vec<u8>>,
    relay_key: Zeroizing<Vec<u8>>,
    app_id: String,
    clock: Arc<dyn Clock>,
}

impl HmacIssuer {
    pub fn new(
        identity_secret: &str,
        relay_secret: &str,
        app_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identity_key: Zeroizing::new(identity_secret.as_bytes().to_vec()),
            relay_key: Zeroizing::new(relay_secret.as_bytes().to_vec()),
            app_id: app_id.into(),
            clock,
        }
    }

    /// Mint an identity token the way the auth subsystem does. Used by
    /// tests and local tooling.
    pub fn mint_identity_token(
        &self,
        identity: &Identity,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        let claims = IdentityClaims {
            sub: identity.id.clone(),
            name: identity.display_name.clone(),
            kind: identity.kind,
            email: identity.email.clone(),
            exp: self.clock.now().timestamp() + ttl_secs,
        };
        sign(&self.identity_key, &claims)
    }

    /// Decode and check a relay token. Exposed for the relay side of tests.
    pub fn inspect_relay_token(
        &self,
        token: &str,
    ) -> Result<(String, String, RelayRole), AuthError> {
        let claims: RelayClaims = verify(&self.relay_key, token)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok((claims.ch, claims.acct, claims.role))
    }
}

fn mac(key: &[u8], payload: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| AuthError::Signing(e.to_string()))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sign<T: Serialize>(key: &[u8], claims: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(claims).map_err(|e| AuthError::Signing(e.to_string()))?;
    let signed = format!("{VERSION}.{}", URL_SAFE_NO_PAD.encode(json));
    let tag = mac(key, signed.as_bytes())?;
    Ok(format!("{signed}.{}", URL_SAFE_NO_PAD.encode(tag)))
}

fn verify<T: for<'de> Deserialize<'de>>(key: &[u8], token: &str) -> Result<T, AuthError> {
    let (signed, tag) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
    let (version, body) = signed.split_once('.').ok_or(AuthError::Malformed)?;
    if version != VERSION {
        return Err(AuthError::Malformed);
    }
    let tag = URL_SAFE_NO_PAD
        .decode(tag)
        .map_err(|_| AuthError::Malformed)?;
    let expected = mac(key, signed.as_bytes())?;
    if !bool::from(expected.ct_eq(&tag)) {
        return Err(AuthError::BadSignature);
    }
    let json = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| AuthError::Malformed)?;
    serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)
}

impl CredentialIssuer for HmacIssuer {
    fn verify_identity_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims: IdentityClaims = verify(&self.identity_key, token)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(Identity {
            id: claims.sub,
            display_name: claims.name,
            kind: claims.kind,
            email: claims.email,
        })
    }

    fn mint_relay_token(
        &self,
        channel: &str,
        account: &str,
        role: RelayRole,
        ttl_secs: u64,
    ) -> Result<String, AuthError> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX / 2);
        let claims = RelayClaims {
            app: self.app_id.clone(),
            ch: channel.to_string(),
            acct: account.to_string(),
            role,
            exp: self.clock.now().timestamp().saturating_add(ttl),
        };
        sign(&self.relay_key, &claims)
    }

    fn relay_app_id(&self) -> &str {
        &self.app_id
    }
}
