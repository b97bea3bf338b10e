//! Admin credentials and signed bearer tokens.
//!
//! A token is `hex(claims_json) "." hex(hmac_sha256(secret, claims_json))`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const PASSWORD_SALT: &str = "fruitreel_admin_salt";
pub const TOKEN_ISSUER: &str = "fruitreel-api";
pub const ADMIN_ROLE: &str = "admin";

pub const ADMIN_PERMISSIONS: [&str; 5] = [
    "view_sessions",
    "modify_probability",
    "view_analytics",
    "delete_sessions",
    "system_settings",
];

/// `sha256(password + salt)` as lowercase hex.
pub fn hash_password(password: &str) -> String {
    let mut h = Sha256::new();
    h.update(password.as_bytes());
    h.update(PASSWORD_SALT.as_bytes());
    hex::encode(h.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("role {0:?} may not use admin routes")]
    Forbidden(String),
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("ttl", &self.ttl).finish()
    }
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> HmacSha256 {
        keyed(&self.secret)
    }

    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> (String, Claims) {
        let claims = Claims {
            username: username.to_string(),
            role: ADMIN_ROLE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };
        (self.sign(&claims), claims)
    }

    pub(crate) fn sign(&self, claims: &Claims) -> String {
        let payload = serde_json::to_vec(claims).unwrap_or_default();
        let mut mac = self.mac();
        mac.update(&payload);
        format!(
            "{}.{}",
            hex::encode(&payload),
            hex::encode(mac.finalize().into_bytes())
        )
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let (payload_hex, sig_hex) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let payload = hex::decode(payload_hex).map_err(|_| AuthError::Malformed)?;
        let sig = hex::decode(sig_hex).map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac();
        mac.update(&payload);
        mac.verify_slice(&sig).map_err(|_| AuthError::BadSignature)?;

        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;
        if claims.iss != TOKEN_ISSUER {
            return Err(AuthError::Malformed);
        }
        if now.timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }
        if claims.role != ADMIN_ROLE {
            warn!(role = %claims.role, "token with non-admin role");
            return Err(AuthError::Forbidden(claims.role));
        }
        Ok(claims)
    }
}

/// Check a login attempt against the configured admin account.
pub fn verify_credentials(
    expected_user: &str,
    expected_hash: &str,
    username: &str,
    password: &str,
) -> bool {
    // compare MACs of both hashes; verify_slice is constant-time
    let key = expected_hash.as_bytes();
    let mut reference = keyed(key);
    reference.update(expected_hash.as_bytes());
    let reference = reference.finalize().into_bytes();
    let mut candidate = keyed(key);
    candidate.update(hash_password(password).as_bytes());
    let hash_ok = candidate.verify_slice(&reference).is_ok();
    username == expected_user && hash_ok
}

fn keyed(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC key")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn password_hash_is_salted_sha256() {
        let h = hash_password("admin123");
        assert_eq!(h.len(), 64);
        assert_ne!(h, hex::encode(Sha256::digest(b"admin123")));
        assert_eq!(h, hash_password("admin123"));
    }

    #[test]
    fn credentials_check() {
        let hash = hash_password("s3cret");
        assert!(verify_credentials("admin", &hash, "admin", "s3cret"));
        assert!(!verify_credentials("admin", &hash, "admin", "wrong"));
        assert!(!verify_credentials("admin", &hash, "root", "s3cret"));
    }

    #[test]
    fn issued_token_verifies_until_expiry() {
        let signer = TokenSigner::new("k", 1);
        let (token, claims) = signer.issue("admin", at(1_000));
        assert_eq!(signer.verify(&token, at(1_001)).unwrap(), claims);
        assert_eq!(signer.verify(&token, at(1_000 + 3600)), Err(AuthError::Expired));
    }

    #[test]
    fn tampered_token_rejected() {
        let signer = TokenSigner::new("k", 1);
        let (token, mut claims) = signer.issue("admin", at(0));
        claims.username = "mallory".into();
        let forged_payload = hex::encode(serde_json::to_vec(&claims).unwrap());
        let sig = token.split_once('.').unwrap().1;
        let forged = format!("{forged_payload}.{sig}");
        assert_eq!(signer.verify(&forged, at(1)), Err(AuthError::BadSignature));

        let other = TokenSigner::new("other", 1);
        assert_eq!(other.verify(&token, at(1)), Err(AuthError::BadSignature));
        assert_eq!(signer.verify("nodot", at(1)), Err(AuthError::Malformed));
    }

    #[test]
    fn non_admin_role_rejected() {
        let signer = TokenSigner::new("k", 1);
        let claims = Claims {
            username: "guest".into(),
            role: "player".into(),
            iat: 0,
            exp: 100,
            iss: TOKEN_ISSUER.into(),
        };
        let token = signer.sign(&claims);
        assert_eq!(
            signer.verify(&token, at(1)),
            Err(AuthError::Forbidden("player".into()))
        );
    }
}
