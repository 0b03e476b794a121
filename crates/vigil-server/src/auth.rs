//! Bearer-token generation and verification.
//!
//! The account service authenticates users and hands them an HMAC-SHA256
//! signed token binding their user id to an expiry window. This module is
//! the single verification rule for that credential: the HTTP auth
//! middleware and the WebSocket handshake both call [`verify_token`], so a
//! token that opens one surface opens both and nothing else.

use thiserror::Error;

/// Token format: `base64url(user_id|expires_unix_secs|hmac_signature)`.
/// The signature binds the user id to the expiry window, preventing both
/// impersonation (different user id) and replay (after expiry).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The token is not structurally a signed token.
    #[error("malformed token")]
    Malformed,
    /// The signature does not match the payload.
    #[error("invalid token signature")]
    BadSignature,
    /// The token's expiry window has passed.
    #[error("token expired")]
    Expired,
}

/// Derives the 32-byte HMAC key for bearer tokens from the configured
/// secret. Uses SHA-256 with a domain-separation prefix so the derived key
/// is independent of any other use of the secret.
pub fn derive_token_secret(secret: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"vigil-auth-token-v1:");
    hasher.update(secret.as_bytes());
    let result = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&result);
    key
}

/// Issues a signed token for a user, valid for `ttl_secs` from now.
pub fn issue_token(user_id: &str, ttl_secs: u64, secret: &[u8; 32]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let expires = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        + ttl_secs;

    let payload = format!("{}|{}", user_id, expires);

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    use base64::Engine;
    let token_bytes = format!("{}|{}", payload, hex::encode(signature));
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes.as_bytes())
}

/// Verifies a signed token. Returns the bound user id if the signature
/// matches and the token has not expired.
pub fn verify_token(token: &str, secret: &[u8; 32]) -> Result<String, AuthError> {
    use base64::Engine;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| AuthError::Malformed)?;

    let token_str = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;

    // Parse: user_id|expires|signature_hex
    let parts: Vec<&str> = token_str.splitn(3, '|').collect();
    if parts.len() != 3 {
        return Err(AuthError::Malformed);
    }

    let user_id = parts[0];
    let expires_str = parts[1];
    let sig_hex = parts[2];

    // Verify HMAC before anything else
    let payload = format!("{}|{}", user_id, expires_str);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    let expected_sig = mac.finalize().into_bytes();
    let provided_sig = hex::decode(sig_hex).map_err(|_| AuthError::Malformed)?;

    if expected_sig.as_slice() != provided_sig.as_slice() {
        return Err(AuthError::BadSignature);
    }

    // Check expiry
    let expires: u64 = expires_str.parse().map_err(|_| AuthError::Malformed)?;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    if now > expires {
        return Err(AuthError::Expired);
    }

    Ok(user_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let secret = derive_token_secret("test-secret");
        let token = issue_token("user-1", 60, &secret);

        let user_id = verify_token(&token, &secret).expect("verification should succeed");
        assert_eq!(user_id, "user-1");
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = derive_token_secret("test-secret");
        // Hand-sign a payload whose expiry is far in the past
        let token = {
            use base64::Engine;
            use hmac::{Hmac, Mac};
            use sha2::Sha256;

            let payload = "user-1|1000000000"; // 2001
            let mut mac = Hmac::<Sha256>::new_from_slice(&secret).unwrap();
            mac.update(payload.as_bytes());
            let sig = mac.finalize().into_bytes();
            base64::engine::general_purpose::URL_SAFE_NO_PAD
                .encode(format!("{}|{}", payload, hex::encode(sig)).as_bytes())
        };

        assert_eq!(verify_token(&token, &secret), Err(AuthError::Expired));
    }

    #[test]
    fn tampered_user_id_is_rejected() {
        let secret = derive_token_secret("test-secret");
        let token = issue_token("user-1", 60, &secret);

        use base64::Engine;
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .unwrap();
        let token_str = String::from_utf8(decoded).unwrap();
        let forged = token_str.replacen("user-1", "user-2", 1);
        let forged_token =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(forged.as_bytes());

        assert_eq!(
            verify_token(&forged_token, &secret),
            Err(AuthError::BadSignature)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let secret = derive_token_secret("test-secret");
        let other = derive_token_secret("other-secret");
        let token = issue_token("user-1", 60, &secret);

        assert_eq!(verify_token(&token, &other), Err(AuthError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let secret = derive_token_secret("test-secret");
        assert_eq!(verify_token("not base64!!!", &secret), Err(AuthError::Malformed));
        assert_eq!(verify_token("", &secret), Err(AuthError::Malformed));

        use base64::Engine;
        let no_parts = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"just-a-string");
        assert_eq!(verify_token(&no_parts, &secret), Err(AuthError::Malformed));
    }

    #[test]
    fn derived_secrets_differ_by_input() {
        assert_ne!(derive_token_secret("a"), derive_token_secret("b"));
        assert_eq!(derive_token_secret("a"), derive_token_secret("a"));
    }
}
