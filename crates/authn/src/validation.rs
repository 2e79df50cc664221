//! JWT algorithm validation.
//!
//! Tokens are checked against an allowlist before any signature work, so an
//! attacker-chosen header (`alg: none`, an HMAC algorithm keyed with the
//! public key) never reaches the verifier.

use jsonwebtoken::{Header, decode_header};

use crate::error::AuthError;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, keyed with a shared secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Algorithms the token service signs and verifies. Only EdDSA (Ed25519).
///
/// Per RFC 8725 Section 3.1, validators must reject algorithms they do not
/// fully implement.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["EdDSA"];

/// Validates a JWT `alg` header value.
///
/// # Errors
///
/// Returns [`AuthError::TokenInvalid`] if the algorithm is forbidden or not
/// in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use warden_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("RS256").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::token_invalid(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::token_invalid(format!(
            "Algorithm '{alg}' is not in accepted list (only EdDSA is supported)"
        )));
    }

    Ok(())
}

/// Decodes the header without verifying anything, then checks its algorithm.
///
/// The raw `alg` string is read from the header segment directly, because
/// `jsonwebtoken` refuses to parse headers naming algorithms it does not know
/// (`none` among them) and those must still be reported as forbidden.
///
/// # Errors
///
/// Returns [`AuthError::TokenInvalid`] for a malformed header or a rejected
/// algorithm.
pub fn checked_header(token: &str) -> Result<Header, AuthError> {
    if let Some(alg) = raw_algorithm(token) {
        validate_algorithm(&alg)?;
    }
    decode_header(token)
        .map_err(|e| AuthError::token_invalid(format!("Failed to decode JWT header: {e}")))
}

fn raw_algorithm(token: &str) -> Option<String> {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    let header = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
    let json: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    json.get("alg")?.as_str().map(str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    use super::*;

    fn token_with_header(header: &str) -> String {
        format!("{}.e30.", URL_SAFE_NO_PAD.encode(header))
    }

    #[test]
    fn test_validate_algorithm_eddsa_accepted() {
        assert!(validate_algorithm("EdDSA").is_ok());
    }

    #[test]
    fn test_validate_algorithm_rs256_rejected() {
        let result = validate_algorithm("RS256");
        assert!(matches!(
            result,
            Err(AuthError::TokenInvalid(ref msg)) if msg.contains("not in accepted list")
        ));
    }

    #[test]
    fn test_forbidden_algorithms_each_rejected_with_security_message() {
        for alg in FORBIDDEN_ALGORITHMS {
            let result = validate_algorithm(alg);
            assert!(
                matches!(
                    result,
                    Err(AuthError::TokenInvalid(ref msg))
                        if msg.contains("not allowed for security reasons")
                ),
                "Expected security rejection for forbidden algorithm '{alg}'"
            );
        }
    }

    #[test]
    fn test_accepted_algorithms_constant() {
        assert_eq!(ACCEPTED_ALGORITHMS, &["EdDSA"]);
    }

    #[test]
    fn checked_header_reports_alg_none_as_forbidden() {
        let result = checked_header(&token_with_header(r#"{"alg":"none","typ":"JWT"}"#));
        assert!(
            matches!(result, Err(AuthError::TokenInvalid(ref msg)) if msg.contains("'none'")),
            "got {result:?}"
        );
    }

    #[test]
    fn checked_header_rejects_hmac() {
        let result = checked_header(&token_with_header(r#"{"alg":"HS256","typ":"JWT"}"#));
        assert!(matches!(result, Err(AuthError::TokenInvalid(_))));
    }

    #[test]
    fn checked_header_accepts_eddsa() {
        let header = checked_header(&token_with_header(r#"{"alg":"EdDSA","typ":"JWT"}"#)).unwrap();
        assert_eq!(header.alg, jsonwebtoken::Algorithm::EdDSA);
    }

    #[test]
    fn checked_header_rejects_garbage() {
        assert!(matches!(checked_header("not-a-token"), Err(AuthError::TokenInvalid(_))));
        assert!(matches!(checked_header(""), Err(AuthError::TokenInvalid(_))));
    }
}
