//! Decode identity claims from SSO access tokens.
//!
//! Tokens are obtained directly from the identity provider over TLS and kept encrypted,
//! so their signature is not verified again when claims are read.
use anyhow::Result;
use base64::Engine;
use serde::Deserialize;

use portal_models::auth::Identity;

/// The SSO token is not a JWT with the expected claims.
#[derive(Debug, thiserror::Error)]
#[error("the SSO token does not carry valid identity claims")]
pub struct InvalidClaims;

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    iss: Option<String>,

    #[serde(default)]
    scope: Vec<String>,

    user_id: String,

    user_name: String,
}

/// Decode the [`Identity`] of a user from an SSO access token.
///
/// Users are admins when the token was granted the `admin_scope`.
pub fn identity(access_token: &str, admin_scope: &str) -> Result<Identity> {
    let payload = access_token.split('.').nth(1).ok_or(InvalidClaims)?;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|error| anyhow::anyhow!(error).context(InvalidClaims))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|error| anyhow::anyhow!(error).context(InvalidClaims))?;

    let admin = claims.scope.iter().any(|scope| scope == admin_scope);
    Ok(Identity {
        admin,
        issuer: claims.iss,
        scopes: claims.scope,
        user_id: claims.user_id,
        user_name: claims.user_name,
    })
}

/// Encode an [`Identity`] into an unsigned JWT, for tests.
#[cfg(any(test, feature = "test-fixture"))]
pub fn unsigned_token(identity: &Identity) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "iss": identity.issuer,
        "scope": identity.scopes,
        "user_id": identity.user_id,
        "user_name": identity.user_name,
    });
    let claims = engine.encode(claims.to_string());
    format!("{}.{}.", header, claims)
}

#[cfg(test)]
mod tests {
    use portal_models::auth::Identity;

    use super::InvalidClaims;

    fn identity(scopes: &[&str]) -> Identity {
        Identity {
            admin: false,
            issuer: Some("https://uaa.example.com/oauth/token".into()),
            scopes: scopes.iter().map(|scope| scope.to_string()).collect(),
            user_id: "user-1".into(),
            user_name: "alice".into(),
        }
    }

    #[test]
    fn decode_user() {
        let token = super::unsigned_token(&identity(&["openid"]));
        let actual = super::identity(&token, "stackato.admin").unwrap();
        assert_eq!(actual, identity(&["openid"]));
    }

    #[test]
    fn decode_admin() {
        let token = super::unsigned_token(&identity(&["openid", "stackato.admin"]));
        let actual = super::identity(&token, "stackato.admin").unwrap();
        assert!(actual.admin);
    }

    #[test]
    fn reject_opaque_tokens() {
        let error = super::identity("not-a-jwt", "stackato.admin").unwrap_err();
        assert!(error.is::<InvalidClaims>());
        let error = super::identity("a.!!!.c", "stackato.admin").unwrap_err();
        assert!(error.is::<InvalidClaims>());
    }
}
