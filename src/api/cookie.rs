//! Signed session cookies.
use actix_web::cookie::Cookie;
use actix_web::cookie::CookieJar;
use actix_web::cookie::Key;
use actix_web::cookie::SameSite;
use actix_web::HttpRequest;
use anyhow::Result;

use portal_conf::SessionsConf;

/// Minimum length, in bytes, of the secret used to derive the signing key.
const MIN_SECRET_LEN: usize = 32;

/// The session cookie signing secret is too short.
#[derive(Debug, thiserror::Error)]
#[error("sessions.secret must be at least 32 bytes long")]
pub struct WeakCookieSecret;

/// Issue and verify signed cookies carrying session IDs.
#[derive(Clone)]
pub struct SessionCookies {
    key: Key,
    name: String,
    secure: bool,
}

impl SessionCookies {
    /// Name of the session cookie.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derive the signing key from the sessions configuration.
    pub fn new(conf: &SessionsConf) -> Result<SessionCookies> {
        if conf.secret.len() < MIN_SECRET_LEN {
            anyhow::bail!(WeakCookieSecret);
        }
        Ok(SessionCookies {
            key: Key::derive_from(conf.secret.as_bytes()),
            name: conf.cookie_name.clone(),
            secure: conf.cookie_secure,
        })
    }

    /// Build a removal cookie that expires the session cookie in the browser.
    pub fn expired(&self) -> Cookie<'static> {
        let mut cookie = self.base(String::new());
        cookie.make_removal();
        cookie
    }

    /// Build a signed cookie carrying the given session ID.
    pub fn issue(&self, session_id: &str) -> Result<Cookie<'static>> {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key)
            .add(self.base(session_id.to_string()));
        let cookie = jar
            .get(&self.name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("signed session cookie missing from jar"))?;
        Ok(cookie)
    }

    /// Extract the session ID from the request cookie, if the signature is valid.
    pub fn session_id(&self, request: &HttpRequest) -> Option<String> {
        let cookie = request.cookie(&self.name)?;
        let mut jar = CookieJar::new();
        jar.add_original(cookie);
        let verified = jar.signed(&self.key).get(&self.name)?;
        Some(verified.value().to_string())
    }

    fn base(&self, value: String) -> Cookie<'static> {
        Cookie::build(self.name.clone(), value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .finish()
    }
}

#[cfg(test)]
impl SessionCookies {
    /// Session cookies signed with the fixture configuration.
    pub fn fixture() -> SessionCookies {
        let conf = portal_conf::Conf::fixture();
        match SessionCookies::new(&conf.sessions) {
            Ok(cookies) => cookies,
            Err(error) => panic!("invalid session cookies fixture: {:?}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;

    use super::SessionCookies;

    #[test]
    fn issue_then_verify() {
        let cookies = SessionCookies::fixture();
        let cookie = cookies.issue("session-1").unwrap();
        assert_ne!(cookie.value(), "session-1");
        let request = TestRequest::default().cookie(cookie).to_http_request();
        assert_eq!(cookies.session_id(&request), Some("session-1".to_string()));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let cookies = SessionCookies::fixture();
        let cookie = cookies.issue("session-1").unwrap();
        let forged = cookie.value().replace("session-1", "session-2");
        let forged = actix_web::cookie::Cookie::new(cookies.name().to_string(), forged);
        let request = TestRequest::default().cookie(forged).to_http_request();
        assert_eq!(cookies.session_id(&request), None);
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut conf = portal_conf::Conf::fixture().sessions;
        conf.secret = "too-short".into();
        assert!(SessionCookies::new(&conf).is_err());
    }

    #[test]
    fn expired_cookie_clears_value() {
        let cookies = SessionCookies::fixture();
        let cookie = cookies.expired();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(actix_web::cookie::time::Duration::ZERO));
    }
}
