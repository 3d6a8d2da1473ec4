//! Parsing of the provider's redirect back to us

use url::Url;
use crate::Result;
use crate::error::{AuthErrorKind, Error};

/// Query parameters of the callback request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pairs: Vec<(String, String)>,
}

/// Verified OAuth 1.0a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth1Callback {
    pub token: String,
    pub verifier: String,
}

/// Verified OAuth 2.0 callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Callback {
    pub code: String,
}

impl CallbackParams {
    /// From a bare query string (`a=1&b=2`, optionally with a leading `?`)
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        Self {
            pairs: url::form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
        }
    }

    /// From a full callback URL
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::auth(AuthErrorKind::MalformedResponse, format!("Invalid callback URL: {}", e)))?;
        Ok(Self::from_query(parsed.query().unwrap_or("")))
    }

    /// From a raw HTTP request (`GET /callback?code=xxx&state=yyy HTTP/1.1`)
    pub fn from_request(request: &str) -> Result<Self> {
        let first_line = request
            .lines()
            .next()
            .ok_or_else(|| Error::auth(AuthErrorKind::MalformedResponse, "Empty callback request"))?;

        let target = first_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| Error::auth(AuthErrorKind::MalformedResponse, "Invalid callback request line"))?;

        Ok(Self::from_query(target.split_once('?').map(|(_, q)| q).unwrap_or("")))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Whether this looks like a redirect from either flow (success or denial)
    pub fn is_provider_redirect(&self) -> bool {
        ["oauth_verifier", "code", "denied", "error"]
            .iter()
            .any(|k| self.get(k).is_some())
    }

    /// Whether the provider reported success
    pub fn is_success(&self) -> bool {
        self.get("denied").is_none()
            && self.get("error").is_none()
            && (self.get("oauth_verifier").is_some() || self.get("code").is_some())
    }

    /// Validate an OAuth 1.0a redirect against the request token we issued
    pub fn oauth1(&self, expected_token: &str) -> Result<OAuth1Callback> {
        if self.get("denied").is_some() {
            return Err(Error::auth(
                AuthErrorKind::ProviderRejected,
                "User declined the authorization request",
            ));
        }

        let token = self
            .get("oauth_token")
            .ok_or_else(|| Error::auth(AuthErrorKind::MalformedResponse, "Callback is missing oauth_token"))?;
        if token != expected_token {
            return Err(Error::auth(
                AuthErrorKind::StateMismatch,
                "Callback oauth_token does not match the request token",
            ));
        }

        let verifier = self
            .get("oauth_verifier")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::auth(AuthErrorKind::MalformedResponse, "Callback is missing oauth_verifier"))?;

        Ok(OAuth1Callback {
            token: token.to_string(),
            verifier: verifier.to_string(),
        })
    }

    /// Validate an OAuth 2.0 redirect against the state we issued
    pub fn oauth2(&self, expected_state: &str) -> Result<OAuth2Callback> {
        if let Some(err) = self.get("error") {
            let description = self.get("error_description").unwrap_or("Unknown error");
            return Err(Error::auth(
                AuthErrorKind::ProviderRejected,
                format!("Authorization failed: {} - {}", err, description),
            ));
        }

        match self.get("state") {
            Some(s) if s.as_bytes() == expected_state.as_bytes() => {}
            Some(_) => {
                return Err(Error::auth(
                    AuthErrorKind::StateMismatch,
                    "Callback state does not match the value issued for this attempt",
                ))
            }
            None => return Err(Error::auth(AuthErrorKind::StateMismatch, "Missing state parameter")),
        }

        let code = self
            .get("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::auth(AuthErrorKind::MalformedResponse, "Missing authorization code"))?;

        Ok(OAuth2Callback { code: code.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let request = "GET /callback?code=abc123&state=xyz789 HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let params = CallbackParams::from_request(request).unwrap();
        assert_eq!(params.get("code"), Some("abc123"));
        assert_eq!(params.get("state"), Some("xyz789"));
        assert!(params.is_success());
    }

    #[test]
    fn test_parse_request_without_query() {
        let params = CallbackParams::from_request("GET /favicon.ico HTTP/1.1\r\n\r\n").unwrap();
        assert!(params.is_empty());
        assert!(!params.is_provider_redirect());
        assert!(CallbackParams::from_request("").is_err());
    }

    #[test]
    fn test_oauth2_success() {
        let params = CallbackParams::from_query("?code=abc&state=s1");
        assert_eq!(params.oauth2("s1").unwrap().code, "abc");
    }

    #[test]
    fn test_oauth2_state_mismatch() {
        let params = CallbackParams::from_query("code=abc&state=wrong");
        let err = params.oauth2("expected").unwrap_err();
        assert_eq!(err.kind(), Some(AuthErrorKind::StateMismatch));

        let missing = CallbackParams::from_query("code=abc");
        assert_eq!(missing.oauth2("expected").unwrap_err().kind(), Some(AuthErrorKind::StateMismatch));
    }

    #[test]
    fn test_oauth2_state_is_case_sensitive() {
        let params = CallbackParams::from_query("code=abc&state=ABC");
        assert!(params.oauth2("abc").is_err());
    }

    #[test]
    fn test_oauth2_provider_error() {
        let params = CallbackParams::from_query("error=access_denied&error_description=User+denied&state=s");
        let err = params.oauth2("s").unwrap_err();
        assert_eq!(err.kind(), Some(AuthErrorKind::ProviderRejected));
        assert!(err.to_string().contains("access_denied"));
        assert!(!params.is_success());
        assert!(params.is_provider_redirect());
    }

    #[test]
    fn test_oauth1_success() {
        let params = CallbackParams::from_url("https://app.example.com/callback?oauth_token=t1&oauth_verifier=v1").unwrap();
        let callback = params.oauth1("t1").unwrap();
        assert_eq!(callback.verifier, "v1");
    }

    #[test]
    fn test_oauth1_token_mismatch() {
        let params = CallbackParams::from_query("oauth_token=other&oauth_verifier=v1");
        assert_eq!(params.oauth1("t1").unwrap_err().kind(), Some(AuthErrorKind::StateMismatch));
    }

    #[test]
    fn test_oauth1_denied() {
        let params = CallbackParams::from_query("denied=t1");
        assert_eq!(params.oauth1("t1").unwrap_err().kind(), Some(AuthErrorKind::ProviderRejected));
    }

    #[test]
    fn test_oauth1_missing_verifier() {
        let params = CallbackParams::from_query("oauth_token=t1");
        assert_eq!(params.oauth1("t1").unwrap_err().kind(), Some(AuthErrorKind::MalformedResponse));
    }
}
