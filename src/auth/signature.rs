//! OAuth 1.0a HMAC-SHA1 request signing (RFC 5849 §3.4)
//!
//! ```text
//! base string = UPPER(method) "&" enc(base URI) "&" enc(normalized params)
//! signing key = enc(consumer_secret) "&" enc(token_secret)
//! signature   = base64(HMAC-SHA1(signing key, base string))
//! ```

use std::collections::BTreeMap;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use ring::hmac;
use url::Url;
use uuid::Uuid;
use crate::Result;
use crate::error::Error;
use super::percent;

/// Parameter name → value, fixed OAuth parameters plus request parameters
pub type SignatureParams = BTreeMap<String, String>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";

/// Fresh single-use nonce (32 hex chars)
pub fn generate_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current time in whole seconds since the epoch
pub fn generate_timestamp() -> String {
    Utc::now().timestamp().to_string()
}

/// Split a request URL into its base string URI and its query parameters
///
/// The scheme and host are lowercased and default ports dropped (the `url`
/// crate normalizes both); query and fragment are removed.
pub fn normalize_url(url: &str) -> Result<(String, Vec<(String, String)>)> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::Other(format!("Cannot sign invalid URL {}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Other(format!("Cannot sign URL without host: {}", url)))?;

    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let base = format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path());

    let query = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    Ok((base, query))
}

/// Encode, sort and `&`-join all parameters
fn normalize_params<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut encoded: Vec<(String, String)> = params
        .into_iter()
        .filter(|(k, _)| *k != "oauth_signature")
        .map(|(k, v)| (percent::encode(k), percent::encode(v)))
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the signature base string
///
/// Query parameters already present on `url` are merged into `params`.
pub fn base_string(method: &str, url: &str, params: &SignatureParams) -> Result<String> {
    let (base_url, query) = normalize_url(url)?;

    let all = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .chain(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    Ok(format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent::encode(&base_url),
        percent::encode(&normalize_params(all)),
    ))
}

/// Build the HMAC signing key
pub fn signing_key(consumer_secret: &str, token_secret: Option<&str>) -> String {
    format!(
        "{}&{}",
        percent::encode(consumer_secret),
        percent::encode(token_secret.unwrap_or(""))
    )
}

/// Sign a request, returning the base64 HMAC-SHA1 digest
pub fn sign(
    method: &str,
    url: &str,
    params: &SignatureParams,
    consumer_secret: &str,
    token_secret: Option<&str>,
) -> Result<String> {
    let base = base_string(method, url, params)?;
    let key = signing_key(consumer_secret, token_secret);
    Ok(hmac_sha1_base64(key.as_bytes(), base.as_bytes()))
}

fn hmac_sha1_base64(key: &[u8], message: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, key);
    let tag = hmac::sign(&key, message);
    STANDARD.encode(tag.as_ref())
}

/// Signs requests on behalf of one registered consumer
#[derive(Clone)]
pub struct SignatureSigner {
    consumer_key: String,
    consumer_secret: String,
}

impl std::fmt::Debug for SignatureSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureSigner")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

impl SignatureSigner {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        }
    }

    /// Fixed OAuth parameters merged with the request's own parameters
    pub fn oauth_params(&self, nonce: &str, timestamp: &str, extra: &[(&str, &str)]) -> SignatureParams {
        let mut params = SignatureParams::new();
        params.insert("oauth_consumer_key".to_string(), self.consumer_key.clone());
        params.insert("oauth_nonce".to_string(), nonce.to_string());
        params.insert("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string());
        params.insert("oauth_timestamp".to_string(), timestamp.to_string());
        params.insert("oauth_version".to_string(), OAUTH_VERSION.to_string());
        for (k, v) in extra {
            params.insert((*k).to_string(), (*v).to_string());
        }
        params
    }

    /// Sign with this consumer's secret
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        params: &SignatureParams,
        token_secret: Option<&str>,
    ) -> Result<String> {
        sign(method, url, params, &self.consumer_secret, token_secret)
    }

    /// `Authorization` header value with a fresh nonce and timestamp
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        extra: &[(&str, &str)],
        token_secret: Option<&str>,
    ) -> Result<String> {
        self.authorization_header_with(
            method,
            url,
            extra,
            token_secret,
            &generate_nonce(),
            &generate_timestamp(),
        )
    }

    /// `Authorization` header value for a given nonce and timestamp
    ///
    /// Non-`oauth_` entries in `extra` (form body parameters) are signed but
    /// kept out of the header.
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        extra: &[(&str, &str)],
        token_secret: Option<&str>,
        nonce: &str,
        timestamp: &str,
    ) -> Result<String> {
        let mut params = self.oauth_params(nonce, timestamp, extra);
        let signature = self.sign(method, url, &params, token_secret)?;
        params.insert("oauth_signature".to_string(), signature);

        let fields: Vec<String> = params
            .iter()
            .filter(|(k, _)| k.starts_with("oauth_"))
            .map(|(k, v)| format!("{}=\"{}\"", percent::encode(k), percent::encode(v)))
            .collect();

        Ok(format!("OAuth {}", fields.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST_TOKEN_URL: &str = "https://api.example.com/oauth/request_token";
    const CALLBACK: &str = "https://app.example.com/callback";

    fn fixture_params() -> SignatureParams {
        SignatureSigner::new("ck-demo", "s3cr3t")
            .oauth_params("abc123", "1700000000", &[("oauth_callback", CALLBACK)])
    }

    #[test]
    fn test_request_token_base_string_golden() {
        let base = base_string("POST", REQUEST_TOKEN_URL, &fixture_params()).unwrap();
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.example.com%2Foauth%2Frequest_token&\
             oauth_callback%3Dhttps%253A%252F%252Fapp.example.com%252Fcallback\
             %26oauth_consumer_key%3Dck-demo%26oauth_nonce%3Dabc123\
             %26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1700000000\
             %26oauth_version%3D1.0"
        );
    }

    #[test]
    fn test_request_token_signature_golden() {
        let sig = sign("POST", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3t", None).unwrap();
        assert_eq!(sig, "DyY2++qRYNjH0pF5uhtwU4g0Cjw=");
    }

    #[test]
    fn test_published_twitter_example() {
        // developer.twitter.com "Creating a signature" walkthrough
        let signer = SignatureSigner::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
        );
        let params = signer.oauth_params(
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            "1318622958",
            &[
                ("include_entities", "true"),
                ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
                ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ],
        );
        let sig = signer
            .sign(
                "post",
                "https://api.twitter.com/1.1/statuses/update.json",
                &params,
                Some("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
            )
            .unwrap();
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn test_query_parameters_are_signed() {
        let signer = SignatureSigner::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
        );
        let params = signer.oauth_params(
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            "1318622958",
            &[
                ("oauth_token", "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb"),
                ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
            ],
        );
        let sig = signer
            .sign(
                "POST",
                "https://api.twitter.com/1.1/statuses/update.json?include_entities=true",
                &params,
                Some("LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE"),
            )
            .unwrap();
        assert_eq!(sig, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = sign("POST", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3t", None).unwrap();
        let b = sign("POST", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3t", None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_change_alters_signature() {
        let baseline = sign("POST", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3t", None).unwrap();

        for key in fixture_params().keys() {
            let mut params = fixture_params();
            if let Some(v) = params.get_mut(key) {
                v.push('x');
            }
            let changed = sign("POST", REQUEST_TOKEN_URL, &params, "s3cr3t", None).unwrap();
            assert_ne!(baseline, changed, "changing {} did not change the signature", key);
        }

        let other_method = sign("GET", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3t", None).unwrap();
        let other_secret = sign("POST", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3T", None).unwrap();
        let with_token = sign("POST", REQUEST_TOKEN_URL, &fixture_params(), "s3cr3t", Some("t")).unwrap();
        assert_ne!(baseline, other_method);
        assert_ne!(baseline, other_secret);
        assert_ne!(baseline, with_token);
    }

    #[test]
    fn test_signing_key() {
        assert_eq!(signing_key("s3cr3t", None), "s3cr3t&");
        assert_eq!(signing_key("a&b", Some("c d")), "a%26b&c%20d");
    }

    #[test]
    fn test_normalize_url() {
        let (base, query) = normalize_url("HTTPS://API.Example.com:443/1.1/x.json?b=2&a=1#frag").unwrap();
        assert_eq!(base, "https://api.example.com/1.1/x.json");
        assert_eq!(query, vec![("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())]);

        let (base, _) = normalize_url("http://example.com:8080/r").unwrap();
        assert_eq!(base, "http://example.com:8080/r");
    }

    #[test]
    fn test_authorization_header_shape() {
        let signer = SignatureSigner::new("ck-demo", "s3cr3t");
        let header = signer
            .authorization_header_with(
                "POST",
                REQUEST_TOKEN_URL,
                &[("oauth_callback", CALLBACK), ("status", "not in header")],
                None,
                "abc123",
                "1700000000",
            )
            .unwrap();

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_callback=\"https%3A%2F%2Fapp.example.com%2Fcallback\""));
        assert!(header.contains("oauth_nonce=\"abc123\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_signature=\""));
        assert!(!header.contains("status"));
    }

    #[test]
    fn test_header_signature_matches_golden() {
        let signer = SignatureSigner::new("ck-demo", "s3cr3t");
        let header = signer
            .authorization_header_with(
                "POST",
                REQUEST_TOKEN_URL,
                &[("oauth_callback", CALLBACK)],
                None,
                "abc123",
                "1700000000",
            )
            .unwrap();
        assert!(header.contains(&format!("oauth_signature=\"{}\"", percent::encode("DyY2++qRYNjH0pF5uhtwU4g0Cjw="))));
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let signer = SignatureSigner::new("ck", "very-secret");
        let dbg = format!("{:?}", signer);
        assert!(!dbg.contains("very-secret"));
    }
}
