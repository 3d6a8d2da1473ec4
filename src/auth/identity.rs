//! The signed-in user as reported by the provider

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::Result;
use crate::error::{AuthErrorKind, Error};

/// Profile returned by the provider's "who am I" endpoint
///
/// The well-known fields are lifted out for callers; `raw` keeps the full
/// response untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub screen_name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

impl UserIdentity {
    /// From `GET /1.1/account/verify_credentials.json`
    pub fn from_v1(raw: Value) -> Result<Self> {
        let id = str_field(&raw, "id_str")
            .or_else(|| raw.get("id").and_then(|v| v.as_u64()).map(|n| n.to_string()))
            .ok_or_else(|| missing("verify_credentials", "id_str"))?;
        let screen_name = str_field(&raw, "screen_name")
            .ok_or_else(|| missing("verify_credentials", "screen_name"))?;
        let display_name = str_field(&raw, "name").unwrap_or_else(|| screen_name.clone());
        let avatar_url = str_field(&raw, "profile_image_url_https")
            .or_else(|| str_field(&raw, "profile_image_url"));

        Ok(Self { id, screen_name, display_name, avatar_url, raw })
    }

    /// From `GET /2/users/me`, which wraps the user in `data`
    pub fn from_v2(raw: Value) -> Result<Self> {
        let data = raw.get("data").ok_or_else(|| missing("users/me", "data"))?;
        let id = str_field(data, "id").ok_or_else(|| missing("users/me", "data.id"))?;
        let screen_name = str_field(data, "username")
            .ok_or_else(|| missing("users/me", "data.username"))?;
        let display_name = str_field(data, "name").unwrap_or_else(|| screen_name.clone());
        let avatar_url = str_field(data, "profile_image_url");

        Ok(Self { id, screen_name, display_name, avatar_url, raw })
    }
}

fn str_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(|v| v.as_str()).map(str::to_string)
}

fn missing(endpoint: &str, field: &str) -> Error {
    Error::auth(
        AuthErrorKind::MalformedResponse,
        format!("{} response has no {}", endpoint, field),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_v1() {
        let raw = json!({
            "id": 6253282,
            "id_str": "6253282",
            "screen_name": "TwitterAPI",
            "name": "Twitter API",
            "profile_image_url_https": "https://pbs.twimg.com/profile_images/1/a.png"
        });
        let identity = UserIdentity::from_v1(raw.clone()).unwrap();
        assert_eq!(identity.id, "6253282");
        assert_eq!(identity.screen_name, "TwitterAPI");
        assert_eq!(identity.display_name, "Twitter API");
        assert_eq!(identity.avatar_url.as_deref(), Some("https://pbs.twimg.com/profile_images/1/a.png"));
        assert_eq!(identity.raw, raw);
    }

    #[test]
    fn test_from_v1_numeric_id_only() {
        let identity = UserIdentity::from_v1(json!({"id": 42, "screen_name": "n"})).unwrap();
        assert_eq!(identity.id, "42");
        assert_eq!(identity.display_name, "n");
        assert!(identity.avatar_url.is_none());
    }

    #[test]
    fn test_from_v2() {
        let raw = json!({"data": {"id": "2244994945", "name": "X Dev", "username": "XDevelopers"}});
        let identity = UserIdentity::from_v2(raw).unwrap();
        assert_eq!(identity.id, "2244994945");
        assert_eq!(identity.screen_name, "XDevelopers");
        assert_eq!(identity.display_name, "X Dev");
    }

    #[test]
    fn test_from_v2_missing_data() {
        let err = UserIdentity::from_v2(json!({"errors": []})).unwrap_err();
        assert_eq!(err.kind(), Some(AuthErrorKind::MalformedResponse));
    }
}
