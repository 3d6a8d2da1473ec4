//! Shared plumbing for provider calls: per-step deadline, transport error
//! classification, and non-2xx body summarisation.

use std::collections::HashMap;
use std::time::Duration;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use crate::Result;
use crate::error::{AuthErrorKind, Error};

const MAX_ERROR_BODY: usize = 200;

/// Status and body of a completed provider call
#[derive(Debug)]
pub(crate) struct ProviderResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Send a request and read its body, bounded by `deadline`
pub(crate) async fn execute(
    request: RequestBuilder,
    deadline: Duration,
    step: &str,
) -> Result<ProviderResponse> {
    let call = async {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>(ProviderResponse { status, body })
    };

    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(response)) => {
            tracing::debug!(step, status = response.status.as_u16(), "provider responded");
            Ok(response)
        }
        Ok(Err(e)) => Err(transport_error(step, e)),
        Err(_) => Err(Error::auth(
            AuthErrorKind::Timeout,
            format!("{} did not complete within {}s", step, deadline.as_secs()),
        )),
    }
}

fn transport_error(step: &str, e: reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        AuthErrorKind::Timeout
    } else {
        AuthErrorKind::NetworkFailure
    };
    Error::auth(kind, format!("{} failed: {}", step, e))
}

/// Map a non-2xx response to an auth error
///
/// `on_unauthorized` picks the kind for 401: token endpoints treat it as a
/// signature problem, resource endpoints as an expired grant.
pub(crate) fn rejection(step: &str, response: &ProviderResponse, on_unauthorized: AuthErrorKind) -> Error {
    let kind = if response.status == StatusCode::UNAUTHORIZED {
        on_unauthorized
    } else {
        AuthErrorKind::ProviderRejected
    };
    Error::auth(
        kind,
        format!(
            "{} returned {}: {}",
            step,
            response.status.as_u16(),
            summarize_error_body(&response.body)
        ),
    )
}

/// Pull a readable message out of a provider error body
pub(crate) fn summarize_error_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        // OAuth 2.0 token endpoint
        if let Some(desc) = json.get("error_description").and_then(|v| v.as_str()) {
            return desc.to_string();
        }
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
        // v1.1 {"errors":[{"code":32,"message":"..."}]}
        if let Some(first) = json.get("errors").and_then(|v| v.get(0)) {
            let code = first.get("code").and_then(|v| v.as_i64());
            let message = first.get("message").and_then(|v| v.as_str()).unwrap_or("unknown error");
            return match code {
                Some(code) => format!("{} (code {})", message, code),
                None => message.to_string(),
            };
        }
        // v2 problem details
        if let Some(detail) = json.get("detail").and_then(|v| v.as_str()) {
            return detail.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

/// Parse an `application/x-www-form-urlencoded` response body
pub(crate) fn parse_form(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

/// Fetch a required field from a parsed form body
pub(crate) fn form_field(form: &HashMap<String, String>, name: &str, step: &str) -> Result<String> {
    form.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| {
            Error::auth(
                AuthErrorKind::MalformedResponse,
                format!("{} response is missing {}", step, name),
            )
        })
}
