//! Shared HTTP plumbing for the OpenStack service clients.

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use tracing::debug;

use super::OpenStackError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request bound for JSON calls. Image uploads are not bounded.
pub(super) const API_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_CHARS: usize = 300;

pub(super) static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Builds a bounded API request carrying the session token.
pub(super) fn authed(method: Method, url: &str, token: &str) -> RequestBuilder {
    unbounded(method, url, token).timeout(API_TIMEOUT)
}

/// Builds a request carrying the session token with no overall timeout.
pub(super) fn unbounded(method: Method, url: &str, token: &str) -> RequestBuilder {
    HTTP_CLIENT
        .request(method, url)
        .header("X-Auth-Token", token)
        .header("Accept", "application/json")
}

/// Sends `request` and returns the body of a success response.
pub(super) async fn send(
    action: &'static str,
    request: RequestBuilder,
) -> Result<Vec<u8>, OpenStackError> {
    let response = request
        .send()
        .await
        .map_err(|err| OpenStackError::Transport {
            action,
            message: err.to_string(),
        })?;

    let status = response.status();
    debug!(action, status = status.as_u16(), url = %response.url(), "response received");
    let body = response
        .bytes()
        .await
        .map_err(|err| OpenStackError::Transport {
            action,
            message: err.to_string(),
        })?;

    if status.is_success() {
        return Ok(body.to_vec());
    }
    Err(OpenStackError::Api {
        action,
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Sends `request` and decodes a JSON success body.
pub(super) async fn send_json<T: DeserializeOwned>(
    action: &'static str,
    request: RequestBuilder,
) -> Result<T, OpenStackError> {
    let body = send(action, request).await?;
    decode(action, &body)
}

/// Decodes a JSON body.
pub(super) fn decode<T: DeserializeOwned>(
    action: &'static str,
    body: &[u8],
) -> Result<T, OpenStackError> {
    serde_json::from_slice(body).map_err(|err| OpenStackError::Decode {
        action,
        message: err.to_string(),
    })
}

/// Extracts a readable message from an error body.
///
/// Services wrap errors as `{"<kind>": {"message": "..."}}`; anything else is
/// returned as text, capped in length.
pub(super) fn error_message(body: &[u8]) -> String {
    let wrapped = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value.as_object().and_then(|object| {
                object.values().find_map(|inner| {
                    inner
                        .get("message")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_owned)
                })
            })
        });
    wrapped.unwrap_or_else(|| {
        String::from_utf8_lossy(body)
            .trim()
            .chars()
            .take(MAX_ERROR_CHARS)
            .collect()
    })
}

/// Joins a service base URL and a path without doubling slashes.
pub(super) fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Appends a version segment unless the endpoint already ends with it.
pub(super) fn versioned(base: &str, version: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(version) {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/{version}")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

/// Accepts identifiers encoded either as strings or as integers.
pub(super) fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

/// Optional variant of [`flexible_id`].
pub(super) fn flexible_id_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }),
    )
}
