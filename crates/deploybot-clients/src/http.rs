use std::time::Duration;

use reqwest::{Client, Response};

use crate::{ClientError, Result};

pub(crate) const USER_AGENT: &str = concat!("deploybot/", env!("CARGO_PKG_VERSION"));

/// Every outbound call carries a request-level timeout so a hung service
/// cannot stall a run forever.
pub fn build_http_client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
}

/// Pass 2xx responses through; turn anything else into [`ClientError::Status`]
/// carrying the response body.
pub(crate) async fn ensure_success(service: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service,
        status: status.as_u16(),
        body: truncate(&body, 300),
    })
}

pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    resp: Response,
) -> Result<T> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
        service,
        reason: e.to_string(),
    })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}
