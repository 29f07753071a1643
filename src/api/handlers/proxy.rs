//! Reverse proxy to the dashboard frontend for requests the gate lets through.

use axum::{
    body::{Body, to_bytes},
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use reqwest::{Client, redirect::Policy};
use std::{sync::Arc, time::Duration};
use tracing::{error, instrument};
use url::Url;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const UPSTREAM_TIMEOUT_SECONDS: u64 = 30;

// Connection-scoped headers that must not be forwarded by a proxy.
static HOP_BY_HOP: [header::HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug)]
pub struct Upstream {
    base: Url,
    client: Client,
}

impl Upstream {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: Url) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .redirect(Policy::none())
            .timeout(Duration::from_secs(UPSTREAM_TIMEOUT_SECONDS))
            .build()?;
        Ok(Self { base, client })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn target(&self, uri: &Uri) -> Url {
        let mut url = self.base.clone();
        let base_path = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{base_path}{}", uri.path()));
        url.set_query(uri.query());
        url
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn forward(
    Extension(upstream): Extension<Arc<Upstream>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let target = upstream.target(&parts.uri);

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Failed to read request body: {err}");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let result = upstream
        .client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await;

    match result {
        Ok(response) => {
            let status = response.status();
            let mut headers = response.headers().clone();
            strip_hop_by_hop(&mut headers);
            (status, headers, Body::from_stream(response.bytes_stream())).into_response()
        }
        Err(err) => {
            error!("Upstream request failed: {err}");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}
