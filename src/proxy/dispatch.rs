//! Upstream dispatch: build the provider request, execute it, mirror the
//! response to the client and account for usage.
//!
//! Streamed responses are piped through chunk-by-chunk; a tap on the byte
//! stream feeds the SSE usage scanner so the receipt can be completed when
//! the stream ends without ever holding the whole body. Buffered responses
//! are parsed for the usage object directly.

use crate::db::models::providers::ProviderDBResponse;
use crate::providers::Credentials;
use crate::proxy::error::ProxyError;
use crate::proxy::sse::{extract_buffered_usage, SseUsageScanner, TokenUsage};
use crate::usage::UsageReceipt;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::instrument;

/// Used when the client doesn't provide a User-Agent.
pub const DEFAULT_USER_AGENT: &str = "SmoothLLM-Proxy/1.0";

/// LLM responses can take a while; the upstream call gets a long leash.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Response headers that must not be mirrored: the body is re-framed on the
/// way through.
const HOP_BY_HOP: [header::HeaderName; 3] = [
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::CONTENT_LENGTH,
];

/// Execute one upstream request and mirror the response.
///
/// `body` is the final wire body (already transformed / rewritten);
/// `wants_stream` is the client's `stream` flag and decides between the
/// write-through pipe and the buffered path. The receipt is completed on
/// every exit, including the implicit cancellation path when the caller's
/// future is dropped.
#[instrument(skip_all, fields(provider = %provider.name, kind = %provider.provider_type), err)]
pub async fn dispatch(
    client: &reqwest::Client,
    provider: &ProviderDBResponse,
    body: Vec<u8>,
    client_headers: &HeaderMap,
    wants_stream: bool,
    receipt: UsageReceipt,
) -> Result<Response, ProxyError> {
    let Some(base_url) = provider.effective_base_url() else {
        receipt.complete(0, TokenUsage::default(), "no base URL configured".to_string());
        return Err(ProxyError::Internal("no base URL configured for provider".to_string()));
    };

    let url = format!("{base_url}{}", provider.provider_type.chat_path());

    let user_agent = client_headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_USER_AGENT);

    let mut request = client
        .post(&url)
        .timeout(UPSTREAM_TIMEOUT)
        .header(header::USER_AGENT, user_agent)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(accept) = client_headers.get(header::ACCEPT) {
        request = request.header(header::ACCEPT, accept);
    }

    request = provider.provider_type.apply_auth(
        request,
        &Credentials {
            api_key: &provider.api_key,
            access_token: &provider.access_token,
        },
    );

    let response = match request.body(body).send().await {
        Ok(response) => response,
        Err(e) => {
            receipt.complete(0, TokenUsage::default(), format!("proxy request failed: {e}"));
            return Err(ProxyError::ProviderUnavailable(e.to_string()));
        }
    };

    let status = response.status();
    let upstream_headers = response.headers().clone();

    if let Some(classified) = ProxyError::from_upstream_status(status, String::new()) {
        // Error outcome: buffer the (small) upstream error body for the
        // envelope message, account the attempt against the upstream status.
        let message = match response.bytes().await {
            Ok(bytes) => upstream_error_message(&bytes),
            Err(_) => String::new(),
        };
        receipt.complete(
            status.as_u16() as i32,
            TokenUsage::default(),
            classified.error_code().to_string(),
        );
        return Err(with_message(classified, message));
    }

    if wants_stream {
        let tap = UsageTap {
            inner: Box::pin(response.bytes_stream()),
            scanner: Some(SseUsageScanner::new()),
            receipt: Some(receipt),
            status: status.as_u16() as i32,
        };
        Ok(mirror_response(status, &upstream_headers, Body::from_stream(tap)))
    } else {
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                receipt.complete(
                    status.as_u16() as i32,
                    TokenUsage::default(),
                    "failed to read response".to_string(),
                );
                return Err(ProxyError::ProviderUnavailable(e.to_string()));
            }
        };

        let usage = extract_buffered_usage(&bytes);
        receipt.complete(status.as_u16() as i32, usage, String::new());
        Ok(mirror_response(status, &upstream_headers, Body::from(bytes)))
    }
}

/// Mirror the upstream status and headers onto a client response.
fn mirror_response(status: StatusCode, upstream_headers: &HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    for (name, value) in upstream_headers {
        if HOP_BY_HOP.contains(name) {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

/// Best-effort human message from an upstream error body.
fn upstream_error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = value
            .pointer("/error/message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }
    String::from_utf8_lossy(&body[..body.len().min(200)]).to_string()
}

fn with_message(err: ProxyError, message: String) -> ProxyError {
    if message.is_empty() {
        return err;
    }
    match err {
        ProxyError::ProviderUnavailable(_) => ProxyError::ProviderUnavailable(message),
        ProxyError::PassThrough { status, .. } => ProxyError::PassThrough { status, message },
        other => other,
    }
}

/// Byte-stream pass-through that feeds the usage scanner and settles the
/// receipt when the upstream stream finishes. Dropping the tap mid-stream
/// leaves the receipt to its cancellation path.
struct UsageTap {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    scanner: Option<SseUsageScanner>,
    receipt: Option<UsageReceipt>,
    status: i32,
}

impl Stream for UsageTap {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(scanner) = this.scanner.as_mut() {
                    scanner.feed(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let (Some(scanner), Some(receipt)) = (this.scanner.take(), this.receipt.take()) {
                    receipt.complete(this.status, scanner.finish(), format!("stream error: {e}"));
                }
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if let (Some(scanner), Some(receipt)) = (this.scanner.take(), this.receipt.take()) {
                    receipt.complete(this.status, scanner.finish(), String::new());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
