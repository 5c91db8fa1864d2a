//! Request logging and request-id generation.

use axum::{extract::Request, middleware::Next, response::Response};
use http::HeaderValue;
use std::future::Future;
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use super::error::REQUEST_ID_HEADER;

/// Generates a UUID v4 for every request that arrives without an `x-request-id`.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %uri,
    );

    async move {
        let started = Instant::now();
        info!("Request started");

        let response = next.run(request).await;
        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;

        if status.is_server_error() {
            error!(status = status.as_u16(), latency_ms, "Request failed");
        } else if status.is_client_error() {
            warn!(status = status.as_u16(), latency_ms, "Request rejected");
        } else {
            info!(status = status.as_u16(), latency_ms, "Request completed");
        }

        response
    }
    .instrument(span)
    .await
}

/// Time an outbound call and log its outcome.
pub async fn log_external_call<F, T, E>(service: &str, operation: &str, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let result = call.await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => info!(service, operation, latency_ms, "External call succeeded"),
        Err(e) => warn!(service, operation, latency_ms, error = %e, "External call failed"),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_request_id_is_a_uuid() {
        let request = http::Request::builder().body(()).unwrap();
        let id = UuidRequestId.make_request_id(&request).unwrap();
        let value = id.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok());
    }

    #[tokio::test]
    async fn test_log_external_call_passes_result_through() {
        let ok: Result<u8, String> = log_external_call("mpesa", "oauth", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, String> =
            log_external_call("mpesa", "stkpush", async { Err("boom".to_string()) }).await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
