//! Shaping of gateway responses.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use drivegate_common::{Error, Result};
use drivegate_drive::RemoteResponse;

/// Connection-level headers that must not be forwarded.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Plain `404 Not Found`.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Plain `400 Bad Request`.
pub fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

/// Serialize `value` as tab-indented JSON.
pub fn json(value: &impl Serialize) -> Result<Response> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::InvalidInput(format!("Failed to encode listing: {}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        buf,
    )
        .into_response())
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

/// Forward an upstream response with its status, headers and body.
pub fn passthrough(remote: RemoteResponse) -> Response {
    let mut response = Response::new(Body::from_stream(remote.body));
    *response.status_mut() = remote.status;
    *response.headers_mut() = strip_hop_by_hop(remote.headers);
    response
}

/// Forward a file download, forcing it to display inline and be cacheable.
pub fn inline_file(remote: RemoteResponse) -> Response {
    let mut response = passthrough(remote);
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("public"));
    response
}

/// Map an operation failure to a response.
pub fn error_response(err: &Error) -> Response {
    match err {
        Error::BadRequest(_) => bad_request(),
        Error::NotFound(_) => not_found(),
        Error::Remote { status, message } => {
            let status = StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            tracing::warn!(status = %status, error = %err, "Upstream call failed");
            (status, message.clone()).into_response()
        }
        Error::Authentication(_) | Error::Network(_) => {
            tracing::warn!(error = %err, "Upstream unavailable");
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
        Error::InvalidInput(_) | Error::Config(_) => {
            tracing::error!(error = %err, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
