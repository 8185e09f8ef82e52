//! HTTP front end.
//!
//! Every path is served by the same three handlers; the method picks the
//! operation and the URL path names the object.

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::TryStreamExt;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use drivegate_common::{DrivePath, Error, Result};
use drivegate_drive::ByteStream;

use crate::operations::{DriveGateway, ListingMode};
use crate::response;

/// Request header selecting the full listing format.
pub const FULL_LISTING_HEADER: &str = "full";

#[derive(Clone)]
struct AppState {
    gateway: Arc<DriveGateway>,
    public_url: Option<Arc<Url>>,
}

/// Build the router serving `gateway`.
///
/// Listing URLs are built on `public_url` when given, otherwise on the
/// request's `Host` header.
pub fn build_router(gateway: Arc<DriveGateway>, public_url: Option<Url>) -> Router {
    let state = AppState {
        gateway,
        public_url: public_url.map(Arc::new),
    };

    Router::new()
        .route("/", get(fetch).put(upload).delete(remove))
        .route("/{*path}", get(fetch).put(upload).delete(remove))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Absolute URL the client addressed.
fn request_url(public_url: Option<&Url>, headers: &HeaderMap, uri: &Uri) -> Result<Url> {
    match public_url {
        Some(base) => {
            let mut url = base.clone();
            let prefix = base.path().trim_end_matches('/').to_string();
            url.set_path(&format!("{}{}", prefix, uri.path()));
            Ok(url)
        }
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| Error::BadRequest("Missing Host header".to_string()))?;

            Url::parse(&format!("http://{}{}", host, uri.path()))
                .map_err(|e| Error::BadRequest(format!("Invalid request URL: {}", e)))
        }
    }
}

fn listing_mode(headers: &HeaderMap) -> ListingMode {
    match headers.get(FULL_LISTING_HEADER).map(|v| v.as_bytes()) {
        Some(b"true") => ListingMode::Full,
        _ => ListingMode::Summary,
    }
}

fn body_stream(body: Body) -> ByteStream {
    Box::pin(
        body.into_data_stream()
            .map_err(|e| Error::Network(format!("Failed to read request body: {}", e))),
    )
}

async fn fetch(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let url = match request_url(state.public_url.as_deref(), &headers, &uri) {
        Ok(url) => url,
        Err(e) => return response::error_response(&e),
    };

    let path = DrivePath::parse(uri.path());
    state
        .gateway
        .fetch(&path, &url, listing_mode(&headers))
        .await
}

async fn upload(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let path = DrivePath::parse(uri.path());
    state
        .gateway
        .upload(&path, content_type, Some(body_stream(body)))
        .await
}

async fn remove(State(state): State<AppState>, uri: Uri, body: Body) -> Response {
    let path = DrivePath::parse(uri.path());
    state.gateway.delete(&path, Some(body_stream(body))).await
}
