//! HTTP transport for the translator endpoint.

use crate::endpoint::TranslatorEndpoint;
use crate::schema::wsdl_definition;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

type SharedEndpoint = Arc<TranslatorEndpoint>;

/// Name under which the WSDL is published below the endpoint path.
pub const WSDL_NAME: &str = "translator.wsdl";

/// Build the router: the SOAP endpoint and its WSDL, nothing else.
pub fn create_router(endpoint: SharedEndpoint) -> Router {
    let server = &endpoint.config().server;
    let path = server.endpoint_path.clone();
    let wsdl_path = format!("{}/{}", path.trim_end_matches('/'), WSDL_NAME);
    let body_limit = server.max_body_size;

    Router::new()
        .route(&path, post(soap_handler))
        .route(&wsdl_path, get(wsdl_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(endpoint)
}

async fn soap_handler(
    State(endpoint): State<SharedEndpoint>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if !is_soap_content_type(&endpoint, content_type) {
        debug!(content_type = ?content_type, "Rejecting non-SOAP content type");
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    let response = endpoint.handle(&body).await;
    (
        response.status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}

async fn wsdl_handler(State(endpoint): State<SharedEndpoint>, headers: HeaderMap) -> Response {
    let server = &endpoint.config().server;
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|_| server.transform_wsdl_locations)
        .unwrap_or(server.listen_address.as_str());
    let location = format!("http://{}{}", host, server.endpoint_path);

    (
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        wsdl_definition(&location),
    )
        .into_response()
}

/// Check if Content-Type is valid for SOAP.
fn is_soap_content_type(endpoint: &TranslatorEndpoint, content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let ct_lower = ct.to_lowercase();
            endpoint
                .config()
                .server
                .allowed_content_types
                .iter()
                .any(|allowed| ct_lower.starts_with(&allowed.to_lowercase()))
        }
        None => false,
    }
}

/// Serve the endpoint on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    endpoint: SharedEndpoint,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(
        address = %addr,
        path = %endpoint.config().server.endpoint_path,
        "SOAP endpoint listening"
    );

    axum::serve(listener, create_router(endpoint))
        .with_graceful_shutdown(shutdown)
        .await
}
