//! Response assembly.
//!
//! # Responsibilities
//! - Turn a coordinator result into an HTTP response
//! - Set `Content-Length` from the real body
//! - Produce short `text/plain` error responses
//!
//! # Design Decisions
//! - Handler-supplied framing headers were already dropped by the coordinator
//! - HEAD keeps the headers of the full response, including its length

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::cgi::{GatewayError, GatewayResponse};

/// Build the client response. With `head_only` the body is omitted.
pub fn into_http(gateway: GatewayResponse, head_only: bool) -> Response {
    let length = gateway.body.len();
    let body = if head_only {
        Body::empty()
    } else {
        Body::from(gateway.body)
    };

    let mut response = Response::new(body);
    *response.status_mut() = gateway.status;

    let headers = response.headers_mut();
    for (name, value) in gateway.headers {
        headers.append(name, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    response
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        into_http(self, false)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        GatewayResponse::from_error(&self).into_response()
    }
}

/// Plain error response for a status.
pub fn error_response(status: StatusCode) -> Response {
    GatewayResponse::plain(status).into_response()
}
