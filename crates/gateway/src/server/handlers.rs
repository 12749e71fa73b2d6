//! Axum request handlers for all service endpoints.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{HealthResponse, ACKNOWLEDGMENT};
use common::RawRequest;
use tracing::{debug, error, info, warn};

use super::state::AppState;
use crate::message::{respond, InboundMessage};
use crate::verifier::{Payload, Verification, Verified};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// `GET {callback_path}` — URL verification challenge.
pub async fn callback_get(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    dispatch(&state, RawRequest::get(query))
}

/// `POST {callback_path}` — message delivery.
pub async fn callback_post(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    dispatch(&state, RawRequest::post(query, body))
}

/// Verify a callback and build its response.
///
/// Every outcome is answered with `200 OK`; the platform retries anything else.
fn dispatch(state: &AppState, req: RawRequest) -> Response {
    let Verified { variant, payload } = match state.verifier.verify(&req) {
        Verification::Verified(v) => v,
        Verification::Rejected(reason) => {
            warn!(code = reason.code(), detail = reason.detail(), "callback rejected");
            return acknowledge();
        }
    };

    match payload {
        Payload::Challenge(echo) => {
            info!(?variant, "challenge answered");
            (StatusCode::OK, echo).into_response()
        }
        Payload::Message(message) => {
            debug!(?variant, encrypted = message.encrypted, "message received");
            reply_to(state, &message)
        }
    }
}

fn reply_to(state: &AppState, message: &InboundMessage) -> Response {
    let Some(reply) = state.handler.handle(message) else {
        return acknowledge();
    };

    match respond(&state.credentials, state.renderer.as_ref(), message, &reply) {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, msg_type = reply.msg_type(), "reply failed");
            acknowledge()
        }
    }
}

fn acknowledge() -> Response {
    (StatusCode::OK, ACKNOWLEDGMENT).into_response()
}

/// `GET /health` — liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}
