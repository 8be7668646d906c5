use axum::{
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use std::sync::Arc;

use crate::api::models::HealthResponse;
use crate::dispatch::ActionRequest;
use crate::upload::{Payload, UploadPart};
use crate::AppState;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const JSONP_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let editor_config = state.editor_config.is_valid();
    let storage = state.storage.exists("/").await.unwrap_or(false);

    let status = if editor_config && storage { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        editor_config,
        storage,
    })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Single entry point for every editor action.
///
/// Always answers 200; failures travel inside the body.
pub async fn controller(
    State(state): State<Arc<AppState>>,
    Query(mut params): Query<Vec<(String, String)>>,
    request: Request,
) -> Response {
    let payload = match body_kind(request.method(), request.headers()) {
        BodyKind::Multipart => read_multipart(request, &mut params).await,
        BodyKind::Form => {
            match Form::<Vec<(String, String)>>::from_request(request, &()).await {
                Ok(Form(fields)) => params.extend(fields),
                Err(e) => tracing::warn!(error = %e, "Failed to read form body"),
            }
            Payload::Absent
        }
        BodyKind::Other => Payload::Absent,
    };

    let response = state
        .dispatcher
        .dispatch(&ActionRequest::new(params, payload))
        .await;

    let content_type = if response.wrapped {
        JSONP_CONTENT_TYPE
    } else {
        JSON_CONTENT_TYPE
    };

    ([(header::CONTENT_TYPE, content_type)], response.body).into_response()
}

enum BodyKind {
    Multipart,
    Form,
    Other,
}

fn body_kind(method: &Method, headers: &HeaderMap) -> BodyKind {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/") {
        BodyKind::Multipart
    } else if content_type.starts_with("application/x-www-form-urlencoded")
        && method != Method::GET
        && method != Method::HEAD
    {
        BodyKind::Form
    } else {
        BodyKind::Other
    }
}

/// Splits a multipart body into file parts and plain text parameters.
async fn read_multipart(request: Request, params: &mut Vec<(String, String)>) -> Payload {
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected multipart request");
            return Payload::Malformed;
        }
    };

    let mut parts = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read multipart field");
                return Payload::Malformed;
            }
        };

        let field_name = field.name().unwrap_or_default().to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            match field.text().await {
                Ok(value) => params.push((field_name, value)),
                Err(e) => {
                    tracing::warn!(field = %field_name, error = %e, "Failed to read multipart text");
                    return Payload::Malformed;
                }
            }
            continue;
        };

        let content_type = field.content_type().map(str::to_string);

        match field.bytes().await {
            Ok(data) => parts.push(UploadPart {
                field_name,
                file_name,
                content_type,
                data,
            }),
            Err(e) => {
                tracing::warn!(file = %file_name, error = %e, "Failed to read file data");
                return Payload::Malformed;
            }
        }
    }

    Payload::Multipart(parts)
}
