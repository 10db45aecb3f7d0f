use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use shared::http::{admin_routes, make_error_response, require_api_key, ReadinessProbe};
use tracking::CaseStore;
use worker::coordinator::{Coordinator, Outcome};
use worker::envelope::{CaseHints, Envelope, EventData, FileDescriptor};
use worker::WorkerError;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub store: Arc<dyn CaseStore>,
    pub api_key: String,
}

/// Synchronous case-creation request. Identifiers that the queue producer
/// would normally supply are generated when absent, so a bare request with
/// just the entity references is valid.
#[derive(Deserialize)]
pub struct CreateCaseBody {
    pub correlation_id: Option<String>,
    pub customer_ref: Option<String>,
    pub business_ref: Option<String>,
    pub case: Option<CaseHints>,
    pub file: Option<FileDescriptor>,
}

#[derive(Serialize)]
pub struct CreateCaseResponse {
    pub correlation_id: String,
    pub case_id: Option<String>,
    pub outcome: &'static str,
}

pub fn router(state: ApiState) -> Router {
    let ready: ReadinessProbe = Arc::new(|| true);
    Router::new()
        .route("/create-case-with-online-submission", post(create_case))
        .route("/cases/{correlation_id}", get(get_case))
        .with_state(state)
        .merge(admin_routes(ready))
}

fn envelope_from_body(body: CreateCaseBody) -> (String, Envelope) {
    let correlation_id = body
        .correlation_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let file = match body.file {
        Some(mut file) => {
            if file.file_id.is_none() {
                file.file_id = Some(Uuid::new_v4().to_string());
            }
            file
        }
        None => FileDescriptor {
            file_id: Some(Uuid::new_v4().to_string()),
            file_name: None,
            url: None,
        },
    };

    let envelope = Envelope {
        id: None,
        event_type: None,
        data: Some(EventData {
            correlation_id: Some(correlation_id.clone()),
            customer_ref: body.customer_ref,
            business_ref: body.business_ref,
            case: body.case,
            file: Some(file),
        }),
    };

    (correlation_id, envelope)
}

fn error_response(err: WorkerError) -> Response {
    match err {
        WorkerError::Validation(message) => {
            make_error_response(StatusCode::BAD_REQUEST, message)
        }
        WorkerError::CreationInProgress => make_error_response(
            StatusCode::CONFLICT,
            "case creation already in progress for this correlation id",
        ),
        WorkerError::Gateway(err) => {
            error!(error = %err, "CRM gateway error");
            make_error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
        WorkerError::Store(err) => {
            error!(error = %err, "tracking store error");
            make_error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn create_case(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<CreateCaseBody>,
) -> Response {
    if let Err(denied) = require_api_key(&headers, &state.api_key) {
        return denied;
    }

    let (correlation_id, envelope) = envelope_from_body(body);

    match state.coordinator.process(&envelope).await {
        Ok(Outcome::Created { case_id }) => (
            StatusCode::CREATED,
            Json(CreateCaseResponse {
                correlation_id,
                case_id: Some(case_id),
                outcome: "created",
            }),
        )
            .into_response(),
        Ok(Outcome::MetadataAttached { case_id }) => (
            StatusCode::OK,
            Json(CreateCaseResponse {
                correlation_id,
                case_id: Some(case_id),
                outcome: "metadata_attached",
            }),
        )
            .into_response(),
        Ok(Outcome::Skipped { case_id }) => (
            StatusCode::OK,
            Json(CreateCaseResponse {
                correlation_id,
                case_id,
                outcome: "skipped",
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_case(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(correlation_id): Path<String>,
) -> Response {
    if let Err(denied) = require_api_key(&headers, &state.api_key) {
        return denied;
    }

    match state.store.get(&correlation_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => make_error_response(
            StatusCode::NOT_FOUND,
            format!("no case tracked for correlation id '{correlation_id}'"),
        ),
        Err(err) => {
            error!(error = %err, "tracking store error");
            make_error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}
