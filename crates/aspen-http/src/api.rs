//! Management API handlers: bulk command enqueue and push.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use aspen_core::{Command, EnrollId, EnrollType, PushResult};
use aspen_push::PushProvider;
use aspen_storage::CommandStore;

/// Build an enrollment id from a raw API path segment.
///
/// A segment containing the `:` delimiter addresses a user channel;
/// anything else a device channel.
fn enroll_id_from_str(raw: &str) -> EnrollId {
    match raw.split_once(':') {
        Some((device, _user)) => EnrollId {
            enroll_type: EnrollType::User,
            id: raw.to_string(),
            parent_id: Some(device.to_string()),
        },
        None => EnrollId {
            enroll_type: EnrollType::Device,
            id: raw.to_string(),
            parent_id: None,
        },
    }
}

fn enroll_ids_from_path(ids: &str) -> Vec<EnrollId> {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(enroll_id_from_str)
        .collect()
}

/// Enqueue response.
#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub command_uuid: String,
    pub request_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Enqueue a raw command plist for a comma-separated list of
/// enrollment ids.
pub async fn enqueue_handler<S>(
    State(store): State<S>,
    Path(ids): Path<String>,
    body: Bytes,
) -> impl IntoResponse
where
    S: CommandStore,
{
    let command = match Command::parse(&body) {
        Ok(command) => command,
        Err(e) => {
            tracing::info!(error = %e, "rejecting unparseable command");
            return (
                StatusCode::BAD_REQUEST,
                Json(EnqueueResponse {
                    command_uuid: String::new(),
                    request_type: String::new(),
                    error: Some(e.to_string()),
                }),
            );
        }
    };

    let enroll_ids = enroll_ids_from_path(&ids);
    if let Err(e) = store.enqueue_command(&enroll_ids, &command) {
        tracing::error!(error = %format!("{e:#}"), "failed to enqueue command");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(EnqueueResponse {
                command_uuid: command.command_uuid,
                request_type: command.request_type,
                error: Some(e.to_string()),
            }),
        );
    }

    tracing::info!(
        command_uuid = %command.command_uuid,
        request_type = %command.request_type,
        count = enroll_ids.len(),
        "command enqueued"
    );
    (
        StatusCode::OK,
        Json(EnqueueResponse {
            command_uuid: command.command_uuid,
            request_type: command.request_type,
            error: None,
        }),
    )
}

/// Push response.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    pub results: Vec<PushResult>,
}

/// Send an MDM wake-up push to a comma-separated list of enrollment
/// ids.
pub async fn push_handler<P>(State(provider): State<P>, Path(ids): Path<String>) -> impl IntoResponse
where
    P: PushProvider,
{
    let enroll_ids = enroll_ids_from_path(&ids);
    match provider.push(&enroll_ids).await {
        Ok(results) => (StatusCode::OK, Json(PushResponse { results })),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "push failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PushResponse { results: vec![] }),
            )
        }
    }
}
