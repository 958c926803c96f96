//! Aspen MDM HTTP Layer
//!
//! Axum handlers for the MDM check-in and command endpoints plus the
//! management API.

mod api;
mod handlers;
mod middleware;

pub use api::*;
pub use handlers::*;
pub use middleware::*;

use axum::Router;

/// The device-facing MDM router.
pub fn mdm_router<S>(service: S) -> Router
where
    S: aspen_service::CheckinAndCommand + Clone + 'static,
{
    use axum::routing::post;

    Router::new()
        .route("/mdm/checkin", post(handlers::checkin_handler::<S>))
        .route("/mdm/command", post(handlers::command_handler::<S>))
        .route("/mdm", post(handlers::checkin_and_command_handler::<S>))
        .with_state(service)
}

/// The management API router.
pub fn api_router<St, P>(store: St, pusher: P) -> Router
where
    St: aspen_storage::CommandStore + Clone + 'static,
    P: aspen_push::PushProvider + Clone + 'static,
{
    use axum::routing::{post, put};

    Router::new()
        .route("/v1/enqueue/:ids", put(api::enqueue_handler::<St>))
        .with_state(store)
        .merge(
            Router::new()
                .route("/v1/push/:ids", post(api::push_handler::<P>))
                .with_state(pusher),
        )
}
