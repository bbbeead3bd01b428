/// HTTP boundary
///
/// Thin axum handlers wiring the activity-processing pipeline to routes.
/// Handlers never build protocol objects themselves; they call into the
/// resolver/verifier/pagination components and translate [`ApError`]
/// values into responses.
use crate::{
    activitypub::routing::ACTIVITYPUB_CONTENT_TYPE,
    context::AppContext,
    error::{ApError, ApResult},
};
use axum::{
    http::header,
    response::{IntoResponse, Response},
    Router,
};
use serde::Serialize;

pub mod actor;
pub mod outbox;
pub mod webfinger;

/// Build all API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(webfinger::routes())
        .merge(actor::routes())
        .merge(outbox::routes())
}

/// Actor-scoped routes carry their handle as a single `@handle` path
/// segment; the router itself only sees a generic segment.
pub(crate) fn handle_of(segment: &str) -> ApResult<&str> {
    segment
        .strip_prefix('@')
        .ok_or_else(|| ApError::NotFound(format!("no route for /{}", segment)))
}

/// JSON response carrying the ActivityPub media type
pub struct ApJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => (
                [(header::CONTENT_TYPE, ACTIVITYPUB_CONTENT_TYPE)],
                body,
            )
                .into_response(),
            Err(e) => {
                ApError::Internal(format!("response serialization: {}", e)).into_response()
            }
        }
    }
}
