/// Outbox endpoints: the union read collection and the write pipeline.
///
/// A POST runs the full activity-processing pipeline: wire validation,
/// auto-wrapping of bare objects, reference resolution, verification,
/// then the persistence mutation. No side effect happens unless every
/// stage succeeds.
use crate::{
    activitypub::{
        factory::{self, CollectionKind},
        pagination::{self, UnionQuery, UnionRecord},
        render,
        render::LocalResource,
        resolver::{self, reference_id, ResolvedActivity},
        routing,
        verify::{self, Verdict},
        vocab::{self, ActivityKind},
    },
    api::{handle_of, ApJson},
    auth::CurrentActor,
    context::AppContext,
    error::{ApError, ApResult},
    store::models::{ActorIdentity, EdgeKind, NewBlip, NewEdge, User},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use url::Url;

/// Build outbox routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/:handle/outbox", get(outbox).post(post_outbox))
}

/// GET /@{handle}/outbox — the user's Create activities and announces,
/// in one globally time-ordered collection
async fn outbox(
    State(ctx): State<AppContext>,
    Path(segment): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApResult<ApJson<Value>> {
    let handle = handle_of(&segment)?;
    let user = ctx
        .store
        .user_by_username(handle)
        .await?
        .ok_or_else(|| ApError::NotFound(format!("no user @{}", handle)))?;

    let base = ctx.base_url();
    let sources = [
        UnionQuery::AuthorBlips { author_id: user.id },
        UnionQuery::ActorEdges {
            kind: EdgeKind::Reblip,
            actor_id: user.id,
        },
    ];

    let value = pagination::paginate_union(
        &ctx.store,
        CollectionKind::Ordered,
        base,
        &format!("/@{}/outbox", handle),
        &query,
        &sources,
        |record| match record {
            UnionRecord::Blip(blip) => Ok(render::create_activity(blip, base)),
            UnionRecord::Edge(edge) => render::edge_activity(edge, base),
        },
    )
    .await?;

    Ok(ApJson(value))
}

/// POST /@{handle}/outbox — submit an activity (or a bare object, which
/// is wrapped in a Create)
async fn post_outbox(
    State(ctx): State<AppContext>,
    CurrentActor(actor): CurrentActor,
    Path(segment): Path<String>,
    Json(body): Json<Value>,
) -> ApResult<Response> {
    let handle = handle_of(&segment)?;
    if actor.username != handle {
        return Err(ApError::Forbidden(
            "you can only post to your own outbox".to_string(),
        ));
    }

    let body = body
        .as_object()
        .cloned()
        .ok_or_else(|| ApError::Input("request body must be a JSON object".to_string()))?;

    if !vocab::has_activitystreams_context(&body) {
        return Err(ApError::Input(
            "@context must include the ActivityStreams namespace".to_string(),
        ));
    }

    let base = ctx.base_url();
    let activity = classify_submission(&actor, base, body)?;

    let kind = ActivityKind::from_type(
        activity
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    )?;

    match kind {
        ActivityKind::Undo => {
            let inner = activity
                .get("object")
                .and_then(Value::as_object)
                .cloned()
                .ok_or_else(|| {
                    ApError::Input("Undo requires an embedded activity object".to_string())
                })?;

            let resolved = resolver::resolve_references(&ctx.store, base, inner, None).await?;

            match verify::verify(&ctx.store, base, &actor, &resolved, true).await? {
                Verdict::Undoable(edge) => {
                    ctx.store.delete_edge(edge.id).await?;
                    Ok((StatusCode::OK, ApJson(json!({}))).into_response())
                }
                Verdict::Accepted => Err(ApError::Protocol(
                    "undo verification yielded no edge".to_string(),
                )),
            }
        }
        _ => {
            let resolved = resolver::resolve_references(&ctx.store, base, activity, None).await?;

            match verify::verify(&ctx.store, base, &actor, &resolved, false).await? {
                Verdict::Accepted => {}
                Verdict::Undoable(_) => {
                    return Err(ApError::Protocol("unexpected undo verdict".to_string()))
                }
            }

            persist(&ctx, &actor, kind, resolved).await
        }
    }
}

/// Sort the submitted body into an activity: bare objects and links are
/// wrapped in a Create on the actor's behalf, activities must already
/// name the actor as theirs.
fn classify_submission(
    actor: &User,
    base: &Url,
    body: Map<String, Value>,
) -> ApResult<Map<String, Value>> {
    let type_str = body
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ApError::Input("missing type".to_string()))?;

    if vocab::is_object_type(type_str) || vocab::is_link_type(type_str) {
        return Ok(factory::wrap_as_create(
            &body,
            render::person_object(actor, base),
        ));
    }

    if vocab::is_activity_type(type_str) {
        let self_id = render::actor_url(base, &actor.username);
        if body.get("actor").and_then(reference_id) != Some(self_id.as_str()) {
            return Err(ApError::Input("activity actor must be yourself".to_string()));
        }
        return Ok(body);
    }

    Err(ApError::Input(format!("unsupported type {:?}", type_str)))
}

/// Apply the state change a verified activity describes
async fn persist(
    ctx: &AppContext,
    actor: &User,
    kind: ActivityKind,
    resolved: ResolvedActivity,
) -> ApResult<Response> {
    let base = ctx.base_url();

    match kind {
        ActivityKind::Create => {
            let object = resolved
                .get("object")
                .and_then(Value::as_object)
                .ok_or_else(|| ApError::Internal("verified Create lost its object".to_string()))?;
            let content = object
                .get("content")
                .and_then(Value::as_str)
                .ok_or_else(|| ApError::Internal("verified Note lost its content".to_string()))?
                .to_string();

            let reply_to_id = match object.get("inReplyTo").and_then(Value::as_str) {
                Some(raw) => Some(resolve_reply_target(ctx, raw).await?),
                None => None,
            };

            let blip = ctx
                .store
                .insert_blip(NewBlip {
                    author_id: actor.id,
                    reply_to_id,
                    content,
                })
                .await?;

            Ok((
                StatusCode::CREATED,
                ApJson(render::create_activity(&blip, base)),
            )
                .into_response())
        }
        ActivityKind::Follow | ActivityKind::Like | ActivityKind::Announce => {
            let edge_kind = match kind {
                ActivityKind::Follow => EdgeKind::Follow,
                ActivityKind::Like => EdgeKind::Like,
                _ => EdgeKind::Reblip,
            };

            let reference = resolved.reference("object").ok_or_else(|| {
                ApError::Internal("verified edge activity lost its object reference".to_string())
            })?;

            // Local follows are accepted immediately; nothing here
            // manually approves followers.
            let (approved, approved_at) = if edge_kind == EdgeKind::Follow {
                (Some(true), Some(Utc::now()))
            } else {
                (None, None)
            };

            ctx.store
                .insert_edge(NewEdge {
                    kind: edge_kind,
                    actor: ActorIdentity::Local(actor.id),
                    object: reference.object_identity(),
                    approved,
                    approved_at,
                })
                .await?;

            Ok((
                StatusCode::CREATED,
                ApJson(Value::Object(resolved.into_wire())),
            )
                .into_response())
        }
        ActivityKind::Undo => Err(ApError::Protocol("Undo does not persist".to_string())),
    }
}

/// A reply target must be an existing local note
async fn resolve_reply_target(ctx: &AppContext, raw: &str) -> ApResult<i64> {
    let url = Url::parse(raw)
        .map_err(|_| ApError::Input("object.inReplyTo must be a URL".to_string()))?;

    if !routing::is_internal(ctx.base_url(), &url) {
        return Err(ApError::FederationUnsupported);
    }

    match routing::resolve_path(&ctx.store, url.path()).await? {
        Some(LocalResource::Post(parent)) => Ok(parent.blip.id),
        _ => Err(ApError::UnresolvedReference(url.to_string())),
    }
}
