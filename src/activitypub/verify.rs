/// Activity Verifier
///
/// Per-type rule engine run after reference resolution and before any
/// mutation. Checks semantic rules (who may act, what may be targeted)
/// and idempotency against persisted relationship edges. Undo re-verifies
/// the full rule set of the inner activity, not just edge existence.
use crate::{
    activitypub::{
        render,
        resolver::{reference_id, ResolvedActivity},
        vocab::ActivityKind,
    },
    error::{ApError, ApResult},
    store::{
        models::{EdgeKind, RelationshipEdge, User},
        Store,
    },
};
use url::Url;

/// Maximum blip content length, in characters
const MAX_CONTENT_CHARS: usize = 500;

/// A successful verification: either the activity may be persisted, or
/// (for Undo) the matched edge that should be deleted.
#[derive(Debug, Clone)]
pub enum Verdict {
    Accepted,
    Undoable(RelationshipEdge),
}

/// Verify a resolved activity against the per-type rules.
///
/// With `undo` set the activity describes an existing edge to reverse;
/// the same semantic rules apply, with the existence check inverted.
/// An unknown activity type is a protocol fault, not a user error.
pub async fn verify(
    store: &Store,
    base: &Url,
    actor: &User,
    activity: &ResolvedActivity,
    undo: bool,
) -> ApResult<Verdict> {
    let type_str = activity
        .type_str()
        .ok_or_else(|| ApError::Input("activity has no type".to_string()))?;

    match ActivityKind::from_type(type_str)? {
        ActivityKind::Create => {
            if undo {
                return Err(ApError::Unsupported(
                    "a Create cannot be undone".to_string(),
                ));
            }
            verify_create(base, actor, activity)?;
            Ok(Verdict::Accepted)
        }
        ActivityKind::Follow => {
            verify_edge(store, base, actor, activity, undo, EdgeKind::Follow).await
        }
        ActivityKind::Like => {
            verify_edge(store, base, actor, activity, undo, EdgeKind::Like).await
        }
        ActivityKind::Announce => {
            verify_edge(store, base, actor, activity, undo, EdgeKind::Reblip).await
        }
        ActivityKind::Undo => Err(ApError::Protocol(
            "Undo must be unwrapped before verification".to_string(),
        )),
    }
}

/// Create mints new content: the object must NOT already exist, must be a
/// Note, and both actor and attribution must be the submitting actor.
fn verify_create(base: &Url, actor: &User, activity: &ResolvedActivity) -> ApResult<()> {
    let self_id = render::actor_url(base, &actor.username);

    let claimed = activity
        .get("actor")
        .and_then(reference_id)
        .unwrap_or_default();
    if claimed != self_id {
        return Err(ApError::Forbidden("actor must be yourself".to_string()));
    }

    if activity.reference("object").is_some() {
        return Err(ApError::Unsupported(
            "creating from resolved objects is not allowed".to_string(),
        ));
    }

    let object = activity
        .get("object")
        .ok_or_else(|| ApError::Input("activity has no object".to_string()))?;

    if object.get("type").and_then(serde_json::Value::as_str) != Some("Note") {
        return Err(ApError::Unsupported(
            "only the following object types are supported: Note".to_string(),
        ));
    }

    let content = object
        .get("content")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ApError::Input("object.content must be a string".to_string()))?;

    let chars = content.chars().count();
    if chars < 1 || chars > MAX_CONTENT_CHARS {
        return Err(ApError::Unsupported(format!(
            "object.content must be at least 1 and at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }

    if let Some(attributed) = object.get("attributedTo") {
        if reference_id(attributed) != Some(self_id.as_str()) {
            return Err(ApError::Forbidden(
                "object.attributedTo must be yourself".to_string(),
            ));
        }
    }

    Ok(())
}

/// Shared rules for the edge-creating activities. The object must already
/// exist (be resolved) and have the expected wire type; duplicates are
/// conflicts, and Undo requires exactly the edge being reversed.
async fn verify_edge(
    store: &Store,
    base: &Url,
    actor: &User,
    activity: &ResolvedActivity,
    undo: bool,
    kind: EdgeKind,
) -> ApResult<Verdict> {
    let (expected_type, verb) = match kind {
        EdgeKind::Follow => ("Person", "follow"),
        EdgeKind::Like => ("Note", "like"),
        EdgeKind::Reblip => ("Note", "announce"),
    };

    let reference = activity.reference("object").ok_or_else(|| {
        ApError::Input(format!("you can only {} an existing object", verb))
    })?;

    let object_type = activity
        .get("object")
        .and_then(|o| o.get("type"))
        .and_then(serde_json::Value::as_str);
    if object_type != Some(expected_type) {
        return Err(match kind {
            EdgeKind::Follow => ApError::Unsupported("you can only follow users".to_string()),
            EdgeKind::Like => ApError::Unsupported("you can only like blips".to_string()),
            EdgeKind::Reblip => {
                ApError::Unsupported("you can only announce blips".to_string())
            }
        });
    }

    if kind == EdgeKind::Follow {
        let object_id = activity.get("object").and_then(reference_id);
        if object_id == Some(render::actor_url(base, &actor.username).as_str()) {
            return Err(ApError::Input("you can not follow yourself".to_string()));
        }
    }

    let existing = store
        .find_edge(kind, actor.id, &reference.object_identity())
        .await?;

    if undo {
        match existing {
            Some(edge) => Ok(Verdict::Undoable(edge)),
            None => Err(ApError::Conflict(match kind {
                EdgeKind::Follow => "you aren't following that user".to_string(),
                EdgeKind::Like => "you don't like that blip".to_string(),
                EdgeKind::Reblip => "you haven't reblipped that blip".to_string(),
            })),
        }
    } else {
        match existing {
            Some(_) => Err(ApError::Conflict(match kind {
                EdgeKind::Follow => "you already follow that user".to_string(),
                EdgeKind::Like => "you already like that blip".to_string(),
                EdgeKind::Reblip => "you've already reblipped that blip".to_string(),
            })),
            None => Ok(Verdict::Accepted),
        }
    }
}
