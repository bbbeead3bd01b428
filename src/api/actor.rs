/// Actor-facing read endpoints: profile documents, notes and the
/// single-source collections (followers, following, replies).
use crate::{
    activitypub::{
        factory::CollectionKind,
        pagination, render,
        render::LocalResource,
        routing,
    },
    api::{handle_of, ApJson},
    context::AppContext,
    error::{ApError, ApResult},
    store::models::User,
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde_json::Value;

/// Build actor routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/:handle", get(actor_document))
        .route("/:handle/followers", get(followers))
        .route("/:handle/following", get(following))
        .route("/:handle/:uuid", get(note_document))
        .route("/:handle/:uuid/replies", get(replies))
}

async fn require_user(ctx: &AppContext, handle: &str) -> ApResult<User> {
    ctx.store
        .user_by_username(handle)
        .await?
        .ok_or_else(|| ApError::NotFound(format!("no user @{}", handle)))
}

/// GET /@{handle} — the actor's Person document
async fn actor_document(
    State(ctx): State<AppContext>,
    Path(segment): Path<String>,
) -> ApResult<ApJson<Value>> {
    let handle = handle_of(&segment)?;
    match routing::resolve_path(&ctx.store, &format!("/@{}", handle)).await? {
        Some(LocalResource::Actor(user)) => {
            Ok(ApJson(render::person_object(&user, ctx.base_url())))
        }
        _ => Err(ApError::NotFound(format!("no user @{}", handle))),
    }
}

/// GET /@{handle}/{uuid} — one Note
async fn note_document(
    State(ctx): State<AppContext>,
    Path((segment, uuid)): Path<(String, String)>,
) -> ApResult<ApJson<Value>> {
    let handle = handle_of(&segment)?;
    match routing::resolve_path(&ctx.store, &format!("/@{}/{}", handle, uuid)).await? {
        Some(LocalResource::Post(blip)) => {
            Ok(ApJson(render::note_object(&blip, ctx.base_url())))
        }
        _ => Err(ApError::NotFound(format!("no post @{}/{}", handle, uuid))),
    }
}

/// GET /@{handle}/followers — actors following this user
async fn followers(
    State(ctx): State<AppContext>,
    Path(segment): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApResult<ApJson<Value>> {
    let handle = handle_of(&segment)?;
    let user = require_user(&ctx, handle).await?;
    let base = ctx.base_url();
    let store = &ctx.store;
    let user_id = user.id;
    let path = format!("/@{}/followers", handle);

    let value = pagination::paginate(
        CollectionKind::Ordered,
        base,
        &path,
        &query,
        || async move { store.count_followers(user_id).await },
        |limit, offset| async move {
            let page = store.followers_page(user_id, limit, offset).await?;
            Ok(page
                .iter()
                .map(|edge| Value::String(render::edge_actor_id(edge, base)))
                .collect())
        },
    )
    .await?;

    Ok(ApJson(value))
}

/// GET /@{handle}/following — actors this user follows
async fn following(
    State(ctx): State<AppContext>,
    Path(segment): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApResult<ApJson<Value>> {
    let handle = handle_of(&segment)?;
    let user = require_user(&ctx, handle).await?;
    let base = ctx.base_url();
    let store = &ctx.store;
    let user_id = user.id;
    let path = format!("/@{}/following", handle);

    let value = pagination::paginate(
        CollectionKind::Ordered,
        base,
        &path,
        &query,
        || async move { store.count_following(user_id).await },
        |limit, offset| async move {
            let page = store.following_page(user_id, limit, offset).await?;
            Ok(page
                .iter()
                .map(|edge| Value::String(render::edge_object_id(edge, base)))
                .collect())
        },
    )
    .await?;

    Ok(ApJson(value))
}

/// GET /@{handle}/{uuid}/replies — replies to one note
async fn replies(
    State(ctx): State<AppContext>,
    Path((segment, uuid)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
) -> ApResult<ApJson<Value>> {
    let handle = handle_of(&segment)?;
    let blip = match routing::resolve_path(&ctx.store, &format!("/@{}/{}", handle, uuid)).await? {
        Some(LocalResource::Post(blip)) => blip,
        _ => return Err(ApError::NotFound(format!("no post @{}/{}", handle, uuid))),
    };

    let base = ctx.base_url();
    let store = &ctx.store;
    let blip_id = blip.blip.id;
    let path = format!("/@{}/{}/replies", handle, uuid);

    let value = pagination::paginate(
        CollectionKind::Ordered,
        base,
        &path,
        &query,
        || async move { store.count_replies(blip_id).await },
        |limit, offset| async move {
            let page = store.replies_page(blip_id, limit, offset).await?;
            Ok(page
                .iter()
                .map(|reply| render::note_object(reply, base))
                .collect())
        },
    )
    .await?;

    Ok(ApJson(value))
}

#[cfg(test)]
mod tests {
    use crate::{api::testing::*, store::testing::*};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn actor_document_is_served_at_the_handle() {
        let ctx = test_ctx().await;
        seed_user(&ctx.store, "john").await;
        let router = app(&ctx);

        let (status, person) = send(&router, "GET", "/@john", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(person["type"], "Person");
        assert_eq!(person["id"], "https://blip.example/@john");
        assert_eq!(person["preferredUsername"], "john");

        let (status, _) = send(&router, "GET", "/@ghost", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn note_documents_are_scoped_to_their_author() {
        let ctx = test_ctx().await;
        let jane = seed_user(&ctx.store, "jane").await;
        seed_user(&ctx.store, "john").await;
        let blip = seed_blip(&ctx.store, &jane, "hello").await;
        let router = app(&ctx);

        let (status, note) = send(
            &router,
            "GET",
            &format!("/@jane/{}", blip.blip.uuid),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(note["content"], "hello");

        let (status, _) = send(
            &router,
            "GET",
            &format!("/@john/{}", blip.blip.uuid),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn follower_collections_page_and_summarize() {
        let ctx = test_ctx().await;
        let jane = seed_user(&ctx.store, "jane").await;
        let router = app(&ctx);

        for (i, name) in ["a_fan", "b_fan", "c_fan"].iter().enumerate() {
            let fan = seed_user(&ctx.store, name).await;
            seed_edge_at(
                &ctx.store,
                crate::store::models::EdgeKind::Follow,
                &fan,
                crate::store::models::ObjectIdentity::Actor(jane.id),
                (i as i64) + 1,
            )
            .await;
        }

        let (status, pointer) = send(&router, "GET", "/@jane/followers", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pointer["type"], "OrderedCollection");
        assert_eq!(pointer["totalItems"], 3);
        assert_eq!(
            pointer["first"],
            "https://blip.example/@jane/followers?page=0"
        );

        let (_, page) = send(
            &router,
            "GET",
            "/@jane/followers?count=2&page=0",
            None,
            None,
        )
        .await;
        assert_eq!(
            page["orderedItems"],
            json!([
                "https://blip.example/@c_fan",
                "https://blip.example/@b_fan",
            ])
        );
        assert_eq!(
            page["next"],
            "https://blip.example/@jane/followers?count=2&page=1"
        );
    }

    #[tokio::test]
    async fn following_lists_edge_objects() {
        let ctx = test_ctx().await;
        let john = seed_user(&ctx.store, "john").await;
        let jane = seed_user(&ctx.store, "jane").await;
        let router = app(&ctx);

        seed_edge_at(
            &ctx.store,
            crate::store::models::EdgeKind::Follow,
            &john,
            crate::store::models::ObjectIdentity::Actor(jane.id),
            1,
        )
        .await;

        let (_, page) = send(&router, "GET", "/@john/following?page=0", None, None).await;
        assert_eq!(
            page["orderedItems"],
            json!(["https://blip.example/@jane"])
        );
    }

    #[tokio::test]
    async fn malformed_page_parameters_are_rejected() {
        let ctx = test_ctx().await;
        seed_user(&ctx.store, "jane").await;
        let router = app(&ctx);

        for uri in [
            "/@jane/followers?page=banana",
            "/@jane/followers?count=-2",
            "/@jane/followers?count=1.5",
        ] {
            let (status, _) = send(&router, "GET", uri, None, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        }
    }
}
