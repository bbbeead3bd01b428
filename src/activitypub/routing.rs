/// Identity & Routing Resolver
///
/// Maps absolute URLs to local resources. `is_internal` decides whether a
/// URL belongs to this node at all; `resolve_path` turns a local path into
/// the actor or post it names.
use crate::{
    activitypub::render::LocalResource,
    error::ApResult,
    store::Store,
};
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;
use uuid::Uuid;

/// Content type set on ActivityPub responses
pub const ACTIVITYPUB_CONTENT_TYPE: &str =
    "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";

/// Routing prefix stripped before resource matching
const ROUTING_PREFIX: &str = "/activityPub";

lazy_static! {
    /// `/@{handle}`, optionally followed by one opaque segment and any
    /// further (ignored) subpath.
    static ref RESOURCE_PATH: Regex =
        Regex::new(r"^/@([a-z0-9_]{1,32})(?:/([^/]+))?(?:/.*)?$").unwrap();
}

/// True when `url` names a resource on this node: host and port must match
/// the base URL exactly. Scheme is deliberately ignored; any port
/// difference makes the URL external.
pub fn is_internal(base: &Url, url: &Url) -> bool {
    base.host_str() == url.host_str() && base.port() == url.port()
}

/// Resolve a local path to the resource it names.
///
/// A bare handle yields the actor; a handle plus the post's opaque id
/// yields the post. Trailing subpath segments (`/outbox`, `/likes`, ...)
/// are ignored, so `/@user/outbox` resolves to the actor.
pub async fn resolve_path(store: &Store, path: &str) -> ApResult<Option<LocalResource>> {
    let path = path.strip_prefix(ROUTING_PREFIX).unwrap_or(path);

    let captures = match RESOURCE_PATH.captures(path) {
        Some(captures) => captures,
        None => return Ok(None),
    };

    let handle = &captures[1];
    let user = match store.user_by_username(handle).await? {
        Some(user) => user,
        None => return Ok(None),
    };

    if let Some(segment) = captures.get(2) {
        // Only a UUID-shaped segment names a post; anything else is a
        // collection subpath of the actor.
        if Uuid::parse_str(segment.as_str()).is_ok() {
            return match store.blip_by_uuid(segment.as_str()).await? {
                Some(blip) if blip.blip.author_id == user.id => {
                    Ok(Some(LocalResource::Post(blip)))
                }
                _ => Ok(None),
            };
        }
    }

    Ok(Some(LocalResource::Actor(user)))
}
