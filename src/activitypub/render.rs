/// Wire renderings of local resources
///
/// Every local resource renders to an ActivityStreams object; actors
/// additionally render to a WebFinger discovery document. Persisted
/// relationship edges render back to the activity that enacted them.
use crate::{
    activitypub::vocab::{AS_CONTEXT, AS_PUBLIC},
    error::ApResult,
    store::models::{ActorIdentity, BlipWithAuthor, EdgeKind, EdgeWithTargets, ObjectIdentity, User},
};
use chrono::SecondsFormat;
use serde_json::{json, Value};
use url::Url;

/// A resolvable local resource: an actor or a post
#[derive(Debug, Clone)]
pub enum LocalResource {
    Actor(User),
    Post(BlipWithAuthor),
}

impl LocalResource {
    /// Render to the resource's protocol object
    pub fn to_object(&self, base: &Url) -> Value {
        match self {
            LocalResource::Actor(user) => person_object(user, base),
            LocalResource::Post(blip) => note_object(blip, base),
        }
    }
}

/// Canonical URL of a local actor
pub fn actor_url(base: &Url, username: &str) -> String {
    let mut url = base.clone();
    url.set_path(&format!("/@{}", username));
    url.set_query(None);
    url.into()
}

/// Canonical URL of a local post
pub fn note_url(base: &Url, blip: &BlipWithAuthor) -> String {
    format!("{}/{}", actor_url(base, &blip.author.username), blip.blip.uuid)
}

fn published(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a user as an ActivityStreams Person
pub fn person_object(user: &User, base: &Url) -> Value {
    let id = actor_url(base, &user.username);
    let mut obj = json!({
        "@context": [
            AS_CONTEXT,
            { "manuallyApprovesFollowers": "as:manuallyApprovesFollowers" }
        ],
        "id": id,
        "type": "Person",
        "inbox": format!("{}/inbox", id),
        "outbox": format!("{}/outbox", id),
        "followers": format!("{}/followers", id),
        "following": format!("{}/following", id),
        "preferredUsername": user.username,
        "name": user.name,
        "manuallyApprovesFollowers": false,
    });

    if let Some(summary) = &user.summary {
        obj["summary"] = json!(summary);
    }

    obj
}

/// Render a user's WebFinger discovery document
pub fn webfinger_document(user: &User, base: &Url) -> Value {
    let url = actor_url(base, &user.username);
    let hostname = base.host_str().unwrap_or_default();

    json!({
        "subject": format!("acct:{}@{}", user.username, hostname),
        "aliases": [url],
        "links": [
            {
                "rel": "http://webfinger.net/rel/profile-page",
                "type": "text/html",
                "href": url,
            },
            {
                "rel": "self",
                "type": "application/activity+json",
                "href": url,
            },
            {
                "rel": "self",
                "type": "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
                "href": url,
            },
        ],
    })
}

/// Render a blip as an ActivityStreams Note
pub fn note_object(blip: &BlipWithAuthor, base: &Url) -> Value {
    let author_id = actor_url(base, &blip.author.username);
    let id = note_url(base, blip);

    json!({
        "@context": AS_CONTEXT,
        "type": "Note",
        "id": id,
        "attributedTo": author_id,
        "to": [
            format!("{}/followers", author_id),
            AS_PUBLIC,
        ],
        "content": blip.blip.content,
        "published": published(&blip.blip.ts),
        "replies": format!("{}/replies", id),
    })
}

/// Render the Create activity that published a blip
pub fn create_activity(blip: &BlipWithAuthor, base: &Url) -> Value {
    let obj = note_object(blip, base);

    json!({
        "@context": AS_CONTEXT,
        "id": format!("{}/activity", obj["id"].as_str().unwrap_or_default()),
        "type": "Create",
        "to": obj["to"].clone(),
        "actor": obj["attributedTo"].clone(),
        "published": obj["published"].clone(),
        "object": obj,
    })
}

/// The wire id of an edge's actor: a local actor URL or the asserted
/// remote URL.
pub fn edge_actor_id(edge: &EdgeWithTargets, base: &Url) -> String {
    match (&edge.edge.actor, &edge.actor_user) {
        (ActorIdentity::Local(_), Some(user)) => actor_url(base, &user.username),
        (ActorIdentity::Remote(url), _) => url.clone(),
        (ActorIdentity::Local(id), None) => {
            // Eager graph violation; render something stable anyway.
            tracing::warn!(edge = edge.edge.id, actor = id, "edge actor row not loaded");
            String::new()
        }
    }
}

/// The wire id of an edge's object
pub fn edge_object_id(edge: &EdgeWithTargets, base: &Url) -> String {
    match (&edge.edge.object, &edge.object_user, &edge.object_blip) {
        (ObjectIdentity::Actor(_), Some(user), _) => actor_url(base, &user.username),
        (ObjectIdentity::Post(_), _, Some(blip)) => note_url(base, blip),
        (ObjectIdentity::Remote(url), _, _) => url.clone(),
        (identity, _, _) => {
            tracing::warn!(edge = edge.edge.id, ?identity, "edge object row not loaded");
            String::new()
        }
    }
}

fn edge_actor_value(edge: &EdgeWithTargets, base: &Url) -> Value {
    match (&edge.edge.actor, &edge.actor_user) {
        (ActorIdentity::Local(_), Some(user)) => person_object(user, base),
        (ActorIdentity::Remote(url), _) => Value::String(url.clone()),
        _ => Value::String(edge_actor_id(edge, base)),
    }
}

fn edge_object_value(edge: &EdgeWithTargets, base: &Url) -> Value {
    match (&edge.edge.object, &edge.object_user, &edge.object_blip) {
        (ObjectIdentity::Actor(_), Some(user), _) => person_object(user, base),
        (ObjectIdentity::Post(_), _, Some(blip)) => note_object(blip, base),
        _ => Value::String(edge_object_id(edge, base)),
    }
}

/// Render a persisted edge back to the activity that enacted it.
///
/// `Reblip` is the persisted form of `Announce`. A Follow renders as an
/// `Invite` into the relationship, wrapped in an `Accept` by the followed
/// actor once approved.
pub fn edge_activity(edge: &EdgeWithTargets, base: &Url) -> ApResult<Value> {
    let wire_type = match edge.edge.kind {
        EdgeKind::Follow => "Follow",
        EdgeKind::Like => "Like",
        EdgeKind::Reblip => "Announce",
    };

    let actor = edge_actor_value(edge, base);
    let object = edge_object_value(edge, base);

    let activity = json!({
        "@context": AS_CONTEXT,
        "type": wire_type,
        "actor": actor.clone(),
        "object": object.clone(),
    });

    if edge.edge.kind != EdgeKind::Follow {
        return Ok(activity);
    }

    let invite = json!({
        "@context": AS_CONTEXT,
        "type": "Invite",
        "actor": actor,
        "object": activity,
    });

    if edge.edge.approved == Some(true) {
        Ok(json!({
            "@context": AS_CONTEXT,
            "type": "Accept",
            "actor": object,
            "object": invite,
        }))
    } else {
        Ok(invite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{Blip, RelationshipEdge};
    use chrono::{TimeZone, Utc};

    fn base() -> Url {
        Url::parse("https://blip.example").unwrap()
    }

    fn user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            name: format!("{} Display", username),
            summary: None,
            ts: Utc.timestamp_opt(1_000, 0).unwrap(),
        }
    }

    fn blip(id: i64, author: &User, content: &str) -> BlipWithAuthor {
        BlipWithAuthor {
            blip: Blip {
                id,
                uuid: "3affab31-5204-45eb-9a0c-3c5a5db3f6e3".to_string(),
                author_id: author.id,
                reply_to_id: None,
                content: content.to_string(),
                ts: Utc.timestamp_opt(2_000, 0).unwrap(),
            },
            author: author.clone(),
        }
    }

    fn follow_edge(actor: &User, object: &User, approved: bool) -> EdgeWithTargets {
        EdgeWithTargets {
            edge: RelationshipEdge {
                id: 1,
                kind: EdgeKind::Follow,
                actor: ActorIdentity::Local(actor.id),
                object: ObjectIdentity::Actor(object.id),
                approved: Some(approved),
                approved_at: None,
                ts: Utc.timestamp_opt(3_000, 0).unwrap(),
            },
            actor_user: Some(actor.clone()),
            object_user: Some(object.clone()),
            object_blip: None,
        }
    }

    #[test]
    fn person_object_carries_collection_urls() {
        let obj = person_object(&user(1, "john"), &base());
        assert_eq!(obj["id"], "https://blip.example/@john");
        assert_eq!(obj["type"], "Person");
        assert_eq!(obj["inbox"], "https://blip.example/@john/inbox");
        assert_eq!(obj["followers"], "https://blip.example/@john/followers");
        assert_eq!(obj["manuallyApprovesFollowers"], false);
        // No summary → field omitted entirely
        assert!(obj.get("summary").is_none());
    }

    #[test]
    fn note_object_is_addressed_to_followers_and_public() {
        let author = user(1, "jane");
        let obj = note_object(&blip(1, &author, "hello"), &base());
        assert_eq!(
            obj["id"],
            "https://blip.example/@jane/3affab31-5204-45eb-9a0c-3c5a5db3f6e3"
        );
        assert_eq!(obj["attributedTo"], "https://blip.example/@jane");
        assert_eq!(obj["to"][0], "https://blip.example/@jane/followers");
        assert_eq!(obj["to"][1], AS_PUBLIC);
    }

    #[test]
    fn create_activity_wraps_the_note() {
        let author = user(1, "jane");
        let act = create_activity(&blip(1, &author, "hello"), &base());
        assert_eq!(act["type"], "Create");
        assert_eq!(
            act["id"],
            "https://blip.example/@jane/3affab31-5204-45eb-9a0c-3c5a5db3f6e3/activity"
        );
        assert_eq!(act["actor"], "https://blip.example/@jane");
        assert_eq!(act["object"]["type"], "Note");
    }

    #[test]
    fn reblip_renders_as_announce() {
        let actor = user(1, "john");
        let author = user(2, "jane");
        let target = blip(7, &author, "hello");
        let edge = EdgeWithTargets {
            edge: RelationshipEdge {
                id: 9,
                kind: EdgeKind::Reblip,
                actor: ActorIdentity::Local(actor.id),
                object: ObjectIdentity::Post(target.blip.id),
                approved: None,
                approved_at: None,
                ts: Utc.timestamp_opt(3_000, 0).unwrap(),
            },
            actor_user: Some(actor),
            object_user: None,
            object_blip: Some(target),
        };

        let act = edge_activity(&edge, &base()).unwrap();
        assert_eq!(act["type"], "Announce");
        assert_eq!(act["actor"]["id"], "https://blip.example/@john");
        assert_eq!(act["object"]["type"], "Note");
    }

    #[test]
    fn approved_follow_renders_as_accept_of_invite() {
        let john = user(1, "john");
        let jane = user(2, "jane");

        let pending = edge_activity(&follow_edge(&john, &jane, false), &base()).unwrap();
        assert_eq!(pending["type"], "Invite");
        assert_eq!(pending["object"]["type"], "Follow");

        let approved = edge_activity(&follow_edge(&john, &jane, true), &base()).unwrap();
        assert_eq!(approved["type"], "Accept");
        assert_eq!(approved["actor"]["id"], "https://blip.example/@jane");
        assert_eq!(approved["object"]["type"], "Invite");
        assert_eq!(approved["object"]["object"]["type"], "Follow");
    }

    #[test]
    fn remote_edge_sides_render_as_bare_urls() {
        let john = user(1, "john");
        let edge = EdgeWithTargets {
            edge: RelationshipEdge {
                id: 3,
                kind: EdgeKind::Like,
                actor: ActorIdentity::Local(john.id),
                object: ObjectIdentity::Remote("https://elsewhere.example/note/5".into()),
                approved: None,
                approved_at: None,
                ts: Utc.timestamp_opt(3_000, 0).unwrap(),
            },
            actor_user: Some(john),
            object_user: None,
            object_blip: None,
        };

        let act = edge_activity(&edge, &base()).unwrap();
        assert_eq!(act["type"], "Like");
        assert_eq!(act["object"], "https://elsewhere.example/note/5");
    }
}
