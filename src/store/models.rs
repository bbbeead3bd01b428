/// Store records and typed identities
use crate::error::ApError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Local actor account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub summary: Option<String>,
    pub ts: DateTime<Utc>,
}

/// A post ("blip"), rendered to the wire as a Note
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Blip {
    pub id: i64,
    pub uuid: String,
    pub author_id: i64,
    pub reply_to_id: Option<i64>,
    pub content: String,
    pub ts: DateTime<Utc>,
}

/// A blip with its author eagerly loaded; rendering a Note needs the
/// author's username to build URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlipWithAuthor {
    pub blip: Blip,
    pub author: User,
}

/// Relationship edge kinds. `Reblip` is the persisted form of an
/// ActivityStreams `Announce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Follow,
    Like,
    Reblip,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Follow => "Follow",
            EdgeKind::Like => "Like",
            EdgeKind::Reblip => "Reblip",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, ApError> {
        match s {
            "Follow" => Ok(EdgeKind::Follow),
            "Like" => Ok(EdgeKind::Like),
            "Reblip" => Ok(EdgeKind::Reblip),
            other => Err(ApError::Internal(format!("unknown edge kind {:?}", other))),
        }
    }
}

/// Who enacted an edge: a local user or a remote actor asserted by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorIdentity {
    Local(i64),
    Remote(String),
}

/// What an edge points at: a local user, a local blip, or a remote URL.
/// Exactly one identity per edge, enforced structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectIdentity {
    Actor(i64),
    Post(i64),
    Remote(String),
}

/// Persisted Follow/Like/Reblip fact between an actor and an object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub id: i64,
    pub kind: EdgeKind,
    pub actor: ActorIdentity,
    pub object: ObjectIdentity,
    pub approved: Option<bool>,
    pub approved_at: Option<DateTime<Utc>>,
    pub ts: DateTime<Utc>,
}

/// Raw relationship row; the nullable identity columns are collapsed into
/// the tagged variants when leaving the storage boundary.
#[derive(Debug, Clone, FromRow)]
pub struct EdgeRow {
    pub id: i64,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub actor_user_id: Option<i64>,
    pub actor_url: Option<String>,
    pub object_user_id: Option<i64>,
    pub object_blip_id: Option<i64>,
    pub object_url: Option<String>,
    pub approved: Option<bool>,
    pub approved_at: Option<DateTime<Utc>>,
    pub ts: DateTime<Utc>,
}

impl TryFrom<EdgeRow> for RelationshipEdge {
    type Error = ApError;

    fn try_from(row: EdgeRow) -> Result<Self, ApError> {
        let actor = match (row.actor_user_id, row.actor_url) {
            (Some(id), None) => ActorIdentity::Local(id),
            (None, Some(url)) => ActorIdentity::Remote(url),
            _ => {
                return Err(ApError::Internal(format!(
                    "relationship {} has malformed actor identity",
                    row.id
                )))
            }
        };

        let object = match (row.object_user_id, row.object_blip_id, row.object_url) {
            (Some(id), None, None) => ObjectIdentity::Actor(id),
            (None, Some(id), None) => ObjectIdentity::Post(id),
            (None, None, Some(url)) => ObjectIdentity::Remote(url),
            _ => {
                return Err(ApError::Internal(format!(
                    "relationship {} has malformed object identity",
                    row.id
                )))
            }
        };

        Ok(RelationshipEdge {
            id: row.id,
            kind: EdgeKind::from_str(&row.kind)?,
            actor,
            object,
            approved: row.approved,
            approved_at: row.approved_at,
            ts: row.ts,
        })
    }
}

/// An edge with its related records eagerly loaded, mirroring the edge's
/// required graph: actor user, object user, object blip (with author).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeWithTargets {
    pub edge: RelationshipEdge,
    pub actor_user: Option<User>,
    pub object_user: Option<User>,
    pub object_blip: Option<BlipWithAuthor>,
}

/// Insertable post
#[derive(Debug, Clone)]
pub struct NewBlip {
    pub author_id: i64,
    pub reply_to_id: Option<i64>,
    pub content: String,
}

/// Insertable edge
#[derive(Debug, Clone)]
pub struct NewEdge {
    pub kind: EdgeKind,
    pub actor: ActorIdentity,
    pub object: ObjectIdentity,
    pub approved: Option<bool>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_row() -> EdgeRow {
        EdgeRow {
            id: 1,
            kind: "Follow".to_string(),
            actor_user_id: Some(10),
            actor_url: None,
            object_user_id: Some(20),
            object_blip_id: None,
            object_url: None,
            approved: Some(true),
            approved_at: None,
            ts: Utc::now(),
        }
    }

    #[test]
    fn identities_collapse_into_variants() {
        let edge = RelationshipEdge::try_from(base_row()).unwrap();
        assert_eq!(edge.actor, ActorIdentity::Local(10));
        assert_eq!(edge.object, ObjectIdentity::Actor(20));
        assert_eq!(edge.kind, EdgeKind::Follow);
    }

    #[test]
    fn remote_object_maps_to_url_variant() {
        let mut row = base_row();
        row.object_user_id = None;
        row.object_url = Some("https://elsewhere.example/@nomad".to_string());
        let edge = RelationshipEdge::try_from(row).unwrap();
        assert_eq!(
            edge.object,
            ObjectIdentity::Remote("https://elsewhere.example/@nomad".to_string())
        );
    }

    #[test]
    fn violating_the_xor_invariant_is_rejected() {
        let mut both = base_row();
        both.actor_url = Some("https://elsewhere.example/@nomad".to_string());
        assert!(RelationshipEdge::try_from(both).is_err());

        let mut neither = base_row();
        neither.object_user_id = None;
        assert!(RelationshipEdge::try_from(neither).is_err());
    }
}
