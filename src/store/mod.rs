/// Resource Store - typed access to persisted state
///
/// Wraps the SQLite pool behind keyed lookups, relational queries with
/// eagerly-loaded related records, paged windows for collections, and the
/// edge existence checks the Activity Verifier relies on. Components
/// receive a `Store` handle by parameter injection; no global connection
/// state exists.

pub mod models;

use crate::error::{ApError, ApResult};
use chrono::{DateTime, Utc};
use models::{
    ActorIdentity, Blip, BlipWithAuthor, EdgeKind, EdgeRow, EdgeWithTargets, NewBlip, NewEdge,
    ObjectIdentity, RelationshipEdge, User,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, SqlitePool};
use uuid::Uuid;

/// Which table a union-projected row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Blips,
    Edges,
}

/// Uniform projection of a heterogeneous record for union paging:
/// source table, row id, timestamp.
#[derive(Debug, Clone)]
pub struct SourceRow {
    pub kind: SourceKind,
    pub id: i64,
    pub ts: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Store {
    db: SqlitePool,
}

const BLIP_WITH_AUTHOR_COLUMNS: &str = "b.id, b.uuid, b.author_id, b.reply_to_id, b.content, b.ts, \
     u.id AS author_row_id, u.username AS author_username, u.name AS author_name, \
     u.summary AS author_summary, u.ts AS author_ts";

const EDGE_WITH_TARGETS_COLUMNS: &str = "r.id, r.type, r.actor_user_id, r.actor_url, r.object_user_id, r.object_blip_id, \
     r.object_url, r.approved, r.approved_at, r.ts, \
     au.id AS au_id, au.username AS au_username, au.name AS au_name, au.summary AS au_summary, au.ts AS au_ts, \
     ou.id AS ou_id, ou.username AS ou_username, ou.name AS ou_name, ou.summary AS ou_summary, ou.ts AS ou_ts, \
     ob.id AS ob_id, ob.uuid AS ob_uuid, ob.author_id AS ob_author_id, ob.reply_to_id AS ob_reply_to_id, \
     ob.content AS ob_content, ob.ts AS ob_ts, \
     oba.id AS oba_id, oba.username AS oba_username, oba.name AS oba_name, oba.summary AS oba_summary, oba.ts AS oba_ts";

const EDGE_WITH_TARGETS_JOINS: &str = "LEFT JOIN users au ON au.id = r.actor_user_id \
     LEFT JOIN users ou ON ou.id = r.object_user_id \
     LEFT JOIN blips ob ON ob.id = r.object_blip_id \
     LEFT JOIN users oba ON oba.id = ob.author_id";

impl Store {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    // ---- users -----------------------------------------------------------

    pub async fn user_by_username(&self, username: &str) -> ApResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, name, summary, ts FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    pub async fn user_by_id(&self, id: i64) -> ApResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, name, summary, ts FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    pub async fn user_by_token(&self, token: &str) -> ApResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.name, u.summary, u.ts
             FROM tokens t JOIN users u ON u.id = t.user_id
             WHERE t.token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    pub async fn insert_user(
        &self,
        username: &str,
        name: &str,
        summary: Option<&str>,
    ) -> ApResult<User> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, name, summary, ts) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(username)
        .bind(name)
        .bind(summary)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            name: name.to_string(),
            summary: summary.map(str::to_string),
            ts: now,
        })
    }

    pub async fn insert_token(&self, user_id: i64, token: &str) -> ApResult<()> {
        sqlx::query("INSERT INTO tokens (token, user_id, ts) VALUES (?1, ?2, ?3)")
            .bind(token)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(())
    }

    // ---- blips -----------------------------------------------------------

    pub async fn blip_by_uuid(&self, uuid: &str) -> ApResult<Option<BlipWithAuthor>> {
        let row = sqlx::query(&format!(
            "SELECT {BLIP_WITH_AUTHOR_COLUMNS}
             FROM blips b JOIN users u ON u.id = b.author_id
             WHERE b.uuid = ?1"
        ))
        .bind(uuid)
        .fetch_optional(&self.db)
        .await?;

        row.map(|r| blip_with_author_from_row(&r)).transpose()
    }

    pub async fn insert_blip(&self, new: NewBlip) -> ApResult<BlipWithAuthor> {
        let now = Utc::now();
        let uuid = Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO blips (uuid, author_id, reply_to_id, content, ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&uuid)
        .bind(new.author_id)
        .bind(new.reply_to_id)
        .bind(&new.content)
        .bind(now)
        .execute(&self.db)
        .await?;

        let author = self
            .user_by_id(new.author_id)
            .await?
            .ok_or_else(|| ApError::Internal(format!("blip author {} vanished", new.author_id)))?;

        Ok(BlipWithAuthor {
            blip: Blip {
                id: result.last_insert_rowid(),
                uuid,
                author_id: new.author_id,
                reply_to_id: new.reply_to_id,
                content: new.content,
                ts: now,
            },
            author,
        })
    }

    pub async fn count_blips_by_author(&self, author_id: i64) -> ApResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM blips WHERE author_id = ?1")
                .bind(author_id)
                .fetch_one(&self.db)
                .await?;

        Ok(count)
    }

    /// Top `limit` blips by an author as union projections, newest first
    pub async fn blips_window_by_author(
        &self,
        author_id: i64,
        limit: i64,
    ) -> ApResult<Vec<SourceRow>> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT id, ts FROM blips WHERE author_id = ?1 ORDER BY ts DESC LIMIT ?2",
        )
        .bind(author_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, ts)| SourceRow {
                kind: SourceKind::Blips,
                id,
                ts,
            })
            .collect())
    }

    /// Bulk re-fetch of blips by id, with authors eagerly loaded.
    /// Result order is not authoritative.
    pub async fn blips_by_ids(&self, ids: &[i64]) -> ApResult<Vec<BlipWithAuthor>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {BLIP_WITH_AUTHOR_COLUMNS}
             FROM blips b JOIN users u ON u.id = b.author_id
             WHERE b.id IN ("
        ));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.db).await?;
        rows.iter().map(blip_with_author_from_row).collect()
    }

    pub async fn count_replies(&self, blip_id: i64) -> ApResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM blips WHERE reply_to_id = ?1")
                .bind(blip_id)
                .fetch_one(&self.db)
                .await?;

        Ok(count)
    }

    pub async fn replies_page(
        &self,
        blip_id: i64,
        limit: i64,
        offset: i64,
    ) -> ApResult<Vec<BlipWithAuthor>> {
        let rows = sqlx::query(&format!(
            "SELECT {BLIP_WITH_AUTHOR_COLUMNS}
             FROM blips b JOIN users u ON u.id = b.author_id
             WHERE b.reply_to_id = ?1
             ORDER BY b.ts DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(blip_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(blip_with_author_from_row).collect()
    }

    // ---- relationship edges ---------------------------------------------

    /// Look up the active edge for `(kind, actor, object)`, discriminating
    /// local ids from remote URLs on the object side.
    pub async fn find_edge(
        &self,
        kind: EdgeKind,
        actor_id: i64,
        object: &ObjectIdentity,
    ) -> ApResult<Option<RelationshipEdge>> {
        let column = match object {
            ObjectIdentity::Actor(_) => "object_user_id",
            ObjectIdentity::Post(_) => "object_blip_id",
            ObjectIdentity::Remote(_) => "object_url",
        };
        let sql = format!(
            "SELECT id, type, actor_user_id, actor_url, object_user_id, object_blip_id,
                    object_url, approved, approved_at, ts
             FROM relationships
             WHERE type = ?1 AND actor_user_id = ?2 AND {column} = ?3 LIMIT 1"
        );

        let query = sqlx::query_as::<_, EdgeRow>(&sql)
            .bind(kind.as_str())
            .bind(actor_id);
        let row = match object {
            ObjectIdentity::Actor(id) | ObjectIdentity::Post(id) => {
                query.bind(id).fetch_optional(&self.db).await?
            }
            ObjectIdentity::Remote(url) => query.bind(url).fetch_optional(&self.db).await?,
        };

        row.map(RelationshipEdge::try_from).transpose()
    }

    pub async fn insert_edge(&self, new: NewEdge) -> ApResult<RelationshipEdge> {
        let now = Utc::now();

        let (actor_user_id, actor_url) = match &new.actor {
            ActorIdentity::Local(id) => (Some(*id), None),
            ActorIdentity::Remote(url) => (None, Some(url.clone())),
        };
        let (object_user_id, object_blip_id, object_url) = match &new.object {
            ObjectIdentity::Actor(id) => (Some(*id), None, None),
            ObjectIdentity::Post(id) => (None, Some(*id), None),
            ObjectIdentity::Remote(url) => (None, None, Some(url.clone())),
        };

        let result = sqlx::query(
            "INSERT INTO relationships
                 (type, ts, actor_user_id, actor_url, object_user_id, object_blip_id,
                  object_url, approved, approved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(new.kind.as_str())
        .bind(now)
        .bind(actor_user_id)
        .bind(&actor_url)
        .bind(object_user_id)
        .bind(object_blip_id)
        .bind(&object_url)
        .bind(new.approved)
        .bind(new.approved_at)
        .execute(&self.db)
        .await?;

        Ok(RelationshipEdge {
            id: result.last_insert_rowid(),
            kind: new.kind,
            actor: new.actor,
            object: new.object,
            approved: new.approved,
            approved_at: new.approved_at,
            ts: now,
        })
    }

    pub async fn delete_edge(&self, id: i64) -> ApResult<()> {
        sqlx::query("DELETE FROM relationships WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn count_followers(&self, user_id: i64) -> ApResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relationships WHERE type = 'Follow' AND object_user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    pub async fn followers_page(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> ApResult<Vec<EdgeWithTargets>> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_WITH_TARGETS_COLUMNS}
             FROM relationships r {EDGE_WITH_TARGETS_JOINS}
             WHERE r.type = 'Follow' AND r.object_user_id = ?1
             ORDER BY r.ts DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(edge_with_targets_from_row).collect()
    }

    pub async fn count_following(&self, user_id: i64) -> ApResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relationships WHERE type = 'Follow' AND actor_user_id = ?1",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    pub async fn following_page(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> ApResult<Vec<EdgeWithTargets>> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_WITH_TARGETS_COLUMNS}
             FROM relationships r {EDGE_WITH_TARGETS_JOINS}
             WHERE r.type = 'Follow' AND r.actor_user_id = ?1
             ORDER BY r.ts DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(edge_with_targets_from_row).collect()
    }

    pub async fn count_edges_by_actor(&self, kind: EdgeKind, actor_id: i64) -> ApResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relationships WHERE type = ?1 AND actor_user_id = ?2",
        )
        .bind(kind.as_str())
        .bind(actor_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Top `limit` edges of a kind enacted by an actor as union
    /// projections, newest first
    pub async fn edges_window_by_actor(
        &self,
        kind: EdgeKind,
        actor_id: i64,
        limit: i64,
    ) -> ApResult<Vec<SourceRow>> {
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT id, ts FROM relationships
             WHERE type = ?1 AND actor_user_id = ?2
             ORDER BY ts DESC LIMIT ?3",
        )
        .bind(kind.as_str())
        .bind(actor_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, ts)| SourceRow {
                kind: SourceKind::Edges,
                id,
                ts,
            })
            .collect())
    }

    /// Bulk re-fetch of edges by id with the full eager-load graph.
    /// Result order is not authoritative.
    pub async fn edges_by_ids(&self, ids: &[i64]) -> ApResult<Vec<EdgeWithTargets>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(format!(
            "SELECT {EDGE_WITH_TARGETS_COLUMNS}
             FROM relationships r {EDGE_WITH_TARGETS_JOINS}
             WHERE r.id IN ("
        ));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.db).await?;
        rows.iter().map(edge_with_targets_from_row).collect()
    }
}

fn blip_with_author_from_row(row: &SqliteRow) -> ApResult<BlipWithAuthor> {
    Ok(BlipWithAuthor {
        blip: Blip {
            id: row.get("id"),
            uuid: row.get("uuid"),
            author_id: row.get("author_id"),
            reply_to_id: row.get("reply_to_id"),
            content: row.get("content"),
            ts: row.get("ts"),
        },
        author: User {
            id: row.get("author_row_id"),
            username: row.get("author_username"),
            name: row.get("author_name"),
            summary: row.get("author_summary"),
            ts: row.get("author_ts"),
        },
    })
}

fn edge_with_targets_from_row(row: &SqliteRow) -> ApResult<EdgeWithTargets> {
    let edge = RelationshipEdge::try_from(EdgeRow {
        id: row.get("id"),
        kind: row.get("type"),
        actor_user_id: row.get("actor_user_id"),
        actor_url: row.get("actor_url"),
        object_user_id: row.get("object_user_id"),
        object_blip_id: row.get("object_blip_id"),
        object_url: row.get("object_url"),
        approved: row.get("approved"),
        approved_at: row.get("approved_at"),
        ts: row.get("ts"),
    })?;

    let actor_user = row.get::<Option<i64>, _>("au_id").map(|id| User {
        id,
        username: row.get("au_username"),
        name: row.get("au_name"),
        summary: row.get("au_summary"),
        ts: row.get("au_ts"),
    });

    let object_user = row.get::<Option<i64>, _>("ou_id").map(|id| User {
        id,
        username: row.get("ou_username"),
        name: row.get("ou_name"),
        summary: row.get("ou_summary"),
        ts: row.get("ou_ts"),
    });

    let object_blip = match row.get::<Option<i64>, _>("ob_id") {
        Some(id) => {
            let author = row
                .get::<Option<i64>, _>("oba_id")
                .map(|author_id| User {
                    id: author_id,
                    username: row.get("oba_username"),
                    name: row.get("oba_name"),
                    summary: row.get("oba_summary"),
                    ts: row.get("oba_ts"),
                })
                .ok_or_else(|| {
                    ApError::Internal(format!("blip {} is missing its author row", id))
                })?;

            Some(BlipWithAuthor {
                blip: Blip {
                    id,
                    uuid: row.get("ob_uuid"),
                    author_id: row.get("ob_author_id"),
                    reply_to_id: row.get("ob_reply_to_id"),
                    content: row.get("ob_content"),
                    ts: row.get("ob_ts"),
                },
                author,
            })
        }
        None => None,
    };

    Ok(EdgeWithTargets {
        edge,
        actor_user,
        object_user,
        object_blip,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn user_lookup_round_trips() {
        let store = memory_store().await;
        let user = seed_user(&store, "john").await;

        let by_name = store.user_by_username("john").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert!(store.user_by_username("jane").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn token_lookup_yields_the_owner() {
        let store = memory_store().await;
        let user = seed_user(&store, "john").await;
        store.insert_token(user.id, "sekrit").await.unwrap();

        let found = store.user_by_token("sekrit").await.unwrap().unwrap();
        assert_eq!(found.username, "john");
        assert!(store.user_by_token("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blips_load_with_their_author() {
        let store = memory_store().await;
        let user = seed_user(&store, "jane").await;
        let blip = seed_blip(&store, &user, "first post").await;

        let found = store
            .blip_by_uuid(&blip.blip.uuid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.blip.content, "first post");
        assert_eq!(found.author.username, "jane");
    }

    #[tokio::test]
    async fn edge_existence_discriminates_object_identity() {
        let store = memory_store().await;
        let john = seed_user(&store, "john").await;
        let jane = seed_user(&store, "jane").await;

        store
            .insert_edge(NewEdge {
                kind: EdgeKind::Follow,
                actor: ActorIdentity::Local(john.id),
                object: ObjectIdentity::Actor(jane.id),
                approved: Some(true),
                approved_at: None,
            })
            .await
            .unwrap();

        assert!(store
            .find_edge(EdgeKind::Follow, john.id, &ObjectIdentity::Actor(jane.id))
            .await
            .unwrap()
            .is_some());
        // Different kind, different object → no match
        assert!(store
            .find_edge(EdgeKind::Like, john.id, &ObjectIdentity::Actor(jane.id))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_edge(
                EdgeKind::Follow,
                john.id,
                &ObjectIdentity::Remote("https://elsewhere.example/@jane".into())
            )
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deleting_an_edge_clears_the_lookup() {
        let store = memory_store().await;
        let john = seed_user(&store, "john").await;
        let jane = seed_user(&store, "jane").await;

        let edge = store
            .insert_edge(NewEdge {
                kind: EdgeKind::Follow,
                actor: ActorIdentity::Local(john.id),
                object: ObjectIdentity::Actor(jane.id),
                approved: Some(true),
                approved_at: None,
            })
            .await
            .unwrap();

        store.delete_edge(edge.id).await.unwrap();

        assert!(store
            .find_edge(EdgeKind::Follow, john.id, &ObjectIdentity::Actor(jane.id))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn follower_pages_carry_the_eager_graph() {
        let store = memory_store().await;
        let john = seed_user(&store, "john").await;
        let jane = seed_user(&store, "jane").await;

        seed_edge_at(
            &store,
            EdgeKind::Follow,
            &john,
            ObjectIdentity::Actor(jane.id),
            100,
        )
        .await;

        assert_eq!(store.count_followers(jane.id).await.unwrap(), 1);
        let page = store.followers_page(jane.id, 10, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].actor_user.as_ref().unwrap().username, "john");
        assert_eq!(page[0].object_user.as_ref().unwrap().username, "jane");
    }

    #[tokio::test]
    async fn bulk_refetch_returns_all_requested_rows() {
        let store = memory_store().await;
        let user = seed_user(&store, "jane").await;
        let a = seed_blip_at(&store, &user, "a", 1).await;
        let b = seed_blip_at(&store, &user, "b", 2).await;

        let fetched = store
            .blips_by_ids(&[a.blip.id, b.blip.id])
            .await
            .unwrap();
        assert_eq!(fetched.len(), 2);

        assert!(store.blips_by_ids(&[]).await.unwrap().is_empty());
    }
}
