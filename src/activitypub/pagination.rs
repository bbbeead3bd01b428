/// Pagination Engine
///
/// Parses page-size/page-number parameters, drives single-source paging,
/// and unions heterogeneous record tables into one globally time-ordered
/// collection. Produces input for the Collection Factory.
use crate::{
    activitypub::factory::{
        self, CollectionKind, DEFAULT_PAGE_SIZE,
    },
    error::{ApError, ApResult},
    store::{
        models::{BlipWithAuthor, EdgeKind, EdgeWithTargets},
        SourceKind, SourceRow, Store,
    },
};
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use url::Url;

/// Parsed pagination parameters.
///
/// `count`/`limit` set the page size (default 10); a present `page`
/// parameter selects the page view. Both must parse as finite
/// non-negative integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page_size: i64,
    pub page: Option<i64>,
}

impl PageParams {
    pub fn from_query(query: &[(String, String)]) -> ApResult<Self> {
        let first = |key: &str| {
            query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let page_size = match first("count").or_else(|| first("limit")) {
            Some(raw) => parse_non_negative(raw, "count")?,
            None => DEFAULT_PAGE_SIZE,
        };

        let page = match first("page") {
            Some(raw) => Some(parse_non_negative(raw, "page")?),
            None => None,
        };

        Ok(Self { page_size, page })
    }

    fn offset(&self, page: i64) -> i64 {
        self.page_size.saturating_mul(page)
    }
}

fn parse_non_negative(raw: &str, name: &str) -> ApResult<i64> {
    let value: i64 = raw
        .parse()
        .map_err(|_| ApError::Input(format!("{} must be a finite non-negative integer", name)))?;

    if value < 0 {
        return Err(ApError::Input(format!(
            "{} must be a finite non-negative integer",
            name
        )));
    }

    Ok(value)
}

/// Page a single source into a collection envelope.
///
/// Without a `page` parameter only `count` runs and a collection pointer
/// is returned; with one, `items` is fetched with
/// `limit = page_size, offset = page_size * page` and wrapped as a
/// collection page.
pub async fn paginate<C, CFut, I, IFut>(
    kind: CollectionKind,
    base: &Url,
    path: &str,
    query: &[(String, String)],
    count: C,
    items: I,
) -> ApResult<Value>
where
    C: FnOnce() -> CFut,
    CFut: Future<Output = ApResult<i64>>,
    I: FnOnce(i64, i64) -> IFut,
    IFut: Future<Output = ApResult<Vec<Value>>>,
{
    let params = PageParams::from_query(query)?;

    match params.page {
        Some(page) => {
            let items = items(params.page_size, params.offset(page)).await?;
            let envelope =
                factory::collection_page_envelope(kind, base, path, page, items, query);
            Ok(serde_json::to_value(envelope)
                .map_err(|e| ApError::Internal(format!("envelope serialization: {}", e)))?)
        }
        None => {
            let total = count().await?;
            let envelope =
                factory::collection_envelope(kind, base, path, total, params.page_size);
            Ok(serde_json::to_value(envelope)
                .map_err(|e| ApError::Internal(format!("envelope serialization: {}", e)))?)
        }
    }
}

/// One typed source feeding a union collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionQuery {
    /// Blips authored by a user
    AuthorBlips { author_id: i64 },
    /// Edges of one kind enacted by a user
    ActorEdges { kind: EdgeKind, actor_id: i64 },
}

impl UnionQuery {
    fn source_kind(&self) -> SourceKind {
        match self {
            UnionQuery::AuthorBlips { .. } => SourceKind::Blips,
            UnionQuery::ActorEdges { .. } => SourceKind::Edges,
        }
    }

    async fn count(&self, store: &Store) -> ApResult<i64> {
        match self {
            UnionQuery::AuthorBlips { author_id } => {
                store.count_blips_by_author(*author_id).await
            }
            UnionQuery::ActorEdges { kind, actor_id } => {
                store.count_edges_by_actor(*kind, *actor_id).await
            }
        }
    }

    async fn window(&self, store: &Store, limit: i64) -> ApResult<Vec<SourceRow>> {
        match self {
            UnionQuery::AuthorBlips { author_id } => {
                store.blips_window_by_author(*author_id, limit).await
            }
            UnionQuery::ActorEdges { kind, actor_id } => {
                store.edges_window_by_actor(*kind, *actor_id, limit).await
            }
        }
    }
}

/// A fully re-fetched union member, with its eager-load graph applied
#[derive(Debug, Clone)]
pub enum UnionRecord {
    Blip(BlipWithAuthor),
    Edge(EdgeWithTargets),
}

impl UnionRecord {
    fn key(&self) -> (SourceKind, i64) {
        match self {
            UnionRecord::Blip(blip) => (SourceKind::Blips, blip.blip.id),
            UnionRecord::Edge(edge) => (SourceKind::Edges, edge.edge.id),
        }
    }
}

/// Page a union of heterogeneous sources into one collection envelope
/// with a single consistent temporal order.
///
/// Every source is projected to `(source, id, timestamp)` triples; the
/// projections are merged, ordered by timestamp descending and sliced by
/// the requested limit/offset. Sliced ids are then re-fetched in bulk
/// from their owning tables and re-ordered to match the slice, since
/// fetch order is not authoritative. Ties in timestamp have unspecified
/// relative order. Pointer totals sum the per-source counts.
///
/// Passing no sources is a programming error.
pub async fn paginate_union<T>(
    store: &Store,
    kind: CollectionKind,
    base: &Url,
    path: &str,
    query: &[(String, String)],
    sources: &[UnionQuery],
    transform: T,
) -> ApResult<Value>
where
    T: Fn(&UnionRecord) -> ApResult<Value>,
{
    if sources.is_empty() {
        return Err(ApError::Internal(
            "paginate_union requires at least one source".to_string(),
        ));
    }

    let params = PageParams::from_query(query)?;

    match params.page {
        None => {
            // Pointer view: sum per-source counts, fetch nothing.
            let counts = try_join_all(sources.iter().map(|s| s.count(store))).await?;
            let total = counts.iter().sum();
            let envelope = factory::collection_envelope(kind, base, path, total, params.page_size);
            Ok(serde_json::to_value(envelope)
                .map_err(|e| ApError::Internal(format!("envelope serialization: {}", e)))?)
        }
        Some(page) => {
            let offset = params.offset(page);
            // Each source only needs its own top offset+limit rows for the
            // global slice to be exact.
            let window = offset.saturating_add(params.page_size);

            let windows =
                try_join_all(sources.iter().map(|s| s.window(store, window))).await?;

            let mut merged: Vec<SourceRow> = windows.into_iter().flatten().collect();
            merged.sort_by(|a, b| b.ts.cmp(&a.ts));

            let slice: Vec<SourceRow> = merged
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(params.page_size.max(0) as usize)
                .collect();

            // Group sliced ids by owning table, bulk re-fetch with each
            // table's eager-load graph.
            let blip_ids: Vec<i64> = slice
                .iter()
                .filter(|r| r.kind == SourceKind::Blips)
                .map(|r| r.id)
                .collect();
            let edge_ids: Vec<i64> = slice
                .iter()
                .filter(|r| r.kind == SourceKind::Edges)
                .map(|r| r.id)
                .collect();

            let (blips, edges) = futures::try_join!(
                store.blips_by_ids(&blip_ids),
                store.edges_by_ids(&edge_ids)
            )?;

            let mut by_key: HashMap<(SourceKind, i64), UnionRecord> = HashMap::new();
            for blip in blips {
                let record = UnionRecord::Blip(blip);
                by_key.insert(record.key(), record);
            }
            for edge in edges {
                let record = UnionRecord::Edge(edge);
                by_key.insert(record.key(), record);
            }

            // Re-order to the sliced sequence before transforming.
            let mut items = Vec::with_capacity(slice.len());
            for row in &slice {
                let record = by_key.get(&(row.kind, row.id)).ok_or_else(|| {
                    ApError::Internal(format!(
                        "union row {:?}/{} vanished during re-fetch",
                        row.kind, row.id
                    ))
                })?;
                items.push(transform(record)?);
            }

            let envelope = factory::collection_page_envelope(kind, base, path, page, items, query);
            Ok(serde_json::to_value(envelope)
                .map_err(|e| ApError::Internal(format!("envelope serialization: {}", e)))?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::ObjectIdentity;
    use crate::store::testing::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://blip.example").unwrap()
    }

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn page_params_default_and_parse() {
        let defaults = PageParams::from_query(&[]).unwrap();
        assert_eq!(defaults.page_size, 10);
        assert_eq!(defaults.page, None);

        let custom = PageParams::from_query(&query(&[("count", "5"), ("page", "2")])).unwrap();
        assert_eq!(custom.page_size, 5);
        assert_eq!(custom.page, Some(2));

        // `limit` is an alias for `count`
        let limit = PageParams::from_query(&query(&[("limit", "25")])).unwrap();
        assert_eq!(limit.page_size, 25);
    }

    #[test]
    fn malformed_parameters_are_input_errors() {
        for q in [
            query(&[("count", "banana")]),
            query(&[("count", "-1")]),
            query(&[("page", "banana")]),
            query(&[("page", "-3")]),
            query(&[("page", "1.5")]),
        ] {
            match PageParams::from_query(&q) {
                Err(ApError::Input(_)) => {}
                other => panic!("expected input error, got {:?}", other.map(|_| ())),
            }
        }
    }

    #[tokio::test]
    async fn pointer_view_never_fetches_items() {
        let value = paginate(
            CollectionKind::Ordered,
            &base(),
            "/@john/outbox",
            &[],
            || async { Ok(11) },
            |_limit, _offset| async {
                panic!("items must not run for the pointer view");
            },
        )
        .await
        .unwrap();

        assert_eq!(value["type"], "OrderedCollection");
        assert_eq!(value["totalItems"], 11);
        assert_eq!(value["first"], "https://blip.example/@john/outbox?page=0");
        assert_eq!(value["last"], "https://blip.example/@john/outbox?page=1");
    }

    #[tokio::test]
    async fn page_view_fetches_with_derived_offset() {
        let value = paginate(
            CollectionKind::Ordered,
            &base(),
            "/@john/outbox",
            &query(&[("count", "5"), ("page", "3")]),
            || async { panic!("count must not run for the page view") },
            |limit, offset| async move {
                assert_eq!(limit, 5);
                assert_eq!(offset, 15);
                Ok(vec![json!("a"), json!("b")])
            },
        )
        .await
        .unwrap();

        assert_eq!(value["type"], "OrderedCollectionPage");
        assert_eq!(value["orderedItems"], json!(["a", "b"]));
        assert_eq!(
            value["next"],
            "https://blip.example/@john/outbox?count=5&page=4"
        );
        assert_eq!(
            value["prev"],
            "https://blip.example/@john/outbox?count=5&page=2"
        );
    }

    #[tokio::test]
    async fn union_preserves_global_temporal_order() {
        let store = memory_store().await;
        let user = seed_user(&store, "jane").await;
        let target = seed_user(&store, "john").await;

        // Blips at t=5, 3, 1; reblip edges at t=4, 2.
        let b5 = seed_blip_at(&store, &user, "five", 5).await;
        let b3 = seed_blip_at(&store, &user, "three", 3).await;
        let b1 = seed_blip_at(&store, &user, "one", 1).await;
        let victim = seed_blip_at(&store, &target, "victim", 0).await;
        let e4 = seed_edge_at(
            &store,
            EdgeKind::Reblip,
            &user,
            ObjectIdentity::Post(victim.blip.id),
            4,
        )
        .await;
        let e2 = seed_edge_at(
            &store,
            EdgeKind::Reblip,
            &user,
            ObjectIdentity::Post(victim.blip.id),
            2,
        )
        .await;

        let sources = [
            UnionQuery::AuthorBlips { author_id: user.id },
            UnionQuery::ActorEdges {
                kind: EdgeKind::Reblip,
                actor_id: user.id,
            },
        ];

        let value = paginate_union(
            &store,
            CollectionKind::Ordered,
            &base(),
            "/@jane/outbox",
            &query(&[("count", "5"), ("page", "0")]),
            &sources,
            |record| {
                Ok(match record {
                    UnionRecord::Blip(b) => json!({ "blip": b.blip.id }),
                    UnionRecord::Edge(e) => json!({ "edge": e.edge.id }),
                })
            },
        )
        .await
        .unwrap();

        let items = value["orderedItems"].as_array().unwrap();
        assert_eq!(
            items.to_vec(),
            vec![
                json!({ "blip": b5.blip.id }),
                json!({ "edge": e4 }),
                json!({ "blip": b3.blip.id }),
                json!({ "edge": e2 }),
                json!({ "blip": b1.blip.id }),
            ]
        );
    }

    #[tokio::test]
    async fn union_slices_across_sources() {
        let store = memory_store().await;
        let user = seed_user(&store, "jane").await;
        let target = seed_user(&store, "john").await;

        let victim = seed_blip_at(&store, &target, "victim", 0).await;
        seed_blip_at(&store, &user, "five", 5).await;
        let b3 = seed_blip_at(&store, &user, "three", 3).await;
        let e4 = seed_edge_at(
            &store,
            EdgeKind::Reblip,
            &user,
            ObjectIdentity::Post(victim.blip.id),
            4,
        )
        .await;
        let e2 = seed_edge_at(
            &store,
            EdgeKind::Reblip,
            &user,
            ObjectIdentity::Post(victim.blip.id),
            2,
        )
        .await;

        let sources = [
            UnionQuery::AuthorBlips { author_id: user.id },
            UnionQuery::ActorEdges {
                kind: EdgeKind::Reblip,
                actor_id: user.id,
            },
        ];

        // Page 1 of size 2 over [5,4,3,2,1] → [3, 2]
        let value = paginate_union(
            &store,
            CollectionKind::Ordered,
            &base(),
            "/@jane/outbox",
            &query(&[("count", "2"), ("page", "1")]),
            &sources,
            |record| {
                Ok(match record {
                    UnionRecord::Blip(b) => json!(b.blip.id),
                    UnionRecord::Edge(e) => json!(e.edge.id),
                })
            },
        )
        .await
        .unwrap();

        assert_eq!(value["orderedItems"], json!([b3.blip.id, e2]));
    }

    #[tokio::test]
    async fn union_pointer_sums_source_counts() {
        let store = memory_store().await;
        let user = seed_user(&store, "jane").await;
        let target = seed_user(&store, "john").await;

        let victim = seed_blip_at(&store, &target, "victim", 0).await;
        seed_blip_at(&store, &user, "a", 1).await;
        seed_blip_at(&store, &user, "b", 2).await;
        seed_edge_at(
            &store,
            EdgeKind::Reblip,
            &user,
            ObjectIdentity::Post(victim.blip.id),
            3,
        )
        .await;

        let sources = [
            UnionQuery::AuthorBlips { author_id: user.id },
            UnionQuery::ActorEdges {
                kind: EdgeKind::Reblip,
                actor_id: user.id,
            },
        ];

        let value = paginate_union(
            &store,
            CollectionKind::Ordered,
            &base(),
            "/@jane/outbox",
            &[],
            &sources,
            |_| Ok(json!(null)),
        )
        .await
        .unwrap();

        assert_eq!(value["type"], "OrderedCollection");
        assert_eq!(value["totalItems"], 3);
    }

    #[tokio::test]
    async fn union_with_no_sources_is_a_programming_error() {
        let store = memory_store().await;

        let result = paginate_union(
            &store,
            CollectionKind::Ordered,
            &base(),
            "/@jane/outbox",
            &[],
            &[],
            |_| Ok(json!(null)),
        )
        .await;

        assert!(matches!(result, Err(ApError::Internal(_))));
    }
}
