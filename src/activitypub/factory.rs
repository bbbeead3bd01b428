/// Collection Factory - pure builders for protocol envelope objects
///
/// Builds collection pointers, collection pages and Create wrappers from
/// primitive inputs. No I/O happens here; the Pagination Engine supplies
/// counts and item lists.
use crate::activitypub::vocab::AS_CONTEXT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Default collection page size
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Whether a collection advertises ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Ordered,
    Plain,
}

impl CollectionKind {
    fn pointer_type(&self) -> &'static str {
        match self {
            CollectionKind::Ordered => "OrderedCollection",
            CollectionKind::Plain => "Collection",
        }
    }

    fn page_type(&self) -> &'static str {
        match self {
            CollectionKind::Ordered => "OrderedCollectionPage",
            CollectionKind::Plain => "CollectionPage",
        }
    }
}

/// Summary envelope describing a paginated set without item payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub total_items: i64,
    pub first: String,
    pub last: String,
}

/// One page of items plus its navigation links
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPage {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub next: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    pub part_of: String,
    pub ordered_items: Vec<Value>,
}

/// Replace `key` in the URL's query, keeping every other parameter
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &retained {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(key, value);
}

/// Drop `key` from the URL's query, keeping every other parameter
fn remove_query_param(url: &mut Url, key: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        url.set_query(None);
        return;
    }

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &retained {
        pairs.append_pair(k, v);
    }
}

/// Index of the last page: `max(0, ceil(total / page_size) - 1)`
pub fn last_page_index(total: i64, page_size: i64) -> i64 {
    if total <= 0 || page_size <= 0 {
        return 0;
    }
    ((total + page_size - 1) / page_size - 1).max(0)
}

/// Build a collection pointer: id, totalItems, first and last page URLs.
/// The page size appears as a `count` query parameter only when it
/// differs from the default.
pub fn collection_envelope(
    kind: CollectionKind,
    base: &Url,
    path: &str,
    total_items: i64,
    page_size: i64,
) -> Collection {
    let mut url = base.clone();
    url.set_path(path);
    url.set_query(None);

    if page_size != DEFAULT_PAGE_SIZE {
        set_query_param(&mut url, "count", &page_size.to_string());
    }

    let id = url.to_string();

    set_query_param(&mut url, "page", "0");
    let first = url.to_string();

    set_query_param(
        &mut url,
        "page",
        &last_page_index(total_items, page_size).to_string(),
    );
    let last = url.to_string();

    Collection {
        context: AS_CONTEXT.to_string(),
        kind: kind.pointer_type().to_string(),
        id,
        total_items,
        first,
        last,
    }
}

/// Build one collection page. Incoming query parameters are preserved
/// verbatim on `id`, `next` and `prev`; `prev` is omitted on page 0 and
/// `partOf` is the same URL with the page parameter removed.
pub fn collection_page_envelope(
    kind: CollectionKind,
    base: &Url,
    path: &str,
    page_index: i64,
    items: Vec<Value>,
    query: &[(String, String)],
) -> CollectionPage {
    let mut url = base.clone();
    url.set_path(path);
    url.set_query(None);

    for (key, value) in query {
        set_query_param(&mut url, key, value);
    }

    let id = url.to_string();

    set_query_param(&mut url, "page", &(page_index + 1).to_string());
    let next = url.to_string();

    let prev = if page_index != 0 {
        set_query_param(&mut url, "page", &(page_index - 1).to_string());
        Some(url.to_string())
    } else {
        None
    };

    remove_query_param(&mut url, "page");
    let part_of = url.to_string();

    CollectionPage {
        context: AS_CONTEXT.to_string(),
        kind: kind.page_type().to_string(),
        id,
        next,
        prev,
        part_of,
        ordered_items: items,
    }
}

/// Wrap a bare object or link in the Create activity that publishes it.
/// The activity id is derived from the object id when one exists;
/// addressing and publication fields are copied over.
pub fn wrap_as_create(object: &Map<String, Value>, actor: Value) -> Map<String, Value> {
    let mut activity = Map::new();
    activity.insert("@context".to_string(), Value::String(AS_CONTEXT.to_string()));
    activity.insert("type".to_string(), Value::String("Create".to_string()));

    if let Some(id) = object.get("id").and_then(Value::as_str) {
        activity.insert("id".to_string(), Value::String(format!("{}/activity", id)));
    }

    activity.insert("actor".to_string(), actor);

    for key in ["to", "bto", "cc", "bcc", "published"] {
        if let Some(value) = object.get(key) {
            activity.insert(key.to_string(), value.clone());
        }
    }

    activity.insert("object".to_string(), Value::Object(object.clone()));
    activity
}
