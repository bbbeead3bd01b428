/// Reference Resolver
///
/// Shallow-walks an activity's string-keyed entries, turning URL and
/// embedded-stub values into rendered local objects. Resolution metadata
/// is carried in a side-table on the resolved activity and never merged
/// into the wire representation; the wire form is recovered with
/// [`ResolvedActivity::into_wire`].
use crate::{
    activitypub::{render::LocalResource, routing},
    error::{ApError, ApResult},
    store::models::ObjectIdentity,
    store::Store,
};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

/// Where a reference landed. A remote target is asserted by URL only and
/// never dereferenced, so it structurally carries no resource.
#[derive(Debug, Clone)]
pub enum ResolvedTarget {
    Local(LocalResource),
    Remote(String),
}

/// Resolver metadata for one resolved field
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub target: ResolvedTarget,
}

impl ResolvedReference {
    pub fn is_remote(&self) -> bool {
        matches!(self.target, ResolvedTarget::Remote(_))
    }

    pub fn resource(&self) -> Option<&LocalResource> {
        match &self.target {
            ResolvedTarget::Local(resource) => Some(resource),
            ResolvedTarget::Remote(_) => None,
        }
    }

    /// The identity used for edge lookups: local row id when the target
    /// is ours, the URL text when it is remote.
    pub fn object_identity(&self) -> ObjectIdentity {
        match &self.target {
            ResolvedTarget::Local(LocalResource::Actor(user)) => ObjectIdentity::Actor(user.id),
            ResolvedTarget::Local(LocalResource::Post(blip)) => {
                ObjectIdentity::Post(blip.blip.id)
            }
            ResolvedTarget::Remote(url) => ObjectIdentity::Remote(url.clone()),
        }
    }
}

/// An activity whose references have been resolved. Field values hold the
/// rendered protocol objects; the side-table remembers which fields were
/// resolved and to what.
#[derive(Debug, Clone)]
pub struct ResolvedActivity {
    pub(crate) activity: Map<String, Value>,
    pub(crate) refs: HashMap<String, ResolvedReference>,
}

impl ResolvedActivity {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.activity.get(key)
    }

    pub fn type_str(&self) -> Option<&str> {
        self.activity.get("type").and_then(Value::as_str)
    }

    /// Resolver metadata for a field, if it was resolved
    pub fn reference(&self, key: &str) -> Option<&ResolvedReference> {
        self.refs.get(key)
    }

    /// Flatten back to the wire representation, discarding metadata
    pub fn into_wire(self) -> Map<String, Value> {
        self.activity
    }
}

/// The id a reference value asserts: the string itself, or the `id` field
/// of an embedded object.
pub fn reference_id(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj.get("id").and_then(Value::as_str),
        _ => None,
    }
}

/// Resolve URL/stub references among an activity's entries.
///
/// If `keys` is given only those fields are considered, otherwise every
/// field except `@context`. String values that do not parse as URLs and
/// object values without an `id` URL pass through unchanged. The
/// per-field lookups run concurrently; the operation is all-or-nothing
/// and the first failing field (in field order) aborts the whole call.
pub async fn resolve_references(
    store: &Store,
    base: &Url,
    activity: Map<String, Value>,
    keys: Option<&[&str]>,
) -> ApResult<ResolvedActivity> {
    let mut candidates: Vec<(String, Url)> = Vec::new();

    for (key, value) in &activity {
        if let Some(keys) = keys {
            if !keys.contains(&key.as_str()) {
                continue;
            }
        } else if key == "@context" {
            continue;
        }

        let url = match value {
            Value::String(s) => match Url::parse(s) {
                Ok(url) => url,
                Err(_) => continue,
            },
            Value::Object(obj) => match obj.get("id").and_then(Value::as_str) {
                Some(id) => match Url::parse(id) {
                    Ok(url) => url,
                    Err(_) => continue,
                },
                None => continue,
            },
            _ => continue,
        };

        candidates.push((key.clone(), url));
    }

    // Per-field lookups are independent; dispatch them together and join.
    let lookups = join_all(
        candidates
            .iter()
            .map(|(_, url)| resolve_one(store, base, url)),
    )
    .await;

    let mut activity = activity;
    let mut refs = HashMap::new();

    for ((key, _), outcome) in candidates.into_iter().zip(lookups) {
        // All-or-nothing: the first failure discards partial work.
        let resource = outcome?;
        activity.insert(key.clone(), resource.to_object(base));
        refs.insert(
            key,
            ResolvedReference {
                target: ResolvedTarget::Local(resource),
            },
        );
    }

    Ok(ResolvedActivity { activity, refs })
}

async fn resolve_one(store: &Store, base: &Url, url: &Url) -> ApResult<LocalResource> {
    if !routing::is_internal(base, url) {
        return Err(ApError::FederationUnsupported);
    }

    routing::resolve_path(store, url.path())
        .await?
        .ok_or_else(|| ApError::UnresolvedReference(url.to_string()))
}
