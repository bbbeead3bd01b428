/// ActivityStreams vocabulary tables and the handled-activity enum
use crate::error::ApError;
use serde_json::{Map, Value};

/// The ActivityStreams JSON-LD namespace
pub const AS_CONTEXT: &str = "https://www.w3.org/ns/activitystreams";

/// The special public audience collection
pub const AS_PUBLIC: &str = "https://www.w3.org/ns/activitystreams#Public";

pub const ACTIVITY_TYPES: &[&str] = &[
    "Accept",
    "Add",
    "Announce",
    "Arrive",
    "Block",
    "Create",
    "Delete",
    "Dislike",
    "Flag",
    "Follow",
    "Ignore",
    "Invite",
    "Join",
    "Leave",
    "Like",
    "Listen",
    "Move",
    "Offer",
    "Question",
    "Reject",
    "Read",
    "Remove",
    "TentativeReject",
    "TentativeAccept",
    "Travel",
    "Undo",
    "Update",
    "View",
];

pub const OBJECT_TYPES: &[&str] = &[
    "Article",
    "Audio",
    "Document",
    "Event",
    "Image",
    "Note",
    "Page",
    "Place",
    "Profile",
    "Relationship",
    "Tombstone",
    "Video",
];

pub const LINK_TYPES: &[&str] = &["Mention"];

pub fn is_activity_type(t: &str) -> bool {
    ACTIVITY_TYPES.contains(&t)
}

pub fn is_object_type(t: &str) -> bool {
    OBJECT_TYPES.contains(&t)
}

pub fn is_link_type(t: &str) -> bool {
    LINK_TYPES.contains(&t)
}

/// True when the object's `@context` is the ActivityStreams namespace or
/// an array containing it.
pub fn has_activitystreams_context(obj: &Map<String, Value>) -> bool {
    match obj.get("@context") {
        Some(Value::String(s)) => s == AS_CONTEXT,
        Some(Value::Array(items)) => items
            .iter()
            .any(|v| v.as_str() == Some(AS_CONTEXT)),
        _ => false,
    }
}

/// The activity types this node actually processes. Parsing is exhaustive:
/// an unknown type is a protocol-level fault, not user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Create,
    Follow,
    Like,
    Announce,
    Undo,
}

impl ActivityKind {
    pub fn from_type(t: &str) -> Result<Self, ApError> {
        match t {
            "Create" => Ok(ActivityKind::Create),
            "Follow" => Ok(ActivityKind::Follow),
            "Like" => Ok(ActivityKind::Like),
            "Announce" => Ok(ActivityKind::Announce),
            "Undo" => Ok(ActivityKind::Undo),
            other => Err(ApError::Protocol(format!(
                "no verifier for activity type {:?}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Create => "Create",
            ActivityKind::Follow => "Follow",
            ActivityKind::Like => "Like",
            ActivityKind::Announce => "Announce",
            ActivityKind::Undo => "Undo",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn context_matches_string_or_array() {
        let string_ctx = json!({ "@context": AS_CONTEXT });
        let array_ctx = json!({ "@context": [AS_CONTEXT, { "manuallyApprovesFollowers": "as:manuallyApprovesFollowers" }] });
        let wrong = json!({ "@context": "https://example.com/ns" });
        let missing = json!({ "type": "Note" });

        assert!(has_activitystreams_context(string_ctx.as_object().unwrap()));
        assert!(has_activitystreams_context(array_ctx.as_object().unwrap()));
        assert!(!has_activitystreams_context(wrong.as_object().unwrap()));
        assert!(!has_activitystreams_context(missing.as_object().unwrap()));
    }

    #[test]
    fn unknown_activity_type_is_a_protocol_fault() {
        let err = ActivityKind::from_type("Transmogrify").unwrap_err();
        assert!(matches!(err, ApError::Protocol(_)));

        // Known-but-unhandled wire types are also protocol faults here;
        // the boundary filters against the vocabulary tables first.
        assert!(ActivityKind::from_type("Block").is_err());
        assert_eq!(
            ActivityKind::from_type("Announce").unwrap(),
            ActivityKind::Announce
        );
    }

    #[test]
    fn vocabulary_tables_classify_types() {
        assert!(is_activity_type("Undo"));
        assert!(is_object_type("Note"));
        assert!(is_link_type("Mention"));
        assert!(!is_object_type("Create"));
    }
}
