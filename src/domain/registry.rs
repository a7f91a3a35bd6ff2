//! Collection registry.
//!
//! The ordered set of collections that make up a user's dataset, each with
//! the field rules applied to incoming documents on restore. Export, import,
//! analysis and reset all walk this table in order.

use serde_json::{Map, Value};

/// How a missing required field gets filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Parse the trailing digits of the document id.
    DerivedFromId,
    /// Use a fixed string.
    Fixed(&'static str),
}

impl Fallback {
    /// Resolve a value for the document with the given id.
    #[must_use]
    pub fn resolve(self, id: &str) -> Option<Value> {
        match self {
            Self::DerivedFromId => number_from_id(id).map(Value::from),
            Self::Fixed(value) => Some(Value::String(value.to_string())),
        }
    }

    /// Human-readable description for preview warnings.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::DerivedFromId => "it will be auto-derived from 'id'".to_string(),
            Self::Fixed(value) => format!("it will default to \"{value}\""),
        }
    }
}

/// A required field and its fallback.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub fallback: Fallback,
}

impl FieldRule {
    /// Whether the field is missing or null in `document`.
    #[must_use]
    pub fn is_missing(&self, document: &Map<String, Value>) -> bool {
        document.get(self.field).is_none_or(Value::is_null)
    }
}

/// A one-level-deep subcollection family keyed by parent id.
#[derive(Debug, Clone, Copy)]
pub struct Subcollection {
    /// Store name under each parent document.
    pub name: &'static str,
    /// Archive key holding `{ parentId: [documents] }`.
    pub archive_key: &'static str,
    pub rules: &'static [FieldRule],
}

/// A registry entry.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub rules: &'static [FieldRule],
    pub subcollection: Option<Subcollection>,
}

/// Collections exported, imported and reset, in processing order.
pub const REGISTRY: &[CollectionSpec] = &[
    CollectionSpec {
        name: "knowledgeBase",
        rules: &[FieldRule {
            field: "pageNumber",
            fallback: Fallback::DerivedFromId,
        }],
        subcollection: None,
    },
    CollectionSpec {
        name: "materials",
        rules: &[],
        subcollection: Some(Subcollection {
            name: "chats",
            archive_key: "materialChats",
            rules: &[],
        }),
    },
    CollectionSpec {
        name: "studyPlans",
        rules: &[],
        subcollection: None,
    },
    CollectionSpec {
        name: "tasks",
        rules: &[FieldRule {
            field: "category",
            fallback: Fallback::Fixed("general"),
        }],
        subcollection: None,
    },
    CollectionSpec {
        name: "sessions",
        rules: &[],
        subcollection: None,
    },
    CollectionSpec {
        name: "flashcardDecks",
        rules: &[],
        subcollection: None,
    },
    CollectionSpec {
        name: "notes",
        rules: &[FieldRule {
            field: "category",
            fallback: Fallback::Fixed("general"),
        }],
        subcollection: None,
    },
];

/// Per-user configuration and memory collections. Cleared by reset only.
pub const SINGLETON_COLLECTIONS: &[&str] = &["settings", "mentorMemory"];

/// Look up a registry entry by collection name.
#[must_use]
pub fn find(name: &str) -> Option<&'static CollectionSpec> {
    REGISTRY.iter().find(|spec| spec.name == name)
}

/// Every nested family with its parent, in registry order.
pub fn nested_families() -> impl Iterator<Item = (&'static CollectionSpec, Subcollection)> {
    REGISTRY
        .iter()
        .filter_map(|spec| spec.subcollection.map(|sub| (spec, sub)))
}

/// Whether `key` is a known top-level or nested archive key.
#[must_use]
pub fn is_known_archive_key(key: &str) -> bool {
    find(key).is_some() || nested_families().any(|(_, sub)| sub.archive_key == key)
}

/// Rules a document does not yet satisfy.
fn missing_rules<'a>(
    rules: &'a [FieldRule],
    document: &'a Map<String, Value>,
) -> impl Iterator<Item = &'a FieldRule> + 'a {
    rules.iter().filter(move |rule| rule.is_missing(document))
}

/// Fill missing required fields in place. Returns the fields that were set.
pub fn apply_rules(
    rules: &[FieldRule],
    id: &str,
    document: &mut Map<String, Value>,
) -> Vec<&'static str> {
    let pending: Vec<FieldRule> = missing_rules(rules, document).copied().collect();
    let mut filled = Vec::new();
    for rule in pending {
        if let Some(value) = rule.fallback.resolve(id) {
            document.insert(rule.field.to_string(), value);
            filled.push(rule.field);
        }
    }
    filled
}

/// Trailing run of ASCII digits in `id`, e.g. `"page-12"` -> 12.
fn number_from_id(id: &str) -> Option<i64> {
    let prefix_len = id.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    id[prefix_len..].parse().ok()
}
