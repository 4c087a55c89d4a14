// src/names.rs
//
// =============================================================================
// ODLC: NAME CLASSIFIER
// =============================================================================
//
// Classifies artifact names into the four categories from the data model:
// Job Document, Project Document, Reserved, Private. Order matters: reserved
// and private checks run before the Project Document pattern, so a malformed
// name can't smuggle itself past classification by also containing a ':'.

use std::fmt;

/// The classification of a declared or referenced artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameClass {
    /// Internal, writable. No `:` or `#`, no `__`, doesn't start with `_`.
    JobDocument,
    /// External, read-only. `Name:ResourceID[@Version]`.
    ProjectDocument {
        name: String,
        resource_id: String,
        version: String,
    },
    /// Contains `__`. Rejected wherever a name is declared by the author.
    Reserved,
    /// Starts with `_`. Rejected wherever a name is declared by the author.
    Private,
}

pub const DEFAULT_VERSION: &str = "stable";

impl NameClass {
    pub fn is_project_document(&self) -> bool {
        matches!(self, NameClass::ProjectDocument { .. })
    }
}

impl fmt::Display for NameClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameClass::JobDocument => write!(f, "job document"),
            NameClass::ProjectDocument {
                name,
                resource_id,
                version,
            } => write!(f, "project document {name}:{resource_id}@{version}"),
            NameClass::Reserved => write!(f, "reserved name"),
            NameClass::Private => write!(f, "private name"),
        }
    }
}

/// Classify a raw artifact name string.
pub fn classify(raw: &str) -> NameClass {
    if raw.contains("__") {
        return NameClass::Reserved;
    }
    if raw.starts_with('_') {
        return NameClass::Private;
    }
    if let Some((name, rest)) = raw.split_once(':') {
        let (resource_id, version) = match rest.split_once('@') {
            Some((res, ver)) => (res.to_string(), ver.to_string()),
            None => (rest.to_string(), DEFAULT_VERSION.to_string()),
        };
        return NameClass::ProjectDocument {
            name: name.to_string(),
            resource_id,
            version,
        };
    }
    NameClass::JobDocument
}

/// Render a Project Document back to its canonical external reference form,
/// `Name:ResourceID@Version`, defaulting a missing version to `@stable`.
pub fn external_reference(name: &str, resource_id: &str, version: &str) -> String {
    format!("{name}:{resource_id}@{version}")
}
