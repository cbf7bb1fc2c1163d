/// Entity identifiers are opaque strings owned by the persistence layer.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh identifier for an entity created locally.
pub fn new_entity_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// Canonical form of a name used for case- and whitespace-insensitive
/// comparisons: trimmed, inner whitespace collapsed, lowercased.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Compare two names ignoring case and surrounding/inner whitespace runs.
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  On   Review "), "on review");
        assert_eq!(normalize_name("DONE"), "done");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn names_match_ignores_case_and_spacing() {
        assert!(names_match("On Review", "on  review"));
        assert!(names_match("\tDone\n", "done"));
        assert!(!names_match("On Review", "OnReview"));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
