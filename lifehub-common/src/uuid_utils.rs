//! Identifier helpers
//!
//! Records are keyed by hyphenated UUIDv4 strings stored as TEXT.

use uuid::Uuid;

/// Generate a new record identifier
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}

/// Validate and normalize an identifier supplied by a client
pub fn parse(s: &str) -> Result<String, uuid::Error> {
    Uuid::parse_str(s).map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_parseable_and_unique() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
        assert_eq!(parse(&a).unwrap(), a);
    }

    #[test]
    fn test_parse_normalizes_case() {
        let id = "67E55044-10B1-426F-9247-BB680E5FE0C8";
        assert_eq!(parse(id).unwrap(), id.to_lowercase());
        assert!(parse("not-a-uuid").is_err());
    }
}
