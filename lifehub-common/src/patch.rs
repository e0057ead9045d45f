//! Partial-update helpers
//!
//! Update payloads use `Option<T>` for "leave unchanged". Nullable columns
//! need a third state, so they use `Option<Option<T>>` with
//! [`deserialize_some`]: absent is `None`, explicit `null` is `Some(None)`.

use serde::{Deserialize, Deserializer};

/// Wrap any present value (including `null`) in `Some`
///
/// Use together with `#[serde(default)]`.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Apply a patch field onto the current value
pub fn merge<T>(current: T, patch: Option<T>) -> T {
    patch.unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "deserialize_some")]
        due: Option<Option<String>>,
        title: Option<String>,
    }

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert!(absent.due.is_none());

        let cleared: Patch = serde_json::from_str(r#"{"due": null}"#).unwrap();
        assert_eq!(cleared.due, Some(None));

        let set: Patch = serde_json::from_str(r#"{"due": "2024-01-01", "title": "x"}"#).unwrap();
        assert_eq!(set.due, Some(Some("2024-01-01".to_string())));
        assert_eq!(merge("old".to_string(), set.title), "x");
    }
}
