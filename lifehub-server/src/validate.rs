//! Field validation shared by the request payloads

use crate::error::{ApiError, ApiResult};

/// Trimmed, non-empty text no longer than `max` characters
pub fn required_text(field: &str, value: &str, max: usize) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::field(field, "This field may not be blank."));
    }
    max_len(field, value, max)?;
    Ok(value.to_string())
}

pub fn max_len(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::field(
            field,
            format!("Ensure this field has no more than {} characters.", max),
        ));
    }
    Ok(())
}

/// Minimal address check: one `@`, a non-empty local part and a dotted domain
pub fn email(field: &str, value: &str) -> ApiResult<String> {
    let value = value.trim().to_lowercase();
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::field(field, "Enter a valid email address."));
    }
    max_len(field, &value, 254)?;
    Ok(value)
}

/// `#rrggbb` color
pub fn hex_color(field: &str, value: &str) -> ApiResult<String> {
    let ok = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !ok {
        return Err(ApiError::field(field, "Enter a color like #1890ff."));
    }
    Ok(value.to_string())
}

pub fn non_negative(field: &str, value: f64) -> ApiResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(ApiError::field(field, "Ensure this value is greater than or equal to 0."));
    }
    Ok(value)
}

pub fn positive(field: &str, value: f64) -> ApiResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::field(field, "Ensure this value is greater than 0."));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("title", "  Buy milk ", 200).unwrap(), "Buy milk");
        assert!(required_text("title", "   ", 200).is_err());
        assert!(required_text("title", "abcdef", 5).is_err());
    }

    #[test]
    fn test_email() {
        assert_eq!(email("email", "Ann@Example.com").unwrap(), "ann@example.com");
        for bad in ["", "ann", "ann@", "@example.com", "ann@example", "a b@example.com", "a@b@c.com"] {
            assert!(email("email", bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_hex_color() {
        assert!(hex_color("color", "#1890ff").is_ok());
        assert!(hex_color("color", "1890ff").is_err());
        assert!(hex_color("color", "#zz90ff").is_err());
    }
}
