//! Utility functions

/// Convert PascalCase, camelCase or kebab-case to snake_case.
///
/// Runs of capitals stay together: `HTTPServer` becomes `http_server`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '.' {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if !result.is_empty() && !result.ends_with('_') && (prev_lower || (prev_upper && next_lower)) {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Convert snake_case or kebab-case to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    s.split(['_', '-', ' ', '.'])
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

/// Lower-case header/metadata key for an attribute name.
pub fn to_header_key(s: &str) -> String {
    to_snake_case(s).replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_conversion() {
        assert_eq!(to_snake_case("RequiredString"), "required_string");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("request-id"), "request_id");
        assert_eq!(to_snake_case("address"), "address");
        assert_eq!(to_snake_case("Int32Map"), "int32_map");

        assert_eq!(to_pascal_case("create_order"), "CreateOrder");
        assert_eq!(to_pascal_case("RequiredString"), "RequiredString");
        assert_eq!(to_pascal_case("x-request-id"), "XRequestId");
    }

    #[test]
    fn test_header_key() {
        assert_eq!(to_header_key("RequestID"), "request-id");
        assert_eq!(to_header_key("api_key"), "api-key");
    }
}
