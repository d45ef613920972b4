//! The one name rule: Rust identifier → GraphQL field name.
use once_cell::sync::Lazy;
use regex::Regex;

static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[_A-Za-z][_0-9A-Za-z]*$").unwrap());

pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

pub fn is_reserved(name: &str) -> bool {
    name.starts_with("__")
}

/// Strip `r#`, keep leading underscores, snake_case → lowerCamelCase.
///
/// `created_at` → `createdAt`, `r#type` → `type`, `__type` → `__type`.
pub fn field_name(ident: &str) -> String {
    let ident = ident.strip_prefix("r#").unwrap_or(ident);
    let body = ident.trim_start_matches('_');
    let mut out = String::with_capacity(ident.len());
    out.push_str(&ident[..ident.len() - body.len()]);

    let mut upper_next = false;
    for (i, c) in body.chars().enumerate() {
        if c == '_' {
            upper_next = true;
            continue;
        }
        if upper_next && i > 0 {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper_next = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_becomes_lower_camel() {
        assert_eq!(field_name("created_at"), "createdAt");
        assert_eq!(field_name("include_deprecated"), "includeDeprecated");
        assert_eq!(field_name("hello"), "hello");
        assert_eq!(field_name("a_b_c"), "aBC");
    }

    #[test]
    fn raw_identifiers_and_leading_underscores() {
        assert_eq!(field_name("r#type"), "type");
        assert_eq!(field_name("__type"), "__type");
        assert_eq!(field_name("_private_thing"), "_privateThing");
    }

    #[test]
    fn rule_is_stable() {
        for ident in ["of_type", "query_type", "enum_values"] {
            assert_eq!(field_name(ident), field_name(ident));
        }
        assert_eq!(field_name("of_type"), "ofType");
    }

    #[test]
    fn name_validity() {
        assert!(is_valid_name("Query"));
        assert!(is_valid_name("_x1"));
        assert!(!is_valid_name("1x"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(""));
        assert!(is_reserved("__Type"));
        assert!(!is_reserved("_Type"));
    }
}
