//! Naming conventions of the Web API URL space.

/// Derive an entity set (collection) name from an entity logical name.
///
/// The service exposes collections under pluralized names. The rule is the
/// naive English one the service itself applies: `y` becomes `ies`, a
/// trailing `s` or `x` gains `es`, everything else gains `s`. Irregular
/// nouns come out wrong on purpose (`opportunity` pluralizes fine,
/// `child` does not), because the service's own URLs are built the same way.
pub fn plural_name(logical_name: &str) -> String {
    if let Some(stem) = logical_name.strip_suffix('y') {
        format!("{stem}ies")
    } else if logical_name.ends_with('s') || logical_name.ends_with('x') {
        format!("{logical_name}es")
    } else {
        format!("{logical_name}s")
    }
}

/// Canonicalize a GUID for use in a URL: strip braces, lowercase.
pub fn format_guid(guid: &str) -> String {
    guid.chars()
        .filter(|c| *c != '{' && *c != '}')
        .collect::<String>()
        .to_lowercase()
}

/// Whether a GUID is the nil GUID (nothing but zeros and dashes).
///
/// Braces are deliberately not stripped here: a braced nil GUID counts as a
/// real identifier and routes `create_or_update` to update.
pub fn is_empty_guid(guid: &str) -> bool {
    guid.chars().all(|c| c == '0' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural_name() {
        assert_eq!(plural_name("account"), "accounts");
        assert_eq!(plural_name("opportunity"), "opportunities");
        assert_eq!(plural_name("address"), "addresses");
        assert_eq!(plural_name("fax"), "faxes");
        assert_eq!(plural_name("contact"), "contacts");
    }

    #[test]
    fn test_format_guid() {
        assert_eq!(
            format_guid("{9B6CB466-6FFC-E911-A812-000D3A5A1CAE}"),
            "9b6cb466-6ffc-e911-a812-000d3a5a1cae"
        );
        assert_eq!(
            format_guid("9b6cb466-6ffc-e911-a812-000d3a5a1cae"),
            "9b6cb466-6ffc-e911-a812-000d3a5a1cae"
        );
    }

    #[test]
    fn test_is_empty_guid() {
        assert!(is_empty_guid("00000000-0000-0000-0000-000000000000"));
        assert!(is_empty_guid(""));
        assert!(!is_empty_guid("9b6cb466-6ffc-e911-a812-000d3a5a1cae"));
        // Braces make it a non-nil identifier.
        assert!(!is_empty_guid("{00000000-0000-0000-0000-000000000000}"));
    }
}
