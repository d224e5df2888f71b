//! URN wildcard matching for operations and resources.
//!
//! Both axes use the same colon-delimited shape (`scope:category:action`,
//! `org:42:team:7`). A stored pattern matches a concrete value when:
//!
//! - the pattern is exactly `*` (matches anything, any segment count), or
//! - both have the same number of segments and every pattern segment is `*`
//!   or equal to the value segment (case-sensitive, no partial wildcards).
//!
//! Anything else is a non-match. Malformed patterns are compared as literal
//! text and simply fail (fail closed).

use gatehouse_core::UserId;

/// Universal match-all pattern.
pub const WILDCARD: &str = "*";

/// Contextual token resolved to the requesting principal's id.
pub const SELF_TOKEN: &str = "@me";

const SEPARATOR: char = ':';

/// Compare a concrete `value` against a stored wildcard `pattern`.
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == WILDCARD {
        return true;
    }

    let mut pattern_segments = pattern.split(SEPARATOR);
    let mut value_segments = value.split(SEPARATOR);

    loop {
        match (pattern_segments.next(), value_segments.next()) {
            (None, None) => return true,
            (Some(p), Some(v)) => {
                if p != WILDCARD && p != v {
                    return false;
                }
            }
            // Segment count mismatch.
            _ => return false,
        }
    }
}

/// Replace every `@me` segment with the principal's id.
///
/// Only whole segments are substituted; `user@me` stays literal.
pub fn resolve_self(urn: &str, user_id: UserId) -> String {
    if !urn.split(SEPARATOR).any(|segment| segment == SELF_TOKEN) {
        return urn.to_string();
    }

    let id = user_id.to_string();
    urn.split(SEPARATOR)
        .map(|segment| if segment == SELF_TOKEN { id.as_str() } else { segment })
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn universal_pattern_matches_any_shape() {
        assert!(matches("*", "admin:users:create"));
        assert!(matches("*", "org:42:team:7"));
        assert!(matches("*", ""));
    }

    #[test]
    fn segment_wildcards_only_cover_their_own_position() {
        assert!(matches("admin:*:create", "admin:users:create"));
        assert!(matches("*:*:*", "self:2fa:setup"));
        assert!(!matches("admin:*:create", "admin:users:delete"));
        assert!(!matches("self:*:*", "admin:users:create"));
    }

    #[test]
    fn segment_count_must_agree_without_universal_pattern() {
        assert!(!matches("*:*:*", "*"));
        assert!(!matches("*:*:*", "org:42:team:7"));
        assert!(!matches("org:*", "org:42:team:7"));
    }

    #[test]
    fn comparison_is_case_sensitive_and_whole_segment() {
        assert!(!matches("Admin:users:create", "admin:users:create"));
        assert!(!matches("admin:user*:create", "admin:users:create"));
    }

    #[test]
    fn empty_inputs() {
        assert!(matches("", ""));
        assert!(!matches("admin:users:create", ""));
        assert!(!matches("", "admin:users:create"));
    }

    #[test]
    fn resolve_self_substitutes_whole_segments_only() {
        let me = UserId::new(42);
        assert_eq!(resolve_self("self:user:@me", me), "self:user:42");
        assert_eq!(resolve_self("org:@me:user:@me", me), "org:42:user:42");
        assert_eq!(resolve_self("self:user:x@me", me), "self:user:x@me");
        assert_eq!(resolve_self("*", me), "*");
    }

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![Just("*".to_string()), "[a-z0-9@]{1,6}"]
    }

    fn urn() -> impl Strategy<Value = String> {
        prop::collection::vec(segment(), 1..5).prop_map(|segs| segs.join(":"))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the universal pattern matches every value.
        #[test]
        fn universal_pattern_always_matches(value in urn()) {
            prop_assert!(matches("*", &value));
        }

        /// Property: differing segment counts never match unless the pattern is `*`.
        #[test]
        fn segment_count_mismatch_never_matches(pattern in urn(), value in urn()) {
            let p_len = pattern.split(':').count();
            let v_len = value.split(':').count();
            prop_assume!(pattern != "*" && p_len != v_len);
            prop_assert!(!matches(&pattern, &value));
        }

        /// Property: every value matches itself.
        #[test]
        fn matching_is_reflexive(value in urn()) {
            prop_assert!(matches(&value, &value));
        }
    }
}
