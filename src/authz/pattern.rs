//! Wildcard matching shared by resource, namespace and feature checks.
//! Only three shapes exist: `*`, `prefix*` and an exact name; comparison is
//! ASCII case-insensitive and never allocates.

/// Returns true when `value` satisfies `pattern`.
#[inline]
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" { return true; }
    if let Some(prefix) = pattern.strip_suffix('*') {
        let (p, v) = (prefix.as_bytes(), value.as_bytes());
        return v.len() >= p.len() && v[..p.len()].eq_ignore_ascii_case(p);
    }
    pattern.eq_ignore_ascii_case(value)
}

/// True when any pattern in the set matches.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], value: &str) -> bool {
    patterns.iter().any(|p| matches(p.as_ref(), value))
}
