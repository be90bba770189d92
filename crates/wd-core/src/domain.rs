//! Domain inclusion/exclusion matching
//!
//! Shared by cosmetic lookups and by initiator-domain conditions. Matching is
//! always on label boundaries: `sub.example.com` matches `example.com`,
//! `notexample.com` never does.
//!
//! # Examples
//!
//! ```
//! use wd_core::domain::applies;
//!
//! let includes = vec!["example.com".to_string()];
//! assert!(applies(&includes, &[], "sub.example.com"));
//! assert!(!applies(&includes, &[], "notexample.com"));
//! ```

/// Normalize a domain token from a filter list: lowercase, surrounding dots
/// trimmed, only hostname characters allowed.
pub fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() || trimmed.len() > 253 {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    if trimmed.contains("..") {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

/// True if `domain` equals `entry` or is a subdomain of it.
#[inline]
pub fn matches_domain(domain: &str, entry: &str) -> bool {
    let domain = domain.trim_end_matches('.');
    if entry.is_empty() || domain.len() < entry.len() {
        return false;
    }

    let split = domain.len() - entry.len();
    if !domain.is_char_boundary(split) || !domain[split..].eq_ignore_ascii_case(entry) {
        return false;
    }

    split == 0 || domain.as_bytes()[split - 1] == b'.'
}

/// Decide whether a rule scoped by `includes`/`excludes` applies to `domain`.
///
/// - non-empty includes: the domain must match one of them
/// - an exclude match always wins over an include match
/// - only excludes: applies everywhere except the excluded domains
/// - neither: applies globally
pub fn applies(includes: &[String], excludes: &[String], domain: &str) -> bool {
    if !includes.is_empty() && !includes.iter().any(|entry| matches_domain(domain, entry)) {
        return false;
    }

    !excludes.iter().any(|entry| matches_domain(domain, entry))
}

/// Split a domain option (`a.com|~b.com` or `a.com,~b.com`) into disjoint
/// include and exclude sets. A domain listed both ways is only excluded.
///
/// Returns `None` if any entry is not a valid domain.
pub fn split_domain_list(value: &str, separator: char) -> Option<(Vec<String>, Vec<String>)> {
    let mut includes = Vec::new();
    let mut excludes = Vec::new();

    for raw in value.split(separator) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain = normalize_domain(domain_raw)?;
        let target = if is_exclude { &mut excludes } else { &mut includes };
        if !target.contains(&domain) {
            target.push(domain);
        }
    }

    includes.retain(|d| !excludes.contains(d));
    Some((includes, excludes))
}

/// Get the parent domain (strip leftmost label).
pub fn parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over a host and each of its parent domains, most specific first.
pub struct DomainSuffixes<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for DomainSuffixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = parent_domain(result);
        Some(result)
    }
}

/// Walk `a.b.example.com`, `b.example.com`, `example.com`, `com`.
pub fn suffixes(host: &str) -> DomainSuffixes<'_> {
    let host = host.trim_end_matches('.');
    DomainSuffixes {
        current: if host.is_empty() { None } else { Some(host) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn suffix_match_respects_label_boundary() {
        assert!(matches_domain("example.com", "example.com"));
        assert!(matches_domain("sub.example.com", "example.com"));
        assert!(matches_domain("a.b.example.com", "example.com"));
        assert!(matches_domain("Sub.Example.COM", "example.com"));
        assert!(!matches_domain("notexample.com", "example.com"));
        assert!(!matches_domain("example.com.evil.com", "example.com"));
        assert!(!matches_domain("com", "example.com"));
        assert!(!matches_domain("example.com", ""));
    }

    #[test]
    fn applies_globally_without_lists() {
        assert!(applies(&[], &[], "example.com"));
    }

    #[test]
    fn applies_to_included_domain_and_subdomains() {
        let includes = list(&["example.com"]);
        assert!(applies(&includes, &[], "example.com"));
        assert!(applies(&includes, &[], "sub.example.com"));
        assert!(!applies(&includes, &[], "notexample.com"));
        assert!(!applies(&includes, &[], "other.com"));
    }

    #[test]
    fn excludes_only_carves_out_of_global() {
        let excludes = list(&["example.com"]);
        assert!(!applies(&[], &excludes, "example.com"));
        assert!(!applies(&[], &excludes, "www.example.com"));
        assert!(applies(&[], &excludes, "other.com"));
        assert!(applies(&[], &excludes, "notexample.com"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let includes = list(&["example.com"]);
        let excludes = list(&["shop.example.com"]);
        assert!(applies(&includes, &excludes, "example.com"));
        assert!(applies(&includes, &excludes, "news.example.com"));
        assert!(!applies(&includes, &excludes, "shop.example.com"));
        assert!(!applies(&includes, &excludes, "cart.shop.example.com"));
        assert!(!applies(&includes, &excludes, "other.com"));
    }

    #[test]
    fn multiple_includes() {
        let includes = list(&["a.com", "b.org"]);
        assert!(applies(&includes, &[], "x.b.org"));
        assert!(applies(&includes, &[], "a.com"));
        assert!(!applies(&includes, &[], "c.net"));
    }

    #[test]
    fn domain_list_is_split_disjoint() {
        let (inc, exc) = split_domain_list("a.com|~b.com|A.com|~a.com|c.com", '|').unwrap();
        assert_eq!(inc, list(&["c.com"]));
        assert_eq!(exc, list(&["b.com", "a.com"]));

        let (inc, exc) = split_domain_list("example.com,~ads.example.com", ',').unwrap();
        assert_eq!(inc, list(&["example.com"]));
        assert_eq!(exc, list(&["ads.example.com"]));

        assert!(split_domain_list("good.com|bad domain", '|').is_none());
    }

    #[test]
    fn normalizes_domains() {
        assert_eq!(normalize_domain(" .Example.COM. "), Some("example.com".to_string()));
        assert_eq!(normalize_domain("origin-mobile_mob.conduit.com"), Some("origin-mobile_mob.conduit.com".to_string()));
        assert_eq!(normalize_domain("exa mple.com"), None);
        assert_eq!(normalize_domain("a..b"), None);
        assert_eq!(normalize_domain(""), None);
    }

    #[test]
    fn walks_suffixes() {
        let walked: Vec<&str> = suffixes("a.b.example.com").collect();
        assert_eq!(walked, vec!["a.b.example.com", "b.example.com", "example.com", "com"]);
        assert_eq!(suffixes("").count(), 0);
        assert_eq!(parent_domain("com"), None);
    }
}
