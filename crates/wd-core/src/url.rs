//! URL helpers for request evaluation
//!
//! These functions avoid allocations and work directly on string slices.

// =============================================================================
// Scheme / Host Extraction
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    // Find ':'
    let colon_pos = bytes.iter().position(|&b| b == b':')?;

    // Check for "://"
    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

/// Host of a URL, without userinfo or port.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let scheme_end = get_scheme_end(url)?;
    let rest = &url[scheme_end..];

    let authority_end = rest
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(rest.len());
    let mut authority = &rest[..authority_end];

    if let Some(at_pos) = authority.rfind('@') {
        authority = &authority[at_pos + 1..];
    }

    let host = if authority.starts_with('[') {
        match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        }
    } else {
        match authority.rfind(':') {
            Some(pos) => &authority[..pos],
            None => authority,
        }
    };

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Host of an initiator, which may be a full origin or a bare hostname.
pub fn initiator_host(initiator: &str) -> Option<&str> {
    let initiator = initiator.trim();
    if initiator.is_empty() || initiator == "null" {
        return None;
    }
    if initiator.contains("://") {
        extract_host(initiator)
    } else {
        Some(initiator.trim_end_matches('/'))
    }
}

// =============================================================================
// Registrable Domain
// =============================================================================

/// Common two-part public suffixes.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Registrable domain (eTLD+1) of a host, by heuristic: the last two
/// labels, or three under a common two-part suffix.
pub fn registrable_domain(host: &str) -> &str {
    let host = host.trim_end_matches('.');
    if host.starts_with('[') || host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let dots: Vec<usize> = host.match_indices('.').map(|(i, _)| i).collect();
    let n = dots.len();
    if n < 2 {
        return host;
    }

    let last_two = &host[dots[n - 2] + 1..];
    if COMMON_TWO_PART_TLDS.iter().any(|s| s.eq_ignore_ascii_case(last_two)) {
        if n >= 3 {
            return &host[dots[n - 3] + 1..];
        }
        return host;
    }

    last_two
}

/// Check if a request is third-party relative to the initiating site.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    !registrable_domain(site_host).eq_ignore_ascii_case(registrable_domain(req_host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hosts() {
        assert_eq!(extract_host("https://example.com/path"), Some("example.com"));
        assert_eq!(extract_host("https://user:pw@sub.example.com:8443/"), Some("sub.example.com"));
        assert_eq!(extract_host("http://example.com?q=1"), Some("example.com"));
        assert_eq!(extract_host("http://[::1]:80/"), Some("[::1]"));
        assert_eq!(extract_host("example.com/path"), None);
        assert_eq!(extract_host("https:///path"), None);
    }

    #[test]
    fn initiator_forms() {
        assert_eq!(initiator_host("https://news.site.com"), Some("news.site.com"));
        assert_eq!(initiator_host("site.com"), Some("site.com"));
        assert_eq!(initiator_host("null"), None);
    }

    #[test]
    fn registrable_domains() {
        assert_eq!(registrable_domain("a.b.example.com"), "example.com");
        assert_eq!(registrable_domain("example.com"), "example.com");
        assert_eq!(registrable_domain("shop.example.co.uk"), "example.co.uk");
        assert_eq!(registrable_domain("co.uk"), "co.uk");
        assert_eq!(registrable_domain("localhost"), "localhost");
        assert_eq!(registrable_domain("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn party_detection() {
        assert!(!is_third_party("www.example.com", "cdn.example.com"));
        assert!(is_third_party("site.com", "ads.example.com"));
    }
}
