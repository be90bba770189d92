//! Rule Grammar Parser
//!
//! Turns filter-list text (ad-filter syntax or hosts files) into typed rule
//! records. Parsing never fails: a line that cannot be classified is counted
//! as skipped and dropped.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use wd_core::domain::{normalize_domain, split_domain_list};
use wd_core::pattern::regex_literal;
use wd_core::types::ResourceType;

// =============================================================================
// Rule Records
// =============================================================================

/// Textual grammar of a filter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    #[default]
    Adblock,
    Hosts,
}

impl ListFormat {
    /// Guess the format from content: hosts when most rule lines are
    /// `IP domain` entries.
    pub fn detect(text: &str) -> Self {
        let mut hosts = 0usize;
        let mut other = 0usize;

        for line in text.lines().take(500) {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') || line.starts_with('[') {
                continue;
            }
            let first = line.split_whitespace().next().unwrap_or("");
            if first.parse::<IpAddr>().is_ok() {
                hosts += 1;
            } else {
                other += 1;
            }
        }

        if hosts > other {
            Self::Hosts
        } else {
            Self::Adblock
        }
    }
}

/// A rule matched against network requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRule {
    pub pattern: String,
    pub is_exception: bool,
    pub domain_includes: Vec<String>,
    pub domain_excludes: Vec<String>,
    /// `None` when the rule carries no type option
    pub resource_types: Option<ResourceType>,
    /// `Some(true)` third-party only, `Some(false)` first-party only
    pub third_party_only: Option<bool>,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub match_case: bool,
    #[serde(default)]
    pub badfilter: bool,
    pub original_text: String,
}

/// A CSS selector hidden on matching pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementHideRule {
    pub selector: String,
    pub domain_includes: Vec<String>,
    pub domain_excludes: Vec<String>,
    pub is_exception: bool,
}

/// Opaque script injection, passed through to the page layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptletRule {
    pub script_body: String,
    pub domain_includes: Vec<String>,
    #[serde(default)]
    pub domain_excludes: Vec<String>,
    #[serde(default)]
    pub is_exception: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParsedRule {
    Network(NetworkRule),
    ElementHide(ElementHideRule),
    Scriptlet(ScriptletRule),
}

/// Rules parsed from one list plus the tally of lines that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub rules: Vec<ParsedRule>,
    pub lines: usize,
    pub skipped: usize,
}

// =============================================================================
// Entry Points
// =============================================================================

pub fn parse_filter_list(text: &str, format: ListFormat) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    for raw_line in text.lines() {
        outcome.lines += 1;
        let line = raw_line.trim();

        let status = match format {
            ListFormat::Adblock => parse_adblock_line(line, &mut outcome.rules),
            ListFormat::Hosts => parse_hosts_line(line, &mut outcome.rules),
        };

        if status == LineStatus::Skipped {
            log::trace!("skipped filter line: {}", line);
            outcome.skipped += 1;
        }
    }

    log::debug!(
        "parsed {} lines into {} rules ({} skipped)",
        outcome.lines,
        outcome.rules.len(),
        outcome.skipped
    );

    outcome
}

/// Parse a single network rule in ad-filter syntax, e.g. a user's custom
/// rule. Cosmetic syntax and unsupported options yield `None`.
pub fn parse_network_rule(text: &str) -> Option<NetworkRule> {
    let line = text.trim();
    if line.is_empty() || is_comment_line(line) || find_cosmetic_separator(line).is_some() {
        return None;
    }
    network_rule(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStatus {
    Ignored,
    Parsed,
    Skipped,
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[')
}

// =============================================================================
// Ad-filter Syntax
// =============================================================================

fn parse_adblock_line(line: &str, out: &mut Vec<ParsedRule>) -> LineStatus {
    if line.is_empty() || is_comment_line(line) {
        return LineStatus::Ignored;
    }

    if let Some((pos, separator)) = find_cosmetic_separator(line) {
        let domains = &line[..pos];
        let body = line[pos + separator.len()..].trim();
        return match cosmetic_rule(domains, body, separator) {
            Some(rule) => {
                out.push(rule);
                LineStatus::Parsed
            }
            None => LineStatus::Skipped,
        };
    }

    // Hosts-style comments, and hosts entries mixed into ad-filter lists.
    if line.starts_with('#') {
        return LineStatus::Ignored;
    }
    if looks_like_hosts_entry(line) {
        return parse_hosts_line(line, out);
    }

    if line.contains("$$") {
        return LineStatus::Skipped;
    }

    match network_rule(line) {
        Some(rule) => {
            out.push(ParsedRule::Network(rule));
            LineStatus::Parsed
        }
        None => LineStatus::Skipped,
    }
}

const COSMETIC_SEPARATORS: [&str; 8] = ["#@%#", "#%#", "#@?#", "#?#", "#@$#", "#$#", "#@#", "##"];

/// Position and text of the first cosmetic separator in the line.
fn find_cosmetic_separator(line: &str) -> Option<(usize, &'static str)> {
    line.match_indices('#').find_map(|(pos, _)| {
        let rest = &line[pos..];
        COSMETIC_SEPARATORS
            .iter()
            .find(|sep| rest.starts_with(**sep))
            .map(|sep| (pos, *sep))
    })
}

fn cosmetic_rule(domains: &str, body: &str, separator: &str) -> Option<ParsedRule> {
    if body.is_empty() {
        return None;
    }

    let (domain_includes, domain_excludes) = split_domain_list(domains, ',')?;
    if domain_includes.is_empty() && domains.split(',').any(|d| {
        let d = d.trim();
        !d.is_empty() && !d.starts_with('~')
    }) {
        // Every include was also excluded; the rule has no scope left.
        return None;
    }

    match separator {
        "##" | "#@#" => {
            let is_exception = separator == "#@#";
            if let Some(args) = body.strip_prefix("+js(") {
                let script_body = args.strip_suffix(')')?.trim();
                if script_body.is_empty() && !is_exception {
                    return None;
                }
                return Some(ParsedRule::Scriptlet(ScriptletRule {
                    script_body: script_body.to_string(),
                    domain_includes,
                    domain_excludes,
                    is_exception,
                }));
            }
            if body.starts_with("+js") || body.contains(":-abp-") || body.contains(":has-text(") {
                return None;
            }
            Some(ParsedRule::ElementHide(ElementHideRule {
                selector: body.to_string(),
                domain_includes,
                domain_excludes,
                is_exception,
            }))
        }
        "#%#" | "#@%#" => Some(ParsedRule::Scriptlet(ScriptletRule {
            script_body: body.to_string(),
            domain_includes,
            domain_excludes,
            is_exception: separator == "#@%#",
        })),
        // Procedural selectors and CSS injection have no declarative form.
        _ => None,
    }
}

fn network_rule(line: &str) -> Option<NetworkRule> {
    let (is_exception, body) = match line.strip_prefix("@@") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, line),
    };

    let (pattern_part, options_text) = split_rule_options(body);
    let options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };

    let mut pattern = pattern_part.trim().to_string();
    if pattern.chars().any(char::is_whitespace) {
        return None;
    }

    if pattern.is_empty() || pattern == "*" {
        // Match-everything patterns are only accepted with a domain scope.
        if options.domain_includes.is_empty() {
            return None;
        }
        pattern = "*".to_string();
    }

    if pattern.starts_with("||") && pattern.len() == 2 {
        return None;
    }

    Some(NetworkRule {
        pattern,
        is_exception,
        domain_includes: options.domain_includes,
        domain_excludes: options.domain_excludes,
        resource_types: options.resource_types,
        third_party_only: options.third_party_only,
        important: options.important,
        match_case: options.match_case,
        badfilter: options.badfilter,
        original_text: line.to_string(),
    })
}

/// Split off the `$options` clause at the first unescaped `$`. For `/regex/`
/// patterns the search starts after the closing slash.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    let search_from = if line.starts_with('/') {
        match line.rfind('/') {
            Some(end) if end > 0 && regex_literal(&line[..=end]).is_some() => end,
            _ => 0,
        }
    } else {
        0
    };

    let bytes = line.as_bytes();
    let mut i = search_from;
    while i < bytes.len() {
        if bytes[i] == b'$' && (i == 0 || bytes[i - 1] != b'\\') {
            return (&line[..i], Some(&line[i + 1..]));
        }
        i += 1;
    }

    (line, None)
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Default)]
struct ParsedOptions {
    domain_includes: Vec<String>,
    domain_excludes: Vec<String>,
    resource_types: Option<ResourceType>,
    third_party_only: Option<bool>,
    important: bool,
    match_case: bool,
    badfilter: bool,
}

/// Options that change the rule's action into something other than a plain
/// block/allow. Such rules cannot be expressed and are skipped whole.
const UNSUPPORTED_OPTIONS: &[&str] = &[
    "redirect",
    "redirect-rule",
    "rewrite",
    "removeparam",
    "queryprune",
    "csp",
    "replace",
    "header",
    "permissions",
    "urltransform",
    "uritransform",
    "cookie",
    "hls",
    "jsonprune",
    "stealth",
    "popup",
    "popunder",
    "empty",
    "mp4",
    "inline-script",
    "inline-font",
    "elemhide",
    "ehide",
    "generichide",
    "ghide",
    "specifichide",
    "shide",
    "genericblock",
    "content",
    "jsinject",
    "urlblock",
    "extension",
];

fn parse_options(text: &str) -> Option<ParsedOptions> {
    let mut options = ParsedOptions::default();
    let mut type_include = ResourceType::empty();
    let mut type_exclude = ResourceType::empty();

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let (name, value) = match raw_lower.split_once('=') {
            Some((name, _)) => (name, Some(&raw[name.len() + 1..])),
            None => (raw_lower.as_str(), None),
        };

        if let Some(value) = value {
            match name {
                "domain" | "from" => {
                    let (includes, excludes) = split_domain_list(value, '|')?;
                    if includes.is_empty() && excludes.is_empty() {
                        return None;
                    }
                    merge_unique(&mut options.domain_includes, includes);
                    merge_unique(&mut options.domain_excludes, excludes);
                    let excludes = &options.domain_excludes;
                    options.domain_includes.retain(|d| !excludes.contains(d));
                }
                _ if UNSUPPORTED_OPTIONS.contains(&name) => return None,
                _ => log::trace!("ignoring unknown option '{}'", raw),
            }
            continue;
        }

        match name {
            "important" => options.important = true,
            "match-case" | "match_case" => options.match_case = true,
            "badfilter" => options.badfilter = true,
            "third-party" | "thirdparty" | "3p" | "~first-party" | "~1p" => {
                options.third_party_only = Some(true)
            }
            "~third-party" | "~3p" | "first-party" | "firstparty" | "1p" => {
                options.third_party_only = Some(false)
            }
            _ if UNSUPPORTED_OPTIONS.contains(&name) => return None,
            _ => {
                let (negated, type_name) = match name.strip_prefix('~') {
                    Some(rest) => (true, rest),
                    None => (false, name),
                };
                match ResourceType::from_option(type_name) {
                    Some(mask) if negated => type_exclude |= mask,
                    Some(mask) => type_include |= mask,
                    None => log::trace!("ignoring unknown option '{}'", raw),
                }
            }
        }
    }

    if !type_include.is_empty() || !type_exclude.is_empty() {
        let mask = finalize_type_mask(type_include, type_exclude);
        if mask.is_empty() {
            return None;
        }
        options.resource_types = Some(mask);
    }

    Some(options)
}

fn merge_unique(target: &mut Vec<String>, incoming: Vec<String>) {
    for domain in incoming {
        if !target.contains(&domain) {
            target.push(domain);
        }
    }
}

/// Listed types minus negated ones; only negations means "the common set
/// minus these".
fn finalize_type_mask(include: ResourceType, exclude: ResourceType) -> ResourceType {
    if include.is_empty() {
        ResourceType::DEFAULT & !exclude
    } else {
        include & !exclude
    }
}

// =============================================================================
// Hosts Syntax
// =============================================================================

/// Host names that appear in every hosts file and must never be blocked.
const RESERVED_HOSTS: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
    "0.0.0.0",
];

/// Addresses a hosts entry may sink a domain into.
const SINK_ADDRESSES: &[&str] = &["0.0.0.0", "127.0.0.1", "::", "::1"];

fn looks_like_hosts_entry(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .map_or(false, |first| SINK_ADDRESSES.contains(&first))
}

fn parse_hosts_line(line: &str, out: &mut Vec<ParsedRule>) -> LineStatus {
    let line = match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    };
    if line.is_empty() || is_comment_line(line) {
        return LineStatus::Ignored;
    }

    let mut tokens = line.split_whitespace();
    let address = tokens.next().unwrap_or("");
    if !SINK_ADDRESSES.contains(&address) {
        return LineStatus::Skipped;
    }

    let mut parsed = 0usize;
    let mut reserved = 0usize;
    for token in tokens {
        let lower = token.to_ascii_lowercase();
        if RESERVED_HOSTS.contains(&lower.as_str()) || lower.parse::<IpAddr>().is_ok() {
            reserved += 1;
            continue;
        }
        let Some(domain) = normalize_domain(&lower) else {
            continue;
        };
        out.push(ParsedRule::Network(NetworkRule {
            pattern: format!("||{}^", domain),
            is_exception: false,
            domain_includes: Vec::new(),
            domain_excludes: Vec::new(),
            resource_types: None,
            third_party_only: None,
            important: false,
            match_case: false,
            badfilter: false,
            original_text: format!("{} {}", address, token),
        }));
        parsed += 1;
    }

    if parsed > 0 {
        LineStatus::Parsed
    } else if reserved > 0 {
        LineStatus::Ignored
    } else {
        LineStatus::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(outcome: &ParseOutcome, index: usize) -> &NetworkRule {
        match &outcome.rules[index] {
            ParsedRule::Network(rule) => rule,
            other => panic!("expected network rule, got {:?}", other),
        }
    }

    fn element_hide(outcome: &ParseOutcome, index: usize) -> &ElementHideRule {
        match &outcome.rules[index] {
            ParsedRule::ElementHide(rule) => rule,
            other => panic!("expected element hide rule, got {:?}", other),
        }
    }

    #[test]
    fn skips_comments_and_metadata() {
        let outcome = parse_filter_list("[Adblock Plus 2.0]\n! Title: test\n\n   \n# hosts comment", ListFormat::Adblock);
        assert!(outcome.rules.is_empty());
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.lines, 5);
    }

    #[test]
    fn parses_network_and_exception_rules() {
        let outcome = parse_filter_list("||ads.example.com^\n@@||ads.example.com/safe.js", ListFormat::Adblock);
        assert_eq!(outcome.rules.len(), 2);

        let block = network(&outcome, 0);
        assert_eq!(block.pattern, "||ads.example.com^");
        assert!(!block.is_exception);
        assert_eq!(block.resource_types, None);

        let allow = network(&outcome, 1);
        assert_eq!(allow.pattern, "||ads.example.com/safe.js");
        assert!(allow.is_exception);
        assert_eq!(allow.original_text, "@@||ads.example.com/safe.js");
    }

    #[test]
    fn parses_options() {
        let outcome = parse_filter_list(
            "||tracker.net^$script,image,third-party,domain=a.com|~b.a.com,important,match-case,future-option",
            ListFormat::Adblock,
        );
        let rule = network(&outcome, 0);
        assert_eq!(rule.resource_types, Some(ResourceType::SCRIPT | ResourceType::IMAGE));
        assert_eq!(rule.third_party_only, Some(true));
        assert_eq!(rule.domain_includes, vec!["a.com".to_string()]);
        assert_eq!(rule.domain_excludes, vec!["b.a.com".to_string()]);
        assert!(rule.important);
        assert!(rule.match_case);
    }

    #[test]
    fn option_aliases() {
        let outcome = parse_filter_list("/pixel.$1p,css,xhr,frame\n/beacon.$~third-party", ListFormat::Adblock);
        let first = network(&outcome, 0);
        assert_eq!(first.third_party_only, Some(false));
        assert_eq!(
            first.resource_types,
            Some(ResourceType::STYLESHEET | ResourceType::XMLHTTPREQUEST | ResourceType::SUB_FRAME)
        );
        assert_eq!(network(&outcome, 1).third_party_only, Some(false));
    }

    #[test]
    fn negated_types_subtract_from_default() {
        let outcome = parse_filter_list("/ads/$~image", ListFormat::Adblock);
        let types = network(&outcome, 0).resource_types.unwrap();
        assert!(!types.contains(ResourceType::IMAGE));
        assert!(types.contains(ResourceType::SCRIPT));

        let outcome = parse_filter_list("/ads/$image,~image", ListFormat::Adblock);
        assert!(outcome.rules.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn options_split_at_first_unescaped_dollar() {
        let (pattern, options) = split_rule_options("/path\\$x/page$script,domain=a.com");
        assert_eq!(pattern, "/path\\$x/page");
        assert_eq!(options, Some("script,domain=a.com"));

        let (pattern, options) = split_rule_options("/ads$/");
        assert_eq!(pattern, "/ads$/");
        assert_eq!(options, None);

        let (pattern, options) = split_rule_options("/ads\\d+/$image");
        assert_eq!(pattern, "/ads\\d+/");
        assert_eq!(options, Some("image"));
    }

    #[test]
    fn unsupported_actions_are_skipped() {
        let outcome = parse_filter_list(
            "||site.com^$removeparam=utm_source\n||cdn.com/ad.js$redirect=noopjs\n||x.com^$popup",
            ListFormat::Adblock,
        );
        assert!(outcome.rules.is_empty());
        assert_eq!(outcome.skipped, 3);
    }

    #[test]
    fn unscoped_empty_patterns_are_skipped() {
        let outcome = parse_filter_list("$script\n@@\n*$image\n$domain=a.com,script", ListFormat::Adblock);
        assert_eq!(outcome.rules.len(), 1);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(network(&outcome, 0).pattern, "*");
    }

    #[test]
    fn parses_element_hiding() {
        let outcome = parse_filter_list(
            "example.com##.banner-ad\n##.global-ad\nexample.com,~shop.example.com#@#.sponsor",
            ListFormat::Adblock,
        );
        assert_eq!(outcome.rules.len(), 3);

        let scoped = element_hide(&outcome, 0);
        assert_eq!(scoped.selector, ".banner-ad");
        assert_eq!(scoped.domain_includes, vec!["example.com".to_string()]);
        assert!(!scoped.is_exception);

        let global = element_hide(&outcome, 1);
        assert!(global.domain_includes.is_empty());
        assert!(global.domain_excludes.is_empty());

        let exception = element_hide(&outcome, 2);
        assert!(exception.is_exception);
        assert_eq!(exception.domain_excludes, vec!["shop.example.com".to_string()]);
    }

    #[test]
    fn selector_is_kept_verbatim() {
        let outcome = parse_filter_list("example.com##div[id^=\"ad_\"] > a[href*='#x']", ListFormat::Adblock);
        assert_eq!(element_hide(&outcome, 0).selector, "div[id^=\"ad_\"] > a[href*='#x']");
    }

    #[test]
    fn parses_scriptlets() {
        let outcome = parse_filter_list(
            "example.com#%#window.ads = false;\nexample.com##+js(set-constant, ads, false)\n~news.org#@%#log()",
            ListFormat::Adblock,
        );
        assert_eq!(outcome.rules.len(), 3);
        match &outcome.rules[0] {
            ParsedRule::Scriptlet(rule) => {
                assert_eq!(rule.script_body, "window.ads = false;");
                assert_eq!(rule.domain_includes, vec!["example.com".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &outcome.rules[1] {
            ParsedRule::Scriptlet(rule) => assert_eq!(rule.script_body, "set-constant, ads, false"),
            other => panic!("unexpected {:?}", other),
        }
        match &outcome.rules[2] {
            ParsedRule::Scriptlet(rule) => {
                assert!(rule.is_exception);
                assert_eq!(rule.domain_excludes, vec!["news.org".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn procedural_and_html_filters_are_skipped() {
        let outcome = parse_filter_list(
            "example.com#?#div:has-text(Sponsored)\nexample.com##div:has-text(Ad)\nexample.com$$script[data-ad]",
            ListFormat::Adblock,
        );
        assert!(outcome.rules.is_empty());
        assert_eq!(outcome.skipped, 3);
    }

    #[test]
    fn self_cancelling_domain_list_is_skipped() {
        let outcome = parse_filter_list("a.com,~a.com##.ad", ListFormat::Adblock);
        assert!(outcome.rules.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn parses_hosts_format() {
        let outcome = parse_filter_list(
            "# comment\n0.0.0.0 malware.test\n127.0.0.1 localhost\n127.0.0.1 tracker.test # inline\n0.0.0.0 a.test b.test\n192.168.1.1 router.lan\n::1 ip6-localhost",
            ListFormat::Hosts,
        );
        let patterns: Vec<&str> = outcome
            .rules
            .iter()
            .map(|r| match r {
                ParsedRule::Network(rule) => rule.pattern.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(patterns, vec!["||malware.test^", "||tracker.test^", "||a.test^", "||b.test^"]);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn hosts_entries_inside_adblock_lists() {
        let outcome = parse_filter_list("0.0.0.0 ads.test\n||other.test^", ListFormat::Adblock);
        assert_eq!(network(&outcome, 0).pattern, "||ads.test^");
        assert_eq!(network(&outcome, 1).pattern, "||other.test^");
    }

    #[test]
    fn detects_format() {
        assert_eq!(ListFormat::detect("# hosts\n0.0.0.0 a.com\n0.0.0.0 b.com\n"), ListFormat::Hosts);
        assert_eq!(ListFormat::detect("! list\n||a.com^\n##.ad\n"), ListFormat::Adblock);
    }

    #[test]
    fn custom_rule_parsing() {
        let rule = parse_network_rule("||example.com^$script").unwrap();
        assert_eq!(rule.resource_types, Some(ResourceType::SCRIPT));
        assert!(parse_network_rule("example.com##.ad").is_none());
        assert!(parse_network_rule("! note").is_none());
    }
}
