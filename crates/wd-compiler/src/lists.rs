//! Filter list metadata, cached parse results and user-authored rules.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use wd_core::domain::normalize_domain;
use wd_core::types::Category;

use crate::parser::{parse_filter_list, parse_network_rule, ListFormat, NetworkRule, ParsedRule};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A subscribed filter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterList {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "sourceURI")]
    pub source_uri: String,
    pub category: Category,
    pub enabled: bool,
    #[serde(default)]
    pub format: ListFormat,
    #[serde(default)]
    pub raw_rule_count: usize,
    #[serde(default)]
    pub last_fetched_at: Option<u64>,
}

impl FilterList {
    pub fn new(id: impl Into<String>, source_uri: impl Into<String>, category: Category) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            source_uri: source_uri.into(),
            category,
            enabled: true,
            format: ListFormat::Adblock,
            raw_rule_count: 0,
            last_fetched_at: None,
        }
    }
}

/// A filter list together with the rules parsed from its last good fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedList {
    pub meta: FilterList,
    pub rules: Vec<ParsedRule>,
    /// The most recent refresh failed; `rules` are from an older fetch
    #[serde(default)]
    pub stale: bool,
    #[serde(default)]
    pub skipped: usize,
}

impl CachedList {
    /// Parse freshly fetched text into a cache entry.
    pub fn from_text(mut meta: FilterList, text: &str, fetched_at: u64) -> Self {
        let outcome = parse_filter_list(text, meta.format);
        meta.raw_rule_count = outcome.lines;
        meta.last_fetched_at = Some(fetched_at);

        Self {
            meta,
            rules: outcome.rules,
            stale: false,
            skipped: outcome.skipped,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomRuleKind {
    Block,
    Allow,
}

/// A rule written by the user. Always compiled, never subject to the list
/// rule ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    pub id: u64,
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: CustomRuleKind,
    pub created_at: u64,
}

impl CustomRule {
    pub fn new(id: u64, pattern: impl Into<String>, kind: CustomRuleKind, created_at: u64) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            kind,
            created_at,
        }
    }

    /// Read the pattern as a network rule. A bare domain covers the domain
    /// and its subdomains; anything else uses ad-filter syntax. The action
    /// comes from `kind`, so a leading `@@` is ignored.
    pub fn to_network_rule(&self) -> Option<NetworkRule> {
        let text = self.pattern.trim();
        let text = text.strip_prefix("@@").unwrap_or(text).trim();

        let mut rule = match bare_domain(text) {
            Some(domain) => parse_network_rule(&format!("||{}^", domain))?,
            None => parse_network_rule(text)?,
        };
        rule.is_exception = self.kind == CustomRuleKind::Allow;
        rule.original_text = self.pattern.clone();
        Some(rule)
    }
}

fn bare_domain(text: &str) -> Option<String> {
    if !text.contains('.') || text.starts_with('.') {
        return None;
    }
    normalize_domain(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_bare_domain_is_anchored() {
        let rule = CustomRule::new(1, "Ads.Example.com", CustomRuleKind::Block, 1);
        let network = rule.to_network_rule().expect("valid rule");
        assert_eq!(network.pattern, "||ads.example.com^");
        assert!(!network.is_exception);
    }

    #[test]
    fn custom_filter_syntax() {
        let rule = CustomRule::new(2, "@@/banner/*$image", CustomRuleKind::Allow, 1);
        let network = rule.to_network_rule().expect("valid rule");
        assert_eq!(network.pattern, "/banner/*");
        assert!(network.is_exception);
        assert_eq!(network.original_text, "@@/banner/*$image");

        let rule = CustomRule::new(3, "example.com##.ad", CustomRuleKind::Block, 1);
        assert!(rule.to_network_rule().is_none());
    }

    #[test]
    fn cached_list_records_fetch() {
        let meta = FilterList::new("easylist", "https://lists.test/easylist.txt", Category::Ads);
        let cached = CachedList::from_text(meta, "! c\n||a.test^\nbad$redirect=x\n", 42);
        assert_eq!(cached.rules.len(), 1);
        assert_eq!(cached.skipped, 1);
        assert_eq!(cached.meta.raw_rule_count, 3);
        assert_eq!(cached.meta.last_fetched_at, Some(42));
        assert!(!cached.stale);
    }

    #[test]
    fn serde_shape() {
        let rule = CustomRule::new(7, "x.com", CustomRuleKind::Allow, 9);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "allow");
        assert_eq!(json["createdAt"], 9);

        let meta = FilterList::new("l", "https://l.test", Category::Trackers);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["sourceURI"], "https://l.test");
        assert_eq!(json["category"], "trackers");
    }
}
