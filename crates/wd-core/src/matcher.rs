//! Reference Matcher
//!
//! Evaluates a compiled rule batch against a request with the same
//! precedence the rule-matching backend uses: the highest priority wins and
//! at equal priority Allow beats Block. The extension never runs this on the
//! hot path; it backs the CLI `check` command and the precedence tests.

use regex::{Regex, RegexBuilder};

use crate::domain::matches_domain;
use crate::types::{CompiledRule, DomainType, ResourceType, RuleAction};
use crate::url::{extract_host, initiator_host, is_third_party};

// =============================================================================
// Request / Result
// =============================================================================

/// Context for a request being matched.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Request type
    pub resource_type: ResourceType,
    /// Origin or hostname of the initiating document, if any
    pub initiator: Option<&'a str>,
}

/// Final decision for a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    /// Request is allowed (no matching block rules, or exception matched)
    Allow,
    /// Request is blocked
    Block,
}

/// Result of matching a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub decision: MatchDecision,
    /// Rule that determined the decision, `None` when nothing matched
    pub rule_id: Option<u32>,
    pub priority: u32,
}

impl Default for MatchResult {
    fn default() -> Self {
        Self {
            decision: MatchDecision::Allow,
            rule_id: None,
            priority: 0,
        }
    }
}

// =============================================================================
// Matcher
// =============================================================================

struct LoadedRule {
    rule: CompiledRule,
    regex: Regex,
}

/// Evaluates requests against a compiled rule batch.
pub struct RuleMatcher {
    rules: Vec<LoadedRule>,
    rejected: Vec<u32>,
}

impl RuleMatcher {
    /// Load a batch. Rules whose pattern does not compile are set aside,
    /// as the backend would reject them.
    pub fn new(rules: &[CompiledRule]) -> Self {
        let mut loaded = Vec::with_capacity(rules.len());
        let mut rejected = Vec::new();

        for rule in rules {
            match RegexBuilder::new(&rule.match_pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
            {
                Ok(regex) => loaded.push(LoadedRule {
                    rule: rule.clone(),
                    regex,
                }),
                Err(e) => {
                    log::warn!("rule {} has an invalid pattern: {}", rule.id, e);
                    rejected.push(rule.id);
                }
            }
        }

        Self {
            rules: loaded,
            rejected,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// IDs of rules that could not be loaded.
    pub fn rejected_ids(&self) -> &[u32] {
        &self.rejected
    }

    pub fn match_request(&self, ctx: &RequestContext<'_>) -> MatchResult {
        let req_host = extract_host(ctx.url).unwrap_or("");
        let site_host = ctx.initiator.and_then(initiator_host);

        let candidates = self
            .rules
            .iter()
            .filter(|loaded| condition_matches(&loaded.rule, ctx, req_host, site_host))
            .filter(|loaded| loaded.regex.is_match(ctx.url))
            .map(|loaded| &loaded.rule);

        apply_precedence(candidates)
    }
}

fn condition_matches(
    rule: &CompiledRule,
    ctx: &RequestContext<'_>,
    req_host: &str,
    site_host: Option<&str>,
) -> bool {
    if let Some(types) = rule.resource_types {
        if !types.intersects(ctx.resource_type) {
            return false;
        }
    }

    if let Some(includes) = &rule.initiator_domain_includes {
        match site_host {
            Some(site) if includes.iter().any(|d| matches_domain(site, d)) => {}
            _ => return false,
        }
    }

    if let (Some(excludes), Some(site)) = (&rule.initiator_domain_excludes, site_host) {
        if excludes.iter().any(|d| matches_domain(site, d)) {
            return false;
        }
    }

    if let Some(domain_type) = rule.domain_type {
        // Requests without an initiator are top-level navigations.
        let third_party = site_host.map_or(false, |site| is_third_party(site, req_host));
        let wanted = domain_type == DomainType::ThirdParty;
        if third_party != wanted {
            return false;
        }
    }

    true
}

/// Apply precedence rules to determine final decision.
fn apply_precedence<'r>(candidates: impl Iterator<Item = &'r CompiledRule>) -> MatchResult {
    let mut best: Option<&CompiledRule> = None;

    for rule in candidates {
        let wins = match best {
            None => true,
            Some(current) => {
                rule.priority > current.priority
                    || (rule.priority == current.priority
                        && rule.action == RuleAction::Allow
                        && current.action == RuleAction::Block)
            }
        };
        if wins {
            best = Some(rule);
        }
    }

    match best {
        Some(rule) => MatchResult {
            decision: match rule.action {
                RuleAction::Allow => MatchDecision::Allow,
                RuleAction::Block => MatchDecision::Block,
            },
            rule_id: Some(rule.id),
            priority: rule.priority,
        },
        None => MatchResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::to_match_pattern;
    use crate::types::Category;

    fn rule(id: u32, priority: u32, action: RuleAction, pattern: &str) -> CompiledRule {
        CompiledRule {
            id,
            priority,
            action,
            match_pattern: to_match_pattern(pattern),
            resource_types: Some(ResourceType::DEFAULT),
            initiator_domain_includes: None,
            initiator_domain_excludes: None,
            domain_type: None,
            case_sensitive: false,
            source_category: Category::Ads,
        }
    }

    fn script(url: &str) -> RequestContext<'_> {
        RequestContext {
            url,
            resource_type: ResourceType::SCRIPT,
            initiator: Some("https://site.com"),
        }
    }

    #[test]
    fn higher_priority_wins() {
        let matcher = RuleMatcher::new(&[
            rule(1, 1, RuleAction::Block, "||ads.example.com^"),
            rule(2, 3, RuleAction::Allow, "||ads.example.com/safe.js"),
        ]);

        let blocked = matcher.match_request(&script("https://ads.example.com/track.js"));
        assert_eq!(blocked.decision, MatchDecision::Block);
        assert_eq!(blocked.rule_id, Some(1));

        let allowed = matcher.match_request(&script("https://ads.example.com/safe.js"));
        assert_eq!(allowed.decision, MatchDecision::Allow);
        assert_eq!(allowed.rule_id, Some(2));
    }

    #[test]
    fn allow_wins_ties_regardless_of_order() {
        for rules in [
            vec![rule(1, 5, RuleAction::Block, "||x.com^"), rule(2, 5, RuleAction::Allow, "||x.com^")],
            vec![rule(2, 5, RuleAction::Allow, "||x.com^"), rule(1, 5, RuleAction::Block, "||x.com^")],
        ] {
            let result = RuleMatcher::new(&rules).match_request(&script("https://x.com/a.js"));
            assert_eq!(result.decision, MatchDecision::Allow);
        }
    }

    #[test]
    fn no_match_is_allow() {
        let matcher = RuleMatcher::new(&[rule(1, 1, RuleAction::Block, "||x.com^")]);
        assert_eq!(matcher.match_request(&script("https://y.com/")), MatchResult::default());
    }

    #[test]
    fn resource_type_and_initiator_conditions() {
        let mut scoped = rule(1, 1, RuleAction::Block, "||tracker.net^");
        scoped.resource_types = Some(ResourceType::IMAGE);
        scoped.initiator_domain_includes = Some(vec!["site.com".to_string()]);
        scoped.initiator_domain_excludes = Some(vec!["safe.site.com".to_string()]);
        let matcher = RuleMatcher::new(&[scoped]);

        let mut ctx = RequestContext {
            url: "https://tracker.net/p.gif",
            resource_type: ResourceType::IMAGE,
            initiator: Some("https://www.site.com"),
        };
        assert_eq!(matcher.match_request(&ctx).decision, MatchDecision::Block);

        ctx.initiator = Some("https://safe.site.com");
        assert_eq!(matcher.match_request(&ctx).decision, MatchDecision::Allow);

        ctx.initiator = Some("https://other.com");
        assert_eq!(matcher.match_request(&ctx).decision, MatchDecision::Allow);

        ctx.initiator = Some("https://www.site.com");
        ctx.resource_type = ResourceType::SCRIPT;
        assert_eq!(matcher.match_request(&ctx).decision, MatchDecision::Allow);
    }

    #[test]
    fn third_party_condition() {
        let mut third = rule(1, 1, RuleAction::Block, "||cdn.example.com^");
        third.domain_type = Some(DomainType::ThirdParty);
        let matcher = RuleMatcher::new(&[third]);

        let mut ctx = script("https://cdn.example.com/lib.js");
        assert_eq!(matcher.match_request(&ctx).decision, MatchDecision::Block);

        ctx.initiator = Some("https://www.example.com");
        assert_eq!(matcher.match_request(&ctx).decision, MatchDecision::Allow);
    }

    #[test]
    fn case_sensitivity_follows_rule() {
        let mut sensitive = rule(1, 1, RuleAction::Block, "/Banner/");
        sensitive.match_pattern = "Banner".to_string();
        sensitive.case_sensitive = true;
        let matcher = RuleMatcher::new(&[sensitive, rule(2, 1, RuleAction::Block, "/promo.")]);

        assert_eq!(matcher.match_request(&script("https://x.com/banner")).decision, MatchDecision::Allow);
        assert_eq!(matcher.match_request(&script("https://x.com/Banner")).decision, MatchDecision::Block);
        assert_eq!(matcher.match_request(&script("https://x.com/PROMO.js")).decision, MatchDecision::Block);
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let mut broken = rule(7, 1, RuleAction::Block, "x");
        broken.match_pattern = "(".to_string();
        let matcher = RuleMatcher::new(&[broken]);
        assert!(matcher.is_empty());
        assert_eq!(matcher.rejected_ids(), &[7]);
    }
}
