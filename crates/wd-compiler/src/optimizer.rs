use std::collections::HashSet;

use wd_core::types::{Category, ResourceType};

use crate::parser::{NetworkRule, ParsedRule};

/// A parsed rule tagged with the list it came from.
#[derive(Debug, Clone, Copy)]
pub struct SourcedRule<'a> {
    pub list_index: usize,
    pub category: Category,
    pub rule: &'a ParsedRule,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Drop `$badfilter` rules together with their targets, then collapse
/// duplicates. Order is preserved and the first occurrence wins.
pub fn optimize_rules(rules: &mut Vec<SourcedRule<'_>>) -> OptimizeStats {
    let before = rules.len();
    let mut badfilter_keys: HashSet<RuleKey<'_>> = HashSet::new();
    let mut badfilter_rules = 0usize;

    for sourced in rules.iter() {
        if let ParsedRule::Network(rule) = sourced.rule {
            if rule.badfilter {
                badfilter_rules += 1;
                badfilter_keys.insert(RuleKey::network(rule));
            }
        }
    }

    let mut badfiltered_rules = 0usize;
    rules.retain(|sourced| {
        let ParsedRule::Network(rule) = sourced.rule else {
            return true;
        };
        if rule.badfilter {
            return false;
        }
        if !badfilter_keys.is_empty() && badfilter_keys.contains(&RuleKey::network(rule)) {
            badfiltered_rules += 1;
            return false;
        }
        true
    });

    let mut seen: HashSet<RuleKey<'_>> = HashSet::with_capacity(rules.len());
    let mut deduped = 0usize;
    rules.retain(|sourced| {
        if seen.insert(RuleKey::from(sourced.rule)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    let after = rules.len();

    log::debug!(
        "optimized {} rules to {} ({} duplicates, {} badfiltered)",
        before,
        after,
        deduped,
        badfiltered_rules
    );

    OptimizeStats {
        before,
        after,
        deduped,
        badfilter_rules,
        badfiltered_rules,
    }
}

/// Identity of a rule for de-duplication. The source line text is not part
/// of it, so `||a.com^$script,image` and `||a.com^$image,script` collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RuleKey<'a> {
    Network {
        pattern: &'a str,
        is_exception: bool,
        domain_includes: &'a [String],
        domain_excludes: &'a [String],
        resource_types: Option<ResourceType>,
        third_party_only: Option<bool>,
        important: bool,
        match_case: bool,
    },
    Cosmetic(&'a ParsedRule),
}

impl<'a> RuleKey<'a> {
    fn network(rule: &'a NetworkRule) -> Self {
        RuleKey::Network {
            pattern: &rule.pattern,
            is_exception: rule.is_exception,
            domain_includes: &rule.domain_includes,
            domain_excludes: &rule.domain_excludes,
            resource_types: rule.resource_types,
            third_party_only: rule.third_party_only,
            important: rule.important,
            match_case: rule.match_case,
        }
    }
}

impl<'a> From<&'a ParsedRule> for RuleKey<'a> {
    fn from(rule: &'a ParsedRule) -> Self {
        match rule {
            ParsedRule::Network(rule) => RuleKey::network(rule),
            other => RuleKey::Cosmetic(other),
        }
    }
}
