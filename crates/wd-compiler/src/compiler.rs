//! Rule Compiler
//!
//! Recompiles every enabled list plus the user's own rules from scratch into
//! one prioritized batch. Compilation is a pure function of its input: the
//! same lists and settings always produce the same IDs and priorities.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use wd_core::domain::normalize_domain;
use wd_core::error::{Result, RuleSetError};
use wd_core::ids::IdAllocator;
use wd_core::pattern::{is_valid_match_pattern, to_match_pattern};
use wd_core::types::{Category, CompiledRule, DomainType, ResourceType};

use crate::config::CompilerConfig;
use crate::cosmetics::CosmeticIndex;
use crate::lists::{CachedList, CustomRule};
use crate::optimizer::{optimize_rules, SourcedRule};
use crate::parser::{NetworkRule, ParsedRule};
use crate::priority::PriorityTier;

// =============================================================================
// Input / Output
// =============================================================================

/// Everything a compilation depends on. Lists are processed in order; when
/// the list rule ceiling is reached, earlier lists keep their rules.
#[derive(Debug, Clone, Default)]
pub struct CompileInput<'a> {
    pub lists: Vec<&'a CachedList>,
    pub custom_rules: &'a [CustomRule],
    pub whitelist: &'a [String],
    pub blacklist: &'a [String],
    pub enabled_categories: BTreeSet<Category>,
    /// Total rules the backend accepts. List rules give way to user rules
    /// so that the whole batch fits.
    pub rule_budget: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeExhaustion {
    pub category: Category,
    pub width: u32,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileDiagnostics {
    pub lists_compiled: usize,
    /// Lines the parser could not classify, summed over compiled lists
    pub parse_skipped: usize,
    /// Parsed rules before and after de-duplication and badfilter
    pub rules_before_optimize: usize,
    pub rules_after_optimize: usize,
    pub duplicates_removed: usize,
    pub badfiltered: usize,
    /// Rules whose translated pattern is not a valid expression
    pub rejected_rules: usize,
    pub range_exhausted: Vec<RangeExhaustion>,
    /// Effective list rule ceiling after reserving room for user rules
    pub list_ceiling: usize,
    /// List rules dropped by the list rule ceiling
    pub capacity_dropped: usize,
    pub stale_lists: Vec<String>,
    pub rules_per_category: BTreeMap<Category, usize>,
    /// Network rules emitted per list ID
    pub rules_per_list: BTreeMap<String, usize>,
    pub cosmetic_rules: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Compilation {
    /// Sorted by ID
    pub rules: Vec<CompiledRule>,
    pub cosmetics: CosmeticIndex,
    pub diagnostics: CompileDiagnostics,
}

impl Compilation {
    /// IDs of the compiled rules grouped by category.
    pub fn rule_ids(&self) -> BTreeMap<Category, Vec<u32>> {
        let mut ids: BTreeMap<Category, Vec<u32>> = BTreeMap::new();
        for rule in &self.rules {
            ids.entry(rule.source_category).or_default().push(rule.id);
        }
        ids
    }
}

// =============================================================================
// Compilation
// =============================================================================

pub fn compile(input: &CompileInput<'_>, config: &CompilerConfig) -> Result<Compilation> {
    config.validate()?;

    let mut diagnostics = CompileDiagnostics::default();
    let mut sourced: Vec<SourcedRule<'_>> = Vec::new();

    for (list_index, list) in input.lists.iter().enumerate() {
        if !list_included(list, &input.enabled_categories) {
            continue;
        }

        diagnostics.lists_compiled += 1;
        diagnostics.parse_skipped += list.skipped;
        if list.stale {
            log::warn!("list '{}' is stale; compiling its last cached rules", list.id());
            diagnostics.stale_lists.push(list.id().to_string());
        }

        sourced.extend(list.rules.iter().map(|rule| SourcedRule {
            list_index,
            category: list.meta.category,
            rule,
        }));
    }

    let stats = optimize_rules(&mut sourced);
    diagnostics.rules_before_optimize = stats.before;
    diagnostics.rules_after_optimize = stats.after;
    diagnostics.duplicates_removed = stats.deduped;
    diagnostics.badfiltered = stats.badfiltered_rules;

    let mut emitter = RuleEmitter::new(config);

    // User rules are exempt from the ceiling, so they go first and the
    // lists share whatever budget is left.
    emitter.user_domains(input.whitelist, Category::Whitelist);
    emitter.user_domains(input.blacklist, Category::Blacklist);
    emitter.custom_rules(input.custom_rules);

    let user_rules = emitter.rules.len();
    let ceiling = list_ceiling(config.max_list_rules, input.rule_budget, user_rules);
    diagnostics.list_ceiling = ceiling;

    let mut cosmetics = CosmeticIndex::new();
    let mut per_list = vec![0usize; input.lists.len()];
    let mut list_rules = 0usize;

    for item in &sourced {
        match item.rule {
            ParsedRule::Network(rule) => {
                let Some(pattern) = emitter.translate(rule) else {
                    continue;
                };
                if list_rules >= ceiling {
                    emitter.capacity_dropped += 1;
                    continue;
                }
                let tier = PriorityTier::for_list_rule(rule);
                if emitter.push(item.category, tier, rule, pattern) {
                    list_rules += 1;
                    per_list[item.list_index] += 1;
                }
            }
            ParsedRule::ElementHide(rule) => cosmetics.insert_element_hide(rule),
            ParsedRule::Scriptlet(rule) => cosmetics.insert_scriptlet(rule),
        }
    }

    if emitter.capacity_dropped > 0 {
        log::warn!(
            "list rule ceiling of {} reached ({} user rules reserved); dropped {} rules from later lists",
            ceiling,
            user_rules,
            emitter.capacity_dropped
        );
    }

    for (list, count) in input.lists.iter().zip(per_list) {
        if count > 0 {
            *diagnostics.rules_per_list.entry(list.id().to_string()).or_insert(0) += count;
        }
    }

    let (rules, exhausted) = emitter.finish(&mut diagnostics);
    for exhaustion in &exhausted {
        let error = RuleSetError::RangeExhausted {
            category: exhaustion.category,
            width: exhaustion.width,
        };
        log::warn!("{}; dropped {} rules", error, exhaustion.dropped);
    }
    diagnostics.range_exhausted = exhausted;
    diagnostics.cosmetic_rules = cosmetics.len();

    log::debug!(
        "compiled {} lists into {} network rules and {} cosmetic rules",
        diagnostics.lists_compiled,
        rules.len(),
        diagnostics.cosmetic_rules
    );

    Ok(Compilation {
        rules,
        cosmetics,
        diagnostics,
    })
}

/// The configured list ceiling, lowered so that list rules plus user rules
/// stay within the backend budget.
fn list_ceiling(max_list_rules: usize, rule_budget: Option<usize>, user_rules: usize) -> usize {
    match rule_budget {
        Some(budget) => max_list_rules.min(budget.saturating_sub(user_rules)),
        None => max_list_rules,
    }
}

fn list_included(list: &CachedList, enabled: &BTreeSet<Category>) -> bool {
    let category = list.meta.category;
    if !list.meta.enabled {
        return false;
    }
    if !category.is_list_category() {
        log::warn!("list '{}' has non-list category '{}'; skipping", list.id(), category);
        return false;
    }
    // Subscriptions outside the built-in categories follow only their own flag.
    category == Category::FilterLists || enabled.contains(&category)
}

// =============================================================================
// Emission
// =============================================================================

struct RuleEmitter<'c> {
    config: &'c CompilerConfig,
    ids: IdAllocator<'c>,
    rules: Vec<CompiledRule>,
    exhausted: BTreeMap<Category, RangeExhaustion>,
    rejected: usize,
    capacity_dropped: usize,
}

impl<'c> RuleEmitter<'c> {
    fn new(config: &'c CompilerConfig) -> Self {
        Self {
            config,
            ids: config.id_ranges.allocator(),
            rules: Vec::new(),
            exhausted: BTreeMap::new(),
            rejected: 0,
            capacity_dropped: 0,
        }
    }

    fn translate(&mut self, rule: &NetworkRule) -> Option<String> {
        let pattern = to_match_pattern(&rule.pattern);
        if is_valid_match_pattern(&pattern) {
            Some(pattern)
        } else {
            log::debug!("rejecting rule with invalid pattern: {}", rule.original_text);
            self.rejected += 1;
            None
        }
    }

    /// Allocate an ID and record the rule. Returns false when the category
    /// band is exhausted and the rule was dropped.
    fn push(&mut self, category: Category, tier: PriorityTier, rule: &NetworkRule, pattern: String) -> bool {
        let Some(id) = self.next_id(category) else {
            return false;
        };

        self.rules.push(CompiledRule {
            id,
            priority: tier.priority(),
            action: tier.action(),
            match_pattern: pattern,
            resource_types: Some(rule.resource_types.unwrap_or(self.config.default_resource_types)),
            initiator_domain_includes: non_empty(&rule.domain_includes),
            initiator_domain_excludes: non_empty(&rule.domain_excludes),
            domain_type: rule.third_party_only.map(|third_party| {
                if third_party {
                    DomainType::ThirdParty
                } else {
                    DomainType::FirstParty
                }
            }),
            case_sensitive: rule.match_case,
            source_category: category,
        });
        true
    }

    fn custom_rules(&mut self, rules: &[CustomRule]) {
        for custom in rules {
            match custom.to_network_rule() {
                Some(rule) => {
                    if let Some(pattern) = self.translate(&rule) {
                        let tier = PriorityTier::for_user_rule(Category::Custom, rule.is_exception);
                        self.push(Category::Custom, tier, &rule, pattern);
                    }
                }
                None => {
                    log::warn!("custom rule {} ('{}') is not a network rule", custom.id, custom.pattern);
                    self.rejected += 1;
                }
            }
        }
    }

    /// Whitelisted sites get every request they initiate allowed;
    /// blacklisted domains are blocked with their subdomains.
    fn user_domains(&mut self, domains: &[String], category: Category) {
        for raw in domains {
            let Some(domain) = normalize_domain(raw) else {
                log::warn!("ignoring invalid {} entry '{}'", category, raw);
                self.rejected += 1;
                continue;
            };

            let (pattern, includes, types) = if category == Category::Whitelist {
                (".*".to_string(), Some(vec![domain]), ResourceType::ALL)
            } else {
                (
                    to_match_pattern(&format!("||{}^", domain)),
                    None,
                    self.config.default_resource_types | ResourceType::MAIN_FRAME,
                )
            };

            let Some(id) = self.next_id(category) else {
                continue;
            };
            let tier = PriorityTier::for_user_rule(category, category == Category::Whitelist);
            self.rules.push(CompiledRule {
                id,
                priority: tier.priority(),
                action: tier.action(),
                match_pattern: pattern,
                resource_types: Some(types),
                initiator_domain_includes: includes,
                initiator_domain_excludes: None,
                domain_type: None,
                case_sensitive: false,
                source_category: category,
            });
        }
    }

    fn next_id(&mut self, category: Category) -> Option<u32> {
        match self.ids.next_id(category) {
            Ok(id) => Some(id),
            Err(RuleSetError::RangeExhausted { width, .. }) => {
                self.exhausted
                    .entry(category)
                    .or_insert(RangeExhaustion {
                        category,
                        width,
                        dropped: 0,
                    })
                    .dropped += 1;
                None
            }
            Err(e) => {
                log::warn!("cannot allocate a rule id for '{}': {}", category, e);
                self.rejected += 1;
                None
            }
        }
    }

    fn finish(mut self, diagnostics: &mut CompileDiagnostics) -> (Vec<CompiledRule>, Vec<RangeExhaustion>) {
        self.rules.sort_by_key(|rule| rule.id);
        for rule in &self.rules {
            *diagnostics
                .rules_per_category
                .entry(rule.source_category)
                .or_insert(0) += 1;
        }
        diagnostics.rejected_rules = self.rejected;
        diagnostics.capacity_dropped = self.capacity_dropped;
        (self.rules, self.exhausted.into_values().collect())
    }
}

fn non_empty(domains: &[String]) -> Option<Vec<String>> {
    if domains.is_empty() {
        None
    } else {
        Some(domains.to_vec())
    }
}
