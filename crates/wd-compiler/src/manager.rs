//! Rule-set manager.
//!
//! Owns the subscribed lists with their cached rules, the user's own rules
//! and settings, and the last compilation that reached the backend. Every
//! change is followed by a full recompilation; concurrent triggers coalesce
//! so that at most one compilation runs at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wd_core::domain::normalize_domain;
use wd_core::error::{Result, RuleSetError};
use wd_core::types::{Category, CompiledRule};

use crate::compiler::{compile, CompileDiagnostics, CompileInput, Compilation};
use crate::config::CompilerConfig;
use crate::lists::{now_millis, CachedList, CustomRule, CustomRuleKind, FilterList};
use crate::store::KeyValueStore;
use crate::sync::{synchronize, RuleBackend, SyncReport};

pub const KEY_FILTER_LISTS: &str = "filter_lists";
pub const KEY_CUSTOM_RULES: &str = "custom_rules";
pub const KEY_USER_DOMAINS: &str = "user_domains";
pub const KEY_COMPILED_RULE_IDS: &str = "compiled_rule_ids";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Recompile Gate
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// This caller ran the job; the value is from its final run
    Ran(T),
    /// A run was already in flight and will repeat once for this trigger
    Coalesced,
}

#[derive(Debug, Default)]
struct GateState {
    running: bool,
    pending: bool,
}

/// Allows one job in flight. Triggers that arrive meanwhile collapse into a
/// single re-run performed by the caller that is already running.
#[derive(Debug, Default)]
pub struct RecompileGate {
    state: Mutex<GateState>,
}

struct ResetOnPanic<'a>(&'a Mutex<GateState>);

impl Drop for ResetOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = lock(self.0);
            state.running = false;
            state.pending = false;
        }
    }
}

impl RecompileGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<T>(&self, mut job: impl FnMut() -> T) -> GateOutcome<T> {
        {
            let mut state = lock(&self.state);
            if state.running {
                state.pending = true;
                return GateOutcome::Coalesced;
            }
            state.running = true;
        }

        let _reset = ResetOnPanic(&self.state);
        loop {
            let result = job();
            let mut state = lock(&self.state);
            if state.pending {
                // A newer trigger supersedes this result.
                state.pending = false;
                continue;
            }
            state.running = false;
            return GateOutcome::Ran(result);
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

// =============================================================================
// Manager
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStatus {
    pub id: String,
    pub display_name: String,
    pub category: Category,
    pub enabled: bool,
    pub stale: bool,
    pub rule_count: usize,
    pub last_fetched_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatus {
    pub lists: Vec<ListStatus>,
    pub enabled_categories: Vec<Category>,
    pub custom_rules: usize,
    /// Rules in the last compilation that reached the backend
    pub active_rules: usize,
    pub last_error: Option<String>,
    pub diagnostics: Option<CompileDiagnostics>,
    /// Rule IDs that appeared or disappeared per category in the last
    /// successful recompilation
    pub rule_id_churn: BTreeMap<Category, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDomains {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    enabled_categories: BTreeSet<Category>,
}

#[derive(Debug)]
struct ManagerState {
    lists: Vec<Arc<CachedList>>,
    custom_rules: Vec<CustomRule>,
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    enabled_categories: BTreeSet<Category>,
    last_good: Option<Arc<Compilation>>,
    last_error: Option<RuleSetError>,
    /// IDs of the last installed compilation, seeded from the store
    previous_rule_ids: BTreeMap<Category, Vec<u32>>,
    rule_id_churn: BTreeMap<Category, usize>,
}

impl Default for ManagerState {
    fn default() -> Self {
        Self {
            lists: Vec::new(),
            custom_rules: Vec::new(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            enabled_categories: Category::ALL.into_iter().filter(Category::is_toggleable).collect(),
            last_good: None,
            last_error: None,
            previous_rule_ids: BTreeMap::new(),
            rule_id_churn: BTreeMap::new(),
        }
    }
}

pub struct RuleSetManager<B> {
    config: CompilerConfig,
    state: Mutex<ManagerState>,
    backend: Mutex<B>,
    gate: RecompileGate,
}

impl<B: RuleBackend> RuleSetManager<B> {
    pub fn new(config: CompilerConfig, backend: B) -> Self {
        Self {
            config,
            state: Mutex::new(ManagerState::default()),
            backend: Mutex::new(backend),
            gate: RecompileGate::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Lists
    // -------------------------------------------------------------------------

    /// Store freshly fetched list text. Returns the number of skipped lines.
    pub fn upsert_list(&self, meta: FilterList, text: &str) -> usize {
        self.insert_list(CachedList::from_text(meta, text, now_millis()))
    }

    /// Like [`RuleSetManager::upsert_list`] for a list parsed elsewhere.
    ///
    /// A list already stored under the same ID or source URI is refreshed
    /// in place: its rules and fetch fields are replaced, while its ID,
    /// display name and enabled flag are kept.
    pub fn insert_list(&self, mut cached: CachedList) -> usize {
        let skipped = cached.skipped;
        let mut state = lock(&self.state);

        match find_list(&state.lists, cached.id(), &cached.meta.source_uri) {
            Some(index) => {
                let stored = &state.lists[index].meta;
                cached.meta.id = stored.id.clone();
                cached.meta.display_name = stored.display_name.clone();
                cached.meta.enabled = stored.enabled;
                log::debug!(
                    "list '{}' refreshed with {} rules ({} lines skipped)",
                    cached.id(),
                    cached.rules.len(),
                    skipped
                );
                state.lists[index] = Arc::new(cached);
            }
            None => {
                log::debug!(
                    "list '{}' cached with {} rules ({} lines skipped)",
                    cached.id(),
                    cached.rules.len(),
                    skipped
                );
                state.lists.push(Arc::new(cached));
            }
        }
        skipped
    }

    /// A refresh failed: keep the cached rules and mark the list stale.
    /// `list` is a list ID or source URI.
    pub fn record_fetch_failure(&self, list: &str, reason: &str) -> bool {
        let error = RuleSetError::FetchFailed {
            list: list.to_string(),
            reason: reason.to_string(),
        };
        log::warn!("{}; keeping cached rules", error);

        let mut state = lock(&self.state);
        match find_list(&state.lists, list, list) {
            Some(index) => {
                Arc::make_mut(&mut state.lists[index]).stale = true;
                true
            }
            None => false,
        }
    }

    pub fn remove_list(&self, list_id: &str) -> bool {
        let mut state = lock(&self.state);
        let before = state.lists.len();
        state.lists.retain(|l| l.id() != list_id);
        state.lists.len() != before
    }

    pub fn set_list_enabled(&self, list_id: &str, enabled: bool) -> bool {
        let mut state = lock(&self.state);
        match state.lists.iter_mut().find(|l| l.id() == list_id) {
            Some(list) => {
                Arc::make_mut(list).meta.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn lists(&self) -> Vec<FilterList> {
        lock(&self.state).lists.iter().map(|l| l.meta.clone()).collect()
    }

    // -------------------------------------------------------------------------
    // User rules and settings
    // -------------------------------------------------------------------------

    pub fn add_custom_rule(&self, pattern: &str, kind: CustomRuleKind) -> Result<CustomRule> {
        let created_at = now_millis();
        let mut state = lock(&self.state);

        let mut id = created_at;
        while state.custom_rules.iter().any(|r| r.id == id) {
            id += 1;
        }

        let rule = CustomRule::new(id, pattern.trim(), kind, created_at);
        if rule.to_network_rule().is_none() {
            return Err(RuleSetError::Config(format!(
                "'{}' is not a valid network rule",
                pattern
            )));
        }

        state.custom_rules.push(rule.clone());
        Ok(rule)
    }

    pub fn remove_custom_rule(&self, id: u64) -> bool {
        let mut state = lock(&self.state);
        let before = state.custom_rules.len();
        state.custom_rules.retain(|r| r.id != id);
        state.custom_rules.len() != before
    }

    pub fn custom_rules(&self) -> Vec<CustomRule> {
        lock(&self.state).custom_rules.clone()
    }

    /// Replace the whitelist and blacklist. Invalid entries are dropped.
    pub fn set_user_domains(&self, whitelist: &[String], blacklist: &[String]) {
        let whitelist = normalized_domains(whitelist);
        let blacklist = normalized_domains(blacklist);
        let mut state = lock(&self.state);
        state.whitelist = whitelist;
        state.blacklist = blacklist;
    }

    pub fn set_enabled_categories(&self, categories: impl IntoIterator<Item = Category>) {
        let enabled = categories
            .into_iter()
            .filter(Category::is_list_category)
            .collect();
        lock(&self.state).enabled_categories = enabled;
    }

    // -------------------------------------------------------------------------
    // Compilation
    // -------------------------------------------------------------------------

    /// Recompile from scratch and synchronize the backend. If another
    /// recompilation is in flight this returns `Coalesced` and that run
    /// repeats once it finishes.
    pub fn recompile(&self) -> GateOutcome<Result<SyncReport>> {
        self.gate.run(|| self.recompile_once())
    }

    fn recompile_once(&self) -> Result<SyncReport> {
        let (lists, custom_rules, whitelist, blacklist, enabled_categories) = {
            let state = lock(&self.state);
            (
                state.lists.clone(),
                state.custom_rules.clone(),
                state.whitelist.clone(),
                state.blacklist.clone(),
                state.enabled_categories.clone(),
            )
        };

        let input = CompileInput {
            lists: lists.iter().map(Arc::as_ref).collect(),
            custom_rules: &custom_rules,
            whitelist: &whitelist,
            blacklist: &blacklist,
            enabled_categories,
            rule_budget: Some(lock(&self.backend).limits().max_rules),
        };

        let result = compile(&input, &self.config).and_then(|compilation| {
            let mut backend = lock(&self.backend);
            synchronize(&mut *backend, &compilation.rules).map(|report| (compilation, report))
        });

        let mut state = lock(&self.state);
        match result {
            Ok((compilation, report)) => {
                let rule_ids = compilation.rule_ids();
                let churn = rule_id_churn(&state.previous_rule_ids, &rule_ids);
                for (category, changed) in &churn {
                    log::debug!("'{}' rule ids changed: {} added or removed", category, changed);
                }
                state.rule_id_churn = churn;
                state.previous_rule_ids = rule_ids;
                state.last_good = Some(Arc::new(compilation));
                state.last_error = None;
                Ok(report)
            }
            Err(e) => {
                log::warn!("recompilation failed, serving the last known-good rule set: {}", e);
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn last_compilation(&self) -> Option<Arc<Compilation>> {
        lock(&self.state).last_good.clone()
    }

    pub fn compiled_rules(&self) -> Vec<CompiledRule> {
        self.last_compilation()
            .map(|c| c.rules.clone())
            .unwrap_or_default()
    }

    /// Selectors to hide on `domain` under the last known-good rule set.
    pub fn cosmetics_for(&self, domain: &str) -> Vec<String> {
        self.last_compilation()
            .map(|c| c.cosmetics.cosmetics_for(domain))
            .unwrap_or_default()
    }

    pub fn scriptlets_for(&self, domain: &str) -> Vec<String> {
        self.last_compilation()
            .map(|c| c.cosmetics.scriptlets_for(domain))
            .unwrap_or_default()
    }

    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut lock(&self.backend))
    }

    pub fn status(&self) -> ManagerStatus {
        let state = lock(&self.state);
        ManagerStatus {
            lists: state
                .lists
                .iter()
                .map(|l| ListStatus {
                    id: l.meta.id.clone(),
                    display_name: l.meta.display_name.clone(),
                    category: l.meta.category,
                    enabled: l.meta.enabled,
                    stale: l.stale,
                    rule_count: l.rules.len(),
                    last_fetched_at: l.meta.last_fetched_at,
                })
                .collect(),
            enabled_categories: state.enabled_categories.iter().copied().collect(),
            custom_rules: state.custom_rules.len(),
            active_rules: state.last_good.as_ref().map_or(0, |c| c.rules.len()),
            last_error: state.last_error.as_ref().map(ToString::to_string),
            diagnostics: state.last_good.as_ref().map(|c| c.diagnostics.clone()),
            rule_id_churn: state.rule_id_churn.clone(),
        }
    }

    /// Rule IDs by category of the last installed compilation, or as loaded
    /// from the store until the first recompilation.
    pub fn previous_rule_ids(&self) -> BTreeMap<Category, Vec<u32>> {
        lock(&self.state).previous_rule_ids.clone()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    pub fn save_to(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        let (lists, custom_rules, domains, rule_ids) = {
            let state = lock(&self.state);
            let lists: Vec<CachedList> = state.lists.iter().map(|l| CachedList::clone(l)).collect();
            let domains = UserDomains {
                whitelist: state.whitelist.clone(),
                blacklist: state.blacklist.clone(),
                enabled_categories: state.enabled_categories.clone(),
            };
            (lists, state.custom_rules.clone(), domains, state.previous_rule_ids.clone())
        };

        store.set(KEY_FILTER_LISTS, to_json(&lists)?)?;
        store.set(KEY_CUSTOM_RULES, to_json(&custom_rules)?)?;
        store.set(KEY_USER_DOMAINS, to_json(&domains)?)?;
        store.set(KEY_COMPILED_RULE_IDS, to_json(&rule_ids)?)?;
        Ok(())
    }

    /// Restore a manager from `store`. Missing keys fall back to defaults.
    /// Nothing is compiled until [`RuleSetManager::recompile`] is called.
    pub fn load_from(config: CompilerConfig, backend: B, store: &dyn KeyValueStore) -> Result<Self> {
        let lists: Vec<CachedList> = read_json(store, KEY_FILTER_LISTS)?.unwrap_or_default();
        let custom_rules: Vec<CustomRule> = read_json(store, KEY_CUSTOM_RULES)?.unwrap_or_default();
        let domains: Option<UserDomains> = read_json(store, KEY_USER_DOMAINS)?;
        let previous_rule_ids = read_json(store, KEY_COMPILED_RULE_IDS)?.unwrap_or_default();

        let manager = Self::new(config, backend);
        {
            let mut state = lock(&manager.state);
            state.lists = lists.into_iter().map(Arc::new).collect();
            state.custom_rules = custom_rules;
            if let Some(domains) = domains {
                state.whitelist = domains.whitelist;
                state.blacklist = domains.blacklist;
                state.enabled_categories = domains.enabled_categories;
            }
            state.previous_rule_ids = previous_rule_ids;
        }
        Ok(manager)
    }
}

/// Per category, the number of IDs present in only one of the two maps.
fn rule_id_churn(
    previous: &BTreeMap<Category, Vec<u32>>,
    current: &BTreeMap<Category, Vec<u32>>,
) -> BTreeMap<Category, usize> {
    let categories: BTreeSet<Category> = previous.keys().chain(current.keys()).copied().collect();
    categories
        .into_iter()
        .filter_map(|category| {
            let before: BTreeSet<u32> = previous.get(&category).into_iter().flatten().copied().collect();
            let after: BTreeSet<u32> = current.get(&category).into_iter().flatten().copied().collect();
            let changed = before.symmetric_difference(&after).count();
            (changed > 0).then_some((category, changed))
        })
        .collect()
}

fn find_list(lists: &[Arc<CachedList>], id: &str, source_uri: &str) -> Option<usize> {
    lists
        .iter()
        .position(|l| l.id() == id)
        .or_else(|| lists.iter().position(|l| l.meta.source_uri == source_uri))
}

fn normalized_domains(domains: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(domains.len());
    for raw in domains {
        match normalize_domain(raw) {
            Some(domain) if !out.contains(&domain) => out.push(domain),
            Some(_) => {}
            None => log::warn!("ignoring invalid domain '{}'", raw),
        }
    }
    out
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| RuleSetError::Store(e.to_string()))
}

fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| RuleSetError::Store(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}
