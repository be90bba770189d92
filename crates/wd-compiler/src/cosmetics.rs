//! Cosmetic Index
//!
//! Element-hiding and scriptlet rules never reach the network backend. They
//! are indexed by the domains they name and looked up per page.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use wd_core::domain::{applies, normalize_domain, suffixes};

use crate::parser::{ElementHideRule, ScriptletRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CosmeticKind {
    Selector,
    Scriptlet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CosmeticEntry {
    pub kind: CosmeticKind,
    /// CSS selector or opaque script text
    pub body: String,
    pub domain_includes: Vec<String>,
    pub domain_excludes: Vec<String>,
    pub is_exception: bool,
}

/// Cosmetic rules keyed by domain. Entries without includes are generic and
/// checked on every lookup.
#[derive(Debug, Clone, Default)]
pub struct CosmeticIndex {
    entries: Vec<CosmeticEntry>,
    generic: Vec<usize>,
    by_domain: BTreeMap<String, Vec<usize>>,
}

impl CosmeticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_element_hide(&mut self, rule: &ElementHideRule) {
        self.insert(CosmeticEntry {
            kind: CosmeticKind::Selector,
            body: rule.selector.clone(),
            domain_includes: rule.domain_includes.clone(),
            domain_excludes: rule.domain_excludes.clone(),
            is_exception: rule.is_exception,
        });
    }

    pub fn insert_scriptlet(&mut self, rule: &ScriptletRule) {
        self.insert(CosmeticEntry {
            kind: CosmeticKind::Scriptlet,
            body: rule.script_body.clone(),
            domain_includes: rule.domain_includes.clone(),
            domain_excludes: rule.domain_excludes.clone(),
            is_exception: rule.is_exception,
        });
    }

    fn insert(&mut self, entry: CosmeticEntry) {
        let index = self.entries.len();
        if entry.domain_includes.is_empty() {
            self.generic.push(index);
        } else {
            for domain in &entry.domain_includes {
                self.by_domain.entry(domain.clone()).or_default().push(index);
            }
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Selectors to hide on `domain`, sorted, with exceptions applied.
    pub fn cosmetics_for(&self, domain: &str) -> Vec<String> {
        self.lookup(domain, CosmeticKind::Selector)
    }

    /// Script bodies to inject on `domain`, sorted, with exceptions applied.
    pub fn scriptlets_for(&self, domain: &str) -> Vec<String> {
        self.lookup(domain, CosmeticKind::Scriptlet)
    }

    /// Selectors stored under exactly `domain`, ignoring exceptions and
    /// generic rules.
    pub fn domain_entries(&self, domain: &str) -> Vec<String> {
        let Some(domain) = normalize_domain(domain) else {
            return Vec::new();
        };
        self.by_domain
            .get(&domain)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &self.entries[i])
                    .filter(|e| e.kind == CosmeticKind::Selector && !e.is_exception)
                    .map(|e| e.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[CosmeticEntry] {
        &self.entries
    }

    fn lookup(&self, domain: &str, kind: CosmeticKind) -> Vec<String> {
        let Some(domain) = normalize_domain(domain) else {
            return Vec::new();
        };

        let mut candidates: BTreeSet<usize> = self.generic.iter().copied().collect();
        for suffix in suffixes(&domain) {
            if let Some(indices) = self.by_domain.get(suffix) {
                candidates.extend(indices.iter().copied());
            }
        }

        let mut selected = BTreeSet::new();
        let mut excepted = BTreeSet::new();
        for entry in candidates.into_iter().map(|i| &self.entries[i]) {
            if entry.kind != kind || !applies(&entry.domain_includes, &entry.domain_excludes, &domain) {
                continue;
            }
            if entry.is_exception {
                excepted.insert(entry.body.as_str());
            } else {
                selected.insert(entry.body.as_str());
            }
        }

        selected
            .difference(&excepted)
            .map(|body| body.to_string())
            .collect()
    }
}
