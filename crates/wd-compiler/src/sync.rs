//! Dynamic Rule Set Synchronizer
//!
//! Reconciles a compiled rule batch with whatever the backend reports as
//! installed. The backend gives no transactions, so every run starts from
//! observed state: read, diff, then apply removals and additions in
//! sequential chunks. Re-running after a partial failure converges.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use wd_core::error::{Result, RuleSetError};
use wd_core::types::CompiledRule;

// =============================================================================
// Backend Contract
// =============================================================================

/// Limits the backend enforces on standing rules and per-call batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendLimits {
    pub max_rules: usize,
    pub max_batch: usize,
}

impl Default for BackendLimits {
    fn default() -> Self {
        Self {
            max_rules: 30_000,
            max_batch: 1_000,
        }
    }
}

impl BackendLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_rules == 0 || self.max_batch == 0 {
            return Err(RuleSetError::Config(
                "backend limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("batch rejected: {0}")]
    Rejected(String),
    #[error("standing rule limit of {limit} exceeded")]
    Capacity { limit: usize },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// One `{addRules, removeRuleIds}` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    pub add_rules: Vec<CompiledRule>,
    pub remove_rule_ids: Vec<u32>,
}

impl SyncBatch {
    pub fn len(&self) -> usize {
        self.add_rules.len() + self.remove_rule_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.add_rules.is_empty() && self.remove_rule_ids.is_empty()
    }
}

/// The rule-matching engine that evaluates installed rules. The
/// synchronizer is its only writer.
pub trait RuleBackend {
    fn limits(&self) -> BackendLimits;

    fn installed_rules(&self) -> std::result::Result<Vec<CompiledRule>, BackendError>;

    fn update_rules(&mut self, batch: &SyncBatch) -> std::result::Result<(), BackendError>;
}

// =============================================================================
// Diff
// =============================================================================

/// Operations that turn the installed set into the target set. A rule whose
/// ID is kept but whose content changed is removed and re-added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub remove_ids: Vec<u32>,
    pub add: Vec<CompiledRule>,
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn diff(target: &[CompiledRule], installed: &[CompiledRule]) -> Self {
        let installed_by_id: BTreeMap<u32, &CompiledRule> =
            installed.iter().map(|rule| (rule.id, rule)).collect();
        let target_ids: BTreeSet<u32> = target.iter().map(|rule| rule.id).collect();

        let mut plan = SyncPlan {
            remove_ids: installed_by_id
                .keys()
                .copied()
                .filter(|id| !target_ids.contains(id))
                .collect(),
            ..SyncPlan::default()
        };

        let mut add: Vec<&CompiledRule> = Vec::new();
        for rule in target {
            match installed_by_id.get(&rule.id) {
                Some(existing) if *existing == rule => plan.unchanged += 1,
                Some(_) => {
                    plan.remove_ids.push(rule.id);
                    add.push(rule);
                }
                None => add.push(rule),
            }
        }

        plan.remove_ids.sort_unstable();
        plan.remove_ids.dedup();
        add.sort_by_key(|rule| rule.id);
        plan.add = add.into_iter().cloned().collect();
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.remove_ids.is_empty() && self.add.is_empty()
    }

    /// Chunk into backend calls of at most `max_batch` operations:
    /// all removals first, then additions.
    pub fn batches(&self, max_batch: usize) -> Vec<SyncBatch> {
        let max_batch = max_batch.max(1);
        let mut batches = Vec::new();

        for chunk in self.remove_ids.chunks(max_batch) {
            batches.push(SyncBatch {
                add_rules: Vec::new(),
                remove_rule_ids: chunk.to_vec(),
            });
        }
        for chunk in self.add.chunks(max_batch) {
            batches.push(SyncBatch {
                add_rules: chunk.to_vec(),
                remove_rule_ids: Vec::new(),
            });
        }

        batches
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub removed: usize,
    pub added: usize,
    pub unchanged: usize,
    pub batches: usize,
}

/// Bring the backend to exactly `target`.
pub fn synchronize<B: RuleBackend + ?Sized>(backend: &mut B, target: &[CompiledRule]) -> Result<SyncReport> {
    let limits = backend.limits();
    if target.len() > limits.max_rules {
        return Err(RuleSetError::BackendCapacity {
            wanted: target.len(),
            limit: limits.max_rules,
        });
    }

    let installed = backend
        .installed_rules()
        .map_err(|e| sync_failed(e, &SyncReport::default()))?;
    let plan = SyncPlan::diff(target, &installed);

    let mut report = SyncReport {
        unchanged: plan.unchanged,
        ..SyncReport::default()
    };

    for batch in plan.batches(limits.max_batch) {
        backend
            .update_rules(&batch)
            .map_err(|e| sync_failed(e, &report))?;
        report.removed += batch.remove_rule_ids.len();
        report.added += batch.add_rules.len();
        report.batches += 1;
    }

    if report.batches > 0 {
        log::info!(
            "synchronized rules: {} added, {} removed, {} unchanged in {} batches",
            report.added,
            report.removed,
            report.unchanged,
            report.batches
        );
    } else {
        log::debug!("backend already up to date ({} rules)", report.unchanged);
    }

    Ok(report)
}

fn sync_failed(error: BackendError, report: &SyncReport) -> RuleSetError {
    log::warn!("backend sync failed: {}", error);
    RuleSetError::BackendSyncFailed {
        reason: error.to_string(),
        applied_removals: report.removed,
        applied_additions: report.added,
    }
}

// =============================================================================
// In-memory Backend
// =============================================================================

/// A backend held in memory, enforcing the same limits a browser does.
/// Each call is validated before anything is applied.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rules: BTreeMap<u32, CompiledRule>,
    limits: BackendLimits,
    calls: usize,
    fail_on_call: Option<usize>,
}

impl MemoryBackend {
    pub fn new(limits: BackendLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Make the `call`-th `update_rules` call (1-based, counted over the
    /// backend's lifetime) fail without applying anything.
    pub fn fail_on_call(&mut self, call: usize) {
        self.fail_on_call = Some(call);
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.values()
    }
}

impl RuleBackend for MemoryBackend {
    fn limits(&self) -> BackendLimits {
        self.limits
    }

    fn installed_rules(&self) -> std::result::Result<Vec<CompiledRule>, BackendError> {
        Ok(self.rules.values().cloned().collect())
    }

    fn update_rules(&mut self, batch: &SyncBatch) -> std::result::Result<(), BackendError> {
        self.calls += 1;
        if self.fail_on_call == Some(self.calls) {
            return Err(BackendError::Unavailable(format!("injected failure on call {}", self.calls)));
        }

        if batch.len() > self.limits.max_batch {
            return Err(BackendError::Rejected(format!(
                "batch of {} operations exceeds {}",
                batch.len(),
                self.limits.max_batch
            )));
        }

        let removing: BTreeSet<u32> = batch
            .remove_rule_ids
            .iter()
            .copied()
            .filter(|id| self.rules.contains_key(id))
            .collect();

        let mut adding = BTreeSet::new();
        for rule in &batch.add_rules {
            let taken = self.rules.contains_key(&rule.id) && !removing.contains(&rule.id);
            if taken || !adding.insert(rule.id) {
                return Err(BackendError::Rejected(format!("duplicate rule id {}", rule.id)));
            }
        }

        if self.rules.len() - removing.len() + adding.len() > self.limits.max_rules {
            return Err(BackendError::Capacity {
                limit: self.limits.max_rules,
            });
        }

        for id in removing {
            self.rules.remove(&id);
        }
        for rule in &batch.add_rules {
            self.rules.insert(rule.id, rule.clone());
        }

        Ok(())
    }
}
