use std::sync::Arc;
use std::thread;

use wd_compiler::sync::BackendError;
use wd_compiler::{
    synchronize, BackendLimits, CompilerConfig, CustomRuleKind, FilterList, GateOutcome, MemoryBackend,
    RuleBackend, RuleSetManager, SyncBatch, SyncPlan,
};
use wd_core::{Category, CompiledRule, RuleSetError};

fn list(id: &str, category: Category) -> FilterList {
    FilterList::new(id, format!("https://lists.test/{}.txt", id), category)
}

fn list_text(prefix: &str, count: usize) -> String {
    (0..count).map(|i| format!("||{}{}.test^\n", prefix, i)).collect()
}

#[test]
fn concurrent_triggers_converge_to_latest_state() {
    let manager = Arc::new(RuleSetManager::new(
        CompilerConfig::default(),
        MemoryBackend::new(BackendLimits {
            max_rules: 10_000,
            max_batch: 50,
        }),
    ));
    manager.upsert_list(list("ads", Category::Ads), &list_text("ad", 500));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                if i % 2 == 0 {
                    manager
                        .add_custom_rule(&format!("user{}.test", i), CustomRuleKind::Block)
                        .expect("valid rule");
                }
                manager.recompile()
            })
        })
        .collect();

    let mut ran = 0;
    for handle in handles {
        match handle.join().expect("no panic") {
            GateOutcome::Ran(result) => {
                result.expect("sync succeeds");
                ran += 1;
            }
            GateOutcome::Coalesced => {}
        }
    }
    assert!(ran >= 1);

    // Whatever interleaving happened, the final pass saw every custom rule.
    let installed = manager.with_backend(|backend| backend.len());
    assert_eq!(installed, 504);
    assert_eq!(manager.compiled_rules().len(), 504);
}

#[test]
fn recompile_after_list_update_only_touches_changes() {
    let manager = RuleSetManager::new(CompilerConfig::default(), MemoryBackend::new(BackendLimits::default()));
    manager.upsert_list(list("ads", Category::Ads), "||a.test^\n||b.test^\n||c.test^");
    match manager.recompile() {
        GateOutcome::Ran(Ok(report)) => assert_eq!(report.added, 3),
        other => panic!("unexpected {:?}", other),
    }

    // `b` removed: `c` shifts down to the freed ID and is re-added.
    manager.upsert_list(list("ads", Category::Ads), "||a.test^\n||c.test^");
    match manager.recompile() {
        GateOutcome::Ran(Ok(report)) => {
            assert_eq!(report.unchanged, 1);
            assert_eq!(report.removed, 2);
            assert_eq!(report.added, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(manager.with_backend(|backend| backend.len()), 2);
}

/// Fails every call after the first `budget` updates, like a backend that
/// is torn down mid-sync.
struct FlakyBackend {
    inner: MemoryBackend,
    budget: usize,
}

impl RuleBackend for FlakyBackend {
    fn limits(&self) -> BackendLimits {
        self.inner.limits()
    }

    fn installed_rules(&self) -> Result<Vec<CompiledRule>, BackendError> {
        self.inner.installed_rules()
    }

    fn update_rules(&mut self, batch: &SyncBatch) -> Result<(), BackendError> {
        if self.budget == 0 {
            return Err(BackendError::Unavailable("worker restarted".to_string()));
        }
        self.budget -= 1;
        self.inner.update_rules(batch)
    }
}

#[test]
fn interrupted_sync_is_repaired_by_fresh_diff() {
    let manager = RuleSetManager::new(
        CompilerConfig::default(),
        FlakyBackend {
            inner: MemoryBackend::new(BackendLimits {
                max_rules: 1_000,
                max_batch: 10,
            }),
            budget: 2,
        },
    );
    manager.upsert_list(list("ads", Category::Ads), &list_text("ad", 35));

    match manager.recompile() {
        GateOutcome::Ran(Err(RuleSetError::BackendSyncFailed {
            applied_removals,
            applied_additions,
            ..
        })) => {
            assert_eq!(applied_removals, 0);
            assert_eq!(applied_additions, 20);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(manager.compiled_rules().is_empty());
    assert!(manager.status().last_error.is_some());

    manager.with_backend(|backend| backend.budget = usize::MAX);
    match manager.recompile() {
        GateOutcome::Ran(Ok(report)) => {
            assert_eq!(report.unchanged, 20);
            assert_eq!(report.added, 15);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(manager.with_backend(|backend| backend.inner.len()), 35);
    assert!(manager.status().last_error.is_none());
}

#[test]
fn stale_rules_left_by_a_crash_are_removed() {
    let mut backend = MemoryBackend::new(BackendLimits::default());
    let manager = RuleSetManager::new(CompilerConfig::default(), MemoryBackend::new(BackendLimits::default()));
    manager.upsert_list(list("ads", Category::Ads), "||a.test^\n||b.test^");
    manager.recompile();
    let old = manager.compiled_rules();
    synchronize(&mut backend, &old).expect("initial sync");

    manager.upsert_list(list("ads", Category::Ads), "||a.test^");
    manager.recompile();
    let target = manager.compiled_rules();

    // Diff computed, process died before removals were issued.
    let plan = SyncPlan::diff(&target, &old);
    assert_eq!(plan.remove_ids, vec![old[1].id]);

    let report = synchronize(&mut backend, &target).expect("recovery sync");
    assert_eq!(report.removed, 1);
    let installed: Vec<_> = backend.rules().cloned().collect();
    assert_eq!(installed, target);
}

#[test]
fn saturated_lists_leave_room_for_user_rules() {
    let text = list_text("sub", 40_000);

    let manager = RuleSetManager::new(CompilerConfig::default(), MemoryBackend::new(BackendLimits::default()));
    manager.upsert_list(list("big", Category::FilterLists), &text);
    manager
        .add_custom_rule("user.test", CustomRuleKind::Block)
        .expect("valid rule");
    manager.set_user_domains(&[], &["evil.test".to_string()]);

    let report = match manager.recompile() {
        GateOutcome::Ran(result) => result.expect("batch fits the backend"),
        GateOutcome::Coalesced => panic!("no concurrent run"),
    };
    assert_eq!(report.added, 29_002);
    assert_eq!(manager.with_backend(|backend| backend.len()), 29_002);

    // A backend with less headroom than the configured ceiling shrinks it.
    let tight = RuleSetManager::new(
        CompilerConfig::default(),
        MemoryBackend::new(BackendLimits {
            max_rules: 29_001,
            max_batch: 1_000,
        }),
    );
    tight.upsert_list(list("big", Category::FilterLists), &text);
    for pattern in ["u1.test", "u2.test", "u3.test"] {
        tight.add_custom_rule(pattern, CustomRuleKind::Block).expect("valid rule");
    }

    match tight.recompile() {
        GateOutcome::Ran(result) => {
            result.expect("batch fits the backend");
        }
        GateOutcome::Coalesced => panic!("no concurrent run"),
    }
    let (installed, custom) = tight.with_backend(|backend| {
        let custom = backend
            .rules()
            .filter(|r| r.source_category == Category::Custom)
            .count();
        (backend.len(), custom)
    });
    assert_eq!(installed, 29_001);
    assert_eq!(custom, 3);

    let diagnostics = tight.status().diagnostics.expect("compiled");
    assert_eq!(diagnostics.list_ceiling, 28_998);
    assert_eq!(diagnostics.capacity_dropped, 40_000 - 28_998);
}
