//! Warden Filter Compiler
//!
//! This crate turns filter-list text into the bounded, prioritized rule set
//! installed in the browser's rule-matching backend, and keeps that backend
//! in sync as lists, settings and user rules change.
//!
//! # Modules
//!
//! - `parser`: Ad-filter and hosts grammar to typed rule records
//! - `optimizer`: De-duplication and `$badfilter` handling
//! - `priority`: Priority tiers for list and user rules
//! - `compiler`: Full recompilation within the rule ceiling and ID bands
//! - `cosmetics`: Per-domain element-hiding and scriptlet index
//! - `sync`: Backend contract and idempotent reconciliation
//! - `manager`: Owned state, coalesced recompilation, persistence

pub mod compiler;
pub mod config;
pub mod cosmetics;
pub mod lists;
pub mod manager;
pub mod optimizer;
pub mod parser;
pub mod priority;
pub mod store;
pub mod sync;

pub use compiler::{compile, CompileDiagnostics, CompileInput, Compilation, RangeExhaustion};
pub use config::{CompilerConfig, WardenConfig};
pub use cosmetics::CosmeticIndex;
pub use lists::{CachedList, CustomRule, CustomRuleKind, FilterList};
pub use manager::{GateOutcome, ManagerStatus, RecompileGate, RuleSetManager};
pub use optimizer::optimize_rules;
pub use parser::{parse_filter_list, ListFormat, ParsedRule};
pub use store::{KeyValueStore, MemoryStore};
pub use sync::{synchronize, BackendLimits, MemoryBackend, RuleBackend, SyncBatch, SyncPlan, SyncReport};
