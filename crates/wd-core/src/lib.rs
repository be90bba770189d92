//! Warden Core Library
//!
//! This crate holds the rule model shared by the filter compiler, the
//! dynamic rule synchronizer and the extension bindings, together with the
//! pure leaf functions the compiler is built on.
//!
//! # Modules
//!
//! - `types`: Rule actions, categories, resource types and compiled rules
//! - `domain`: Domain inclusion/exclusion matching
//! - `pattern`: Ad-filter pattern to anchored regex translation
//! - `ids`: Rule ID ranges and per-category allocation
//! - `url`: Allocation-free URL helpers
//! - `matcher`: Reference evaluator with backend precedence semantics
//! - `declarative`: Declarative-rule JSON shape handed to the browser
//! - `error`: Shared error type

pub mod declarative;
pub mod domain;
pub mod error;
pub mod ids;
pub mod matcher;
pub mod pattern;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use domain::{applies, matches_domain, normalize_domain};
pub use error::{Result, RuleSetError};
pub use ids::{IdAllocator, IdSequence, IdSpace, RuleIdRange};
pub use matcher::{MatchDecision, MatchResult, RequestContext, RuleMatcher};
pub use pattern::to_match_pattern;
pub use types::{Category, CompiledRule, DomainType, ResourceType, RuleAction};
