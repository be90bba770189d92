//! Declarative rule shape
//!
//! The JSON records the browser's declarative rule API accepts and returns.
//! Compiled rules are rendered into this shape for installation, and the
//! installed set read back from the browser is converted into compiled rules
//! for diffing.

use serde::{Deserialize, Serialize};

use crate::ids::IdSpace;
use crate::types::{Category, CompiledRule, DomainType, ResourceType, RuleAction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarativeRule {
    pub id: u32,
    pub priority: u32,
    pub action: DeclarativeAction,
    pub condition: DeclarativeCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarativeAction {
    #[serde(rename = "type")]
    pub kind: RuleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_initiator_domains: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<DomainType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_url_filter_case_sensitive: Option<bool>,
}

impl From<&CompiledRule> for DeclarativeRule {
    fn from(rule: &CompiledRule) -> Self {
        Self {
            id: rule.id,
            priority: rule.priority,
            action: DeclarativeAction { kind: rule.action },
            condition: DeclarativeCondition {
                regex_filter: Some(rule.match_pattern.clone()),
                resource_types: rule
                    .resource_types
                    .map(|types| types.names().into_iter().map(String::from).collect()),
                initiator_domains: rule.initiator_domain_includes.clone(),
                excluded_initiator_domains: rule.initiator_domain_excludes.clone(),
                domain_type: rule.domain_type,
                is_url_filter_case_sensitive: Some(rule.case_sensitive),
            },
        }
    }
}

impl CompiledRule {
    pub fn to_declarative(&self) -> DeclarativeRule {
        DeclarativeRule::from(self)
    }
}

impl DeclarativeRule {
    /// Convert an installed record back into a compiled rule. The category is
    /// recovered from the ID band; IDs outside every band are filed under
    /// `Custom` and will simply fail to match any target rule when diffed.
    pub fn into_compiled(self, space: &IdSpace) -> CompiledRule {
        let condition = self.condition;
        CompiledRule {
            id: self.id,
            priority: self.priority,
            action: self.action.kind,
            match_pattern: condition.regex_filter.unwrap_or_default(),
            resource_types: condition
                .resource_types
                .map(|names| ResourceType::from_names(&names)),
            initiator_domain_includes: condition.initiator_domains,
            initiator_domain_excludes: condition.excluded_initiator_domains,
            domain_type: condition.domain_type,
            case_sensitive: condition.is_url_filter_case_sensitive.unwrap_or(false),
            source_category: space.category_of(self.id).unwrap_or(Category::Custom),
        }
    }
}
