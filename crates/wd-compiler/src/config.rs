//! Compiler and synchronizer configuration, loaded from JSON.

use serde::{Deserialize, Serialize};
use wd_core::error::{Result, RuleSetError};
use wd_core::ids::IdSpace;
use wd_core::types::{Category, ResourceType};

use crate::sync::BackendLimits;

/// One thousand below the backend's default limit, leaving room for user rules.
pub const DEFAULT_MAX_LIST_RULES: usize = 29_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Ceiling on list-sourced rules; user rules are not counted
    pub max_list_rules: usize,
    pub id_ranges: IdSpace,
    /// Types applied to network rules that name none
    #[serde(with = "resource_type_names")]
    pub default_resource_types: ResourceType,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_list_rules: DEFAULT_MAX_LIST_RULES,
            id_ranges: IdSpace::default(),
            default_resource_types: ResourceType::DEFAULT,
        }
    }
}

impl CompilerConfig {
    /// Every category must own a band, and the default type set must not
    /// be empty.
    pub fn validate(&self) -> Result<()> {
        for category in Category::ALL {
            if self.id_ranges.range(category).is_none() {
                return Err(RuleSetError::InvalidIdRanges(format!(
                    "no range declared for '{}'",
                    category
                )));
            }
        }
        if self.default_resource_types.is_empty() {
            return Err(RuleSetError::Config(
                "default_resource_types must name at least one type".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub compiler: CompilerConfig,
    pub sync: BackendLimits,
}

impl WardenConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| RuleSetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The list ceiling has to stay below the backend limit, or a full set
    /// of lists leaves no room for custom and user domain rules.
    pub fn validate(&self) -> Result<()> {
        self.compiler.validate()?;
        self.sync.validate()?;
        if self.compiler.max_list_rules >= self.sync.max_rules {
            return Err(RuleSetError::Config(format!(
                "max_list_rules ({}) must be below the backend limit of {}",
                self.compiler.max_list_rules, self.sync.max_rules
            )));
        }
        Ok(())
    }
}

/// Resource types as a list of backend names instead of a raw bit mask.
mod resource_type_names {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use wd_core::types::ResourceType;

    pub fn serialize<S: Serializer>(types: &ResourceType, serializer: S) -> Result<S::Ok, S::Error> {
        types.names().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ResourceType, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut types = ResourceType::empty();
        for name in &names {
            match ResourceType::from_option(name) {
                Some(t) => types |= t,
                None => {
                    let known = ResourceType::from_names(std::slice::from_ref(name));
                    if known.is_empty() {
                        return Err(serde::de::Error::custom(format!("unknown resource type '{}'", name)));
                    }
                    types |= known;
                }
            }
        }
        Ok(types)
    }
}
