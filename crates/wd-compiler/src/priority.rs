//! Exception/priority resolution.
//!
//! The backend picks the highest-priority matching rule and lets Allow win
//! a tie, so every tier that must override another sits strictly above it.

use wd_core::types::{Category, RuleAction};

use crate::parser::NetworkRule;

/// Priority tiers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityTier {
    ListBlock,
    ListImportant,
    ListException,
    Blacklist,
    Whitelist,
    CustomBlock,
    CustomAllow,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 7] = [
        PriorityTier::ListBlock,
        PriorityTier::ListImportant,
        PriorityTier::ListException,
        PriorityTier::Blacklist,
        PriorityTier::Whitelist,
        PriorityTier::CustomBlock,
        PriorityTier::CustomAllow,
    ];

    pub const fn priority(self) -> u32 {
        match self {
            PriorityTier::ListBlock => 1,
            PriorityTier::ListImportant => 2,
            PriorityTier::ListException => 3,
            PriorityTier::Blacklist => 4,
            PriorityTier::Whitelist => 5,
            PriorityTier::CustomBlock => 6,
            PriorityTier::CustomAllow => 7,
        }
    }

    pub const fn action(self) -> RuleAction {
        match self {
            PriorityTier::ListException | PriorityTier::Whitelist | PriorityTier::CustomAllow => {
                RuleAction::Allow
            }
            _ => RuleAction::Block,
        }
    }

    /// Tier of a rule coming out of a subscribed list.
    pub fn for_list_rule(rule: &NetworkRule) -> Self {
        if rule.is_exception {
            PriorityTier::ListException
        } else if rule.important {
            PriorityTier::ListImportant
        } else {
            PriorityTier::ListBlock
        }
    }

    /// Tier of a user-authored rule in the given category band.
    pub fn for_user_rule(category: Category, is_exception: bool) -> Self {
        match (category, is_exception) {
            (Category::Whitelist, _) => PriorityTier::Whitelist,
            (Category::Blacklist, _) => PriorityTier::Blacklist,
            (_, true) => PriorityTier::CustomAllow,
            (_, false) => PriorityTier::CustomBlock,
        }
    }
}
