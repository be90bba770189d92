//! Core type definitions for Warden
//!
//! These types describe rules as they leave the compiler and are handed to
//! the rule-matching backend. They are used throughout the workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleSetError;

// =============================================================================
// Rule Actions
// =============================================================================

/// Action to take for a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Exception rule (@@...) - allows the request
    Allow,
    /// Block rule - cancels the request
    Block,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

// =============================================================================
// Categories
// =============================================================================

/// Logical source of a compiled rule. Every category owns one ID range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ads,
    Trackers,
    Social,
    Cryptominers,
    Malware,
    /// User whitelisted domains
    Whitelist,
    /// User blacklisted domains
    Blacklist,
    /// User-authored custom rules
    Custom,
    /// Subscribed third-party filter lists
    FilterLists,
}

impl Category {
    /// All categories in ID-range order.
    pub const ALL: [Category; 9] = [
        Self::Ads,
        Self::Trackers,
        Self::Social,
        Self::Cryptominers,
        Self::Malware,
        Self::Whitelist,
        Self::Blacklist,
        Self::Custom,
        Self::FilterLists,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ads => "ads",
            Self::Trackers => "trackers",
            Self::Social => "social",
            Self::Cryptominers => "cryptominers",
            Self::Malware => "malware",
            Self::Whitelist => "whitelist",
            Self::Blacklist => "blacklist",
            Self::Custom => "custom",
            Self::FilterLists => "filterlists",
        }
    }

    /// Whether a filter list may be filed under this category.
    pub fn is_list_category(&self) -> bool {
        !matches!(self, Self::Whitelist | Self::Blacklist | Self::Custom)
    }

    /// Whether lists in this category are gated by the enabled-category set.
    /// Subscribed lists only honour their own enabled flag.
    pub fn is_toggleable(&self) -> bool {
        matches!(
            self,
            Self::Ads | Self::Trackers | Self::Social | Self::Cryptominers | Self::Malware
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RuleSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RuleSetError::Config(format!("unknown category '{}'", s)))
    }
}

// =============================================================================
// Resource Types (bit mask for type filtering)
// =============================================================================

bitflags::bitflags! {
    /// Resource type bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ResourceType: u32 {
        const MAIN_FRAME = 1 << 0;
        const SUB_FRAME = 1 << 1;   // iframe/frame
        const STYLESHEET = 1 << 2;
        const SCRIPT = 1 << 3;
        const IMAGE = 1 << 4;
        const FONT = 1 << 5;
        const OBJECT = 1 << 6;
        const XMLHTTPREQUEST = 1 << 7;
        const PING = 1 << 8;
        const MEDIA = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const OTHER = 1 << 11;

        /// Types covered by a network rule without a type option
        const DEFAULT = Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::SUB_FRAME.bits()
            | Self::MEDIA.bits()
            | Self::FONT.bits()
            | Self::OTHER.bits();
        /// All request types
        const ALL = 0x0FFF;
    }
}

/// Backend names, in the order the backend documents them.
const RESOURCE_TYPE_NAMES: [(ResourceType, &str); 12] = [
    (ResourceType::MAIN_FRAME, "main_frame"),
    (ResourceType::SUB_FRAME, "sub_frame"),
    (ResourceType::STYLESHEET, "stylesheet"),
    (ResourceType::SCRIPT, "script"),
    (ResourceType::IMAGE, "image"),
    (ResourceType::FONT, "font"),
    (ResourceType::OBJECT, "object"),
    (ResourceType::XMLHTTPREQUEST, "xmlhttprequest"),
    (ResourceType::PING, "ping"),
    (ResourceType::MEDIA, "media"),
    (ResourceType::WEBSOCKET, "websocket"),
    (ResourceType::OTHER, "other"),
];

impl ResourceType {
    /// Map a filter-list option token (`script`, `css`, `xhr`, ...) to a type.
    pub fn from_option(name: &str) -> Option<Self> {
        match name {
            "script" => Some(Self::SCRIPT),
            "image" => Some(Self::IMAGE),
            "stylesheet" | "css" => Some(Self::STYLESHEET),
            "xmlhttprequest" | "xhr" => Some(Self::XMLHTTPREQUEST),
            "subdocument" | "frame" => Some(Self::SUB_FRAME),
            "document" | "doc" => Some(Self::MAIN_FRAME),
            "media" => Some(Self::MEDIA),
            "font" => Some(Self::FONT),
            "object" | "object-subrequest" => Some(Self::OBJECT),
            "ping" | "beacon" => Some(Self::PING),
            "websocket" => Some(Self::WEBSOCKET),
            "other" => Some(Self::OTHER),
            "all" => Some(Self::ALL),
            _ => None,
        }
    }

    /// Parse from a backend request type string.
    pub fn from_request(name: &str) -> Self {
        RESOURCE_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(t, _)| *t)
            .unwrap_or(Self::OTHER)
    }

    /// Backend names for every type in the mask.
    pub fn names(&self) -> Vec<&'static str> {
        RESOURCE_TYPE_NAMES
            .iter()
            .filter(|(t, _)| self.contains(*t))
            .map(|(_, n)| *n)
            .collect()
    }

    /// Inverse of [`ResourceType::names`]; unknown names are ignored.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        names.iter().fold(Self::empty(), |acc, name| {
            match RESOURCE_TYPE_NAMES.iter().find(|(_, n)| *n == name.as_ref()) {
                Some((t, _)) => acc | *t,
                None => acc,
            }
        })
    }
}

// =============================================================================
// Party
// =============================================================================

/// First-party / third-party restriction of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DomainType {
    FirstParty,
    ThirdParty,
}

// =============================================================================
// Compiled Rule
// =============================================================================

/// A normalized, backend-ready rule with an allocated ID and priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRule {
    /// Unique within one compilation; inside the range of `source_category`
    pub id: u32,
    /// Higher wins; Allow wins ties
    pub priority: u32,
    pub action: RuleAction,
    /// Anchored regular expression matched against the request URL
    pub match_pattern: String,
    pub resource_types: Option<ResourceType>,
    pub initiator_domain_includes: Option<Vec<String>>,
    pub initiator_domain_excludes: Option<Vec<String>>,
    pub domain_type: Option<DomainType>,
    #[serde(default)]
    pub case_sensitive: bool,
    pub source_category: Category,
}
