//! Agent settings and per-operation overlays.
//!
//! Settings are keyed by dotted paths (`section.key`). A request never mutates
//! shared settings: it takes a snapshot of the baseline, applies its operation's
//! overlay and hands the result to the agent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::operation::Operation;

pub mod keys {
    pub const ENABLE_REVIEW_LABELS_SECURITY: &str = "pr_reviewer.enable_review_labels_security";
    pub const ENABLE_REVIEW_LABELS_EFFORT: &str = "pr_reviewer.enable_review_labels_effort";
    pub const REQUIRE_SCORE_REVIEW: &str = "pr_reviewer.require_score_review";
    pub const REQUIRE_TESTS_REVIEW: &str = "pr_reviewer.require_tests_review";
    pub const REQUIRE_SECURITY_REVIEW: &str = "pr_reviewer.require_security_review";
    pub const REQUIRE_FOCUSED_REVIEW: &str = "pr_reviewer.require_focused_review";
    pub const EXTRA_INSTRUCTIONS: &str = "pr_reviewer.extra_instructions";

    pub const GIT_PROVIDER: &str = "config.git_provider";
    pub const VERBOSITY_LEVEL: &str = "config.verbosity_level";
    pub const OPENAI_KEY: &str = "openai.key";
    pub const OPENAI_API_TYPE: &str = "openai.api_type";
    pub const OPENAI_API_VERSION: &str = "openai.api_version";
    pub const OPENAI_API_BASE: &str = "openai.api_base";
    pub const OPENAI_DEPLOYMENT_ID: &str = "openai.deployment_id";
    pub const GITHUB_USER_TOKEN: &str = "github.user_token";
}

/// Review instructions used for bug scans.
pub const BUG_SCAN_INSTRUCTIONS: &str = "Focus exclusively on identifying bugs, logic errors, \
security vulnerabilities, and potential runtime issues. Skip style and maintainability concerns.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Int(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}

/// Ordered list of overrides. Later entries win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverlay {
    entries: Vec<(String, SettingValue)>,
}

impl SettingsOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    pub fn entries(&self) -> &[(String, SettingValue)] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Overrides an operation applies before the agent is invoked.
    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Review => Self::new()
                .set(keys::ENABLE_REVIEW_LABELS_SECURITY, false)
                .set(keys::ENABLE_REVIEW_LABELS_EFFORT, false),
            Operation::FindBugs => Self::new()
                .set(keys::ENABLE_REVIEW_LABELS_SECURITY, false)
                .set(keys::ENABLE_REVIEW_LABELS_EFFORT, false)
                .set(keys::REQUIRE_SCORE_REVIEW, false)
                .set(keys::REQUIRE_TESTS_REVIEW, false)
                .set(keys::REQUIRE_SECURITY_REVIEW, true)
                .set(keys::REQUIRE_FOCUSED_REVIEW, false)
                .set(keys::EXTRA_INSTRUCTIONS, BUG_SCAN_INSTRUCTIONS),
            _ => Self::new(),
        }
    }

    /// Keys an operation resets once the agent returns, under the partial restore policy.
    pub fn reset_for(operation: Operation) -> Self {
        match operation {
            Operation::FindBugs => Self::new()
                .set(keys::REQUIRE_SECURITY_REVIEW, true)
                .set(keys::EXTRA_INSTRUCTIONS, ""),
            _ => Self::new(),
        }
    }
}

/// Immutable map of agent settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten `[section] key = value` tables into dotted keys.
    pub fn from_sections(sections: &BTreeMap<String, BTreeMap<String, SettingValue>>) -> Self {
        let values = sections
            .iter()
            .flat_map(|(section, entries)| {
                entries
                    .iter()
                    .map(move |(key, value)| (format!("{}.{}", section, key), value.clone()))
            })
            .collect();
        Self { values }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(SettingValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingValue::as_str)
    }

    /// Return a copy with the overlay applied.
    pub fn apply(&self, overlay: &SettingsOverlay) -> Settings {
        let mut values = self.values.clone();
        for (key, value) in overlay.entries() {
            values.insert(key.clone(), value.clone());
        }
        Settings { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What survives in the session baseline after a request overrides settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestorePolicy {
    /// Every override is scoped to its own request.
    #[default]
    All,
    /// Overrides persist into the baseline; bug scans reset only the security-review
    /// flag and the extra instructions afterwards.
    Partial,
}

impl std::str::FromStr for RestorePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(RestorePolicy::All),
            "partial" => Ok(RestorePolicy::Partial),
            other => Err(Error::invalid_request(format!(
                "unknown restore policy '{}' (expected 'all' or 'partial')",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_restore_policy() {
        assert_eq!("all".parse::<RestorePolicy>().unwrap(), RestorePolicy::All);
        assert_eq!("Partial".parse::<RestorePolicy>().unwrap(), RestorePolicy::Partial);
        assert!("some".parse::<RestorePolicy>().is_err());
    }

    #[test]
    fn test_from_sections_flattens_keys() {
        let mut reviewer = BTreeMap::new();
        reviewer.insert("num_max_findings".to_string(), SettingValue::Int(5));
        let mut sections = BTreeMap::new();
        sections.insert("pr_reviewer".to_string(), reviewer);

        let settings = Settings::from_sections(&sections);
        assert_eq!(
            settings.get("pr_reviewer.num_max_findings"),
            Some(&SettingValue::Int(5))
        );
    }

    #[test]
    fn test_apply_does_not_mutate_base() {
        let base = Settings::new().with(keys::REQUIRE_SECURITY_REVIEW, false);
        let effective = base.apply(&SettingsOverlay::for_operation(Operation::FindBugs));

        assert_eq!(base.get_bool(keys::REQUIRE_SECURITY_REVIEW), Some(false));
        assert_eq!(effective.get_bool(keys::REQUIRE_SECURITY_REVIEW), Some(true));
        assert_eq!(
            effective.get_str(keys::EXTRA_INSTRUCTIONS),
            Some(BUG_SCAN_INSTRUCTIONS)
        );
    }

    #[test]
    fn test_overlay_later_entries_win() {
        let overlay = SettingsOverlay::new()
            .set("config.verbosity_level", 0i64)
            .set("config.verbosity_level", 2i64);
        let settings = Settings::new().apply(&overlay);
        assert_eq!(
            settings.get("config.verbosity_level"),
            Some(&SettingValue::Int(2))
        );
    }

    #[test]
    fn test_find_bugs_overlay_order() {
        let overlay = SettingsOverlay::for_operation(Operation::FindBugs);
        let names: Vec<&str> = overlay.keys().collect();
        assert_eq!(
            names,
            vec![
                keys::ENABLE_REVIEW_LABELS_SECURITY,
                keys::ENABLE_REVIEW_LABELS_EFFORT,
                keys::REQUIRE_SCORE_REVIEW,
                keys::REQUIRE_TESTS_REVIEW,
                keys::REQUIRE_SECURITY_REVIEW,
                keys::REQUIRE_FOCUSED_REVIEW,
                keys::EXTRA_INSTRUCTIONS,
            ]
        );
        assert_eq!(SettingsOverlay::reset_for(Operation::FindBugs).len(), 2);
        assert!(SettingsOverlay::for_operation(Operation::Describe).is_empty());
    }

    #[test]
    fn test_setting_value_deserialize_untagged() {
        let value: SettingValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, SettingValue::Bool(true));
        let value: SettingValue = serde_json::from_str("3").unwrap();
        assert_eq!(value, SettingValue::Int(3));
        let value: SettingValue = serde_json::from_str("\"github\"").unwrap();
        assert_eq!(value.to_string(), "github");
    }
}
