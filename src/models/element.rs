//! UI element addressing and description types.

use serde::{Deserialize, Serialize};

/// Criteria used to locate a single UI element.
///
/// At least one field must be set; when several are set an element must
/// match all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementQuery {
    /// Stable automation identifier assigned by the application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    /// Accessible name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Control type, e.g. `Button` or `Edit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
}

impl ElementQuery {
    /// Query by automation id only.
    #[must_use]
    pub fn by_automation_id(automation_id: impl Into<String>) -> Self {
        Self {
            automation_id: Some(automation_id.into()),
            ..Self::default()
        }
    }

    /// Whether no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.automation_id.is_none() && self.name.is_none() && self.control_type.is_none()
    }

    /// Reject an empty query or blank criteria.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the query cannot match anything.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.is_empty() {
            return Err("at least one of automationId, name or controlType is required".into());
        }
        let blank = [&self.automation_id, &self.name, &self.control_type]
            .into_iter()
            .flatten()
            .any(|value| value.trim().is_empty());
        if blank {
            return Err("element criteria must not be blank".into());
        }
        Ok(())
    }

    /// Whether `element` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, element: &ElementInfo) -> bool {
        let same = |wanted: &Option<String>, actual: &str| {
            wanted.as_deref().is_none_or(|value| value == actual)
        };
        same(&self.automation_id, &element.automation_id)
            && same(&self.name, &element.name)
            && same(&self.control_type, &element.control_type)
    }
}

/// Subtree an event subscription covers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementScope {
    /// Root element of the scope; `None` means the whole desktop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<ElementQuery>,
    /// Whether descendants of `root` are included.
    #[serde(default = "default_true")]
    pub include_descendants: bool,
}

impl Default for ElementScope {
    fn default() -> Self {
        Self {
            root: None,
            include_descendants: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Toggle pattern state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ToggleState {
    /// Unchecked.
    Off,
    /// Checked.
    On,
    /// Neither, e.g. a tri-state box.
    Indeterminate,
}

impl ToggleState {
    /// State reached by one toggle action.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On | Self::Indeterminate => Self::Off,
        }
    }
}

/// Snapshot of one UI element's accessible properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Stable automation identifier.
    pub automation_id: String,
    /// Accessible name.
    #[serde(default)]
    pub name: String,
    /// Control type.
    #[serde(default)]
    pub control_type: String,
    /// Whether the element accepts input.
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    /// Supported accessibility patterns, e.g. `Invoke`, `Value`, `Toggle`.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Current value for elements supporting the `Value` pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Current state for elements supporting the `Toggle` pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle_state: Option<ToggleState>,
}

impl ElementInfo {
    /// Whether the element advertises `pattern`.
    #[must_use]
    pub fn supports(&self, pattern: &str) -> bool {
        self.patterns.iter().any(|p| p == pattern)
    }
}
