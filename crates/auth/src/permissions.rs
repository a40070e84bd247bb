use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission name in `area.action` form (`"invoices.issue"`).
///
/// Granted permissions may use wildcards:
/// - `"*"` grants everything
/// - `"invoices.*"` grants every action in an area
/// - `"*.read"` grants one action in every area
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        let granted = self.as_str();
        let required = required.as_str();
        if granted == "*" || granted == required {
            return true;
        }
        if let Some(area) = granted.strip_suffix(".*") {
            return required
                .strip_prefix(area)
                .is_some_and(|rest| rest.starts_with('.'));
        }
        if let Some(action) = granted.strip_prefix("*.") {
            return required
                .rsplit_once('.')
                .is_some_and(|(_, a)| a == action);
        }
        false
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
