use crate::config::ConfigValue;
use crate::rules::RuleError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// What to do with a callable whose qualified name matches a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Leave the callable untouched
    Disable,
    /// Wrap and emit plain trace lines
    Enable,
    /// Wrap and emit banner trace lines
    Highlight,
    /// Wrap, trace this call, and silence wrapped calls in its dynamic extent
    HideTree,
}

impl Action {
    /// Tag used in rule files for [`Action::Highlight`]
    pub const HIGHLIGHT_TAG: &'static str = "highlight";

    /// Tag used in rule files for [`Action::HideTree`]
    pub const HIDE_TREE_TAG: &'static str = "hide_tree";

    /// Whether a callable resolved to this action gets a wrapper
    pub fn wraps(self) -> bool {
        !matches!(self, Action::Disable)
    }

    pub fn is_highlight(self) -> bool {
        matches!(self, Action::Highlight)
    }

    pub fn hides_tree(self) -> bool {
        matches!(self, Action::HideTree)
    }

    /// Parse the string form used in rule files and on the command line
    pub fn from_tag(tag: &str) -> Result<Self, RuleError> {
        match tag {
            "true" | "True" => Ok(Action::Enable),
            "false" | "False" => Ok(Action::Disable),
            Self::HIGHLIGHT_TAG => Ok(Action::Highlight),
            Self::HIDE_TREE_TAG => Ok(Action::HideTree),
            other => Err(RuleError::UnknownAction(other.to_string())),
        }
    }
}

impl From<bool> for Action {
    fn from(enabled: bool) -> Self {
        if enabled {
            Action::Enable
        } else {
            Action::Disable
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Disable => write!(f, "false"),
            Action::Enable => write!(f, "true"),
            Action::Highlight => write!(f, "{}", Self::HIGHLIGHT_TAG),
            Action::HideTree => write!(f, "{}", Self::HIDE_TREE_TAG),
        }
    }
}

/// Action as written in a TOML rule file: `true`, `false`, or a tag string
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawAction {
    Flag(bool),
    Tag(String),
}

impl TryFrom<RawAction> for Action {
    type Error = RuleError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        match raw {
            RawAction::Flag(flag) => Ok(Action::from(flag)),
            RawAction::Tag(tag) => Action::from_tag(&tag),
        }
    }
}

/// One `(pattern, action)` pair of a rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub pattern: String,
    pub action: Action,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, action: impl Into<Action>) -> Self {
        Self {
            pattern: pattern.into(),
            action: action.into(),
        }
    }

    /// A pattern made only of identifier characters and dots is an exact
    /// qualified name, not a regular expression
    pub fn is_exact_literal(&self) -> bool {
        is_exact_literal(&self.pattern)
    }
}

impl<P: Into<String>, A: Into<Action>> From<(P, A)> for Rule {
    fn from((pattern, action): (P, A)) -> Self {
        Rule::new(pattern, action)
    }
}

/// `^[A-Za-z0-9_.]+$`
pub fn is_exact_literal(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[derive(Debug, Deserialize)]
struct RawRule {
    pattern: String,
    action: RawAction,
}

#[derive(Debug, Deserialize)]
struct RawTraceFile {
    #[serde(default)]
    config: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    rule: Vec<RawRule>,
}

/// A trace file: configuration overrides plus the ordered rule table
///
/// # Example TOML
/// ```toml
/// [config]
/// INDENT_UNIT_TEXT = "  "
///
/// [[rule]]
/// pattern = "select.select"
/// action = "highlight"
///
/// [[rule]]
/// pattern = "select([.].+)?"
/// action = true
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceFile {
    pub config: BTreeMap<String, ConfigValue>,
    pub rules: Vec<Rule>,
}

impl TraceFile {
    /// Parse a trace file from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, RuleError> {
        let raw: RawTraceFile = toml::from_str(content)?;
        let rules = raw
            .rule
            .into_iter()
            .map(|r| Ok(Rule::new(r.pattern, Action::try_from(r.action)?)))
            .collect::<Result<Vec<_>, RuleError>>()?;

        Ok(Self {
            config: raw.config,
            rules,
        })
    }

    /// Load a trace file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Rule table for the bundled echo application
    ///
    /// Uses the embedded rules-default.toml compiled into the binary.
    pub fn default_echo_rules() -> Result<Self, RuleError> {
        const DEFAULT_TOML: &str = include_str!("../../rules-default.toml");
        Self::from_toml_str(DEFAULT_TOML)
    }
}
