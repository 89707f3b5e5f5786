// Declarative trace rules
//
// A rule table is an ordered list of `(pattern, action)` pairs over qualified
// callable names (`module.Class.method`). Order defines precedence, with one
// exception: patterns made only of alphanumerics, underscores and dots are
// exact names and take precedence over every regular-expression rule, so an
// exact rule is never shadowed by a broader pattern listed before it.

mod compiler;
mod definition;
mod resolver;

pub use compiler::CompiledRules;
pub use definition::{is_exact_literal, Action, RawAction, Rule, TraceFile};
pub use resolver::Match;

use thiserror::Error;

/// Configuration errors, raised while loading or compiling a rule table
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Invalid pattern in rule {index} ({pattern:?}): {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown rule action: {0:?} (expected true, false, \"highlight\" or \"hide_tree\")")]
    UnknownAction(String),

    #[error("Failed to parse trace file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to read trace file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests;
