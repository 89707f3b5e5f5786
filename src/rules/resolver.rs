use crate::rules::{Action, CompiledRules, Rule};

/// The rule that decided a qualified name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub action: Action,
    pub rule: &'a Rule,
    /// Position of the rule in the source table
    pub index: usize,
    /// Whether the rule came from the exact-literal group
    pub exact: bool,
}

impl CompiledRules {
    /// Find the rule deciding `qualified_name`
    ///
    /// Exact-literal rules are checked first, then pattern rules; within each
    /// group the earliest rule wins. Read-only, safe to call from any thread.
    pub fn lookup(&self, qualified_name: &str) -> Option<Match<'_>> {
        if let Some(&pos) = self.exact_index.get(qualified_name) {
            let exact = &self.exact[pos];
            return Some(Match {
                action: exact.rule.action,
                rule: &exact.rule,
                index: exact.index,
                exact: true,
            });
        }

        // SetMatches iterates indices in ascending order
        let first = self.pattern_set.matches(qualified_name).iter().next()?;
        let pattern = &self.patterns[first];
        Some(Match {
            action: pattern.rule.action,
            rule: &pattern.rule,
            index: pattern.index,
            exact: false,
        })
    }

    /// Resolve `qualified_name` to an action, `None` when no rule matches
    pub fn resolve(&self, qualified_name: &str) -> Option<Action> {
        self.lookup(qualified_name).map(|m| m.action)
    }

    /// Action to install for `qualified_name`; `None` for no-match and
    /// [`Action::Disable`] alike
    pub fn wrap_action(&self, qualified_name: &str) -> Option<Action> {
        self.resolve(qualified_name).filter(|action| action.wraps())
    }
}
