use crate::rules::{Action, Rule, RuleError};
use regex::{Regex, RegexSet};
use std::collections::HashMap;

/// Exact-literal rule kept with its position in the source table
#[derive(Debug, Clone)]
pub(crate) struct ExactRule {
    pub(crate) index: usize,
    pub(crate) rule: Rule,
}

/// Regular-expression rule kept with its position in the source table
#[derive(Debug, Clone)]
pub(crate) struct PatternRule {
    pub(crate) index: usize,
    pub(crate) rule: Rule,
}

/// Rule table compiled for resolution
///
/// Rules are partitioned into exact-literal rules and pattern rules, each
/// group keeping its original relative order. Exact-literal rules are
/// consulted first; the first matching rule of a group wins.
///
/// # Example Usage
/// ```
/// use tracecall::rules::{Action, CompiledRules, Rule};
///
/// let rules = CompiledRules::compile(vec![
///     Rule::new(".+[.]foo", false),
///     Rule::new("a.b.foo", true),
/// ])?;
/// assert_eq!(rules.resolve("a.b.foo"), Some(Action::Enable));
/// assert_eq!(rules.resolve("a.c.foo"), Some(Action::Disable));
/// # Ok::<(), tracecall::rules::RuleError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub(crate) exact: Vec<ExactRule>,
    /// Qualified name → position in `exact` of its first rule
    pub(crate) exact_index: HashMap<String, usize>,
    pub(crate) patterns: Vec<PatternRule>,
    /// Anchored patterns, same order as `patterns`
    pub(crate) pattern_set: RegexSet,
}

impl CompiledRules {
    /// Compile an ordered rule table
    ///
    /// # Errors
    /// Returns [`RuleError::InvalidPattern`] for the first pattern rule whose
    /// regular expression does not compile.
    pub fn compile<I, R>(rules: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        let mut exact = Vec::new();
        let mut exact_index = HashMap::new();
        let mut patterns = Vec::new();
        let mut anchored = Vec::new();

        for (index, rule) in rules.into_iter().map(Into::into).enumerate() {
            if rule.is_exact_literal() {
                exact_index
                    .entry(rule.pattern.clone())
                    .or_insert(exact.len());
                exact.push(ExactRule { index, rule });
                continue;
            }

            let source = anchor(&rule.pattern);
            // Validate one by one so the error names the offending rule
            Regex::new(&source).map_err(|source| RuleError::InvalidPattern {
                index,
                pattern: rule.pattern.clone(),
                source,
            })?;
            anchored.push(source);
            patterns.push(PatternRule { index, rule });
        }

        let pattern_set = RegexSet::new(&anchored).map_err(|source| RuleError::InvalidPattern {
            index: patterns.first().map(|p| p.index).unwrap_or_default(),
            pattern: anchored.join(" | "),
            source,
        })?;

        tracing::debug!(
            exact = exact.len(),
            patterns = patterns.len(),
            "compiled trace rules"
        );

        Ok(Self {
            exact,
            exact_index,
            patterns,
            pattern_set,
        })
    }

    /// Number of rules in the source table
    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exact-literal rules in their original relative order
    pub fn exact_rules(&self) -> impl Iterator<Item = &Rule> {
        self.exact.iter().map(|e| &e.rule)
    }

    /// Pattern rules in their original relative order
    pub fn pattern_rules(&self) -> impl Iterator<Item = &Rule> {
        self.patterns.iter().map(|p| &p.rule)
    }

    /// Rules in resolution order: exact-literal group first, then patterns
    pub fn ordered_rules(&self) -> impl Iterator<Item = (usize, &Rule, Action)> {
        self.exact
            .iter()
            .map(|e| (e.index, &e.rule, e.rule.action))
            .chain(self.patterns.iter().map(|p| (p.index, &p.rule, p.rule.action)))
    }
}

fn anchor(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_preserves_relative_order() {
        let rules = CompiledRules::compile(vec![
            Rule::new("a([.].+)?", true),
            Rule::new("a.b", Action::Highlight),
            Rule::new(".+[.]c", false),
            Rule::new("a.d", false),
        ])
        .unwrap();

        let exact: Vec<_> = rules.exact_rules().map(|r| r.pattern.as_str()).collect();
        let patterns: Vec<_> = rules.pattern_rules().map(|r| r.pattern.as_str()).collect();
        assert_eq!(exact, vec!["a.b", "a.d"]);
        assert_eq!(patterns, vec!["a([.].+)?", ".+[.]c"]);
        assert_eq!(rules.len(), 4);
    }

    #[test]
    fn test_ordered_rules_keep_source_indices() {
        let rules = CompiledRules::compile(vec![("x.*", true), ("x.y", false)]).unwrap();
        let order: Vec<_> = rules.ordered_rules().map(|(i, _, _)| i).collect();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn test_malformed_regex_fails_at_compile_time() {
        let err = CompiledRules::compile(vec![
            Rule::new("ok.name", true),
            Rule::new("broken[", true),
        ])
        .unwrap_err();

        match err {
            RuleError::InvalidPattern { index, pattern, .. } => {
                assert_eq!(index, 1);
                assert_eq!(pattern, "broken[");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_exact_literal_detection() {
        assert!(Rule::new("select.select", true).is_exact_literal());
        assert!(Rule::new("__main__.main", true).is_exact_literal());
        assert!(!Rule::new("select([.].+)?", true).is_exact_literal());
        assert!(!Rule::new("a -> b.c", true).is_exact_literal());
        assert!(!Rule::new("", true).is_exact_literal());
    }

    #[test]
    fn test_empty_table_compiles() {
        let rules = CompiledRules::compile(Vec::<Rule>::new()).unwrap();
        assert!(rules.is_empty());
        assert_eq!(rules.resolve("anything"), None);
    }

    #[test]
    fn test_patterns_are_anchored() {
        let rules = CompiledRules::compile(vec![("b[.]c", true)]).unwrap();
        assert_eq!(rules.resolve("b.c"), Some(Action::Enable));
        assert_eq!(rules.resolve("a.b.c"), None);
        assert_eq!(rules.resolve("b.c.d"), None);
    }

    #[test]
    fn test_alternation_is_anchored_as_a_group() {
        let rules = CompiledRules::compile(vec![("a|b", true)]).unwrap();
        assert_eq!(rules.resolve("a"), Some(Action::Enable));
        assert_eq!(rules.resolve("ab"), None);
        assert_eq!(rules.resolve("xb"), None);
    }
}
