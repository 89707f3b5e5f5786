//! Property-based tests for rule compilation and precedence
//!
//! Resolution must be deterministic, exact names must beat every pattern,
//! and within each group the earliest rule must win.

use proptest::prelude::*;
use tracecall::rules::{is_exact_literal, Action, CompiledRules, Rule};

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Disable),
        Just(Action::Enable),
        Just(Action::Highlight),
        Just(Action::HideTree),
    ]
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_]{0,5}", 1..4).prop_map(|parts| parts.join("."))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_resolution_is_deterministic(
        names in prop::collection::vec(name_strategy(), 1..6),
        actions in prop::collection::vec(action_strategy(), 6),
        query in name_strategy(),
    ) {
        // Property: mixing exact names and broad patterns, repeated queries agree
        let mut rules: Vec<Rule> = names
            .iter()
            .zip(&actions)
            .map(|(name, action)| Rule::new(name.clone(), *action))
            .collect();
        rules.push(Rule::new("[a-m].*", actions[5]));

        let compiled = CompiledRules::compile(rules).unwrap();
        let first = compiled.resolve(&query);
        for _ in 0..3 {
            prop_assert_eq!(compiled.resolve(&query), first);
        }
    }

    #[test]
    fn prop_exact_name_beats_any_earlier_pattern(
        name in name_strategy(),
        pattern_action in action_strategy(),
        exact_action in action_strategy(),
    ) {
        // Property: a catch-all listed first never shadows an exact name
        let compiled = CompiledRules::compile(vec![
            Rule::new(".+", pattern_action),
            Rule::new(name.clone(), exact_action),
        ])
        .unwrap();

        prop_assert_eq!(compiled.resolve(&name), Some(exact_action));
        let other = format!("{}x", name);
        prop_assert_eq!(compiled.resolve(&other), Some(pattern_action));
    }

    #[test]
    fn prop_first_rule_wins_within_group(
        name in name_strategy(),
        first in action_strategy(),
        second in action_strategy(),
    ) {
        // Property: duplicate exact names resolve to the earliest one
        let exact = CompiledRules::compile(vec![
            Rule::new(name.clone(), first),
            Rule::new(name.clone(), second),
        ])
        .unwrap();
        prop_assert_eq!(exact.resolve(&name), Some(first));

        // Property: overlapping patterns resolve to the earliest one
        let patterns = CompiledRules::compile(vec![
            Rule::new(format!("{}.*", regex::escape(&name)), first),
            Rule::new(".+", second),
        ])
        .unwrap();
        prop_assert_eq!(patterns.resolve(&name), Some(first));
    }

    #[test]
    fn prop_partition_preserves_every_rule(
        names in prop::collection::vec(name_strategy(), 0..8),
    ) {
        // Property: every rule lands in exactly one group, in table order
        let rules: Vec<Rule> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i % 2 == 0 {
                    Rule::new(name.clone(), Action::Enable)
                } else {
                    Rule::new(format!("({})?", name), Action::Disable)
                }
            })
            .collect();
        let compiled = CompiledRules::compile(rules.clone()).unwrap();

        prop_assert_eq!(compiled.len(), rules.len());
        let exact: Vec<&Rule> = compiled.exact_rules().collect();
        let expected: Vec<&Rule> = rules.iter().filter(|r| is_exact_literal(&r.pattern)).collect();
        prop_assert_eq!(exact, expected);

        let mut last_index = None;
        for (index, rule, _) in compiled.ordered_rules() {
            if !rule.is_exact_literal() {
                prop_assert!(last_index.map_or(true, |last| index > last));
                last_index = Some(index);
            }
        }
    }
}

#[test]
fn test_documented_precedence_examples() {
    let compiled = CompiledRules::compile(vec![
        (".+[.]foo", Action::Disable),
        ("a.b.foo", Action::Enable),
    ])
    .unwrap();
    assert_eq!(compiled.resolve("a.b.foo"), Some(Action::Enable));
    assert_eq!(compiled.resolve("a.c.foo"), Some(Action::Disable));

    let compiled = CompiledRules::compile(vec![
        ("x.y.z", Action::Enable),
        ("x.y.z", Action::Disable),
    ])
    .unwrap();
    assert_eq!(compiled.resolve("x.y.z"), Some(Action::Enable));
}

#[test]
fn test_resolution_is_safe_from_many_threads() {
    let compiled = std::sync::Arc::new(
        CompiledRules::compile(vec![
            ("select.select", Action::Highlight),
            ("select([.].+)?", Action::Enable),
        ])
        .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let compiled = std::sync::Arc::clone(&compiled);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    assert_eq!(compiled.resolve("select.select"), Some(Action::Highlight));
                    assert_eq!(
                        compiled.resolve(&format!("select.poll{}", i)),
                        Some(Action::Enable)
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
