use super::*;
use crate::config::ConfigValue;
use std::io::Write;

#[test]
fn test_trace_file_parses_all_action_forms() {
    let file = TraceFile::from_toml_str(
        r#"
        [[rule]]
        pattern = "a.off"
        action = false

        [[rule]]
        pattern = "a.on"
        action = true

        [[rule]]
        pattern = "a.hl"
        action = "highlight"

        [[rule]]
        pattern = "a.hide"
        action = "hide_tree"
        "#,
    )
    .unwrap();

    let actions: Vec<_> = file.rules.iter().map(|r| r.action).collect();
    assert_eq!(
        actions,
        vec![
            Action::Disable,
            Action::Enable,
            Action::Highlight,
            Action::HideTree
        ]
    );
    assert!(file.config.is_empty());
}

#[test]
fn test_trace_file_keeps_rule_order_and_config() {
    let file = TraceFile::from_toml_str(
        r#"
        [config]
        INDENT_UNIT_TEXT = "  "
        HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX = 40
        WRAP_BASE_CLASS_ATTRIBUTES = true

        [[rule]]
        pattern = "select.select"
        action = "highlight"

        [[rule]]
        pattern = "select([.].+)?"
        action = true
        "#,
    )
    .unwrap();

    assert_eq!(file.rules[0].pattern, "select.select");
    assert_eq!(file.rules[1].pattern, "select([.].+)?");
    assert_eq!(
        file.config.get("INDENT_UNIT_TEXT"),
        Some(&ConfigValue::Str("  ".to_string()))
    );
    assert_eq!(
        file.config.get("HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX"),
        Some(&ConfigValue::Int(40))
    );
    assert_eq!(
        file.config.get("WRAP_BASE_CLASS_ATTRIBUTES"),
        Some(&ConfigValue::Bool(true))
    );
}

#[test]
fn test_trace_file_rejects_unknown_action() {
    let err = TraceFile::from_toml_str(
        r#"
        [[rule]]
        pattern = "a.b"
        action = "loud"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, RuleError::UnknownAction(ref tag) if tag == "loud"));
}

#[test]
fn test_trace_file_rejects_bad_toml() {
    let err = TraceFile::from_toml_str("[[rule]\npattern =").unwrap_err();
    assert!(matches!(err, RuleError::Toml(_)));
}

#[test]
fn test_trace_file_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[[rule]]\npattern = \"m.f\"\naction = true").unwrap();

    let loaded = TraceFile::from_file(file.path()).unwrap();
    assert_eq!(loaded.rules, vec![Rule::new("m.f", true)]);
}

#[test]
fn test_trace_file_missing_path() {
    let err = TraceFile::from_file("/nonexistent/rules.toml").unwrap_err();
    assert!(matches!(err, RuleError::Io { .. }));
}

#[test]
fn test_default_echo_rules_compile() {
    let file = TraceFile::default_echo_rules().unwrap();
    let rules = CompiledRules::compile(file.rules).unwrap();

    assert_eq!(rules.resolve("select.select"), Some(Action::Highlight));
    assert_eq!(rules.resolve("select.poll"), Some(Action::Enable));
    assert_eq!(
        rules.resolve("__main__.EchoProtocol.data_received"),
        Some(Action::Highlight)
    );
    assert_eq!(rules.resolve("socket.socket.fileno"), Some(Action::Disable));
    assert_eq!(
        rules.resolve("socket.TcpSocket -> socket.socket.fileno"),
        Some(Action::Disable)
    );
    assert_eq!(
        rules.resolve("socket.TcpSocket -> socket.socket.send"),
        Some(Action::Highlight)
    );
    assert_eq!(
        rules.resolve("socket.TcpSocket -> socket.socket.getpeername"),
        Some(Action::Enable)
    );
    assert_eq!(
        rules.resolve("reactor.Reactor._describe_peer"),
        Some(Action::HideTree)
    );
    assert_eq!(rules.resolve("tracecall.engine.Engine.activate"), Some(Action::Disable));
    assert_eq!(rules.resolve("unrelated.thing"), None);
}

#[test]
fn test_action_display_round_trips_through_tags() {
    for action in [
        Action::Disable,
        Action::Enable,
        Action::Highlight,
        Action::HideTree,
    ] {
        assert_eq!(Action::from_tag(&action.to_string()).unwrap(), action);
    }
}
