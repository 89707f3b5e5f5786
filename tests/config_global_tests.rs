// Tests against the process-wide ConfigStore; serialized because they share it

use serial_test::serial;
use tracecall::config::{keys, ConfigStore, ConfigValue, Settings};
use tracecall::engine::Engine;
use tracecall::rules::TraceFile;
use tracecall::sinks::Channels;

#[test]
#[serial]
fn test_global_store_merges_and_ignores_unknown_keys() {
    let store = ConfigStore::global();
    store.clear();

    store.set_configs([
        (keys::INDENT_UNIT_TEXT, ConfigValue::from("  ")),
        ("SOME_FUTURE_KEY", ConfigValue::from(true)),
    ]);
    store.set_configs([(keys::SHOW_MAIN_THREAD_ID, true)]);

    let settings = store.settings();
    assert_eq!(settings.indent_unit_text, "  ");
    assert!(settings.show_main_thread_id);
    assert_eq!(store.get("SOME_FUTURE_KEY"), Some(ConfigValue::Bool(true)));
    assert_eq!(store.get_or("MISSING", 7i64), ConfigValue::Int(7));

    store.clear();
    assert_eq!(store.settings(), Settings::default());
}

#[test]
#[serial]
fn test_trace_file_config_layers_over_global_store() {
    let store = ConfigStore::global();
    store.clear();
    store.set_configs([
        (keys::HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX, ConfigValue::Int(40)),
        (keys::INDENT_UNIT_TEXT, ConfigValue::from("\t")),
    ]);

    let file = TraceFile::from_toml_str(
        r#"
[config]
INDENT_UNIT_TEXT = ".."

[[rule]]
pattern = "m[.].+"
action = true
"#,
    )
    .unwrap();
    let engine = Engine::from_trace_file(&file, Channels::null()).unwrap();

    assert_eq!(engine.settings().highlight_title_line_char_count_max, 40);
    assert_eq!(engine.settings().indent_unit_text, "..");
    store.clear();
}

#[test]
#[serial]
fn test_readers_see_whole_snapshots() {
    let store = ConfigStore::global();
    store.clear();

    let writer = std::thread::spawn(move || {
        for i in 0..200i64 {
            ConfigStore::global().set_configs([
                (keys::HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX, ConfigValue::Int(i)),
                ("GENERATION", ConfigValue::Int(i)),
            ]);
        }
    });

    for _ in 0..200 {
        let snapshot = ConfigStore::global().snapshot();
        assert_eq!(
            snapshot.get(keys::HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX),
            snapshot.get("GENERATION")
        );
    }
    writer.join().unwrap();
    store.clear();
}
