//! Process-wide trace settings
//!
//! `ConfigStore` is a key/value map merged by `set_configs`. Unknown keys are
//! kept without complaint so newer configuration files work with older
//! builds. Writers replace the whole map at once, so a reader always sees a
//! complete snapshot. `Settings` is the typed, read-only view an engine is
//! built from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Recognized configuration keys
pub mod keys {
    /// Wrap with a callable object instead of a plain function
    pub const WRAP_USING_WRAPPER_CLASS: &str = "WRAP_USING_WRAPPER_CLASS";
    /// Install wrappers on subclasses for attributes inherited from a base
    pub const WRAP_BASE_CLASS_ATTRIBUTES: &str = "WRAP_BASE_CLASS_ATTRIBUTES";
    pub const INDENT_UNIT_TEXT: &str = "INDENT_UNIT_TEXT";
    /// Highlight titles name the runtime class of `self`
    pub const HIGHLIGHT_TITLE_SHOW_SELF_CLASS: &str = "HIGHLIGHT_TITLE_SHOW_SELF_CLASS";
    pub const HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX: &str = "HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX";
    pub const SHOW_MAIN_THREAD_ID: &str = "SHOW_MAIN_THREAD_ID";
    pub const SHOW_FUNC_FILE_PATH_LINENO_PRE_CALL: &str = "SHOW_FUNC_FILE_PATH_LINENO_PRE_CALL";
    pub const SHOW_FUNC_FILE_PATH_LINENO_POST_CALL: &str = "SHOW_FUNC_FILE_PATH_LINENO_POST_CALL";
    pub const WRAPPER_FUNC_DEBUG_INFO_DICT_URIS: &str = "WRAPPER_FUNC_DEBUG_INFO_DICT_URIS";
    pub const PRINTING_HANDLER_DEBUG_ARGS_INSPECT_INFO: &str =
        "PRINTING_HANDLER_DEBUG_ARGS_INSPECT_INFO";
    /// Dumps include argument values, whose display may itself fail
    pub const PRINTING_HANDLER_DEBUG_INFO_DICT: &str = "PRINTING_HANDLER_DEBUG_INFO_DICT";
    pub const PRINTING_HANDLER_DEBUG_INFO_DICT_SAFE: &str = "PRINTING_HANDLER_DEBUG_INFO_DICT_SAFE";
}

/// A configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

pub type ConfigMap = BTreeMap<String, ConfigValue>;

/// Copy-on-write key/value settings store
#[derive(Debug, Default)]
pub struct ConfigStore {
    snapshot: RwLock<Arc<ConfigMap>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store
    pub fn global() -> &'static ConfigStore {
        static GLOBAL: OnceLock<ConfigStore> = OnceLock::new();
        GLOBAL.get_or_init(ConfigStore::new)
    }

    /// Merge `options` into the store
    ///
    /// The merged map is built aside and swapped in whole.
    pub fn set_configs<I, K, V>(&self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let mut merged = ConfigMap::clone(&guard);
        for (key, value) in options {
            let key = key.into();
            let value = value.into();
            tracing::debug!(%key, %value, "config set");
            merged.insert(key, value);
        }
        *guard = Arc::new(merged);
    }

    /// Current full snapshot
    pub fn snapshot(&self) -> Arc<ConfigMap> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.snapshot().get(key).cloned()
    }

    /// Value for `key`, or `default` when unset
    pub fn get_or(&self, key: &str, default: impl Into<ConfigValue>) -> ConfigValue {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Typed view of the current snapshot
    pub fn settings(&self) -> Settings {
        Settings::from_map(&self.snapshot())
    }

    /// Drop every key (tests reuse the global store)
    pub fn clear(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::default();
    }
}

/// Typed settings an engine is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub wrap_using_wrapper_class: bool,
    pub wrap_base_class_attributes: bool,
    pub indent_unit_text: String,
    pub highlight_title_show_self_class: bool,
    pub highlight_title_line_char_count_max: usize,
    pub show_main_thread_id: bool,
    pub show_func_file_path_lineno_pre_call: bool,
    pub show_func_file_path_lineno_post_call: bool,
    pub wrapper_func_debug_info_dict_uris: bool,
    pub printing_handler_debug_args_inspect_info: bool,
    pub printing_handler_debug_info_dict: bool,
    pub printing_handler_debug_info_dict_safe: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wrap_using_wrapper_class: true,
            wrap_base_class_attributes: false,
            indent_unit_text: " ".repeat(4),
            highlight_title_show_self_class: false,
            highlight_title_line_char_count_max: 265,
            show_main_thread_id: false,
            show_func_file_path_lineno_pre_call: false,
            show_func_file_path_lineno_post_call: false,
            wrapper_func_debug_info_dict_uris: false,
            printing_handler_debug_args_inspect_info: false,
            printing_handler_debug_info_dict: false,
            printing_handler_debug_info_dict_safe: false,
        }
    }
}

impl Settings {
    /// Build settings from a raw map; missing or mistyped keys keep defaults
    pub fn from_map(map: &ConfigMap) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            map.get(key).and_then(ConfigValue::as_bool).unwrap_or(default)
        };

        Self {
            wrap_using_wrapper_class: flag(
                keys::WRAP_USING_WRAPPER_CLASS,
                defaults.wrap_using_wrapper_class,
            ),
            wrap_base_class_attributes: flag(
                keys::WRAP_BASE_CLASS_ATTRIBUTES,
                defaults.wrap_base_class_attributes,
            ),
            indent_unit_text: map
                .get(keys::INDENT_UNIT_TEXT)
                .and_then(ConfigValue::as_str)
                .map(str::to_string)
                .unwrap_or(defaults.indent_unit_text),
            highlight_title_show_self_class: flag(
                keys::HIGHLIGHT_TITLE_SHOW_SELF_CLASS,
                defaults.highlight_title_show_self_class,
            ),
            highlight_title_line_char_count_max: map
                .get(keys::HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX)
                .and_then(ConfigValue::as_int)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.highlight_title_line_char_count_max),
            show_main_thread_id: flag(keys::SHOW_MAIN_THREAD_ID, defaults.show_main_thread_id),
            show_func_file_path_lineno_pre_call: flag(
                keys::SHOW_FUNC_FILE_PATH_LINENO_PRE_CALL,
                defaults.show_func_file_path_lineno_pre_call,
            ),
            show_func_file_path_lineno_post_call: flag(
                keys::SHOW_FUNC_FILE_PATH_LINENO_POST_CALL,
                defaults.show_func_file_path_lineno_post_call,
            ),
            wrapper_func_debug_info_dict_uris: flag(
                keys::WRAPPER_FUNC_DEBUG_INFO_DICT_URIS,
                defaults.wrapper_func_debug_info_dict_uris,
            ),
            printing_handler_debug_args_inspect_info: flag(
                keys::PRINTING_HANDLER_DEBUG_ARGS_INSPECT_INFO,
                defaults.printing_handler_debug_args_inspect_info,
            ),
            printing_handler_debug_info_dict: flag(
                keys::PRINTING_HANDLER_DEBUG_INFO_DICT,
                defaults.printing_handler_debug_info_dict,
            ),
            printing_handler_debug_info_dict_safe: flag(
                keys::PRINTING_HANDLER_DEBUG_INFO_DICT_SAFE,
                defaults.printing_handler_debug_info_dict_safe,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_configs_merges() {
        let store = ConfigStore::new();
        store.set_configs([(keys::INDENT_UNIT_TEXT, ConfigValue::from("  "))]);
        store.set_configs([(keys::SHOW_MAIN_THREAD_ID, true)]);

        assert_eq!(store.get(keys::INDENT_UNIT_TEXT), Some("  ".into()));
        assert_eq!(store.get(keys::SHOW_MAIN_THREAD_ID), Some(true.into()));
    }

    #[test]
    fn test_unknown_keys_are_accepted() {
        let store = ConfigStore::new();
        store.set_configs([("SOME_FUTURE_OPTION", 7i64)]);
        assert_eq!(store.get("SOME_FUTURE_OPTION"), Some(ConfigValue::Int(7)));
        assert_eq!(store.settings(), Settings::default());
    }

    #[test]
    fn test_get_or_never_fails() {
        let store = ConfigStore::new();
        assert_eq!(store.get_or("MISSING", 3i64), ConfigValue::Int(3));
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_writes() {
        let store = ConfigStore::new();
        store.set_configs([("A", 1i64)]);
        let before = store.snapshot();
        store.set_configs([("A", 2i64)]);

        assert_eq!(before.get("A"), Some(&ConfigValue::Int(1)));
        assert_eq!(store.get("A"), Some(ConfigValue::Int(2)));
    }

    #[test]
    fn test_settings_from_map() {
        let store = ConfigStore::new();
        store.set_configs([
            (keys::WRAP_USING_WRAPPER_CLASS, ConfigValue::Bool(false)),
            (keys::INDENT_UNIT_TEXT, ConfigValue::from("\t")),
            (keys::HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX, ConfigValue::Int(30)),
        ]);
        let settings = store.settings();

        assert!(!settings.wrap_using_wrapper_class);
        assert_eq!(settings.indent_unit_text, "\t");
        assert_eq!(settings.highlight_title_line_char_count_max, 30);
        assert!(!settings.wrap_base_class_attributes);
    }

    #[test]
    fn test_mistyped_value_keeps_default() {
        let store = ConfigStore::new();
        store.set_configs([
            (keys::INDENT_UNIT_TEXT, ConfigValue::Int(2)),
            (keys::HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX, ConfigValue::Int(-1)),
        ]);
        let settings = store.settings();
        assert_eq!(settings.indent_unit_text, "    ");
        assert_eq!(settings.highlight_title_line_char_count_max, 265);
    }

    #[test]
    fn test_clear() {
        let store = ConfigStore::new();
        store.set_configs([("A", true)]);
        store.clear();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(ConfigStore::new());
        store.set_configs([("A", 0i64), ("B", 0i64)]);

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 1..200i64 {
                    store.set_configs([("A", i), ("B", i)]);
                }
            })
        };

        for _ in 0..200 {
            let snap = store.snapshot();
            assert_eq!(snap.get("A"), snap.get("B"));
        }
        writer.join().unwrap();
    }
}
