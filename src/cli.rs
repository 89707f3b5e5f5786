//! CLI argument parsing for tracecall

use crate::config::ConfigValue;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for `--resolve` and `--show-rules`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "tracecall")]
#[command(version)]
#[command(about = "Declarative call tracing driven by ordered name-matching rules", long_about = None)]
pub struct Cli {
    /// Trace file with `[config]` and `[[rule]]` tables (default: built-in echo rules)
    #[arg(short = 'r', long = "rules", value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Override a config key (e.g., --set INDENT_UNIT_TEXT='  ')
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_config_override)]
    pub set: Vec<(String, ConfigValue)>,

    /// Print the action each qualified name resolves to, then exit
    #[arg(long = "resolve", value_name = "NAME")]
    pub resolve: Vec<String>,

    /// List the compiled rules, exact names first
    #[arg(long = "show-rules")]
    pub show_rules: bool,

    /// Output format for --resolve and --show-rules
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Run the traced echo server and client on 127.0.0.1
    #[arg(long = "demo")]
    pub demo: bool,

    /// Message the demo client sends
    #[arg(short = 'm', long = "message", default_value = "hello")]
    pub message: String,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

/// Parse `KEY=VALUE`; `true`/`false` and integers are typed, anything else is a string
pub fn parse_config_override(raw: &str) -> Result<(String, ConfigValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }

    let value = match value {
        "true" | "True" => ConfigValue::Bool(true),
        "false" | "False" => ConfigValue::Bool(false),
        other => other
            .parse::<i64>()
            .map(ConfigValue::Int)
            .unwrap_or_else(|_| ConfigValue::Str(other.to_string())),
    };
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["tracecall"]);
        assert!(cli.rules.is_none());
        assert!(cli.resolve.is_empty());
        assert!(!cli.show_rules);
        assert!(!cli.demo);
        assert!(!cli.debug);
        assert_eq!(cli.message, "hello");
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_rules_path() {
        let cli = Cli::parse_from(["tracecall", "--rules", "trace.toml"]);
        assert_eq!(cli.rules, Some(PathBuf::from("trace.toml")));
    }

    #[test]
    fn test_cli_resolve_repeats() {
        let cli = Cli::parse_from([
            "tracecall",
            "--resolve",
            "select.select",
            "--resolve",
            "socket.socket.fileno",
        ]);
        assert_eq!(cli.resolve, vec!["select.select", "socket.socket.fileno"]);
    }

    #[test]
    fn test_cli_demo_with_message() {
        let cli = Cli::parse_from(["tracecall", "--demo", "-m", "ping"]);
        assert!(cli.demo);
        assert_eq!(cli.message, "ping");
    }

    #[test]
    fn test_cli_json_format() {
        let cli = Cli::parse_from(["tracecall", "--show-rules", "--format", "json"]);
        assert!(cli.show_rules);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_set_overrides() {
        let cli = Cli::parse_from([
            "tracecall",
            "--set",
            "SHOW_MAIN_THREAD_ID=true",
            "--set",
            "HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX=40",
            "--set",
            "INDENT_UNIT_TEXT=..",
        ]);
        assert_eq!(
            cli.set,
            vec![
                ("SHOW_MAIN_THREAD_ID".to_string(), ConfigValue::Bool(true)),
                (
                    "HIGHLIGHT_TITLE_LINE_CHAR_COUNT_MAX".to_string(),
                    ConfigValue::Int(40)
                ),
                ("INDENT_UNIT_TEXT".to_string(), ConfigValue::Str("..".to_string())),
            ]
        );
    }

    #[test]
    fn test_cli_set_rejects_missing_equals() {
        assert!(Cli::try_parse_from(["tracecall", "--set", "NOPE"]).is_err());
        assert!(parse_config_override("=1").is_err());
    }
}
