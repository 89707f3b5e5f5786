use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracecall::cli::{Cli, OutputFormat};
use tracecall::config::ConfigStore;
use tracecall::demo;
use tracecall::engine::Engine;
use tracecall::rules::{CompiledRules, TraceFile};
use tracecall::runtime::ModuleLoader;
use tracecall::sinks::{Channels, TracingSink};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Print the action each name resolves to, and the rule that decided it
fn print_resolutions(rules: &CompiledRules, names: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            for name in names {
                match rules.lookup(name) {
                    Some(m) => println!(
                        "{} => {} (rule #{} '{}'{})",
                        name,
                        m.action,
                        m.index,
                        m.rule.pattern,
                        if m.exact { ", exact" } else { "" }
                    ),
                    None => println!("{} => no match", name),
                }
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = names
                .iter()
                .map(|name| match rules.lookup(name) {
                    Some(m) => json!({
                        "name": name,
                        "action": m.action.to_string(),
                        "rule": m.index,
                        "pattern": m.rule.pattern,
                        "exact": m.exact,
                    }),
                    None => json!({ "name": name, "action": null }),
                })
                .collect();
            println!("{}", serde_json::Value::Array(entries));
        }
    }
}

/// Print compiled rules in resolution order
fn print_rules(rules: &CompiledRules, format: OutputFormat) {
    match format {
        OutputFormat::Text => {
            println!("=== Exact names ===");
            for (index, rule, action) in rules.ordered_rules().filter(|(_, r, _)| r.is_exact_literal()) {
                println!("#{:<3} {:<10} {}", index, action.to_string(), rule.pattern);
            }
            println!("=== Patterns ===");
            for (index, rule, action) in rules.ordered_rules().filter(|(_, r, _)| !r.is_exact_literal()) {
                println!("#{:<3} {:<10} {}", index, action.to_string(), rule.pattern);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = rules
                .ordered_rules()
                .map(|(index, rule, action)| {
                    json!({
                        "rule": index,
                        "pattern": rule.pattern,
                        "action": action.to_string(),
                        "exact": rule.is_exact_literal(),
                    })
                })
                .collect();
            println!("{}", serde_json::Value::Array(entries));
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    let file = match &args.rules {
        Some(path) => TraceFile::from_file(path)
            .with_context(|| format!("cannot load trace file {}", path.display()))?,
        None => TraceFile::default_echo_rules()?,
    };

    // File settings first, command-line overrides last
    let store = ConfigStore::global();
    store.set_configs(file.config.clone());
    store.set_configs(args.set.clone());

    let rules = CompiledRules::compile(file.rules)?;

    if !args.resolve.is_empty() {
        print_resolutions(&rules, &args.resolve, args.format);
        return Ok(());
    }
    if args.show_rules {
        print_rules(&rules, args.format);
        return Ok(());
    }

    if args.demo {
        let mut channels = Channels::console();
        if args.debug {
            channels = channels.with_debug(std::sync::Arc::new(TracingSink::new(tracing::Level::DEBUG)));
        }
        let engine = Engine::new(store.settings(), rules, channels);
        let loader = ModuleLoader::new();
        demo::register_modules(&loader);
        let reply = demo::run_echo(&engine, &loader, &args.message)?;
        println!("echo reply: {}", reply);
        return Ok(());
    }

    println!(
        "{} rules compiled ({} exact, {} patterns); run with --demo to trace the echo application",
        rules.len(),
        rules.exact_rules().count(),
        rules.pattern_rules().count()
    );
    Ok(())
}
