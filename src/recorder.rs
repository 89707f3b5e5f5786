//! Call event rendering
//!
//! Turns pre-call and post-call events into indented text lines on the info
//! channel, with optional JSON dumps on the debug channel. Rendering never
//! fails: a value whose display representation errors or panics is shown as
//! a placeholder and the problem is reported on the error channel.

use crate::config::Settings;
use crate::engine::CallSite;
use crate::rules::Action;
use crate::runtime::{Args, RoutineKind, Value};
use crate::sinks::Channels;
use serde_json::json;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe, Location};
use std::thread::ThreadId;
use std::time::Duration;

/// What is known about a wrapped call when it starts
#[derive(Debug, Clone)]
pub struct CallInfo<'a> {
    pub qualified_name: &'a str,
    pub site: &'a CallSite,
    pub action: Action,
    pub kind: RoutineKind,
    pub depth: usize,
    /// Where the original routine was defined
    pub location: &'static Location<'static>,
    /// Runtime class of the receiver, for instance and class methods
    pub self_class: Option<String>,
    pub thread: ThreadId,
    pub thread_name: Option<String>,
}

/// Emitted before the original runs
#[derive(Debug)]
pub struct PreCall<'a> {
    pub info: &'a CallInfo<'a>,
    pub args: &'a Args,
}

/// How the original finished
#[derive(Debug)]
pub enum Outcome<'a> {
    Returned(&'a Value),
    Raised(&'a anyhow::Error),
    Panicked(&'a str),
}

/// Emitted after the original returns, raises, or panics
#[derive(Debug)]
pub struct PostCall<'a> {
    pub info: &'a CallInfo<'a>,
    pub outcome: Outcome<'a>,
    pub elapsed: Duration,
}

const BANNER: &str = "=====";

/// Renders call events to the output channels
pub struct CallRecorder {
    settings: Settings,
    channels: Channels,
    main_thread: ThreadId,
}

impl CallRecorder {
    /// The calling thread is taken as the main thread
    pub fn new(settings: Settings, channels: Channels) -> Self {
        Self {
            settings,
            channels,
            main_thread: std::thread::current().id(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    pub fn pre_call(&self, event: &PreCall<'_>) {
        if self.settings.wrapper_func_debug_info_dict_uris {
            let uris = json!({
                "uri": event.info.qualified_name,
                "site": event.info.site,
            });
            self.channels.debug.write_line(&uris.to_string());
        }
        if self.settings.printing_handler_debug_args_inspect_info {
            let inspect = json!({
                "uri": event.info.qualified_name,
                "kind": event.info.kind,
                "positional": event.args.positional.iter().map(Value::type_name).collect::<Vec<_>>(),
                "keywords": event.args.keywords.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            });
            self.channels.debug.write_line(&inspect.to_string());
        }
        self.debug_info_dict("pre_call", event.info, |recorder, dict| {
            dict["args"] = json!(recorder.render_arg_list(event.info, event.args));
        });

        let line = self.format_pre(event);
        self.channels.info.write_line(&line);
    }

    pub fn post_call(&self, event: &PostCall<'_>) {
        self.debug_info_dict("post_call", event.info, |recorder, dict| {
            dict["outcome"] = json!(recorder.render_outcome(event.info, &event.outcome));
        });

        let line = self.format_post(event);
        self.channels.info.write_line(&line);
    }

    /// Pre-call trace line
    pub fn format_pre(&self, event: &PreCall<'_>) -> String {
        let info = event.info;
        let call = format!(
            "{}({})",
            self.title_name(info),
            self.render_arg_list(info, event.args).join(", ")
        );
        let location = if self.settings.show_func_file_path_lineno_pre_call {
            format_location(info.location)
        } else {
            String::new()
        };

        if info.action.is_highlight() {
            format!(
                "{}{}{} + {} {}{}",
                self.thread_prefix(info),
                self.indent(info.depth),
                BANNER,
                self.cap(call),
                BANNER,
                location
            )
        } else {
            format!(
                "{}{}+ {}{}",
                self.thread_prefix(info),
                self.indent(info.depth),
                call,
                location
            )
        }
    }

    /// Post-call trace line
    pub fn format_post(&self, event: &PostCall<'_>) -> String {
        let info = event.info;
        let result = match &event.outcome {
            Outcome::Returned(_) => format!("=> {}", self.render_outcome(info, &event.outcome)),
            Outcome::Raised(_) => format!("!! raised {}", self.render_outcome(info, &event.outcome)),
            Outcome::Panicked(_) => format!("!! panicked {}", self.render_outcome(info, &event.outcome)),
        };
        let location = if self.settings.show_func_file_path_lineno_post_call {
            format_location(info.location)
        } else {
            String::new()
        };
        let summary = format!("{} {}", self.title_name(info), result);

        if info.action.is_highlight() {
            format!(
                "{}{}{} - {} {} [{:.3?}]{}",
                self.thread_prefix(info),
                self.indent(info.depth),
                BANNER,
                self.cap(summary),
                BANNER,
                event.elapsed,
                location
            )
        } else {
            format!(
                "{}{}- {} [{:.3?}]{}",
                self.thread_prefix(info),
                self.indent(info.depth),
                summary,
                event.elapsed,
                location
            )
        }
    }

    fn indent(&self, depth: usize) -> String {
        self.settings.indent_unit_text.repeat(depth)
    }

    fn thread_prefix(&self, info: &CallInfo<'_>) -> String {
        if info.thread == self.main_thread && !self.settings.show_main_thread_id {
            return String::new();
        }
        match &info.thread_name {
            Some(name) => format!("[{:?} {}] ", info.thread, name),
            None => format!("[{:?}] ", info.thread),
        }
    }

    /// Name shown for the call; highlighted method calls may name the
    /// receiver's runtime class instead of the class the wrapper sits on
    fn title_name(&self, info: &CallInfo<'_>) -> String {
        if info.action.is_highlight() && self.settings.highlight_title_show_self_class {
            if let Some(class) = &info.self_class {
                return format!("{}.{}", class, info.site.attribute);
            }
        }
        info.qualified_name.to_string()
    }

    fn cap(&self, text: String) -> String {
        let max = self.settings.highlight_title_line_char_count_max;
        if text.chars().count() <= max {
            return text;
        }
        if max <= 3 {
            return text.chars().take(max).collect();
        }
        let mut capped: String = text.chars().take(max - 3).collect();
        capped.push_str("...");
        capped
    }

    fn render_arg_list(&self, info: &CallInfo<'_>, args: &Args) -> Vec<String> {
        let positional = args
            .positional
            .iter()
            .enumerate()
            .map(|(i, value)| self.render_value(info, &format!("argument {}", i), value));
        let keywords = args
            .keywords
            .iter()
            .map(|(name, value)| format!("{}={}", name, self.render_value(info, name, value)));
        positional.chain(keywords).collect()
    }

    fn render_outcome(&self, info: &CallInfo<'_>, outcome: &Outcome<'_>) -> String {
        match outcome {
            Outcome::Returned(value) => self.render_value(info, "return value", value),
            Outcome::Raised(err) => guarded(|| format!("{:#}", err)).unwrap_or_else(|reason| {
                self.report_display_error(info, "raised error", &reason);
                "<unprintable error>".to_string()
            }),
            Outcome::Panicked(message) => message.to_string(),
        }
    }

    /// Display text for `value`, or a placeholder if producing it fails
    pub(crate) fn render_value(&self, info: &CallInfo<'_>, what: &str, value: &Value) -> String {
        let rendered = guarded(|| value.repr()).and_then(|r| r.map_err(|err| err.to_string()));
        match rendered {
            Ok(text) => text,
            Err(reason) => {
                self.report_display_error(info, what, &reason);
                format!("<unprintable {}>", value.type_name())
            }
        }
    }

    fn report_display_error(&self, info: &CallInfo<'_>, what: &str, reason: &str) {
        tracing::debug!(uri = info.qualified_name, what, reason, "display failed");
        self.channels.error.write_line(&format!(
            "tracecall: cannot display {} of {}: {}",
            what, info.qualified_name, reason
        ));
    }

    fn debug_info_dict<F>(&self, phase: &str, info: &CallInfo<'_>, add_values: F)
    where
        F: FnOnce(&Self, &mut serde_json::Value),
    {
        let full = self.settings.printing_handler_debug_info_dict;
        if !full && !self.settings.printing_handler_debug_info_dict_safe {
            return;
        }

        let mut dict = json!({
            "phase": phase,
            "uri": info.qualified_name,
            "site": info.site,
            "action": info.action.to_string(),
            "kind": info.kind,
            "depth": info.depth,
            "file": info.location.file(),
            "line": info.location.line(),
            "self_class": info.self_class,
            "thread": format!("{:?}", info.thread),
        });
        // The safe variant leaves out values, whose display may fail
        if full {
            add_values(self, &mut dict);
        }
        self.channels.debug.write_line(&dict.to_string());
    }
}

fn format_location(location: &Location<'_>) -> String {
    format!("  @ {}:{}", location.file(), location.line())
}

/// Run a display routine, turning a panic into an error message
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ClassBuilder;
    use crate::sinks::MemoryChannels;

    fn recorder(settings: Settings) -> (CallRecorder, MemoryChannels) {
        let (channels, sinks) = Channels::memory();
        (CallRecorder::new(settings, channels), sinks)
    }

    #[track_caller]
    fn info<'a>(site: &'a CallSite, name: &'a str, action: Action, depth: usize) -> CallInfo<'a> {
        CallInfo {
            qualified_name: name,
            site,
            action,
            kind: RoutineKind::Function,
            depth,
            location: Location::caller(),
            self_class: None,
            thread: std::thread::current().id(),
            thread_name: None,
        }
    }

    #[test]
    fn test_plain_lines_are_indented_by_depth() {
        let (recorder, sinks) = recorder(Settings {
            indent_unit_text: "..".to_string(),
            ..Settings::default()
        });
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 2);
        let args = Args::positional([1i64]).keyword("flag", true);

        recorder.pre_call(&PreCall { info: &info, args: &args });
        recorder.post_call(&PostCall {
            info: &info,
            outcome: Outcome::Returned(&Value::Int(7)),
            elapsed: Duration::from_micros(5),
        });

        let lines = sinks.info.lines();
        assert_eq!(lines[0], "....+ m.f(1, flag=True)");
        assert!(lines[1].starts_with("....- m.f => 7 ["), "{}", lines[1]);
    }

    #[test]
    fn test_highlight_banner_and_cap() {
        let (recorder, sinks) = recorder(Settings {
            highlight_title_line_char_count_max: 12,
            ..Settings::default()
        });
        let site = CallSite::function("select", "select");
        let info = info(&site, "select.select", Action::Highlight, 0);
        let args = Args::positional(["a long argument"]);

        recorder.pre_call(&PreCall { info: &info, args: &args });
        assert_eq!(sinks.info.lines()[0], "===== + select.se... =====");
    }

    #[test]
    fn test_highlight_shows_self_class_when_enabled() {
        let (recorder, sinks) = recorder(Settings {
            highlight_title_show_self_class: true,
            ..Settings::default()
        });
        let site = CallSite::method("socket", "socket", "send");
        let mut info = info(&site, "socket.socket.send", Action::Highlight, 0);
        info.self_class = Some("app.LoggingSocket".to_string());

        recorder.pre_call(&PreCall { info: &info, args: &Args::new() });
        assert!(sinks.info.lines()[0].contains("app.LoggingSocket.send()"));
    }

    #[test]
    fn test_unprintable_argument_degrades_to_placeholder() {
        let (recorder, sinks) = recorder(Settings::default());
        let broken = ClassBuilder::new("m", "Broken")
            .repr(|_| Err(anyhow::anyhow!("no repr for you")))
            .build();
        let obj = broken.instantiate(Args::new()).unwrap();
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);
        let args = Args::positional([Value::Object(obj)]);

        recorder.pre_call(&PreCall { info: &info, args: &args });
        assert_eq!(sinks.info.lines()[0], "+ m.f(<unprintable m.Broken>)");
        assert!(sinks.error.contains("no repr for you"));
    }

    #[test]
    fn test_panicking_repr_degrades_to_placeholder() {
        let (recorder, sinks) = recorder(Settings::default());
        let broken = ClassBuilder::new("m", "Panicky")
            .repr(|_| panic!("repr panicked"))
            .build();
        let obj = broken.instantiate(Args::new()).unwrap();
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);

        recorder.post_call(&PostCall {
            info: &info,
            outcome: Outcome::Returned(&Value::Object(obj)),
            elapsed: Duration::ZERO,
        });
        assert!(sinks.info.lines()[0].contains("<unprintable m.Panicky>"));
        assert!(sinks.error.contains("repr panicked"));
    }

    #[test]
    fn test_raised_outcome() {
        let (recorder, sinks) = recorder(Settings::default());
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);
        let err = anyhow::anyhow!("boom");

        recorder.post_call(&PostCall {
            info: &info,
            outcome: Outcome::Raised(&err),
            elapsed: Duration::ZERO,
        });
        assert!(sinks.info.lines()[0].starts_with("- m.f !! raised boom"));
    }

    #[test]
    fn test_location_shown_when_configured() {
        let (recorder, sinks) = recorder(Settings {
            show_func_file_path_lineno_pre_call: true,
            ..Settings::default()
        });
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);

        recorder.pre_call(&PreCall { info: &info, args: &Args::new() });
        assert!(sinks.info.lines()[0].contains(&format!("@ {}:", file!())));
    }

    #[test]
    fn test_main_thread_id_visibility() {
        let (recorder, sinks) = recorder(Settings {
            show_main_thread_id: true,
            ..Settings::default()
        });
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);

        recorder.pre_call(&PreCall { info: &info, args: &Args::new() });
        assert!(sinks.info.lines()[0].starts_with("[ThreadId("));
    }

    #[test]
    fn test_safe_info_dict_omits_values() {
        let (recorder, sinks) = recorder(Settings {
            printing_handler_debug_info_dict_safe: true,
            ..Settings::default()
        });
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);

        recorder.pre_call(&PreCall { info: &info, args: &Args::positional([1i64]) });
        let dump: serde_json::Value = serde_json::from_str(&sinks.debug.lines()[0]).unwrap();
        assert_eq!(dump["uri"], "m.f");
        assert!(dump.get("args").is_none());
    }

    #[test]
    fn test_full_info_dict_includes_values() {
        let (recorder, sinks) = recorder(Settings {
            printing_handler_debug_info_dict: true,
            ..Settings::default()
        });
        let site = CallSite::function("m", "f");
        let info = info(&site, "m.f", Action::Enable, 0);

        recorder.pre_call(&PreCall { info: &info, args: &Args::positional([1i64]) });
        let dump: serde_json::Value = serde_json::from_str(&sinks.debug.lines()[0]).unwrap();
        assert_eq!(dump["args"], json!(["1"]));
    }
}
