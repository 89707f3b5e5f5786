//! tracecall - Declarative call tracing for an introspectable host runtime
//!
//! An ordered table of rules over qualified callable names
//! (`module.Class.method`) decides which routines get wrapped. Wrapped
//! routines emit an indented pre-call and post-call line for every
//! invocation, optionally highlighted, without changing what the caller
//! observes. Modules are instrumented as they are loaded, before any other
//! code can reach their routines.

pub mod cli;
pub mod config;
pub mod demo;
pub mod engine;
pub mod recorder;
pub mod rules;
pub mod runtime;
pub mod sinks;
