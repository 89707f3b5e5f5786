// Traced echo application
//
// Host modules loaded through a ModuleLoader so an engine can instrument
// them: `socket` (a frozen native-style class and a plain subclass),
// `select`, `reactor` (dispatches connection and data events), `protocols`
// and `__main__` (the echo protocol, a client and the `main` entry point).
// Everything runs on 127.0.0.1 with an ephemeral port.

mod echo;
mod reactor;
mod select;
mod socket;


pub use socket::SocketError;

use crate::engine::{Engine, SweepReport};
use crate::runtime::{Args, Instance, ModuleLoader, RuntimeError, Value};
use std::sync::Arc;

/// Declare the echo application's modules on `loader`
pub fn register_modules(loader: &ModuleLoader) {
    loader.register("socket", socket::init);
    loader.register("select", select::init);
    loader.register("reactor", reactor::init);
    loader.register("protocols", echo::init_protocols);
    loader.register("__main__", echo::init_main);
}

/// Activate `engine` on `loader`, load the application and run one echo
/// round trip of `message`; returns the reply the client received
pub fn run_echo(engine: &Engine, loader: &ModuleLoader, message: &str) -> anyhow::Result<String> {
    let activation: SweepReport = engine.activate(loader);
    tracing::debug!(wrapped = activation.wrapped, "echo application activating");

    let main = loader.import("__main__")?;
    let reply = main.call("main", Args::new().arg(message))?;
    reply.as_str().map(str::to_string).ok_or_else(|| {
        anyhow::anyhow!("__main__.main returned {} instead of str", reply.type_name())
    })
}

fn int_arg(args: &Args, function: &str, index: usize) -> Result<i64, RuntimeError> {
    args.require(function, index, "int")?
        .as_int()
        .ok_or_else(|| bad_argument(function, index, "int"))
}

fn str_arg(args: &Args, function: &str, index: usize) -> Result<String, RuntimeError> {
    args.require(function, index, "str")?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| bad_argument(function, index, "str"))
}

fn bytes_arg(args: &Args, function: &str, index: usize) -> Result<Vec<u8>, RuntimeError> {
    match args.require(function, index, "bytes")? {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Str(text) => Ok(text.as_bytes().to_vec()),
        _ => Err(bad_argument(function, index, "bytes")),
    }
}

fn object_arg(args: &Args, function: &str, index: usize) -> Result<Arc<Instance>, RuntimeError> {
    args.require(function, index, "object")?
        .as_object()
        .cloned()
        .ok_or_else(|| bad_argument(function, index, "object"))
}

fn bad_argument(function: &str, index: usize, expected: &'static str) -> RuntimeError {
    RuntimeError::BadArgument {
        function: function.to_string(),
        index,
        expected,
    }
}
