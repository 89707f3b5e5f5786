//! `select` host module

use super::{int_arg, socket};
use crate::runtime::{Args, Module, ModuleLoader, RuntimeError, Value};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// `None` when the deadline is too far out to represent: wait until ready
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// `select(sockets, timeout_ms)`: the sockets readable within the timeout
fn select(args: Args) -> anyhow::Result<Value> {
    let sockets = args
        .require("select.select", 0, "list")?
        .as_list()
        .ok_or_else(|| RuntimeError::BadArgument {
            function: "select.select".to_string(),
            index: 0,
            expected: "list",
        })?
        .to_vec();
    let timeout = Duration::from_millis(u64::try_from(int_arg(&args, "select.select", 1)?).unwrap_or(0));
    let deadline = deadline_after(timeout);

    loop {
        let mut ready = Vec::new();
        for sock in &sockets {
            if let Value::Object(instance) = sock {
                if socket::poll_readable(instance)? {
                    ready.push(sock.clone());
                }
            }
        }
        if !ready.is_empty() || deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(Value::List(ready));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub(super) fn init(module: &Arc<Module>, _loader: &ModuleLoader) -> anyhow::Result<()> {
    module.def("select", select)?;
    Ok(())
}
