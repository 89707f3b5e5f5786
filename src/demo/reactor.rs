//! `reactor` host module
//!
//! `Reactor` owns a listening socket and one protocol object per accepted
//! connection. Each poll waits on every socket through `select.select` and
//! turns readiness into `on_connection_established`, `on_data_received` and
//! `on_connection_lost` events.

use super::{int_arg, object_arg};
use crate::runtime::{Args, ClassBuilder, Instance, Module, ModuleLoader, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_TIMEOUT_MS: i64 = 50;
const RECV_SIZE: i64 = 4096;

#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("reactor field '{0}' is missing or has the wrong type")]
    Field(&'static str),
    #[error("reactor idle for {0:?} without finishing")]
    TimedOut(Duration),
}

fn list_field(this: &Instance, name: &'static str) -> Result<Vec<Value>, ReactorError> {
    match this.field(name) {
        Some(Value::List(items)) => Ok(items),
        _ => Err(ReactorError::Field(name)),
    }
}

fn object_field(this: &Instance, name: &'static str) -> Result<Arc<Instance>, ReactorError> {
    match this.field(name) {
        Some(Value::Object(object)) => Ok(object),
        _ => Err(ReactorError::Field(name)),
    }
}

/// Protocol bound to `conn`
fn protocol_for(this: &Instance, conn: &Value) -> Result<Option<Arc<Instance>>, ReactorError> {
    let connections = list_field(this, "connections")?;
    let protocols = list_field(this, "protocols")?;
    Ok(connections
        .iter()
        .position(|c| c == conn)
        .and_then(|i| protocols.get(i))
        .and_then(Value::as_object)
        .cloned())
}

pub(super) fn init(module: &Arc<Module>, loader: &ModuleLoader) -> anyhow::Result<()> {
    let select = loader.import("select")?;

    let reactor = ClassBuilder::new("reactor", "Reactor")
        .method("__init__", |args| {
            let this = args.receiver("Reactor.__init__")?;
            let listener = object_arg(&args, "Reactor.__init__", 1)?;
            let protocol = args.require("Reactor.__init__", 2, "class")?.clone();
            this.set_field("listener", listener);
            this.set_field("protocol", protocol);
            this.set_field("connections", Value::List(Vec::new()));
            this.set_field("protocols", Value::List(Vec::new()));
            this.set_field("served", Value::Int(0));
            Ok(Value::None)
        })
        .method("poll_once", move |args| {
            let this = args.receiver("Reactor.poll_once")?;
            let timeout = int_arg(&args, "Reactor.poll_once", 1)?;
            let listener = Value::Object(object_field(this, "listener")?);

            let mut watched = vec![listener.clone()];
            watched.extend(list_field(this, "connections")?);
            let ready = select.call("select", Args::new().arg(Value::List(watched)).arg(timeout))?;

            let mut events = 0;
            for sock in ready.as_list().unwrap_or_default() {
                let Value::Object(sock_obj) = sock else {
                    continue;
                };
                if *sock == listener {
                    let conn = sock_obj.call_method("accept", Args::new())?;
                    this.call_method("on_connection_established", Args::new().arg(conn))?;
                } else {
                    let data = sock_obj.call_method("recv", Args::new().arg(RECV_SIZE))?;
                    if data.as_bytes().is_some_and(<[u8]>::is_empty) {
                        this.call_method("on_connection_lost", Args::new().arg(sock.clone()))?;
                    } else {
                        this.call_method(
                            "on_data_received",
                            Args::new().arg(sock.clone()).arg(data),
                        )?;
                    }
                }
                events += 1;
            }
            Ok(Value::Int(events))
        })
        .method("run", |args| {
            let this = args.receiver("Reactor.run")?;
            let limit = Duration::from_millis(
                u64::try_from(int_arg(&args, "Reactor.run", 1)?).unwrap_or(0),
            );
            let mut idle_since = Instant::now();
            loop {
                let served = this.field("served").and_then(|v| v.as_int()).unwrap_or(0);
                if served > 0 && list_field(this, "connections")?.is_empty() {
                    return Ok(Value::Int(served));
                }
                let events = this.call_method("poll_once", Args::new().arg(POLL_TIMEOUT_MS))?;
                if events.as_int().unwrap_or(0) > 0 {
                    idle_since = Instant::now();
                } else if idle_since.elapsed() >= limit {
                    return Err(ReactorError::TimedOut(limit).into());
                }
            }
        })
        .method("on_connection_established", |args| {
            let this = args.receiver("Reactor.on_connection_established")?;
            let conn = args.require("Reactor.on_connection_established", 1, "socket")?.clone();
            let peer = this.call_method("_describe_peer", Args::new().arg(conn.clone()))?;
            tracing::trace!(peer = ?peer, "connection established");

            let factory = match this.field("protocol") {
                Some(Value::Class(class)) => class,
                _ => return Err(ReactorError::Field("protocol").into()),
            };
            let protocol = factory.instantiate(Args::new())?;
            protocol.call_method("connection_made", Args::new().arg(conn.clone()))?;

            let mut connections = list_field(this, "connections")?;
            let mut protocols = list_field(this, "protocols")?;
            connections.push(conn);
            protocols.push(Value::Object(protocol));
            this.set_field("connections", Value::List(connections));
            this.set_field("protocols", Value::List(protocols));
            let served = this.field("served").and_then(|v| v.as_int()).unwrap_or(0);
            this.set_field("served", Value::Int(served + 1));
            Ok(Value::None)
        })
        .method("on_data_received", |args| {
            let this = args.receiver("Reactor.on_data_received")?;
            let conn = args.require("Reactor.on_data_received", 1, "socket")?;
            let data = args.require("Reactor.on_data_received", 2, "bytes")?.clone();
            if let Some(protocol) = protocol_for(this, conn)? {
                protocol.call_method("data_received", Args::new().arg(data))?;
            }
            Ok(Value::None)
        })
        .method("on_connection_lost", |args| {
            let this = args.receiver("Reactor.on_connection_lost")?;
            let conn = args.require("Reactor.on_connection_lost", 1, "socket")?.clone();
            if let Some(protocol) = protocol_for(this, &conn)? {
                protocol.call_method("connection_lost", Args::new())?;
            }

            let mut connections = list_field(this, "connections")?;
            let mut protocols = list_field(this, "protocols")?;
            if let Some(i) = connections.iter().position(|c| *c == conn) {
                connections.remove(i);
                if i < protocols.len() {
                    protocols.remove(i);
                }
            }
            this.set_field("connections", Value::List(connections));
            this.set_field("protocols", Value::List(protocols));

            if let Value::Object(sock) = &conn {
                sock.call_method("close", Args::new())?;
            }
            Ok(Value::None)
        })
        .method("_describe_peer", |args| {
            let conn = object_arg(&args, "Reactor._describe_peer", 1)?;
            let peer = conn.call_method("getpeername", Args::new())?;
            let local = conn.call_method("getsockname", Args::new())?;
            Ok(Value::Str(format!(
                "{} -> {}",
                peer.as_str().unwrap_or("?"),
                local.as_str().unwrap_or("?")
            )))
        })
        .build();

    module.add_class(&reactor)?;
    Ok(())
}
