//! `protocols` and `__main__` host modules

use super::{bytes_arg, object_arg, str_arg};
use crate::runtime::{Args, ClassBuilder, Module, ModuleLoader, Value};
use std::sync::Arc;
use std::thread;

const BACKLOG: i64 = 8;
const REACTOR_TIMEOUT_MS: i64 = 5_000;
const REPLY_SIZE: i64 = 1024;

pub(super) fn init_protocols(module: &Arc<Module>, _loader: &ModuleLoader) -> anyhow::Result<()> {
    let protocol = ClassBuilder::new("protocols", "Protocol")
        .method("connection_made", |args| {
            let this = args.receiver("Protocol.connection_made")?;
            let transport = object_arg(&args, "Protocol.connection_made", 1)?;
            this.set_field("transport", transport);
            Ok(Value::None)
        })
        .method("data_received", |_args| Ok(Value::None))
        .method("connection_lost", |args| {
            let this = args.receiver("Protocol.connection_lost")?;
            this.set_field("transport", Value::None);
            Ok(Value::None)
        })
        .build();
    module.add_class(&protocol)?;
    Ok(())
}

pub(super) fn init_main(module: &Arc<Module>, loader: &ModuleLoader) -> anyhow::Result<()> {
    let socket = loader.import("socket")?;
    let reactor = loader.import("reactor")?;
    let protocols = loader.import("protocols")?;
    let base = protocols
        .class("Protocol")
        .ok_or_else(|| anyhow::anyhow!("protocols.Protocol is not defined"))?;

    let echo = ClassBuilder::new("__main__", "EchoProtocol")
        .base(&base)
        .method("connection_made", |args| {
            let this = args.receiver("EchoProtocol.connection_made")?;
            let transport = object_arg(&args, "EchoProtocol.connection_made", 1)?;
            this.set_field("transport", transport);
            Ok(Value::None)
        })
        .method("data_received", |args| {
            let this = args.receiver("EchoProtocol.data_received")?;
            let data = bytes_arg(&args, "EchoProtocol.data_received", 1)?;
            let Some(Value::Object(transport)) = this.field("transport") else {
                anyhow::bail!("EchoProtocol received data before connection_made");
            };
            transport.call_method("send", Args::new().arg(data))?;
            transport.call_method("shutdown", Args::new())?;
            Ok(Value::None)
        })
        .build();
    module.add_class(&echo)?;

    let connector = Arc::clone(&socket);
    module.def("client", move |args| {
        let addr = str_arg(&args, "__main__.client", 0)?;
        let message = bytes_arg(&args, "__main__.client", 1)?;
        let sock = match connector.call("create_connection", Args::new().arg(addr))? {
            Value::Object(sock) => sock,
            other => anyhow::bail!("create_connection returned {}", other.type_name()),
        };
        sock.call_method("send", Args::new().arg(message))?;
        let reply = sock.call_method("recv", Args::new().arg(REPLY_SIZE))?;
        sock.call_method("close", Args::new())?;
        Ok(reply)
    })?;

    // Weak so the module does not keep itself alive through its own slot
    let this = Arc::downgrade(module);
    module.def("main", move |args| {
        let message = str_arg(&args, "__main__.main", 0)?;
        let this = this
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("__main__ was dropped"))?;

        let server = socket.call("TcpSocket", Args::new())?;
        let Value::Object(server_sock) = &server else {
            anyhow::bail!("TcpSocket() returned {}", server.type_name());
        };
        server_sock.call_method("bind", Args::new().arg("127.0.0.1:0"))?;
        server_sock.call_method("listen", Args::new().arg(BACKLOG))?;
        let addr = server_sock.call_method("getsockname", Args::new())?;

        let client_module = Arc::clone(&this);
        let client = thread::Builder::new()
            .name("echo-client".to_string())
            .spawn(move || {
                client_module.call("client", Args::new().arg(addr).arg(message))
            })?;

        let protocol = this
            .class("EchoProtocol")
            .ok_or_else(|| anyhow::anyhow!("__main__.EchoProtocol is not defined"))?;
        let event_loop = reactor.call(
            "Reactor",
            Args::new().arg(server.clone()).arg(Value::Class(protocol)),
        )?;
        if let Value::Object(event_loop) = &event_loop {
            event_loop.call_method("run", Args::new().arg(REACTOR_TIMEOUT_MS))?;
        }
        server_sock.call_method("close", Args::new())?;

        let reply = client
            .join()
            .map_err(|_| anyhow::anyhow!("echo client panicked"))??;
        let text = reply
            .as_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        Ok(Value::Str(text))
    })?;

    Ok(())
}
