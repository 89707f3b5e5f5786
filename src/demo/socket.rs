//! `socket` host module
//!
//! Class `socket` stands in for a natively implemented type: it is frozen,
//! so its slots cannot be rewritten and only subclasses (`TcpSocket`) can
//! carry wrappers for its methods.

use super::{bytes_arg, int_arg, str_arg};
use crate::runtime::{Args, Class, ClassBuilder, Instance, Module, ModuleLoader, Opaque, Value};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

const STATE_FIELD: &str = "_state";

static NEXT_FD: AtomicI64 = AtomicI64::new(3);

/// Socket misuse reported to the caller of a socket method
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("socket is not connected")]
    NotConnected,
    #[error("socket is not listening")]
    NotListening,
    #[error("socket is already bound")]
    AlreadyBound,
    #[error("socket is closed")]
    Closed,
    #[error("no connection is waiting")]
    WouldBlock,
    #[error("object has no socket state")]
    MissingState,
}

pub(super) enum Endpoint {
    Unbound,
    Listener {
        listener: TcpListener,
        /// Connections taken off the listener by `select`, not yet accepted
        pending: VecDeque<TcpStream>,
    },
    Stream(TcpStream),
    Closed,
}

pub(super) struct SocketState {
    fd: i64,
    endpoint: Endpoint,
}

fn attach(instance: &Instance, endpoint: Endpoint) {
    let state = SocketState {
        fd: NEXT_FD.fetch_add(1, Ordering::Relaxed),
        endpoint,
    };
    instance.set_field(STATE_FIELD, Value::Opaque(Opaque::new(Mutex::new(state))));
}

fn with_state<T>(
    instance: &Instance,
    f: impl FnOnce(&mut SocketState) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let Some(Value::Opaque(opaque)) = instance.field(STATE_FIELD) else {
        return Err(SocketError::MissingState.into());
    };
    let cell = opaque
        .downcast_ref::<Mutex<SocketState>>()
        .ok_or(SocketError::MissingState)?;
    let mut state = cell.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut state)
}

fn stream(state: &mut SocketState) -> Result<&mut TcpStream, SocketError> {
    match &mut state.endpoint {
        Endpoint::Stream(stream) => Ok(stream),
        Endpoint::Closed => Err(SocketError::Closed),
        _ => Err(SocketError::NotConnected),
    }
}

/// Whether a read on the socket would not block; used by `select`
pub(super) fn poll_readable(instance: &Instance) -> anyhow::Result<bool> {
    with_state(instance, |state| match &mut state.endpoint {
        Endpoint::Listener { listener, pending } => {
            if !pending.is_empty() {
                return Ok(true);
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    pending.push_back(stream);
                    Ok(true)
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(false),
                Err(err) => Err(err.into()),
            }
        }
        Endpoint::Stream(stream) => {
            stream.set_nonblocking(true)?;
            let mut probe = [0u8; 1];
            // End of stream and errors count as readable; recv reports them
            let ready = match stream.peek(&mut probe) {
                Err(err) if err.kind() == ErrorKind::WouldBlock => false,
                _ => true,
            };
            stream.set_nonblocking(false)?;
            Ok(ready)
        }
        Endpoint::Unbound | Endpoint::Closed => Ok(false),
    })
}

fn describe(instance: &Instance) -> anyhow::Result<String> {
    let name = instance.class().full_name();
    with_state(instance, |state| {
        let detail = match &state.endpoint {
            Endpoint::Unbound => "unbound".to_string(),
            Endpoint::Listener { listener, .. } => format!("listening {}", listener.local_addr()?),
            Endpoint::Stream(stream) => {
                format!("{} -> {}", stream.local_addr()?, stream.peer_addr()?)
            }
            Endpoint::Closed => "closed".to_string(),
        };
        Ok(format!("<{} fd={} {}>", name, state.fd, detail))
    })
}

fn socket_class() -> Arc<Class> {
    ClassBuilder::new("socket", "socket")
        .method("__init__", |args| {
            attach(args.receiver("socket.__init__")?, Endpoint::Unbound);
            Ok(Value::None)
        })
        .method("bind", |args| {
            let this = args.receiver("socket.bind")?;
            let addr = str_arg(&args, "socket.bind", 1)?;
            with_state(this, |state| {
                if !matches!(state.endpoint, Endpoint::Unbound) {
                    return Err(SocketError::AlreadyBound.into());
                }
                let listener = TcpListener::bind(addr.as_str())?;
                listener.set_nonblocking(true)?;
                state.endpoint = Endpoint::Listener {
                    listener,
                    pending: VecDeque::new(),
                };
                Ok(Value::None)
            })
        })
        .method("listen", |args| {
            let this = args.receiver("socket.listen")?;
            let backlog = int_arg(&args, "socket.listen", 1)?;
            with_state(this, |state| match state.endpoint {
                Endpoint::Listener { .. } => {
                    tracing::trace!(fd = state.fd, backlog, "listening");
                    Ok(Value::None)
                }
                _ => Err(SocketError::NotListening.into()),
            })
        })
        .method("accept", |args| {
            let this = args.receiver("socket.accept")?;
            let stream = with_state(this, |state| match &mut state.endpoint {
                Endpoint::Listener { listener, pending } => match pending.pop_front() {
                    Some(stream) => Ok(stream),
                    None => match listener.accept() {
                        Ok((stream, _)) => Ok(stream),
                        Err(err) if err.kind() == ErrorKind::WouldBlock => {
                            Err(SocketError::WouldBlock.into())
                        }
                        Err(err) => Err(err.into()),
                    },
                },
                _ => Err(SocketError::NotListening.into()),
            })?;
            stream.set_nonblocking(false)?;

            let conn = Instance::new(this.class());
            attach(&conn, Endpoint::Stream(stream));
            Ok(Value::Object(conn))
        })
        .method("recv", |args| {
            let this = args.receiver("socket.recv")?;
            let size = int_arg(&args, "socket.recv", 1)?;
            let mut buf = vec![0u8; usize::try_from(size).unwrap_or(0)];
            let n = with_state(this, |state| Ok(stream(state)?.read(&mut buf)?))?;
            buf.truncate(n);
            Ok(Value::Bytes(buf))
        })
        .method("send", |args| {
            let this = args.receiver("socket.send")?;
            let data = bytes_arg(&args, "socket.send", 1)?;
            with_state(this, |state| {
                stream(state)?.write_all(&data)?;
                Ok(Value::Int(i64::try_from(data.len())?))
            })
        })
        .method("shutdown", |args| {
            let this = args.receiver("socket.shutdown")?;
            with_state(this, |state| {
                match stream(state)?.shutdown(Shutdown::Both) {
                    Ok(()) => Ok(Value::None),
                    // The peer may already be gone
                    Err(err) if err.kind() == ErrorKind::NotConnected => Ok(Value::None),
                    Err(err) => Err(err.into()),
                }
            })
        })
        .method("close", |args| {
            let this = args.receiver("socket.close")?;
            with_state(this, |state| {
                state.endpoint = Endpoint::Closed;
                Ok(Value::None)
            })
        })
        .method("fileno", |args| {
            let this = args.receiver("socket.fileno")?;
            with_state(this, |state| Ok(Value::Int(state.fd)))
        })
        .method("getsockname", |args| {
            let this = args.receiver("socket.getsockname")?;
            with_state(this, |state| {
                let addr = match &state.endpoint {
                    Endpoint::Listener { listener, .. } => listener.local_addr()?,
                    Endpoint::Stream(stream) => stream.local_addr()?,
                    Endpoint::Closed => return Err(SocketError::Closed.into()),
                    Endpoint::Unbound => return Err(SocketError::NotConnected.into()),
                };
                Ok(Value::Str(addr.to_string()))
            })
        })
        .method("getpeername", |args| {
            let this = args.receiver("socket.getpeername")?;
            with_state(this, |state| {
                Ok(Value::Str(stream(state)?.peer_addr()?.to_string()))
            })
        })
        .repr(describe)
        .frozen()
        .build()
}

pub(super) fn init(module: &Arc<Module>, _loader: &ModuleLoader) -> anyhow::Result<()> {
    let socket = socket_class();
    let tcp_socket = ClassBuilder::new("socket", "TcpSocket")
        .base(&socket)
        .repr(describe)
        .build();
    module.add_class(&socket)?;
    module.add_class(&tcp_socket)?;

    let class = Arc::clone(&tcp_socket);
    module.def("create_connection", move |args: Args| {
        let addr = str_arg(&args, "socket.create_connection", 0)?;
        let stream = TcpStream::connect(addr.as_str())?;
        let conn = Instance::new(&class);
        attach(&conn, Endpoint::Stream(stream));
        Ok(Value::Object(conn))
    })?;
    Ok(())
}
