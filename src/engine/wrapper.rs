//! Call wrappers
//!
//! A wrapper takes the place of a matched routine. It keeps the routine's
//! name, kind and definition site, forwards the arguments unchanged to the
//! original exactly once, and returns its value or error unchanged. Around
//! the call it emits a pre-call and a post-call event. The post-call event is
//! emitted on success, on error, and on panic; a panic is resumed with its
//! original payload afterwards.
//!
//! The wrapper brackets only the synchronous call. Work the original hands
//! to another thread may still be running when the post-call event is
//! emitted.

use crate::engine::depth::Frame;
use crate::engine::WrapperRecord;
use crate::recorder::{panic_message, CallInfo, CallRecorder, Outcome, PostCall, PreCall};
use crate::runtime::{Args, Body, Callable, Routine, RoutineKind, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Shared state every wrapper of one engine reports to
pub(crate) struct Tracer {
    pub(crate) engine_id: u64,
    pub(crate) recorder: CallRecorder,
}

/// Callable-object wrapper
pub struct CallWrapper {
    tracer: Arc<Tracer>,
    record: Arc<WrapperRecord>,
}

impl CallWrapper {
    pub fn record(&self) -> &Arc<WrapperRecord> {
        &self.record
    }
}

impl Callable for CallWrapper {
    fn call(&self, args: Args) -> anyhow::Result<Value> {
        invoke(&self.tracer, &self.record, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build the replacement routine for `record`
///
/// With `use_object` the body is a [`CallWrapper`] object; otherwise it is a
/// plain function, for consumers that require one.
pub(crate) fn wrap(tracer: &Arc<Tracer>, record: &Arc<WrapperRecord>, use_object: bool) -> Routine {
    let body = if use_object {
        Body::Object(Arc::new(CallWrapper {
            tracer: Arc::clone(tracer),
            record: Arc::clone(record),
        }))
    } else {
        let tracer = Arc::clone(tracer);
        let inner = Arc::clone(record);
        Body::Function(Arc::new(move |args| invoke(&tracer, &inner, args)))
    };
    record.original().replaced(body, Arc::clone(record) as Arc<dyn Any + Send + Sync>)
}

fn invoke(tracer: &Tracer, record: &WrapperRecord, args: Args) -> anyhow::Result<Value> {
    let frame = Frame::enter(tracer.engine_id, record.action());
    if frame.suppressed {
        return record.original().call(args);
    }

    let current = std::thread::current();
    let info = CallInfo {
        qualified_name: record.qualified_name(),
        site: record.site(),
        action: record.action(),
        kind: record.original_kind(),
        depth: frame.depth,
        location: record.original_location(),
        self_class: self_class(record.original_kind(), &args),
        thread: current.id(),
        thread_name: current.name().map(str::to_string),
    };

    tracer.recorder.pre_call(&PreCall {
        info: &info,
        args: &args,
    });

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| record.original().call(args)));
    let elapsed = started.elapsed();

    match outcome {
        Ok(result) => {
            let outcome = match &result {
                Ok(value) => Outcome::Returned(value),
                Err(err) => Outcome::Raised(err),
            };
            tracer.recorder.post_call(&PostCall {
                info: &info,
                outcome,
                elapsed,
            });
            drop(frame);
            result
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            tracer.recorder.post_call(&PostCall {
                info: &info,
                outcome: Outcome::Panicked(&message),
                elapsed,
            });
            drop(frame);
            panic::resume_unwind(payload)
        }
    }
}

/// Runtime class of the receiver: the instance's class for methods, the
/// bound class for class methods
fn self_class(kind: RoutineKind, args: &Args) -> Option<String> {
    match (kind, args.first()?) {
        (RoutineKind::Instance, Value::Object(instance)) => Some(instance.class().full_name()),
        (RoutineKind::ClassMethod, Value::Class(class)) => Some(class.full_name()),
        _ => None,
    }
}
