//! Rule resolution and traced-call overhead
//!
//! Resolution runs once per attribute per sweep, so it is off the call path.
//! The traced call benchmarks measure what a wrapped routine costs each time
//! it is invoked, with output discarded.
//!
//! ```bash
//! cargo bench --bench resolve_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tracecall::config::Settings;
use tracecall::engine::Engine;
use tracecall::rules::{Action, CompiledRules, TraceFile};
use tracecall::runtime::{Args, Module, Value};
use tracecall::sinks::Channels;

fn default_rules() -> CompiledRules {
    let file = TraceFile::default_echo_rules().unwrap();
    CompiledRules::compile(file.rules).unwrap()
}

/// Resolve names that hit the exact table, a pattern, or nothing
fn bench_resolve(c: &mut Criterion) {
    let rules = default_rules();
    let mut group = c.benchmark_group("resolve");

    for name in [
        "__main__.main",
        "reactor.Reactor.on_data_received",
        "socket.TcpSocket -> socket.socket.send",
        "unrelated.module.function",
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, name| {
            b.iter(|| black_box(rules.resolve(black_box(name))));
        });
    }

    group.finish();
}

/// Compile the bundled rule table from scratch
fn bench_compile(c: &mut Criterion) {
    let file = TraceFile::default_echo_rules().unwrap();

    c.bench_function("compile_default_rules", |b| {
        b.iter(|| CompiledRules::compile(black_box(file.rules.clone())).unwrap());
    });
}

/// Call a routine bare, then through each wrapper strategy
fn bench_traced_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("traced_call");

    let bare = Module::new("bench");
    bare.def("add", |args| {
        let a = args.get(0).and_then(Value::as_int).unwrap_or(0);
        let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
        Ok(Value::Int(a + b))
    })
    .unwrap();
    let routine = bare.routine("add").unwrap();
    group.bench_function("bare", |b| {
        b.iter(|| routine.call(Args::new().arg(1i64).arg(2i64)).unwrap());
    });

    for wrapper_class in [false, true] {
        let module = Module::new("bench");
        module
            .def("add", |args| {
                let a = args.get(0).and_then(Value::as_int).unwrap_or(0);
                let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
                Ok(Value::Int(a + b))
            })
            .unwrap();

        let settings = Settings {
            wrap_using_wrapper_class: wrapper_class,
            ..Settings::default()
        };
        let engine =
            Engine::from_rules(settings, vec![("bench.add", Action::Enable)], Channels::null())
                .unwrap();
        engine.trace_module(&module);
        let routine = module.routine("add").unwrap();

        let label = if wrapper_class { "object" } else { "function" };
        group.bench_function(label, |b| {
            b.iter(|| routine.call(Args::new().arg(1i64).arg(2i64)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_compile, bench_traced_call);
criterion_main!(benches);
