// Tracing engine
//
// An Engine owns one compiled rule table, the registry of wrappers it has
// installed, and the recorder its wrappers report to. Engines are explicit
// values: several independently configured engines may coexist in one
// process, each with its own registry and call-depth state.

mod depth;
mod registry;
mod sweep;
mod wrapper;


pub use registry::{CallSite, WrapperRecord};
pub use sweep::SweepReport;
pub use wrapper::CallWrapper;

use crate::config::{ConfigStore, Settings};
use crate::recorder::CallRecorder;
use crate::rules::{Action, CompiledRules, RuleError, TraceFile};
use crate::runtime::{Class, Module, ModuleLoadListener, ModuleLoader, RuntimeError};
use crate::sinks::Channels;
use registry::WrapperRegistry;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use wrapper::Tracer;

/// A discovered attribute that could not be wrapped
#[derive(Error, Debug)]
pub enum InstallError {
    #[error("cannot install wrapper for {uri}: {source}")]
    Slot {
        uri: String,
        #[source]
        source: RuntimeError,
    },
}

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

struct EngineInner {
    id: u64,
    rules: CompiledRules,
    tracer: Arc<Tracer>,
    registry: Mutex<WrapperRegistry>,
}

/// Handle to one tracing engine; clones share the same engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build an engine from compiled rules
    ///
    /// The calling thread is treated as the main thread when rendering
    /// thread prefixes.
    pub fn new(settings: Settings, rules: CompiledRules, channels: Channels) -> Self {
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let tracer = Arc::new(Tracer {
            engine_id: id,
            recorder: CallRecorder::new(settings, channels),
        });

        tracing::debug!(engine = id, rules = rules.len(), "engine created");
        Self {
            inner: Arc::new(EngineInner {
                id,
                rules,
                tracer,
                registry: Mutex::new(WrapperRegistry::default()),
            }),
        }
    }

    /// Compile `rules` and build an engine; a malformed pattern fails here
    pub fn from_rules<I, R>(settings: Settings, rules: I, channels: Channels) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = R>,
        R: Into<crate::rules::Rule>,
    {
        Ok(Self::new(settings, CompiledRules::compile(rules)?, channels))
    }

    /// Build an engine from a trace file
    ///
    /// The file's `[config]` table is layered over the process-wide
    /// [`ConfigStore`], and its rules are compiled in file order.
    pub fn from_trace_file(file: &TraceFile, channels: Channels) -> Result<Self, RuleError> {
        let mut merged = ConfigStore::global().snapshot().as_ref().clone();
        merged.extend(file.config.iter().map(|(k, v)| (k.clone(), v.clone())));
        let settings = Settings::from_map(&merged);
        Self::from_rules(settings, file.rules.iter().cloned(), channels)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn settings(&self) -> &Settings {
        self.inner.tracer.recorder.settings()
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.inner.rules
    }

    pub fn channels(&self) -> &Channels {
        self.inner.tracer.recorder.channels()
    }

    /// Action for a qualified name, `None` when no rule matches
    pub fn resolve(&self, qualified_name: &str) -> Option<Action> {
        self.inner.rules.resolve(qualified_name)
    }

    /// Start intercepting module loads
    ///
    /// Every module `loader` loads from now on is swept before its importer
    /// receives it; modules loaded earlier are swept immediately. Call this
    /// before importing the modules to trace.
    pub fn activate(&self, loader: &ModuleLoader) -> SweepReport {
        loader.add_listener(Arc::new(self.clone()));
        let report = SweepReport::total(loader.loaded().iter().map(|m| self.sweep_module(m)));
        tracing::info!(
            engine = self.id(),
            wrapped = report.wrapped,
            failed = report.failed,
            "engine activated"
        );
        report
    }

    /// Sweep one module, picking up routines defined after activation
    pub fn trace_module(&self, module: &Arc<Module>) -> SweepReport {
        self.sweep_module(module)
    }

    /// Sweep one class, its nested classes and its bases
    pub fn trace_class(&self, class: &Arc<Class>) -> SweepReport {
        self.sweep_class(class)
    }

    /// Live wrapper at `site`
    pub fn record(&self, site: &CallSite) -> Option<Arc<WrapperRecord>> {
        self.lock_registry().get(site)
    }

    /// Live wrappers, ordered by call site
    pub fn records(&self) -> Vec<Arc<WrapperRecord>> {
        self.lock_registry().live()
    }

    pub fn wrapped_sites(&self) -> Vec<CallSite> {
        self.records().iter().map(|r| r.site().clone()).collect()
    }

    pub fn wrapper_count(&self) -> usize {
        self.records().len()
    }

    /// Wrapped calls of this engine active on the calling thread
    pub fn current_depth(&self) -> usize {
        depth::current_depth(self.inner.id)
    }

    pub(crate) fn tracer(&self) -> &Arc<Tracer> {
        &self.inner.tracer
    }

    pub(crate) fn lock_registry(&self) -> MutexGuard<'_, WrapperRegistry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ModuleLoadListener for Engine {
    fn on_module_loaded(&self, module: &Arc<Module>) {
        self.sweep_module(module);
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.inner.id)
            .field("rules", &self.inner.rules.len())
            .finish()
    }
}
