use crate::runtime::{Module, RuntimeError};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

/// Populates a module's namespace; may import other modules through the loader
pub type ModuleInit = Arc<dyn Fn(&Arc<Module>, &ModuleLoader) -> anyhow::Result<()> + Send + Sync>;

/// Notified once per module, after its namespace is populated and before the
/// importer receives it
pub trait ModuleLoadListener: Send + Sync {
    fn on_module_loaded(&self, module: &Arc<Module>);
}

#[derive(Default)]
struct LoaderState {
    /// Fully loaded modules, in load order
    loaded: Vec<Arc<Module>>,
    /// Modules whose init is running, with the thread running it
    initializing: HashMap<String, (Arc<Module>, ThreadId)>,
}

/// Module acquisition pipeline
///
/// Modules are declared with [`ModuleLoader::register`] and created on first
/// [`ModuleLoader::import`]. Later imports return the cached module.
#[derive(Default)]
pub struct ModuleLoader {
    definitions: RwLock<HashMap<String, ModuleInit>>,
    state: Mutex<LoaderState>,
    /// Signalled whenever an init finishes, published or not
    published: Condvar,
    listeners: RwLock<Vec<Arc<dyn ModuleLoadListener>>>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare how module `name` is populated
    pub fn register<F>(&self, name: impl Into<String>, init: F)
    where
        F: Fn(&Arc<Module>, &ModuleLoader) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(init));
    }

    pub fn add_listener(&self, listener: Arc<dyn ModuleLoadListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Modules already loaded, in load order
    pub fn loaded(&self) -> Vec<Arc<Module>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loaded
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Module>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .loaded
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Load module `name`, running its init on first import
    ///
    /// Listeners run after init and before the module is published, so no
    /// importer can see the namespace before they do. A circular import on
    /// the initializing thread sees the partially initialized module; other
    /// threads wait until it is published. If the init fails, a waiting
    /// thread retries it.
    pub fn import(&self, name: &str) -> anyhow::Result<Arc<Module>> {
        let current = thread::current().id();
        let module = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if let Some(module) = state.loaded.iter().find(|m| m.name() == name) {
                    return Ok(Arc::clone(module));
                }
                let partial = match state.initializing.get(name) {
                    Some((module, owner)) => (*owner == current).then(|| Arc::clone(module)),
                    None => break,
                };
                if let Some(module) = partial {
                    return Ok(module);
                }
                state = self
                    .published
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            let module = Module::new(name);
            state
                .initializing
                .insert(name.to_string(), (Arc::clone(&module), current));
            module
        };

        let result = self.initialize(&module);

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.initializing.remove(name);
        if result.is_ok() {
            state.loaded.push(Arc::clone(&module));
        }
        drop(state);
        self.published.notify_all();
        result?;
        Ok(module)
    }

    fn initialize(&self, module: &Arc<Module>) -> anyhow::Result<()> {
        let init = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(module.name())
            .cloned()
            .ok_or_else(|| RuntimeError::ModuleNotFound(module.name().to_string()))?;

        init(module, self)?;
        tracing::debug!(module = module.name(), "module initialized");

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_module_loaded(module);
        }
        Ok(())
    }
}
