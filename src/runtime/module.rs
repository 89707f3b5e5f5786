use crate::runtime::{Args, Attr, Class, FunctionBody, Routine, RuntimeError, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A loaded module: a name plus its namespace
pub struct Module {
    name: String,
    attrs: RwLock<BTreeMap<String, Attr>>,
    frozen: bool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            attrs: RwLock::new(BTreeMap::new()),
            frozen: false,
        })
    }

    /// Module whose namespace is fixed once built
    pub fn frozen(name: impl Into<String>, attrs: BTreeMap<String, Attr>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            attrs: RwLock::new(attrs),
            frozen: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn get(&self, name: &str) -> Option<Attr> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of the namespace, in name order
    pub fn attrs(&self) -> Vec<(String, Attr)> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, attr)| (name.clone(), attr.clone()))
            .collect()
    }

    pub fn set(&self, name: impl Into<String>, attr: Attr) -> Result<(), RuntimeError> {
        let name = name.into();
        if self.frozen {
            return Err(RuntimeError::ReadOnly {
                owner: format!("module {}", self.name),
                name,
            });
        }
        self.attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, attr);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<Option<Attr>, RuntimeError> {
        if self.frozen {
            return Err(RuntimeError::ReadOnly {
                owner: format!("module {}", self.name),
                name: name.to_string(),
            });
        }
        Ok(self
            .attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name))
    }

    /// Define a module-level function at the caller's location
    #[track_caller]
    pub fn def<F>(&self, name: &str, f: F) -> Result<(), RuntimeError>
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.set(name, Attr::Routine(Routine::function(name, f)))
    }

    /// Bind a class under its last name segment
    pub fn add_class(&self, class: &Arc<Class>) -> Result<(), RuntimeError> {
        self.set(class.name(), Attr::Class(Arc::clone(class)))
    }

    pub fn routine(&self, name: &str) -> Option<Routine> {
        match self.get(name)? {
            Attr::Routine(routine) => Some(routine),
            _ => None,
        }
    }

    pub fn class(&self, name: &str) -> Option<Arc<Class>> {
        match self.get(name)? {
            Attr::Class(class) => Some(class),
            _ => None,
        }
    }

    /// The slot as a plain function, for consumers that need one
    pub fn function(&self, name: &str) -> Option<FunctionBody> {
        self.routine(name)?.as_function().cloned()
    }

    /// Call the routine bound to `name`
    pub fn call(&self, name: &str, args: Args) -> anyhow::Result<Value> {
        match self.get(name) {
            Some(Attr::Routine(routine)) => routine.call(args),
            Some(Attr::Class(class)) => Ok(Value::Object(class.instantiate(args)?)),
            Some(_) => Err(RuntimeError::NotCallable {
                owner: self.name.clone(),
                name: name.to_string(),
            }
            .into()),
            None => Err(RuntimeError::AttributeNotFound {
                owner: format!("module {}", self.name),
                name: name.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("frozen", &self.frozen)
            .finish()
    }
}
