use crate::runtime::{Args, Attr, Instance, Routine, RuntimeError, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Display hook for instances of a class; may fail
pub type ReprFn = Arc<dyn Fn(&Instance) -> anyhow::Result<String> + Send + Sync>;

/// A class: named attribute table plus ordered bases
///
/// Frozen classes model natively implemented types: their slots cannot be
/// rewritten after construction.
pub struct Class {
    module: String,
    qualname: String,
    bases: Vec<Arc<Class>>,
    attrs: RwLock<BTreeMap<String, Attr>>,
    frozen: bool,
    repr: Option<ReprFn>,
}

impl Class {
    /// Name of the module the class was defined in
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Dotted name inside the module (`Outer.Inner` for nested classes)
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// Last segment of the qualified name
    pub fn name(&self) -> &str {
        self.qualname.rsplit('.').next().unwrap_or(&self.qualname)
    }

    /// `module.qualname`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }

    pub fn bases(&self) -> &[Arc<Class>] {
        &self.bases
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn repr_hook(&self) -> Option<&ReprFn> {
        self.repr.as_ref()
    }

    /// Attribute declared on this class itself
    pub fn get_own(&self, name: &str) -> Option<Attr> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshot of the attributes declared on this class, in name order
    pub fn own_attrs(&self) -> Vec<(String, Attr)> {
        self.attrs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, attr)| (name.clone(), attr.clone()))
            .collect()
    }

    pub fn set_attr(&self, name: impl Into<String>, attr: Attr) -> Result<(), RuntimeError> {
        let name = name.into();
        if self.frozen {
            return Err(RuntimeError::ReadOnly {
                owner: self.full_name(),
                name,
            });
        }
        self.attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, attr);
        Ok(())
    }

    pub fn remove_attr(&self, name: &str) -> Result<Option<Attr>, RuntimeError> {
        if self.frozen {
            return Err(RuntimeError::ReadOnly {
                owner: self.full_name(),
                name: name.to_string(),
            });
        }
        Ok(self
            .attrs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name))
    }

    /// Find `name` on this class or its bases, depth-first, left to right
    pub fn lookup(&self, name: &str) -> Option<Attr> {
        self.get_own(name)
            .or_else(|| self.bases.iter().find_map(|base| base.lookup(name)))
    }

    pub fn lookup_routine(&self, name: &str) -> Option<Routine> {
        match self.lookup(name)? {
            Attr::Routine(routine) => Some(routine),
            _ => None,
        }
    }

    /// This class followed by every base, each appearing once, in lookup order
    pub fn linearize(self: &Arc<Self>) -> Vec<Arc<Class>> {
        fn visit(class: &Arc<Class>, out: &mut Vec<Arc<Class>>) {
            if out.iter().any(|seen| Arc::ptr_eq(seen, class)) {
                return;
            }
            out.push(Arc::clone(class));
            for base in &class.bases {
                visit(base, out);
            }
        }

        let mut out = Vec::new();
        visit(self, &mut out);
        out
    }

    pub fn is_subclass_of(self: &Arc<Self>, other: &Arc<Class>) -> bool {
        self.linearize().iter().any(|c| Arc::ptr_eq(c, other))
    }

    /// Create an instance and run `__init__` when the class has one
    pub fn instantiate(self: &Arc<Self>, args: Args) -> anyhow::Result<Arc<Instance>> {
        let instance = Instance::new(self);
        if let Some(init) = self.lookup_routine("__init__") {
            init.call_bound(&Value::Object(Arc::clone(&instance)), args)?;
        }
        Ok(instance)
    }

    /// Call a routine through the class: class methods get the class bound,
    /// everything else receives `args` as is
    pub fn call(self: &Arc<Self>, name: &str, args: Args) -> anyhow::Result<Value> {
        let routine = self
            .lookup_routine(name)
            .ok_or_else(|| RuntimeError::AttributeNotFound {
                owner: self.full_name(),
                name: name.to_string(),
            })?;
        match routine.kind() {
            crate::runtime::RoutineKind::ClassMethod => {
                routine.call(args.prepend(Value::Class(Arc::clone(self))))
            }
            _ => routine.call(args),
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.full_name())
            .field(
                "bases",
                &self.bases.iter().map(|b| b.full_name()).collect::<Vec<_>>(),
            )
            .field("frozen", &self.frozen)
            .finish()
    }
}

/// Builder for [`Class`]
pub struct ClassBuilder {
    module: String,
    qualname: String,
    bases: Vec<Arc<Class>>,
    attrs: BTreeMap<String, Attr>,
    frozen: bool,
    repr: Option<ReprFn>,
}

impl ClassBuilder {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
            bases: Vec::new(),
            attrs: BTreeMap::new(),
            frozen: false,
            repr: None,
        }
    }

    pub fn base(mut self, base: &Arc<Class>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Instance method defined at the caller's location
    #[track_caller]
    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.attrs
            .insert(name.to_string(), Attr::Routine(Routine::method(name, f)));
        self
    }

    #[track_caller]
    pub fn static_method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.attrs
            .insert(name.to_string(), Attr::Routine(Routine::static_method(name, f)));
        self
    }

    #[track_caller]
    pub fn class_method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.attrs
            .insert(name.to_string(), Attr::Routine(Routine::class_method(name, f)));
        self
    }

    pub fn routine(mut self, routine: Routine) -> Self {
        self.attrs
            .insert(routine.name().to_string(), Attr::Routine(routine));
        self
    }

    pub fn attr(mut self, name: &str, attr: Attr) -> Self {
        self.attrs.insert(name.to_string(), attr);
        self
    }

    /// Nested class stored under its last name segment
    pub fn nested(mut self, class: &Arc<Class>) -> Self {
        self.attrs
            .insert(class.name().to_string(), Attr::Class(Arc::clone(class)));
        self
    }

    pub fn repr<F>(mut self, f: F) -> Self
    where
        F: Fn(&Instance) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.repr = Some(Arc::new(f));
        self
    }

    /// Make the finished class read-only
    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn build(self) -> Arc<Class> {
        Arc::new(Class {
            module: self.module,
            qualname: self.qualname,
            bases: self.bases,
            attrs: RwLock::new(self.attrs),
            frozen: self.frozen,
            repr: self.repr,
        })
    }
}
