use crate::runtime::{Args, Value};
use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Plain function body
pub type FunctionBody = Arc<dyn Fn(Args) -> anyhow::Result<Value> + Send + Sync>;

/// Object implementing the call capability
pub trait Callable: Send + Sync {
    fn call(&self, args: Args) -> anyhow::Result<Value>;

    /// Concrete type access for consumers that inspect callable objects
    fn as_any(&self) -> &dyn Any;
}

/// How a routine binds when looked up through an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum RoutineKind {
    /// Module-level function
    Function,
    /// Receives the instance as its first argument
    Instance,
    /// Receives no implicit argument
    Static,
    /// Receives the runtime class as its first argument
    ClassMethod,
}

/// Callable implementation behind a routine
#[derive(Clone)]
pub enum Body {
    Function(FunctionBody),
    Object(Arc<dyn Callable>),
}

struct RoutineInner {
    name: String,
    kind: RoutineKind,
    body: Body,
    location: &'static Location<'static>,
    tag: Option<Arc<dyn Any + Send + Sync>>,
}

/// Named callable stored in a module or class slot
///
/// Cloning shares the same routine; `same_as` compares identity.
#[derive(Clone)]
pub struct Routine(Arc<RoutineInner>);

impl Routine {
    fn build(
        name: impl Into<String>,
        kind: RoutineKind,
        body: Body,
        location: &'static Location<'static>,
    ) -> Self {
        Routine(Arc::new(RoutineInner {
            name: name.into(),
            kind,
            body,
            location,
            tag: None,
        }))
    }

    /// Module-level function defined at the caller's location
    #[track_caller]
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::build(name, RoutineKind::Function, Body::Function(Arc::new(f)), Location::caller())
    }

    /// Instance method; `args[0]` is the receiver
    #[track_caller]
    pub fn method<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::build(name, RoutineKind::Instance, Body::Function(Arc::new(f)), Location::caller())
    }

    #[track_caller]
    pub fn static_method<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::build(name, RoutineKind::Static, Body::Function(Arc::new(f)), Location::caller())
    }

    /// Class method; `args[0]` is the runtime class
    #[track_caller]
    pub fn class_method<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::build(name, RoutineKind::ClassMethod, Body::Function(Arc::new(f)), Location::caller())
    }

    /// Routine backed by a callable object
    #[track_caller]
    pub fn from_callable(name: impl Into<String>, kind: RoutineKind, callable: Arc<dyn Callable>) -> Self {
        Self::build(name, kind, Body::Object(callable), Location::caller())
    }

    /// Same name, kind and definition site, different body and tag
    pub fn replaced(&self, body: Body, tag: Arc<dyn Any + Send + Sync>) -> Self {
        Routine(Arc::new(RoutineInner {
            name: self.0.name.clone(),
            kind: self.0.kind,
            body,
            location: self.0.location,
            tag: Some(tag),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> RoutineKind {
        self.0.kind
    }

    /// Where the routine was defined
    pub fn location(&self) -> &'static Location<'static> {
        self.0.location
    }

    pub fn body(&self) -> &Body {
        &self.0.body
    }

    /// The body as a plain function; `None` for callable objects
    pub fn as_function(&self) -> Option<&FunctionBody> {
        match &self.0.body {
            Body::Function(f) => Some(f),
            Body::Object(_) => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Arc<dyn Callable>> {
        match &self.0.body {
            Body::Object(obj) => Some(obj),
            Body::Function(_) => None,
        }
    }

    /// Tag attached by whoever produced this routine
    pub fn tag<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let tag = self.0.tag.as_ref()?;
        Arc::clone(tag).downcast::<T>().ok()
    }

    pub fn same_as(&self, other: &Routine) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Call with exactly the given arguments
    pub fn call(&self, args: Args) -> anyhow::Result<Value> {
        match &self.0.body {
            Body::Function(f) => f(args),
            Body::Object(obj) => obj.call(args),
        }
    }

    /// Call as looked up through `receiver`, following the binding convention
    pub fn call_bound(&self, receiver: &Value, args: Args) -> anyhow::Result<Value> {
        match self.0.kind {
            RoutineKind::Function | RoutineKind::Instance => self.call(args.prepend(receiver.clone())),
            RoutineKind::ClassMethod => {
                let class = match receiver {
                    Value::Object(instance) => Value::Class(Arc::clone(instance.class())),
                    other => other.clone(),
                };
                self.call(args.prepend(class))
            }
            RoutineKind::Static => self.call(args),
        }
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.0.name)
            .field("kind", &self.0.kind)
            .field("location", &format_args!("{}:{}", self.0.location.file(), self.0.location.line()))
            .field("tagged", &self.0.tag.is_some())
            .finish()
    }
}
