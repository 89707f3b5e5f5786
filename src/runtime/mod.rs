// Introspectable host runtime
//
// Modules, classes, instances and routines the engine can enumerate and
// rewrite. Code that wants its callables traced is loaded through
// `ModuleLoader`, whose listeners see every module after its namespace is
// populated and before the importer gets it back.

mod class;
mod loader;
mod module;
mod routine;
mod value;

pub use class::{Class, ClassBuilder, ReprFn};
pub use loader::{ModuleInit, ModuleLoadListener, ModuleLoader};
pub use module::Module;
pub use routine::{Body, Callable, FunctionBody, Routine, RoutineKind};
pub use value::{Args, DisplayError, Instance, Opaque, Value};

use std::sync::Arc;
use thiserror::Error;

/// Attribute stored in a module or class namespace
#[derive(Clone)]
pub enum Attr {
    Routine(Routine),
    Class(Arc<Class>),
    Module(Arc<Module>),
    Value(Value),
}

impl Attr {
    pub fn as_routine(&self) -> Option<&Routine> {
        match self {
            Attr::Routine(routine) => Some(routine),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&Arc<Class>> {
        match self {
            Attr::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Attr::Routine(_) => "routine",
            Attr::Class(_) => "class",
            Attr::Module(_) => "module",
            Attr::Value(_) => "value",
        }
    }
}

impl std::fmt::Debug for Attr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attr::Routine(routine) => write!(f, "Attr::Routine({:?})", routine),
            Attr::Class(class) => write!(f, "Attr::Class({})", class.full_name()),
            Attr::Module(module) => write!(f, "Attr::Module({})", module.name()),
            Attr::Value(value) => write!(f, "Attr::Value({:?})", value),
        }
    }
}

/// Errors raised by the host runtime itself
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("{owner} has no attribute {name:?}")]
    AttributeNotFound { owner: String, name: String },

    #[error("{owner}.{name} is not callable")]
    NotCallable { owner: String, name: String },

    #[error("cannot set attribute {name:?} on read-only {owner}")]
    ReadOnly { owner: String, name: String },

    #[error("no module named {0:?}")]
    ModuleNotFound(String),

    #[error("{function}: expected {expected} for argument {index}")]
    BadArgument {
        function: String,
        index: usize,
        expected: &'static str,
    },
}
