use crate::runtime::{Class, RuntimeError};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// A display representation could not be produced
#[derive(Error, Debug)]
#[error("cannot display {type_name}: {reason}")]
pub struct DisplayError {
    pub type_name: String,
    pub reason: String,
}

/// Host value passed to and returned from routines
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Object(Arc<Instance>),
    Class(Arc<Class>),
    Opaque(Opaque),
}

impl Value {
    /// Type name used in trace output; instances report their runtime class
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Object(instance) => instance.class().full_name(),
            Value::Class(_) => "class".to_string(),
            Value::Opaque(opaque) => opaque.type_name().to_string(),
        }
    }

    /// Display representation; instances use their class's repr hook
    pub fn repr(&self) -> Result<String, DisplayError> {
        match self {
            Value::None => Ok("None".to_string()),
            Value::Bool(b) => Ok(if *b { "True" } else { "False" }.to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(x) => Ok(format!("{:?}", x)),
            Value::Str(s) => Ok(format!("{:?}", s)),
            Value::Bytes(bytes) => Ok(format!("b\"{}\"", bytes.escape_ascii())),
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(Value::repr)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("[{}]", parts.join(", ")))
            }
            Value::Object(instance) => instance.repr(),
            Value::Class(class) => Ok(format!("<class '{}'>", class.full_name())),
            Value::Opaque(opaque) => Ok(format!("<{}>", opaque.type_name())),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Instance>> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Arc::ptr_eq(a, b),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Arc<Instance>> for Value {
    fn from(value: Arc<Instance>) -> Self {
        Value::Object(value)
    }
}

/// Host-side resource carried through the runtime untouched
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

/// Call arguments: positional values then keyword pairs in call order
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keywords: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn keyword(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keywords.push((name.into(), value.into()));
        self
    }

    /// Insert a bound receiver in front of the positional arguments
    pub fn prepend(mut self, receiver: Value) -> Self {
        self.positional.insert(0, receiver);
        self
    }

    pub fn first(&self) -> Option<&Value> {
        self.positional.first()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn get_keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positional argument `index`, or a `BadArgument` error naming `function`
    pub fn require(&self, function: &str, index: usize, expected: &'static str) -> Result<&Value, RuntimeError> {
        self.get(index).ok_or_else(|| RuntimeError::BadArgument {
            function: function.to_string(),
            index,
            expected,
        })
    }

    /// The receiver of a bound method call
    pub fn receiver(&self, function: &str) -> Result<&Arc<Instance>, RuntimeError> {
        self.require(function, 0, "instance")?
            .as_object()
            .ok_or_else(|| RuntimeError::BadArgument {
                function: function.to_string(),
                index: 0,
                expected: "instance",
            })
    }
}

/// Object of a class, with its own field table
pub struct Instance {
    class: Arc<Class>,
    fields: Mutex<BTreeMap<String, Value>>,
}

impl Instance {
    pub fn new(class: &Arc<Class>) -> Arc<Self> {
        Arc::new(Self {
            class: Arc::clone(class),
            fields: Mutex::new(BTreeMap::new()),
        })
    }

    /// Runtime class of the instance
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Look `name` up on the runtime class and call it bound to `self`
    pub fn call_method(self: &Arc<Self>, name: &str, args: Args) -> anyhow::Result<Value> {
        let routine = self
            .class
            .lookup_routine(name)
            .ok_or_else(|| RuntimeError::AttributeNotFound {
                owner: self.class.full_name(),
                name: name.to_string(),
            })?;
        routine.call_bound(&Value::Object(Arc::clone(self)), args)
    }

    pub fn repr(&self) -> Result<String, DisplayError> {
        match self.class.repr_hook() {
            Some(hook) => hook(self).map_err(|err| DisplayError {
                type_name: self.class.full_name(),
                reason: format!("{:#}", err),
            }),
            None => Ok(format!("<{} object>", self.class.full_name())),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} object>", self.class.full_name())
    }
}
