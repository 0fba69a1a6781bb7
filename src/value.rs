use std::{fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::FunctionDef,
    diagnostics::{HostError, RuntimeError, RuntimeErrorKind},
    environment::EnvironmentRef,
};

/// Runtime value. Immutable once built; clones share the same allocation.
#[derive(Clone)]
pub struct Value(pub Rc<ValueKind>);

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn nil() -> Self {
        Self::new(ValueKind::Nil)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueKind::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Self::new(ValueKind::List(values))
    }

    pub fn map(entries: IndexMap<MapKey, Value>) -> Self {
        Self::new(ValueKind::Map(entries))
    }

    pub fn native<F>(name: impl Into<String>, arity: Arity, callback: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + 'static,
    {
        Self::new(ValueKind::NativeFunction(NativeFunction {
            name: name.into(),
            arity,
            callback: Rc::new(callback),
        }))
    }

    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    pub fn type_name(&self) -> &'static str {
        match &*self.0 {
            ValueKind::Nil => "Nil",
            ValueKind::Bool(_) => "Bool",
            ValueKind::Number(_) => "Number",
            ValueKind::String(_) => "String",
            ValueKind::List(_) => "List",
            ValueKind::Map(_) => "Map",
            ValueKind::Function(_) | ValueKind::NativeFunction(_) => "Function",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(&*self.0, ValueKind::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.0 {
            ValueKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.0 {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.0 {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match &*self.0 {
            ValueKind::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<MapKey, Value>> {
        match &*self.0 {
            ValueKind::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Strict boolean check used by conditions and logical operators.
    pub fn expect_bool(&self, context: &str) -> Result<bool, RuntimeError> {
        self.as_bool().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "{context} must be Bool, found {}",
                self.type_name()
            ))
        })
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::String(s) => write!(f, "{s:?}"),
            _ => write!(f, "{self}"),
        }
    }
}

/// Structural equality. Functions compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.0, &*other.0) {
            (ValueKind::Nil, ValueKind::Nil) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Number(a), ValueKind::Number(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => a == b,
            (ValueKind::Map(a), ValueKind::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|rhs| value == rhs))
            }
            (ValueKind::Function(_), ValueKind::Function(_))
            | (ValueKind::NativeFunction(_), ValueKind::NativeFunction(_)) => {
                Rc::ptr_eq(&self.0, &other.0)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ValueKind::Nil => write!(f, "nil"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Number(n) => write!(f, "{n}"),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    value.fmt_nested(f)?;
                }
                write!(f, "]")
            }
            ValueKind::Map(map) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    value.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            ValueKind::Function(fun) => {
                write!(f, "<fn {}>", fun.name().unwrap_or("anonymous"))
            }
            ValueKind::NativeFunction(fun) => write!(f, "<native fn {}>", fun.name),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::list(values)
    }
}

pub enum ValueKind {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<MapKey, Value>),
    Function(UserFunction),
    NativeFunction(NativeFunction),
}

/// Hashable subset of values usable as map keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    String(String),
    /// Bit pattern of a non-NaN number, with `-0.0` folded into `0.0`.
    Number(u64),
    Bool(bool),
    Nil,
}

impl MapKey {
    pub fn from_value(value: &Value) -> Result<Self, RuntimeError> {
        match &*value.0 {
            ValueKind::String(s) => Ok(MapKey::String(s.clone())),
            ValueKind::Number(n) if n.is_nan() => {
                Err(RuntimeError::type_error("NaN cannot be used as a map key"))
            }
            ValueKind::Number(n) => Ok(MapKey::Number((n + 0.0).to_bits())),
            ValueKind::Bool(b) => Ok(MapKey::Bool(*b)),
            ValueKind::Nil => Ok(MapKey::Nil),
            _ => Err(RuntimeError::type_error(format!(
                "{} cannot be used as a map key",
                value.type_name()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::String(s) => Value::string(s.clone()),
            MapKey::Number(bits) => Value::number(f64::from_bits(*bits)),
            MapKey::Bool(b) => Value::bool(*b),
            MapKey::Nil => Value::nil(),
        }
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::String(value.to_string())
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_value().fmt_nested(f)
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

pub struct UserFunction {
    pub def: Rc<FunctionDef>,
    pub closure: EnvironmentRef,
}

impl UserFunction {
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }

    pub fn arity(&self) -> usize {
        self.def.params.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(1) => write!(f, "1 argument"),
            Arity::Exact(n) => write!(f, "{n} arguments"),
            Arity::AtLeast(n) => write!(f, "at least {n} arguments"),
        }
    }
}

pub type NativeCallback = Rc<dyn Fn(&[Value]) -> Result<Value, HostError>>;

/// Host capability injected through the registry.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub callback: NativeCallback,
}

impl NativeFunction {
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        if !self.arity.accepts(args.len()) {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityError,
                format!(
                    "function `{}` expected {} but received {}",
                    self.name,
                    self.arity,
                    args.len()
                ),
            ));
        }
        (self.callback)(args)
            .map_err(|err| RuntimeError::new(RuntimeErrorKind::HostError, err.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        let a = Value::list(vec![Value::number(1.0), Value::string("x")]);
        let b = Value::list(vec![Value::number(1.0), Value::string("x")]);
        assert_eq!(a, b);
        assert_ne!(Value::number(1.0), Value::string("1"));
        assert_ne!(Value::nil(), Value::bool(false));

        let mut left = IndexMap::new();
        left.insert(MapKey::from("a"), Value::number(1.0));
        left.insert(MapKey::from("b"), Value::number(2.0));
        let mut right = IndexMap::new();
        right.insert(MapKey::from("b"), Value::number(2.0));
        right.insert(MapKey::from("a"), Value::number(1.0));
        assert_eq!(Value::map(left), Value::map(right));
    }

    #[test]
    fn functions_compare_by_identity() {
        let f = Value::native("f", Arity::Exact(0), |_| Ok(Value::nil()));
        let g = Value::native("f", Arity::Exact(0), |_| Ok(Value::nil()));
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
    }

    #[test]
    fn display_formats() {
        let mut map = IndexMap::new();
        map.insert(MapKey::from("name"), Value::string("tombo"));
        map.insert(MapKey::Number(2.0_f64.to_bits()), Value::list(vec![]));
        let value = Value::list(vec![
            Value::number(3.0),
            Value::number(0.5),
            Value::string("a"),
            Value::nil(),
            Value::map(map),
        ]);
        assert_eq!(
            value.to_string(),
            "[3, 0.5, \"a\", nil, {\"name\": \"tombo\", 2: []}]"
        );
        assert_eq!(Value::string("plain").to_string(), "plain");
    }

    #[test]
    fn map_keys() {
        assert_eq!(
            MapKey::from_value(&Value::number(-0.0)).ok(),
            MapKey::from_value(&Value::number(0.0)).ok()
        );
        let err = MapKey::from_value(&Value::list(vec![])).err().expect("list key");
        assert_eq!(err.kind, RuntimeErrorKind::TypeError);
        assert!(MapKey::from_value(&Value::number(f64::NAN)).is_err());
        let key = MapKey::from_value(&Value::number(4.0)).expect("number key");
        assert_eq!(key.to_value(), Value::number(4.0));
    }

    #[test]
    fn native_call_checks_arity_and_wraps_errors() {
        let fail = NativeFunction {
            name: "fail".into(),
            arity: Arity::Exact(1),
            callback: Rc::new(|_| Err(HostError::new("device offline"))),
        };
        let err = fail.call(&[]).expect_err("arity");
        assert_eq!(err.kind, RuntimeErrorKind::ArityError);
        assert_eq!(err.message, "function `fail` expected 1 argument but received 0");

        let err = fail.call(&[Value::nil()]).expect_err("host failure");
        assert_eq!(err.kind, RuntimeErrorKind::HostError);
        assert_eq!(err.message, "device offline");
    }

    #[test]
    fn strict_bool() {
        assert_eq!(Value::bool(true).expect_bool("condition"), Ok(true));
        let err = Value::number(1.0).expect_bool("condition").expect_err("number");
        assert_eq!(err.message, "condition must be Bool, found Number");
    }
}
