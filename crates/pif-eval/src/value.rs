//! Runtime values, structs and closures.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use indexmap::map::Entry;
use indexmap::IndexMap;
use pif_ast::ast::Block;
use pif_types::{StructuralType, Type};

use crate::context::Context;
use crate::error::{EvalError, EvalResult};

/// Runtime values in PIF
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Text(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
    Struct(Struct),
    Closure(Closure),
    /// A type used as a value, e.g. the built-in `number`.
    TypeTag(Type),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Primitives map to their fixed tag; structs to their derived shape.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Number(_) => Type::number(),
            Value::Text(_) => Type::text(),
            Value::Sequence(_) => Type::sequence(),
            Value::Mapping(_) => Type::mapping(),
            Value::Struct(s) => Type::Struct(s.ty.clone()),
            Value::Closure(_) => Type::function(),
            Value::TypeTag(_) => Type::type_(),
        }
    }

    /// Zero and empty collections are falsy; closures and type tags never are.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Sequence(items) => !items.is_empty(),
            Value::Mapping(m) => !m.is_empty(),
            Value::Struct(s) => !s.fields.is_empty(),
            Value::Closure(_) | Value::TypeTag(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

pub fn derive_type(v: &Value) -> Type {
    v.type_of()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Sequence(a), Value::Sequence(b)) => a == b,
            (Value::Mapping(a), Value::Mapping(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => a == b,
            (Value::TypeTag(a), Value::TypeTag(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "\"{s}\""),
            Value::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Mapping(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Struct(s) => write!(f, "{s}"),
            Value::Closure(c) => write!(f, "{c}"),
            Value::TypeTag(t) => write!(f, "{t}"),
        }
    }
}

/// Hashable normal form of a [`Value`] used as a mapping key.
///
/// Numbers key by bit pattern after folding `-0.0` into `0.0` and every NaN
/// into one canonical NaN. Closures key by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum MapKey {
    Number(u64),
    Text(String),
    Sequence(Vec<MapKey>),
    /// Entries sorted so equal mappings share one key.
    Mapping(Vec<(MapKey, MapKey)>),
    Struct(Vec<(String, MapKey)>),
    Closure(usize),
    TypeTag(Type),
}

impl MapKey {
    fn of(v: &Value) -> Self {
        match v {
            Value::Number(n) => {
                let n = if *n == 0.0 {
                    0.0
                } else if n.is_nan() {
                    f64::NAN
                } else {
                    *n
                };
                MapKey::Number(n.to_bits())
            }
            Value::Text(s) => MapKey::Text(s.clone()),
            Value::Sequence(items) => MapKey::Sequence(items.iter().map(MapKey::of).collect()),
            Value::Mapping(m) => {
                let mut entries: Vec<_> = m
                    .entries
                    .iter()
                    .map(|(key, (_, v))| (key.clone(), MapKey::of(v)))
                    .collect();
                entries.sort();
                MapKey::Mapping(entries)
            }
            Value::Struct(s) => MapKey::Struct(
                s.fields
                    .iter()
                    .map(|(name, v)| (name.clone(), MapKey::of(v)))
                    .collect(),
            ),
            Value::Closure(c) => MapKey::Closure(c.addr()),
            Value::TypeTag(t) => MapKey::TypeTag(t.clone()),
        }
    }
}

/// Value-keyed map in insertion order. Equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: IndexMap<MapKey, (Value, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, replacing the value of an equal key.
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.entry(MapKey::of(&key)) {
            Entry::Occupied(mut slot) => slot.get_mut().1 = value,
            Entry::Vacant(slot) => {
                slot.insert((key, value));
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(&MapKey::of(key)).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.values().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .all(|(key, (_, v))| other.entries.get(key).is_some_and(|(_, ov)| ov == v))
    }
}

impl FromIterator<(Value, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut m = Mapping::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

/// Immutable record whose type is derived from its field values.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    fields: BTreeMap<String, Value>,
    ty: StructuralType,
}

impl Struct {
    /// Build a struct, validating it against `declared` when given.
    pub fn construct(
        fields: BTreeMap<String, Value>,
        declared: Option<&StructuralType>,
    ) -> EvalResult<Self> {
        let ty = fields
            .iter()
            .map(|(name, v)| (name.clone(), v.type_of()))
            .collect::<StructuralType>();
        if let Some(declared) = declared {
            if !ty.obeys(declared) {
                return Err(EvalError::type_mismatch(format!(
                    "struct {ty} does not obey {declared}"
                )));
            }
        }
        Ok(Self { fields, ty })
    }

    pub fn ty(&self) -> &StructuralType {
        &self.ty
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl fmt::Display for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Struct{{")?;
        for (i, (name, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// Signature of a native callable. Arguments arrive in declared parameter
/// order.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> EvalResult<Option<Value>>>;

/// Ordered `(name, type)` parameter list.
pub type Params = Vec<(String, Type)>;

/// Function value. Cheap to clone; identity is by allocation.
#[derive(Clone)]
pub struct Closure(Rc<ClosureData>);

struct ClosureData {
    name: Option<String>,
    params: Params,
    callable: Callable,
}

pub enum Callable {
    /// Body plus the defining context as it was when the literal was
    /// evaluated.
    User { captured: Context, body: Block },
    Native(NativeFn),
}

impl Closure {
    pub fn user(captured: Context, params: Params, body: Block) -> Self {
        Self(Rc::new(ClosureData {
            name: None,
            params,
            callable: Callable::User { captured, body },
        }))
    }

    pub fn native(name: &str, params: Params, f: NativeFn) -> Self {
        Self(Rc::new(ClosureData {
            name: Some(name.to_string()),
            params,
            callable: Callable::Native(f),
        }))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn params(&self) -> &[(String, Type)] {
        &self.0.params
    }

    pub fn callable(&self) -> &Callable {
        &self.0.callable
    }

    /// Allocation address; stable for as long as any clone is alive.
    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Copy of an anonymous user closure that knows the name it is bound
    /// to, so its body can call it recursively. Named closures and natives
    /// are returned unchanged.
    pub fn bound_to(&self, name: &str) -> Self {
        match (&self.0.name, &self.0.callable) {
            (None, Callable::User { captured, body }) => Self(Rc::new(ClosureData {
                name: Some(name.to_string()),
                params: self.0.params.clone(),
                callable: Callable::User {
                    captured: captured.clone(),
                    body: body.clone(),
                },
            })),
            _ => self.clone(),
        }
    }
}

impl PartialEq for Closure {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0.callable {
            Callable::User { .. } => "user",
            Callable::Native(_) => "native",
        };
        f.debug_struct("Closure")
            .field("name", &self.0.name)
            .field("params", &self.0.params)
            .field("kind", &kind)
            .finish()
    }
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<func")?;
        if let Some(name) = &self.0.name {
            write!(f, " {name}")?;
        }
        write!(f, "(")?;
        for (i, (name, ty)) in self.0.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} {ty}")?;
        }
        write!(f, ")>")
    }
}
