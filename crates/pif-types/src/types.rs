//! Core `Type` definitions for PIF.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimType {
    Number,
    Text,
    Sequence,
    Mapping,
    Function,
    /// The type of a first-class type tag.
    Type,
}

impl PrimType {
    pub fn name(self) -> &'static str {
        match self {
            PrimType::Number => "number",
            PrimType::Text => "string",
            PrimType::Sequence => "list",
            PrimType::Mapping => "dict",
            PrimType::Function => "Function",
            PrimType::Type => "Type",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Type {
    Prim(PrimType),
    Struct(StructuralType),
}

impl Type {
    pub fn number() -> Self {
        Type::Prim(PrimType::Number)
    }
    pub fn text() -> Self {
        Type::Prim(PrimType::Text)
    }
    pub fn sequence() -> Self {
        Type::Prim(PrimType::Sequence)
    }
    pub fn mapping() -> Self {
        Type::Prim(PrimType::Mapping)
    }
    pub fn function() -> Self {
        Type::Prim(PrimType::Function)
    }
    pub fn type_() -> Self {
        Type::Prim(PrimType::Type)
    }

    pub fn as_struct(&self) -> Option<&StructuralType> {
        match self {
            Type::Struct(st) => Some(st),
            Type::Prim(_) => None,
        }
    }

    /// Primitive types only obey themselves; structural types use width
    /// subtyping.
    pub fn obeys(&self, required: &Type) -> bool {
        match (self, required) {
            (Type::Struct(candidate), Type::Struct(req)) => candidate.obeys(req),
            _ => self == required,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Prim(p) => f.write_str(p.name()),
            Type::Struct(st) => write!(f, "{st}"),
        }
    }
}

/// Record shape: field name to required field type.
///
/// Fields are kept sorted by name so equality, ordering and hashing depend
/// only on the set of `(name, type)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructuralType {
    fields: BTreeMap<String, Type>,
}

impl StructuralType {
    pub fn new(fields: BTreeMap<String, Type>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True iff every field `required` demands is present here with an
    /// identical type. Extra fields are allowed.
    pub fn obeys(&self, required: &StructuralType) -> bool {
        required
            .fields
            .iter()
            .all(|(name, ty)| self.fields.get(name) == Some(ty))
    }
}

impl FromIterator<(String, Type)> for StructuralType {
    fn from_iter<I: IntoIterator<Item = (String, Type)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for StructuralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {ty}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(pairs: &[(&str, Type)]) -> StructuralType {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect()
    }

    #[test]
    fn field_order_does_not_affect_equality() {
        let a = shape(&[("x", Type::number()), ("y", Type::text())]);
        let b = shape(&[("y", Type::text()), ("x", Type::number())]);
        assert_eq!(a, b);
    }

    #[test]
    fn display_lists_sorted_fields() {
        let st = shape(&[("y", Type::text()), ("x", Type::number())]);
        assert_eq!(st.to_string(), "{x: number, y: string}");
    }

    #[test]
    fn prim_obeys_only_itself() {
        assert!(Type::number().obeys(&Type::number()));
        assert!(!Type::number().obeys(&Type::text()));
        assert!(!Type::Struct(StructuralType::default()).obeys(&Type::number()));
    }

    #[test]
    fn everything_obeys_the_empty_shape() {
        let empty = StructuralType::default();
        assert!(shape(&[("x", Type::number())]).obeys(&empty));
        assert!(empty.obeys(&empty));
    }
}
