//! The type algebra of the expression language.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an inference variable in a [`crate::typing::unify::TypeVarTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeVar(pub u32);

/// Base (non-parameterized) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseType {
    Number,
    Boolean,
    String,
    Point,
    Rect,
    Color,
    Image,
}

/// A type of the expression language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of")]
pub enum Type {
    /// A base type.
    Base(BaseType),
    /// Homogeneous array.
    Array(Box<Type>),
    /// Function from positional parameters to a result.
    Function(Vec<Type>, Box<Type>),
    /// Inference variable; only meaningful together with its table.
    Var(TypeVar),
    /// Unconstrained type, numbered within one resolved type or scheme.
    Generic(u32),
}

/// A primitive's type, whose [`Type::Generic`] entries are instantiated
/// with fresh variables at every use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeScheme {
    /// The function type of the primitive.
    pub params: Vec<Type>,
    /// Result type.
    pub result: Type,
}

impl Type {
    /// Number type.
    pub const fn number() -> Self {
        Type::Base(BaseType::Number)
    }

    /// Boolean type.
    pub const fn boolean() -> Self {
        Type::Base(BaseType::Boolean)
    }

    /// String type.
    pub const fn string() -> Self {
        Type::Base(BaseType::String)
    }

    /// Point type.
    pub const fn point() -> Self {
        Type::Base(BaseType::Point)
    }

    /// Rect type.
    pub const fn rect() -> Self {
        Type::Base(BaseType::Rect)
    }

    /// Color type.
    pub const fn color() -> Self {
        Type::Base(BaseType::Color)
    }

    /// Image type.
    pub const fn image() -> Self {
        Type::Base(BaseType::Image)
    }

    /// Array of `element`.
    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    /// Function type.
    pub fn function(params: Vec<Type>, result: Type) -> Self {
        Type::Function(params, Box::new(result))
    }

    /// Check if the type contains no variables and no generics.
    pub fn is_ground(&self) -> bool {
        match self {
            Type::Base(_) => true,
            Type::Array(element) => element.is_ground(),
            Type::Function(params, result) => params.iter().all(Type::is_ground) && result.is_ground(),
            Type::Var(_) | Type::Generic(_) => false,
        }
    }

    /// Check if the type is a function type.
    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function(..))
    }

    /// Get a human-readable name for this type.
    pub fn display_name(&self) -> String {
        match self {
            Type::Base(base) => base.to_string(),
            Type::Array(element) => format!("Array<{}>", element.display_name()),
            Type::Function(params, result) => {
                let params: Vec<String> = params.iter().map(Type::display_name).collect();
                format!("({}) -> {}", params.join(", "), result.display_name())
            }
            Type::Var(var) => format!("?{}", var.0),
            Type::Generic(n) => generic_name(*n),
        }
    }
}

fn generic_name(n: u32) -> String {
    let letter = (b'a' + (n % 26) as u8) as char;
    if n < 26 {
        format!("'{}", letter)
    } else {
        format!("'{}{}", letter, n / 26)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Number => "Number",
            BaseType::Boolean => "Boolean",
            BaseType::String => "String",
            BaseType::Point => "Point",
            BaseType::Rect => "Rect",
            BaseType::Color => "Color",
            BaseType::Image => "Image",
        };
        f.write_str(name)
    }
}

impl TypeScheme {
    /// Create a scheme from parameter and result types.
    pub fn new(params: Vec<Type>, result: Type) -> Self {
        Self { params, result }
    }

    /// Number of operands the primitive takes.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// The scheme as a (generic) function type.
    pub fn as_type(&self) -> Type {
        Type::function(self.params.clone(), self.result.clone())
    }
}

impl fmt::Display for TypeScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_type())
    }
}
