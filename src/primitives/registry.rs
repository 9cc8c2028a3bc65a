//! Primitive registry for managing available built-in operations.

use crate::core::error::ValueError;
use crate::core::types::Value;
use crate::typing::ty::{Type, TypeScheme};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Category for organizing primitives in the editor's palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Arithmetic on numbers
    Math,
    /// Comparisons, boolean logic and selection
    Logic,
    /// Points and rectangles
    Geometry,
    /// Color construction and composition
    Color,
    /// Arrays and strings
    Collection,
    /// Implemented by the foreign runtime
    Foreign,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Math => "Math",
            Category::Logic => "Logic",
            Category::Geometry => "Geometry",
            Category::Color => "Color",
            Category::Collection => "Collection",
            Category::Foreign => "Foreign",
        }
    }

    /// Get all categories in display order.
    pub fn all() -> &'static [Category] {
        &[
            Category::Math,
            Category::Logic,
            Category::Geometry,
            Category::Color,
            Category::Collection,
            Category::Foreign,
        ]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Name, documentation and type scheme of a primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimitiveSignature {
    /// Unique name, as used in [`crate::expr::ast::Expression::Primitive`].
    pub name: String,
    /// Category for palette organization.
    pub category: Category,
    /// One-line description.
    pub description: String,
    /// Type scheme; generics are instantiated fresh at every use.
    pub scheme: TypeScheme,
}

impl PrimitiveSignature {
    /// Create a signature from parameter and result types.
    pub fn new(name: impl Into<String>, params: Vec<Type>, result: Type) -> Self {
        Self {
            name: name.into(),
            category: Category::Math,
            description: String::new(),
            scheme: TypeScheme::new(params, result),
        }
    }

    /// Set the category.
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Number of operands.
    pub fn arity(&self) -> usize {
        self.scheme.arity()
    }
}

/// A built-in operation over values.
///
/// `apply` is only called with exactly [`PrimitiveSignature::arity`]
/// arguments, none of which is an error value.
pub trait PrimitiveOp: Send + Sync {
    /// Get the signature of this primitive.
    fn signature(&self) -> &PrimitiveSignature;

    /// Compute the result.
    ///
    /// A returned `Err` becomes an error value at the call site.
    fn apply(&self, args: &[Value]) -> Result<Value, ValueError>;
}

/// Function type backing [`FnPrimitive`].
pub type PrimitiveFn = Arc<dyn Fn(&[Value]) -> Result<Value, ValueError> + Send + Sync>;

/// A primitive implemented by a plain function.
#[derive(Clone)]
pub struct FnPrimitive {
    signature: PrimitiveSignature,
    function: PrimitiveFn,
}

impl FnPrimitive {
    /// Wrap a function.
    pub fn new<F>(signature: PrimitiveSignature, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ValueError> + Send + Sync + 'static,
    {
        Self {
            signature,
            function: Arc::new(function),
        }
    }
}

impl PrimitiveOp for FnPrimitive {
    fn signature(&self) -> &PrimitiveSignature {
        &self.signature
    }

    fn apply(&self, args: &[Value]) -> Result<Value, ValueError> {
        (self.function)(args)
    }
}

impl fmt::Debug for FnPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPrimitive")
            .field("name", &self.signature.name)
            .finish()
    }
}

/// Registry for all available primitives.
///
/// Both type inference and evaluation look primitives up here by name.
#[derive(Clone)]
pub struct PrimitiveRegistry {
    /// Primitives indexed by name, in registration order.
    primitives: IndexMap<String, Arc<dyn PrimitiveOp>>,
    /// Primitive names grouped by category.
    categories: IndexMap<Category, Vec<String>>,
}

impl PrimitiveRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            primitives: IndexMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in primitives.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::primitives::builtin::register_all(&mut registry);
        registry
    }

    /// Register a primitive, replacing any primitive of the same name.
    pub fn register<P: PrimitiveOp + 'static>(&mut self, primitive: P) {
        self.register_arc(Arc::new(primitive));
    }

    /// Register a shared primitive.
    pub fn register_arc(&mut self, primitive: Arc<dyn PrimitiveOp>) {
        let name = primitive.signature().name.clone();
        let category = primitive.signature().category;

        if let Some(previous) = self.primitives.insert(name.clone(), primitive) {
            log::debug!("Replacing primitive '{}'", name);
            if let Some(names) = self.categories.get_mut(&previous.signature().category) {
                names.retain(|n| n != &name);
            }
        }
        self.categories.entry(category).or_default().push(name);
    }

    /// Register a primitive implemented by a function.
    pub fn register_fn<F>(&mut self, signature: PrimitiveSignature, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, ValueError> + Send + Sync + 'static,
    {
        self.register(FnPrimitive::new(signature, function));
    }

    /// Look a primitive up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn PrimitiveOp>> {
        self.primitives.get(name)
    }

    /// Get the signature of a primitive.
    pub fn signature(&self, name: &str) -> Option<&PrimitiveSignature> {
        self.primitives.get(name).map(|p| p.signature())
    }

    /// Get the arity of a primitive.
    pub fn arity(&self, name: &str) -> Option<usize> {
        self.signature(name).map(PrimitiveSignature::arity)
    }

    /// Check if a primitive is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.primitives.contains_key(name)
    }

    /// Get all registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.primitives.keys().map(|s| s.as_str())
    }

    /// Invoke a primitive by name.
    ///
    /// Never fails: an unknown name, a wrong argument count, an error
    /// argument or a failing primitive all yield an error value.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Value {
        let Some(primitive) = self.primitives.get(name) else {
            return Value::error(format!("unknown primitive '{}'", name));
        };
        let arity = primitive.signature().arity();
        if args.len() != arity {
            return Value::error(format!(
                "arity mismatch: '{}' expects {} operand(s), found {}",
                name,
                arity,
                args.len()
            ));
        }
        if let Some(error) = args.iter().find(|a| a.is_error()) {
            return error.clone();
        }
        primitive.apply(args).unwrap_or_else(Value::from)
    }

    /// Get primitive names of a category.
    pub fn primitives_by_category(&self, category: &Category) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|names| names.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Search primitives by name or description.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.primitives
            .iter()
            .filter(|(name, primitive)| {
                name.to_lowercase().contains(&query)
                    || primitive
                        .signature()
                        .description
                        .to_lowercase()
                        .contains(&query)
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Unregister a primitive.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.primitives.shift_remove(name) {
            Some(primitive) => {
                if let Some(names) = self.categories.get_mut(&primitive.signature().category) {
                    names.retain(|n| n != name);
                }
                true
            }
            None => false,
        }
    }

    /// Get the total number of registered primitives.
    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Get signatures grouped by category for palette display.
    pub fn grouped_by_category(&self) -> IndexMap<Category, Vec<&PrimitiveSignature>> {
        let mut grouped: IndexMap<Category, Vec<&PrimitiveSignature>> = IndexMap::new();
        for category in Category::all() {
            let mut signatures: Vec<&PrimitiveSignature> = self
                .primitives_by_category(category)
                .into_iter()
                .filter_map(|name| self.signature(name))
                .collect();
            if signatures.is_empty() {
                continue;
            }
            signatures.sort_by(|a, b| a.name.cmp(&b.name));
            grouped.insert(*category, signatures);
        }
        grouped
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for PrimitiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveRegistry")
            .field("primitives", &self.primitives.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double() -> FnPrimitive {
        FnPrimitive::new(
            PrimitiveSignature::new("double", vec![Type::number()], Type::number())
                .with_description("Twice the operand"),
            |args| Ok(Value::Number(args[0].as_number()? * 2.0)),
        )
    }

    #[test]
    fn test_register_and_invoke() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double());

        assert!(registry.contains("double"));
        assert_eq!(registry.arity("double"), Some(1));
        assert_eq!(registry.invoke("double", &[Value::Number(2.5)]), Value::Number(5.0));
    }

    #[test]
    fn test_invoke_is_total() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double());

        assert!(registry.invoke("nope", &[]).is_error());
        let wrong_arity = registry.invoke("double", &[]);
        assert!(wrong_arity.error_message().unwrap().contains("arity"));

        let mismatch = registry.invoke("double", &[Value::string("x")]);
        assert!(mismatch.error_message().unwrap().starts_with("type mismatch"));

        let poisoned = registry.invoke("double", &[Value::error("upstream")]);
        assert_eq!(poisoned, Value::error("upstream"));
    }

    #[test]
    fn test_category_grouping() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double());
        registry.register_fn(
            PrimitiveSignature::new("yes", vec![], Type::boolean()).with_category(Category::Logic),
            |_| Ok(Value::Boolean(true)),
        );

        assert_eq!(registry.primitives_by_category(&Category::Math), vec!["double"]);
        let grouped = registry.grouped_by_category();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&Category::Logic][0].name, "yes");
    }

    #[test]
    fn test_replace_and_unregister() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double());
        registry.register_fn(
            PrimitiveSignature::new("double", vec![Type::number()], Type::number())
                .with_category(Category::Collection),
            |args| Ok(args[0].clone()),
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.primitives_by_category(&Category::Math).is_empty());

        assert!(registry.unregister("double"));
        assert!(!registry.unregister("double"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_search() {
        let mut registry = PrimitiveRegistry::new();
        registry.register(double());
        assert_eq!(registry.search("twice"), vec!["double"]);
        assert!(registry.search("nonexistent").is_empty());
    }

    #[test]
    fn test_builtins_present() {
        let registry = PrimitiveRegistry::with_builtins();
        for name in ["add", "lt", "point", "rgba", "array_length"] {
            assert!(registry.contains(name), "missing builtin {}", name);
        }
    }
}
