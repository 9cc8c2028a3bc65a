//! Expression trees parameterizing graph nodes.
//!
//! Trees are immutable and shared through `Arc`: several nodes (and the
//! value cache) may hold the same subtree. Editing always builds a new tree.

use crate::core::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Prefix of the variables bound to a node's input slots.
pub const INPUT_VARIABLE_PREFIX: &str = "in";

/// Name of the parameter whose value is a node's output.
pub const OUTPUT_PARAMETER: &str = "output";

/// Largest call frame a lambda may take, and highest input slot read
/// without a connection.
pub const MAX_ARGUMENTS: usize = 1024;

/// An expression of the node parameter language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    /// A literal value.
    Constant { value: Value },
    /// A name bound by an enclosing lambda, a node parameter or a node input.
    Variable { name: String },
    /// The Nth value passed to the innermost enclosing call.
    Argument { index: usize },
    /// A built-in operation, applied to its operands.
    ///
    /// Without operands, the primitive denotes the operation itself.
    Primitive {
        name: String,
        operands: Vec<Arc<Expression>>,
    },
    /// Call of an operator expression with operand expressions.
    Apply {
        operator: Arc<Expression>,
        operands: Vec<Arc<Expression>>,
    },
    /// Elementwise application of a callable to an array.
    Map {
        array: Arc<Expression>,
        lambda: Arc<Expression>,
    },
    /// Anonymous function.
    ///
    /// With no named parameters the body reads its arguments through
    /// [`Expression::Argument`].
    Lambda {
        params: Vec<String>,
        body: Arc<Expression>,
    },
}

impl Expression {
    /// Constant expression.
    pub fn constant(value: impl Into<Value>) -> Arc<Self> {
        Arc::new(Expression::Constant {
            value: value.into(),
        })
    }

    /// Variable reference.
    pub fn variable(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Expression::Variable { name: name.into() })
    }

    /// Reference to the variable bound to input `slot`.
    pub fn input(slot: usize) -> Arc<Self> {
        Self::variable(input_variable(slot))
    }

    /// Positional argument reference.
    pub fn argument(index: usize) -> Arc<Self> {
        Arc::new(Expression::Argument { index })
    }

    /// Primitive applied to operands.
    pub fn primitive(name: impl Into<String>, operands: Vec<Arc<Expression>>) -> Arc<Self> {
        Arc::new(Expression::Primitive {
            name: name.into(),
            operands,
        })
    }

    /// Primitive used as a value (no operands).
    pub fn primitive_ref(name: impl Into<String>) -> Arc<Self> {
        Self::primitive(name, Vec::new())
    }

    /// Application.
    pub fn apply(operator: Arc<Expression>, operands: Vec<Arc<Expression>>) -> Arc<Self> {
        Arc::new(Expression::Apply { operator, operands })
    }

    /// Elementwise map.
    pub fn map(array: Arc<Expression>, lambda: Arc<Expression>) -> Arc<Self> {
        Arc::new(Expression::Map { array, lambda })
    }

    /// Lambda with named parameters.
    pub fn lambda<S: Into<String>>(params: Vec<S>, body: Arc<Expression>) -> Arc<Self> {
        Arc::new(Expression::Lambda {
            params: params.into_iter().map(Into::into).collect(),
            body,
        })
    }

    /// Check if this is a lambda literal.
    pub fn is_lambda(&self) -> bool {
        matches!(self, Expression::Lambda { .. })
    }

    /// Copy the whole tree into fresh allocations.
    ///
    /// The result is structurally equal but shares no node with `self`.
    pub fn deep_clone(&self) -> Arc<Expression> {
        let copy = |children: &[Arc<Expression>]| -> Vec<Arc<Expression>> {
            children.iter().map(|e| e.deep_clone()).collect()
        };
        Arc::new(match self {
            Expression::Constant { value } => Expression::Constant {
                value: value.clone(),
            },
            Expression::Variable { name } => Expression::Variable { name: name.clone() },
            Expression::Argument { index } => Expression::Argument { index: *index },
            Expression::Primitive { name, operands } => Expression::Primitive {
                name: name.clone(),
                operands: copy(operands),
            },
            Expression::Apply { operator, operands } => Expression::Apply {
                operator: operator.deep_clone(),
                operands: copy(operands),
            },
            Expression::Map { array, lambda } => Expression::Map {
                array: array.deep_clone(),
                lambda: lambda.deep_clone(),
            },
            Expression::Lambda { params, body } => Expression::Lambda {
                params: params.clone(),
                body: body.deep_clone(),
            },
        })
    }

    /// Number of positional arguments read by this expression's own call frame.
    ///
    /// That is the highest [`Expression::Argument`] index plus one, not
    /// looking inside nested lambdas (they have their own frame).
    pub fn argument_arity(&self) -> usize {
        match self {
            Expression::Argument { index } => index.saturating_add(1),
            Expression::Constant { .. } | Expression::Variable { .. } | Expression::Lambda { .. } => 0,
            Expression::Primitive { operands, .. } => max_arity(operands.iter()),
            Expression::Apply { operator, operands } => {
                max_arity(std::iter::once(operator).chain(operands.iter()))
            }
            Expression::Map { array, lambda } => max_arity([array, lambda].into_iter()),
        }
    }

    /// True when every constant in this tree is finite.
    pub fn constants_finite(&self) -> bool {
        match self {
            Expression::Constant { value } => value.is_finite(),
            Expression::Variable { .. } | Expression::Argument { .. } => true,
            Expression::Primitive { operands, .. } => operands.iter().all(|e| e.constants_finite()),
            Expression::Apply { operator, operands } => {
                operator.constants_finite() && operands.iter().all(|e| e.constants_finite())
            }
            Expression::Map { array, lambda } => array.constants_finite() && lambda.constants_finite(),
            Expression::Lambda { body, .. } => body.constants_finite(),
        }
    }

    /// Names of all primitives used in this tree.
    pub fn primitive_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_primitives(&mut names);
        names
    }

    fn collect_primitives<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expression::Constant { .. } | Expression::Variable { .. } | Expression::Argument { .. } => {}
            Expression::Primitive { name, operands } => {
                names.push(name);
                operands.iter().for_each(|e| e.collect_primitives(names));
            }
            Expression::Apply { operator, operands } => {
                operator.collect_primitives(names);
                operands.iter().for_each(|e| e.collect_primitives(names));
            }
            Expression::Map { array, lambda } => {
                array.collect_primitives(names);
                lambda.collect_primitives(names);
            }
            Expression::Lambda { body, .. } => body.collect_primitives(names),
        }
    }
}

fn max_arity<'a>(children: impl Iterator<Item = &'a Arc<Expression>>) -> usize {
    children.map(|e| e.argument_arity()).max().unwrap_or(0)
}

/// Name of the variable bound to input `slot` of a node.
pub fn input_variable(slot: usize) -> String {
    format!("{}{}", INPUT_VARIABLE_PREFIX, slot)
}

/// Input slot designated by `name`, if it is an input variable name.
pub fn input_slot(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(INPUT_VARIABLE_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::expr::printer::print(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_variable_names() {
        assert_eq!(input_variable(3), "in3");
        assert_eq!(input_slot("in3"), Some(3));
        assert_eq!(input_slot("in"), None);
        assert_eq!(input_slot("input"), None);
        assert_eq!(input_slot("in+1"), None);
        assert_eq!(input_slot("sigma"), None);
    }

    #[test]
    fn test_argument_arity() {
        let body = Expression::primitive("add", vec![Expression::argument(0), Expression::argument(2)]);
        assert_eq!(body.argument_arity(), 3);

        // Arguments inside a nested lambda belong to that lambda's frame.
        let nested = Expression::apply(
            Expression::lambda(Vec::<String>::new(), Expression::argument(4)),
            vec![Expression::argument(1)],
        );
        assert_eq!(nested.argument_arity(), 2);
        assert_eq!(Expression::constant(1.0).argument_arity(), 0);
        assert_eq!(Expression::argument(usize::MAX).argument_arity(), usize::MAX);
    }

    #[test]
    fn test_deep_clone_shares_nothing() {
        let shared = Expression::constant(2.0);
        let tree = Expression::primitive("add", vec![shared.clone(), shared.clone()]);
        let copy = tree.deep_clone();

        assert_eq!(*copy, *tree);
        assert!(!Arc::ptr_eq(&copy, &tree));
        if let Expression::Primitive { operands, .. } = copy.as_ref() {
            assert!(!Arc::ptr_eq(&operands[0], &shared));
        } else {
            panic!("expected a primitive");
        }
    }

    #[test]
    fn test_constants_finite() {
        let tree = Expression::map(
            Expression::constant(Value::Array(vec![Value::Number(1.0)])),
            Expression::lambda(vec!["x"], Expression::variable("x")),
        );
        assert!(tree.constants_finite());

        let hidden = Expression::lambda(
            vec!["x"],
            Expression::primitive("add", vec![Expression::variable("x"), Expression::constant(f64::NAN)]),
        );
        assert!(!hidden.constants_finite());
        assert!(!Expression::constant(Value::point(f64::INFINITY, 0.0)).constants_finite());
    }

    #[test]
    fn test_primitive_names() {
        let tree = Expression::map(
            Expression::input(0),
            Expression::lambda(vec!["x"], Expression::primitive("mul", vec![Expression::variable("x")])),
        );
        assert_eq!(tree.primitive_names(), vec!["mul"]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let tree = Expression::apply(
            Expression::lambda(vec!["x"], Expression::variable("x")),
            vec![Expression::constant(Value::string("hi"))],
        );
        let json = serde_json::to_string(&tree).unwrap();
        let back: Arc<Expression> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }
}
