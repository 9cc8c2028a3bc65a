//! Comparison, boolean and selection primitives.

use crate::core::error::ValueError;
use crate::core::types::Value;
use crate::primitives::registry::{Category, PrimitiveRegistry, PrimitiveSignature};
use crate::typing::ty::Type;

fn comparison(name: &str, description: &str) -> PrimitiveSignature {
    PrimitiveSignature::new(name, vec![Type::number(), Type::number()], Type::boolean())
        .with_category(Category::Logic)
        .with_description(description)
}

fn compare(args: &[Value], op: fn(f64, f64) -> bool) -> Result<Value, ValueError> {
    Ok(Value::Boolean(op(args[0].as_number()?, args[1].as_number()?)))
}

/// Structural equality, with integers and numbers compared by value.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Number(y)) | (Value::Number(y), Value::Integer(x)) => {
            *x as f64 == *y
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

/// Register logic primitives.
pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register_fn(comparison("lt", "a < b"), |args| compare(args, |a, b| a < b));
    registry.register_fn(comparison("le", "a <= b"), |args| compare(args, |a, b| a <= b));
    registry.register_fn(comparison("gt", "a > b"), |args| compare(args, |a, b| a > b));
    registry.register_fn(comparison("ge", "a >= b"), |args| compare(args, |a, b| a >= b));

    registry.register_fn(
        PrimitiveSignature::new("eq", vec![Type::Generic(0), Type::Generic(0)], Type::boolean())
            .with_category(Category::Logic)
            .with_description("Equality of two values of the same type"),
        |args| Ok(Value::Boolean(values_equal(&args[0], &args[1]))),
    );

    let boolean = |name: &str, arity: usize, description: &str| {
        PrimitiveSignature::new(name, vec![Type::boolean(); arity], Type::boolean())
            .with_category(Category::Logic)
            .with_description(description)
    };
    registry.register_fn(boolean("and", 2, "Logical conjunction"), |args| {
        Ok(Value::Boolean(args[0].as_bool()? && args[1].as_bool()?))
    });
    registry.register_fn(boolean("or", 2, "Logical disjunction"), |args| {
        Ok(Value::Boolean(args[0].as_bool()? || args[1].as_bool()?))
    });
    registry.register_fn(boolean("not", 1, "Logical negation"), |args| {
        Ok(Value::Boolean(!args[0].as_bool()?))
    });

    // Both branches are already evaluated; an error in the unselected one
    // still poisons the result.
    registry.register_fn(
        PrimitiveSignature::new(
            "if",
            vec![Type::boolean(), Type::Generic(0), Type::Generic(0)],
            Type::Generic(0),
        )
        .with_category(Category::Logic)
        .with_description("Select the second operand when the first is true, else the third"),
        |args| {
            Ok(if args[0].as_bool()? {
                args[1].clone()
            } else {
                args[2].clone()
            })
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PrimitiveRegistry {
        let mut registry = PrimitiveRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn test_comparisons() {
        let registry = registry();
        assert_eq!(
            registry.invoke("lt", &[Value::Integer(1), Value::Number(1.5)]),
            Value::Boolean(true)
        );
        assert_eq!(
            registry.invoke("ge", &[Value::Integer(1), Value::Integer(2)]),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_equality_across_numeric_kinds() {
        let registry = registry();
        assert_eq!(
            registry.invoke("eq", &[Value::Integer(2), Value::Number(2.0)]),
            Value::Boolean(true)
        );
        assert_eq!(
            registry.invoke(
                "eq",
                &[
                    Value::Array(vec![Value::Integer(1)]),
                    Value::Array(vec![Value::Number(1.0)])
                ]
            ),
            Value::Boolean(true)
        );
        assert_eq!(
            registry.invoke("eq", &[Value::string("a"), Value::string("b")]),
            Value::Boolean(false)
        );
    }

    #[test]
    fn test_if_selects_branch() {
        let registry = registry();
        let args = [Value::Boolean(false), Value::string("yes"), Value::string("no")];
        assert_eq!(registry.invoke("if", &args), Value::string("no"));

        let bad = [Value::Integer(1), Value::Integer(2), Value::Integer(3)];
        assert!(registry.invoke("if", &bad).is_error());
    }

    #[test]
    fn test_boolean_ops() {
        let registry = registry();
        assert_eq!(
            registry.invoke("and", &[Value::Boolean(true), Value::Boolean(false)]),
            Value::Boolean(false)
        );
        assert_eq!(registry.invoke("not", &[Value::Boolean(false)]), Value::Boolean(true));
    }
}
