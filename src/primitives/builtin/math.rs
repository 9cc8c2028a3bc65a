//! Arithmetic primitives.
//!
//! Operations on two integers stay integral when the result fits; any
//! other combination of numbers computes in `f64`.

use crate::core::error::ValueError;
use crate::core::types::Value;
use crate::primitives::registry::{Category, PrimitiveRegistry, PrimitiveSignature};
use crate::typing::ty::Type;

fn signature(name: &str, arity: usize, description: &str) -> PrimitiveSignature {
    PrimitiveSignature::new(name, vec![Type::number(); arity], Type::number())
        .with_category(Category::Math)
        .with_description(description)
}

/// Apply an integer operation when both operands are integers, a float one otherwise.
fn arithmetic(
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, ValueError> {
    if let (Value::Integer(a), Value::Integer(b)) = (&args[0], &args[1]) {
        if let Some(result) = int_op(*a, *b) {
            return Ok(Value::Integer(result));
        }
    }
    let a = args[0].as_number()?;
    let b = args[1].as_number()?;
    Ok(Value::Number(float_op(a, b)))
}

/// Register math primitives.
pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register_fn(signature("add", 2, "Add two numbers (a + b)"), |args| {
        arithmetic(args, i64::checked_add, |a, b| a + b)
    });
    registry.register_fn(signature("sub", 2, "Subtract two numbers (a - b)"), |args| {
        arithmetic(args, i64::checked_sub, |a, b| a - b)
    });
    registry.register_fn(signature("mul", 2, "Multiply two numbers (a * b)"), |args| {
        arithmetic(args, i64::checked_mul, |a, b| a * b)
    });
    registry.register_fn(signature("div", 2, "Divide two numbers (a / b)"), divide);
    registry.register_fn(signature("min", 2, "Smaller of two numbers"), |args| {
        arithmetic(args, |a, b| Some(a.min(b)), f64::min)
    });
    registry.register_fn(signature("max", 2, "Larger of two numbers"), |args| {
        arithmetic(args, |a, b| Some(a.max(b)), f64::max)
    });
    registry.register_fn(signature("pow", 2, "Raise a to the power b"), |args| {
        Ok(Value::Number(args[0].as_number()?.powf(args[1].as_number()?)))
    });
    registry.register_fn(signature("neg", 1, "Negate a number"), |args| match &args[0] {
        Value::Integer(i) if *i != i64::MIN => Ok(Value::Integer(-i)),
        other => Ok(Value::Number(-other.as_number()?)),
    });
    registry.register_fn(signature("abs", 1, "Absolute value"), |args| match &args[0] {
        Value::Integer(i) if *i != i64::MIN => Ok(Value::Integer(i.abs())),
        other => Ok(Value::Number(other.as_number()?.abs())),
    });
    registry.register_fn(signature("sqrt", 1, "Square root"), |args| {
        let x = args[0].as_number()?;
        if x < 0.0 {
            return Err(ValueError::Domain(format!("square root of negative number {}", x)));
        }
        Ok(Value::Number(x.sqrt()))
    });
    registry.register_fn(signature("clamp", 3, "Clamp x to [lo, hi]"), |args| {
        let x = args[0].as_number()?;
        let lo = args[1].as_number()?;
        let hi = args[2].as_number()?;
        if lo > hi {
            return Err(ValueError::Domain(format!("empty clamp range [{}, {}]", lo, hi)));
        }
        Ok(Value::Number(x.clamp(lo, hi)))
    });
    registry.register_fn(signature("pi", 0, "The constant pi"), |_| {
        Ok(Value::Number(std::f64::consts::PI))
    });
}

fn divide(args: &[Value]) -> Result<Value, ValueError> {
    let a = args[0].as_number()?;
    let b = args[1].as_number()?;
    if b == 0.0 {
        return Err(ValueError::Domain("division by zero".to_string()));
    }
    Ok(Value::Number(a / b))
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
    fn test_integer_arithmetic_stays_integral() {
        let registry = registry();
        assert_eq!(
            registry.invoke("add", &[Value::Integer(2), Value::Integer(3)]),
            Value::Integer(5)
        );
        assert_eq!(
            registry.invoke("mul", &[Value::Integer(2), Value::Number(1.5)]),
            Value::Number(3.0)
        );
        // Overflow falls back to floating point.
        assert_eq!(
            registry.invoke("add", &[Value::Integer(i64::MAX), Value::Integer(1)]),
            Value::Number(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn test_division_by_zero_is_an_error_value() {
        let registry = registry();
        let result = registry.invoke("div", &[Value::Number(1.0), Value::Integer(0)]);
        assert_eq!(result, Value::error("division by zero"));
        assert_eq!(
            registry.invoke("div", &[Value::Integer(3), Value::Integer(2)]),
            Value::Number(1.5)
        );
    }

    #[test]
    fn test_mismatch_message() {
        let registry = registry();
        let result = registry.invoke("add", &[Value::Integer(2), Value::string("x")]);
        assert!(result.error_message().unwrap().starts_with("type mismatch"));
    }

    #[test]
    fn test_unary_and_nullary() {
        let registry = registry();
        assert_eq!(registry.invoke("neg", &[Value::Integer(4)]), Value::Integer(-4));
        assert_eq!(registry.invoke("abs", &[Value::Number(-1.5)]), Value::Number(1.5));
        assert!(registry.invoke("sqrt", &[Value::Number(-1.0)]).is_error());
        assert_eq!(registry.invoke("pi", &[]), Value::Number(std::f64::consts::PI));
        assert_eq!(
            registry.invoke("clamp", &[Value::Number(5.0), Value::Integer(0), Value::Integer(1)]),
            Value::Number(1.0)
        );
    }
}
