//! Array and string primitives.

use crate::core::error::ValueError;
use crate::core::types::Value;
use crate::primitives::registry::{Category, PrimitiveRegistry, PrimitiveSignature};
use crate::typing::ty::Type;

/// Upper bound on `range` results.
const MAX_RANGE: i64 = 1 << 20;

fn signature(name: &str, params: Vec<Type>, result: Type, description: &str) -> PrimitiveSignature {
    PrimitiveSignature::new(name, params, result)
        .with_category(Category::Collection)
        .with_description(description)
}

fn array_of(n: u32) -> Type {
    Type::array(Type::Generic(n))
}

/// Register collection primitives.
pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register_fn(
        signature("array_length", vec![array_of(0)], Type::number(), "Number of elements"),
        |args| Ok(Value::Integer(args[0].as_array()?.len() as i64)),
    );
    registry.register_fn(
        signature(
            "array_get",
            vec![array_of(0), Type::number()],
            Type::Generic(0),
            "Element at a zero-based index",
        ),
        array_get,
    );
    registry.register_fn(
        signature(
            "array_concat",
            vec![array_of(0), array_of(0)],
            array_of(0),
            "Concatenate two arrays",
        ),
        |args| {
            let mut items = args[0].as_array()?.to_vec();
            items.extend_from_slice(args[1].as_array()?);
            Ok(Value::Array(items))
        },
    );
    registry.register_fn(
        signature(
            "array_flatten",
            vec![Type::array(array_of(0))],
            array_of(0),
            "Concatenate nested arrays",
        ),
        |args| {
            args[0].as_array()?;
            Ok(args[0].flatten())
        },
    );
    registry.register_fn(
        signature(
            "range",
            vec![Type::number()],
            Type::array(Type::number()),
            "Integers from 0 up to (excluding) n",
        ),
        |args| {
            let n = args[0].as_integer()?;
            if !(0..=MAX_RANGE).contains(&n) {
                return Err(ValueError::Domain(format!(
                    "range length {} is outside [0, {}]",
                    n, MAX_RANGE
                )));
            }
            Ok(Value::Array((0..n).map(Value::Integer).collect()))
        },
    );
    registry.register_fn(
        signature(
            "concat",
            vec![Type::string(), Type::string()],
            Type::string(),
            "Concatenate two strings",
        ),
        |args| Ok(Value::String(format!("{}{}", args[0].as_str()?, args[1].as_str()?))),
    );
    registry.register_fn(
        signature("to_string", vec![Type::Generic(0)], Type::string(), "Textual form of a value"),
        |args| {
            Ok(match &args[0] {
                Value::String(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            })
        },
    );
}

fn array_get(args: &[Value]) -> Result<Value, ValueError> {
    let items = args[0].as_array()?;
    let index = args[1].as_integer()?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| {
            ValueError::Domain(format!(
                "index {} out of bounds for array of length {}",
                index,
                items.len()
            ))
        })
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
    fn test_range_and_length() {
        let registry = registry();
        let range = registry.invoke("range", &[Value::Integer(4)]);
        assert_eq!(
            range,
            Value::Array((0..4).map(Value::Integer).collect::<Vec<_>>())
        );
        assert_eq!(registry.invoke("array_length", &[range]), Value::Integer(4));
        assert!(registry.invoke("range", &[Value::Integer(-1)]).is_error());
        assert!(registry.invoke("range", &[Value::Number(1.5)]).is_error());
    }

    #[test]
    fn test_array_get_bounds() {
        let registry = registry();
        let array = Value::Array(vec![Value::string("a"), Value::string("b")]);
        assert_eq!(
            registry.invoke("array_get", &[array.clone(), Value::Integer(1)]),
            Value::string("b")
        );
        assert!(registry.invoke("array_get", &[array.clone(), Value::Integer(2)]).is_error());
        assert!(registry.invoke("array_get", &[array, Value::Integer(-1)]).is_error());
    }

    #[test]
    fn test_flatten_and_concat() {
        let registry = registry();
        let nested = Value::Array(vec![
            Value::Array(vec![Value::Integer(1)]),
            Value::Array(vec![Value::Integer(2), Value::Integer(3)]),
        ]);
        assert_eq!(
            registry.invoke("array_flatten", &[nested]),
            Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
        assert!(registry.invoke("array_flatten", &[Value::Integer(1)]).is_error());
        assert_eq!(
            registry.invoke("concat", &[Value::string("ab"), Value::string("cd")]),
            Value::string("abcd")
        );
        assert_eq!(
            registry.invoke("to_string", &[Value::Integer(5)]),
            Value::string("5")
        );
    }
}
