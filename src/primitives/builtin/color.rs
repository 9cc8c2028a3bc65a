//! Color primitives.

use crate::core::error::ValueError;
use crate::core::types::{Color, Value};
use crate::primitives::registry::{Category, PrimitiveRegistry, PrimitiveSignature};
use crate::typing::ty::Type;

fn signature(name: &str, params: Vec<Type>, result: Type, description: &str) -> PrimitiveSignature {
    PrimitiveSignature::new(name, params, result)
        .with_category(Category::Color)
        .with_description(description)
}

/// Read a color component, which must lie in `[0, 1]`.
fn component(value: &Value) -> Result<f64, ValueError> {
    let c = value.as_number()?;
    if !(0.0..=1.0).contains(&c) {
        return Err(ValueError::Domain(format!(
            "color component {} is outside [0, 1]",
            c
        )));
    }
    Ok(c)
}

/// Register color primitives.
pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register_fn(
        signature("rgba", vec![Type::number(); 4], Type::color(), "Color from RGBA components"),
        |args| {
            Ok(Value::Color(Color::new(
                component(&args[0])?,
                component(&args[1])?,
                component(&args[2])?,
                component(&args[3])?,
            )))
        },
    );
    registry.register_fn(
        signature("rgb", vec![Type::number(); 3], Type::color(), "Opaque color from RGB components"),
        |args| {
            Ok(Value::Color(Color::rgb(
                component(&args[0])?,
                component(&args[1])?,
                component(&args[2])?,
            )))
        },
    );
    registry.register_fn(
        signature("color_from_hex", vec![Type::string()], Type::color(), "Parse a hex color"),
        |args| {
            Color::from_hex(args[0].as_str()?)
                .map(Value::Color)
                .map_err(ValueError::Domain)
        },
    );
    registry.register_fn(
        signature("color_alpha", vec![Type::color()], Type::number(), "Alpha component of a color"),
        |args| Ok(Value::Number(args[0].as_color()?.a)),
    );
    registry.register_fn(
        signature(
            "color_over",
            vec![Type::color(), Type::color()],
            Type::color(),
            "Composite the first color over the second",
        ),
        |args| Ok(Value::Color(args[0].as_color()?.over(&args[1].as_color()?))),
    );
    registry.register_fn(
        signature(
            "color_mix",
            vec![Type::color(), Type::color(), Type::number()],
            Type::color(),
            "Linear interpolation between two colors",
        ),
        |args| {
            let a = args[0].as_color()?.components();
            let b = args[1].as_color()?.components();
            let t = component(&args[2])?;
            let mix = |i: usize| a[i] + (b[i] - a[i]) * t;
            Ok(Value::Color(Color::new(mix(0), mix(1), mix(2), mix(3))))
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
    fn test_rgb_components_checked() {
        let registry = registry();
        assert_eq!(
            registry.invoke("rgb", &[Value::Integer(1), Value::Integer(0), Value::Integer(0)]),
            Value::Color(Color::RED)
        );
        let out_of_range = registry.invoke(
            "rgb",
            &[Value::Number(1.5), Value::Integer(0), Value::Integer(0)],
        );
        assert!(out_of_range.error_message().unwrap().contains("outside"));
    }

    #[test]
    fn test_mix_and_over() {
        let registry = registry();
        let mid = registry.invoke(
            "color_mix",
            &[Value::Color(Color::BLACK), Value::Color(Color::WHITE), Value::Number(0.5)],
        );
        assert_eq!(mid, Value::Color(Color::rgb(0.5, 0.5, 0.5)));

        let over = registry.invoke(
            "color_over",
            &[Value::Color(Color::TRANSPARENT), Value::Color(Color::BLUE)],
        );
        assert_eq!(over, Value::Color(Color::BLUE));
    }

    #[test]
    fn test_from_hex() {
        let registry = registry();
        assert_eq!(
            registry.invoke("color_from_hex", &[Value::string("#00FF00")]),
            Value::Color(Color::GREEN)
        );
        assert!(registry.invoke("color_from_hex", &[Value::string("#12")]).is_error());
        // Three bytes but two characters.
        assert!(registry.invoke("color_from_hex", &[Value::string("#é1")]).is_error());
    }
}
