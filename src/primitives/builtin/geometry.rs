//! Point and rectangle primitives.

use crate::core::error::ValueError;
use crate::core::types::{Point, Rect, Value};
use crate::primitives::registry::{Category, PrimitiveRegistry, PrimitiveSignature};
use crate::typing::ty::Type;

fn signature(name: &str, params: Vec<Type>, result: Type, description: &str) -> PrimitiveSignature {
    PrimitiveSignature::new(name, params, result)
        .with_category(Category::Geometry)
        .with_description(description)
}

/// Register geometry primitives.
pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register_fn(
        signature("point", vec![Type::number(), Type::number()], Type::point(), "Point from x and y"),
        |args| Ok(Value::point(args[0].as_number()?, args[1].as_number()?)),
    );
    registry.register_fn(
        signature("point_x", vec![Type::point()], Type::number(), "X coordinate of a point"),
        |args| Ok(Value::Number(args[0].as_point()?.x)),
    );
    registry.register_fn(
        signature("point_y", vec![Type::point()], Type::number(), "Y coordinate of a point"),
        |args| Ok(Value::Number(args[0].as_point()?.y)),
    );
    registry.register_fn(
        signature("rect", vec![Type::number(); 4], Type::rect(), "Rect from x, y, width and height"),
        make_rect,
    );
    registry.register_fn(
        signature(
            "rect_from_points",
            vec![Type::point(), Type::point()],
            Type::rect(),
            "Smallest rect containing two corner points",
        ),
        |args| Ok(Value::Rect(Rect::from_corners(args[0].as_point()?, args[1].as_point()?))),
    );
    registry.register_fn(
        signature("rect_origin", vec![Type::rect()], Type::point(), "Minimum corner of a rect"),
        |args| Ok(Value::Point(args[0].as_rect()?.origin)),
    );
    registry.register_fn(
        signature("rect_width", vec![Type::rect()], Type::number(), "Width of a rect"),
        |args| Ok(Value::Number(args[0].as_rect()?.size.width)),
    );
    registry.register_fn(
        signature("rect_height", vec![Type::rect()], Type::number(), "Height of a rect"),
        |args| Ok(Value::Number(args[0].as_rect()?.size.height)),
    );
    registry.register_fn(
        signature("rect_union", vec![Type::rect(), Type::rect()], Type::rect(), "Bounding rect of two rects"),
        |args| Ok(Value::Rect(args[0].as_rect()?.union(&args[1].as_rect()?))),
    );
    registry.register_fn(
        signature(
            "rect_intersection",
            vec![Type::rect(), Type::rect()],
            Type::rect(),
            "Overlap of two rects",
        ),
        |args| Ok(Value::Rect(args[0].as_rect()?.intersection(&args[1].as_rect()?))),
    );
    registry.register_fn(
        signature(
            "rect_translate",
            vec![Type::rect(), Type::point()],
            Type::rect(),
            "Move a rect by an offset",
        ),
        |args| {
            let rect = args[0].as_rect()?;
            let offset = args[1].as_point()?;
            Ok(Value::Rect(Rect {
                origin: Point::new(rect.origin.x + offset.x, rect.origin.y + offset.y),
                size: rect.size,
            }))
        },
    );
    registry.register_fn(
        signature(
            "rect_contains",
            vec![Type::rect(), Type::point()],
            Type::boolean(),
            "Whether a point lies inside a rect",
        ),
        |args| Ok(Value::Boolean(args[0].as_rect()?.contains(args[1].as_point()?))),
    );
    registry.register_fn(
        signature("image_extent", vec![Type::image()], Type::rect(), "Extent of an image"),
        |args| {
            args[0]
                .as_image()?
                .extent
                .map(Value::Rect)
                .ok_or_else(|| ValueError::Domain("image has an infinite extent".to_string()))
        },
    );
}

fn make_rect(args: &[Value]) -> Result<Value, ValueError> {
    let width = args[2].as_number()?;
    let height = args[3].as_number()?;
    if width < 0.0 || height < 0.0 {
        return Err(ValueError::Domain(format!(
            "negative rect size {}x{}",
            width, height
        )));
    }
    Ok(Value::rect(args[0].as_number()?, args[1].as_number()?, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ImageHandle;

    fn registry() -> PrimitiveRegistry {
        let mut registry = PrimitiveRegistry::new();
        register(&mut registry);
        registry
    }

    #[test]
    fn test_rect_construction() {
        let registry = registry();
        let rect = registry.invoke(
            "rect",
            &[Value::Integer(1), Value::Integer(2), Value::Number(3.0), Value::Number(4.0)],
        );
        assert_eq!(rect, Value::rect(1.0, 2.0, 3.0, 4.0));
        assert_eq!(registry.invoke("rect_width", &[rect]), Value::Number(3.0));

        let negative = registry.invoke(
            "rect",
            &[Value::Integer(0), Value::Integer(0), Value::Integer(-1), Value::Integer(1)],
        );
        assert!(negative.is_error());
    }

    #[test]
    fn test_rect_translate() {
        let registry = registry();
        let moved = registry.invoke(
            "rect_translate",
            &[Value::rect(0.0, 0.0, 2.0, 2.0), Value::point(1.0, -1.0)],
        );
        assert_eq!(moved, Value::rect(1.0, -1.0, 2.0, 2.0));
    }

    #[test]
    fn test_image_extent() {
        let registry = registry();
        let finite = ImageHandle::new(Some(Rect::new(0.0, 0.0, 64.0, 32.0)));
        assert_eq!(
            registry.invoke("image_extent", &[Value::Image(finite)]),
            Value::rect(0.0, 0.0, 64.0, 32.0)
        );
        let infinite = ImageHandle::new(None);
        assert!(registry.invoke("image_extent", &[Value::Image(infinite)]).is_error());
    }
}
