//! Values as the foreign numeric runtime represents them.
//!
//! The runtime knows scalars, strings, flat float arrays, opaque handles
//! and tagged blocks of fields. Structured values travel as blocks whose
//! tag names the structure.

use crate::core::error::BridgeError;
use crate::core::types::{Color, ImageHandle, Point, Rect, Value};
use serde::{Deserialize, Serialize};

/// Block tags for structured values.
pub mod tags {
    /// `[x, y]`
    pub const POINT: u8 = 1;
    /// `[x, y, width, height]`
    pub const RECT: u8 = 2;
    /// `[r, g, b, a]`
    pub const COLOR: u8 = 3;
    /// Array of arbitrary values, one field per element.
    pub const ARRAY: u8 = 4;
}

/// A value in the foreign runtime's native representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForeignValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    /// Unboxed array of floats.
    FloatArray(Vec<f64>),
    /// Tagged structure.
    Block { tag: u8, fields: Vec<ForeignValue> },
    /// Opaque image reference, passed through untouched.
    Handle(ImageHandle),
}

impl ForeignValue {
    /// Block of float fields.
    pub fn floats(tag: u8, fields: &[f64]) -> Self {
        ForeignValue::Block {
            tag,
            fields: fields.iter().copied().map(ForeignValue::Float).collect(),
        }
    }

    /// Read as a float; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ForeignValue::Float(x) => Some(*x),
            ForeignValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl TryFrom<&Value> for ForeignValue {
    type Error = BridgeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Number(x) => ForeignValue::Float(*x),
            Value::Integer(i) => ForeignValue::Int(*i),
            Value::Boolean(b) => ForeignValue::Bool(*b),
            Value::String(s) => ForeignValue::Str(s.clone()),
            Value::Point(p) => ForeignValue::floats(tags::POINT, &[p.x, p.y]),
            Value::Rect(r) => ForeignValue::floats(
                tags::RECT,
                &[r.origin.x, r.origin.y, r.size.width, r.size.height],
            ),
            Value::Color(c) => ForeignValue::floats(tags::COLOR, &c.components()),
            Value::Array(items) if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Number(_))) => {
                ForeignValue::FloatArray(items.iter().filter_map(|v| v.as_number().ok()).collect())
            }
            Value::Array(items) => ForeignValue::Block {
                tag: tags::ARRAY,
                fields: items
                    .iter()
                    .map(ForeignValue::try_from)
                    .collect::<Result<_, _>>()?,
            },
            Value::Image(handle) => ForeignValue::Handle(*handle),
            Value::Error(_) | Value::Function(_) => {
                return Err(BridgeError::Unrepresentable(value.kind()))
            }
        })
    }
}

impl TryFrom<Value> for ForeignValue {
    type Error = BridgeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        ForeignValue::try_from(&value)
    }
}

impl TryFrom<ForeignValue> for Value {
    type Error = BridgeError;

    fn try_from(foreign: ForeignValue) -> Result<Self, BridgeError> {
        Ok(match foreign {
            ForeignValue::Float(x) => Value::Number(x),
            ForeignValue::Int(i) => Value::Integer(i),
            ForeignValue::Bool(b) => Value::Boolean(b),
            ForeignValue::Str(s) => Value::String(s),
            ForeignValue::FloatArray(xs) => Value::Array(xs.into_iter().map(Value::Number).collect()),
            ForeignValue::Handle(handle) => Value::Image(handle),
            ForeignValue::Block { tag, fields } => match tag {
                tags::POINT => {
                    let [x, y] = float_fields(tag, &fields)?;
                    Value::Point(Point::new(x, y))
                }
                tags::RECT => {
                    let [x, y, width, height] = float_fields(tag, &fields)?;
                    if width < 0.0 || height < 0.0 {
                        return Err(malformed(tag, "negative size"));
                    }
                    Value::Rect(Rect::new(x, y, width, height))
                }
                tags::COLOR => {
                    let [r, g, b, a] = float_fields(tag, &fields)?;
                    if [r, g, b, a].iter().any(|c| !(0.0..=1.0).contains(c)) {
                        return Err(malformed(tag, "color component outside [0, 1]"));
                    }
                    Value::Color(Color::new(r, g, b, a))
                }
                tags::ARRAY => Value::Array(
                    fields
                        .into_iter()
                        .map(Value::try_from)
                        .collect::<Result<_, _>>()?,
                ),
                other => return Err(BridgeError::UnknownTag(other)),
            },
        })
    }
}

fn malformed(tag: u8, reason: impl Into<String>) -> BridgeError {
    BridgeError::Malformed {
        tag,
        reason: reason.into(),
    }
}

/// Exactly `N` numeric fields.
fn float_fields<const N: usize>(tag: u8, fields: &[ForeignValue]) -> Result<[f64; N], BridgeError> {
    if fields.len() != N {
        return Err(malformed(
            tag,
            format!("expected {} fields, found {}", N, fields.len()),
        ));
    }
    let mut out = [0.0; N];
    for (slot, field) in out.iter_mut().zip(fields) {
        *slot = field
            .as_float()
            .ok_or_else(|| malformed(tag, "non-numeric field"))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ValueKind;

    fn round_trip(value: Value) -> Value {
        Value::try_from(ForeignValue::try_from(&value).unwrap()).unwrap()
    }

    #[test]
    fn test_structured_values_survive() {
        let nested = Value::Array(vec![
            Value::point(1.0, 2.0),
            Value::Integer(3),
            Value::Array(vec![Value::Color(Color::RED)]),
        ]);
        assert_eq!(round_trip(nested.clone()), nested);
        assert_eq!(round_trip(Value::rect(0.0, 1.0, 2.0, 3.0)), Value::rect(0.0, 1.0, 2.0, 3.0));
    }

    #[test]
    fn test_number_arrays_are_unboxed() {
        let numbers = Value::Array(vec![Value::Number(1.0), Value::Number(2.5)]);
        assert_eq!(
            ForeignValue::try_from(&numbers).unwrap(),
            ForeignValue::FloatArray(vec![1.0, 2.5])
        );
        // Integers keep their identity, so mixed arrays stay boxed.
        let mixed = Value::Array(vec![Value::Number(1.0), Value::Integer(2)]);
        assert!(matches!(
            ForeignValue::try_from(&mixed).unwrap(),
            ForeignValue::Block { tag: tags::ARRAY, .. }
        ));
    }

    #[test]
    fn test_unrepresentable_values_rejected() {
        assert_eq!(
            ForeignValue::try_from(&Value::error("boom")).unwrap_err(),
            BridgeError::Unrepresentable(ValueKind::Error)
        );
        let poisoned = Value::Array(vec![Value::Number(1.0), Value::error("boom")]);
        assert!(ForeignValue::try_from(poisoned).is_err());
    }

    #[test]
    fn test_bad_blocks_rejected() {
        assert_eq!(
            Value::try_from(ForeignValue::floats(9, &[1.0])).unwrap_err(),
            BridgeError::UnknownTag(9)
        );
        assert!(matches!(
            Value::try_from(ForeignValue::floats(tags::POINT, &[1.0])),
            Err(BridgeError::Malformed { tag: tags::POINT, .. })
        ));
        assert!(matches!(
            Value::try_from(ForeignValue::floats(tags::COLOR, &[2.0, 0.0, 0.0, 1.0])),
            Err(BridgeError::Malformed { tag: tags::COLOR, .. })
        ));
        let text_field = ForeignValue::Block {
            tag: tags::POINT,
            fields: vec![ForeignValue::Str("x".into()), ForeignValue::Float(0.0)],
        };
        assert!(Value::try_from(text_field).is_err());
    }
}
