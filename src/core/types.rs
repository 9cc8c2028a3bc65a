//! Core value types produced by evaluating expressions.
//!
//! The value model is a closed enum for the same reasons the graph uses one
//! everywhere else:
//! - Closed set of types: parameters of image operations are a finite set
//! - Exhaustive matching catches missing cases at compile time
//! - Serialization: serde handles enums natively
//!
//! Values are immutable once built. Evaluation never fails with a Rust error;
//! failures are carried as [`Value::Error`] and poison every operation that
//! consumes them.

use crate::core::error::ValueError;
use crate::expr::ast::Expression;
use crate::expr::eval::Env;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A value flowing out of a node or an expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// 64-bit floating point number
    Number(f64),
    /// 64-bit signed integer (readable as a number)
    Integer(i64),
    /// Boolean value
    Boolean(bool),
    /// 2D point
    Point(Point),
    /// Axis-aligned rectangle
    Rect(Rect),
    /// RGBA color with components in `[0, 1]`
    Color(Color),
    /// UTF-8 string
    String(String),
    /// Ordered sequence of values
    Array(Vec<Value>),
    /// Opaque reference to an image owned by the image-processing engine
    Image(ImageHandle),
    /// Evaluation failure carried as a value
    Error(String),
    /// A callable produced by evaluating a lambda or a bare primitive.
    #[serde(skip)]
    Function(Callable),
}

/// Discriminant of a [`Value`], used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Number,
    Integer,
    Boolean,
    Point,
    Rect,
    Color,
    String,
    Array,
    Image,
    Error,
    Function,
}

/// 2D point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// 2D extent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Rectangle given by its origin (minimum corner) and size.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

/// RGBA color value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

/// Handle on an image living in the external image-processing engine.
///
/// Only the identity and the (optional) extent are known to the core;
/// pixels never cross this boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImageHandle {
    /// Identity of the image in the engine.
    pub id: Uuid,
    /// Extent of the image, if finite and known.
    pub extent: Option<Rect>,
}

impl PartialEq for ImageHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Something that can be invoked with a list of argument values.
#[derive(Debug, Clone)]
pub enum Callable {
    /// A lambda together with the environment it closed over.
    Lambda(Arc<Closure>),
    /// A built-in operation looked up by name at call time.
    Primitive(String),
}

/// A lambda captured at evaluation time.
#[derive(Debug)]
pub struct Closure {
    /// Parameter names, bound positionally.
    pub params: Vec<String>,
    /// Lambda body.
    pub body: Arc<Expression>,
    /// Bindings visible where the lambda was evaluated.
    pub env: Env,
}

impl Closure {
    /// Number of arguments this closure must be called with.
    pub fn arity(&self) -> usize {
        if self.params.is_empty() {
            self.body.argument_arity()
        } else {
            self.params.len()
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Lambda(a), Callable::Lambda(b)) => Arc::ptr_eq(a, b),
            (Callable::Primitive(a), Callable::Primitive(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Value Implementation
// ============================================================================

impl Value {
    /// Build an error value.
    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(message.into())
    }

    /// Build a point value.
    pub fn point(x: f64, y: f64) -> Self {
        Value::Point(Point::new(x, y))
    }

    /// Build a rect value.
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Value::Rect(Rect::new(x, y, width, height))
    }

    /// Build a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Get the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Integer(_) => ValueKind::Integer,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Point(_) => ValueKind::Point,
            Value::Rect(_) => ValueKind::Rect,
            Value::Color(_) => ValueKind::Color,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Image(_) => ValueKind::Image,
            Value::Error(_) => ValueKind::Error,
            Value::Function(_) => ValueKind::Function,
        }
    }

    /// Check if this value is an evaluation error.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Check if this value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if this value is an image handle.
    pub fn is_image(&self) -> bool {
        matches!(self, Value::Image(_))
    }

    /// Check if this value can be called.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    fn mismatch(&self, expected: ValueKind) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    /// Read this value as a number.
    /// Integers are converted to numbers.
    pub fn as_number(&self) -> Result<f64, ValueError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Integer(i) => Ok(*i as f64),
            _ => Err(self.mismatch(ValueKind::Number)),
        }
    }

    /// Read this value as an integer.
    /// Numbers with an integral value are accepted.
    pub fn as_integer(&self) -> Result<i64, ValueError> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Ok(*n as i64),
            _ => Err(self.mismatch(ValueKind::Integer)),
        }
    }

    /// Read this value as a boolean.
    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch(ValueKind::Boolean)),
        }
    }

    /// Read this value as a point.
    pub fn as_point(&self) -> Result<Point, ValueError> {
        match self {
            Value::Point(p) => Ok(*p),
            _ => Err(self.mismatch(ValueKind::Point)),
        }
    }

    /// Read this value as a rect.
    pub fn as_rect(&self) -> Result<Rect, ValueError> {
        match self {
            Value::Rect(r) => Ok(*r),
            _ => Err(self.mismatch(ValueKind::Rect)),
        }
    }

    /// Read this value as a color.
    pub fn as_color(&self) -> Result<Color, ValueError> {
        match self {
            Value::Color(c) => Ok(*c),
            _ => Err(self.mismatch(ValueKind::Color)),
        }
    }

    /// Read this value as a string slice.
    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            _ => Err(self.mismatch(ValueKind::String)),
        }
    }

    /// Read this value as an array.
    pub fn as_array(&self) -> Result<&[Value], ValueError> {
        match self {
            Value::Array(items) => Ok(items),
            _ => Err(self.mismatch(ValueKind::Array)),
        }
    }

    /// Read this value as an image handle.
    pub fn as_image(&self) -> Result<ImageHandle, ValueError> {
        match self {
            Value::Image(handle) => Ok(*handle),
            _ => Err(self.mismatch(ValueKind::Image)),
        }
    }

    /// Read this value as something callable.
    pub fn as_callable(&self) -> Result<&Callable, ValueError> {
        match self {
            Value::Function(callable) => Ok(callable),
            _ => Err(self.mismatch(ValueKind::Function)),
        }
    }

    /// Get the error message, if this is an error value.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Value::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Flatten nested arrays into one ordered sequence.
    ///
    /// Non-array elements are kept as single entries; a non-array value
    /// flattens to a sequence containing only itself.
    pub fn flat_array(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Value>) {
        match self {
            Value::Array(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other.clone()),
        }
    }

    /// Flattened view of this value as an array value.
    pub fn flatten(&self) -> Value {
        Value::Array(self.flat_array())
    }

    /// False when any float inside is infinite or NaN.
    ///
    /// JSON has no spelling for those, so only finite values can be stored.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Number(n) => n.is_finite(),
            Value::Point(p) => p.x.is_finite() && p.y.is_finite(),
            Value::Rect(r) => [r.origin.x, r.origin.y, r.size.width, r.size.height]
                .iter()
                .all(|v| v.is_finite()),
            Value::Color(c) => c.components().iter().all(|v| v.is_finite()),
            Value::Array(items) => items.iter().all(Value::is_finite),
            _ => true,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Point> for Value {
    fn from(p: Point) -> Self {
        Value::Point(p)
    }
}

impl From<Rect> for Value {
    fn from(r: Rect) -> Self {
        Value::Rect(r)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<ImageHandle> for Value {
    fn from(handle: ImageHandle) -> Self {
        Value::Image(handle)
    }
}

/// Evaluation-context view of a typed failure: it becomes an error value.
impl From<ValueError> for Value {
    fn from(error: ValueError) -> Self {
        Value::Error(error.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Point(p) => write!(f, "{}", p),
            Value::Rect(r) => write!(f, "{}", r),
            Value::Color(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Image(handle) => {
                let id = handle.id.to_string();
                write!(f, "Image({})", &id[..8])
            }
            Value::Error(message) => write!(f, "Error({})", message),
            Value::Function(Callable::Lambda(closure)) => {
                write!(f, "<lambda/{}>", closure.arity())
            }
            Value::Function(Callable::Primitive(name)) => write!(f, "<primitive {}>", name),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "Number",
            ValueKind::Integer => "Integer",
            ValueKind::Boolean => "Boolean",
            ValueKind::Point => "Point",
            ValueKind::Rect => "Rect",
            ValueKind::Color => "Color",
            ValueKind::String => "String",
            ValueKind::Array => "Array",
            ValueKind::Image => "Image",
            ValueKind::Error => "Error",
            ValueKind::Function => "Function",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Geometry
// ============================================================================

impl Point {
    /// Create a new point.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The origin.
    pub const ORIGIN: Point = Point::new(0.0, 0.0);
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Size {
    /// Create a new size.
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Rect {
    /// Create a rect from origin coordinates and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// Create the smallest rect containing both corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let min_x = a.x.min(b.x);
        let min_y = a.y.min(b.y);
        Self::new(min_x, min_y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    /// Maximum x coordinate.
    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    /// Maximum y coordinate.
    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    /// Whether the rect has no area.
    pub fn is_empty(&self) -> bool {
        self.size.width <= 0.0 || self.size.height <= 0.0
    }

    /// Check if a point lies inside the rect (max edges excluded).
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.origin.x && p.x < self.max_x() && p.y >= self.origin.y && p.y < self.max_y()
    }

    /// Smallest rect containing both rects.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.origin.x.min(other.origin.x);
        let y = self.origin.y.min(other.origin.y);
        Rect::new(x, y, self.max_x().max(other.max_x()) - x, self.max_y().max(other.max_y()) - y)
    }

    /// Overlap of both rects; empty (zero-sized) when they are disjoint.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x = self.origin.x.max(other.origin.x);
        let y = self.origin.y.max(other.origin.y);
        let max_x = self.max_x().min(other.max_x());
        let max_y = self.max_y().min(other.max_y());
        if max_x <= x || max_y <= y {
            Rect::new(x, y, 0.0, 0.0)
        } else {
            Rect::new(x, y, max_x - x, max_y - y)
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}, {}, {}x{})",
            self.origin.x, self.origin.y, self.size.width, self.size.height
        )
    }
}

impl ImageHandle {
    /// Create a handle for a freshly produced image.
    pub fn new(extent: Option<Rect>) -> Self {
        Self {
            id: Uuid::new_v4(),
            extent,
        }
    }
}

// ============================================================================
// Color Implementation
// ============================================================================

impl Color {
    /// Create a new color from RGBA components.
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color from RGB components.
    pub const fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse a hex color string.
    ///
    /// Supports formats: "#RGB", "#RGBA", "#RRGGBB", "#RRGGBBAA"
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(format!("Invalid hex color '{}': non-hexadecimal characters", hex));
        }
        let channel = |s: &str, scale: f64| -> Result<f64, String> {
            u8::from_str_radix(s, 16)
                .map(|v| f64::from(v) * scale / 255.0)
                .map_err(|e| e.to_string())
        };

        match hex.len() {
            3 | 4 => {
                let mut c = [1.0; 4];
                for (i, slot) in c.iter_mut().enumerate().take(hex.len()) {
                    *slot = channel(&hex[i..i + 1], 17.0)?;
                }
                Ok(Self::new(c[0], c[1], c[2], c[3]))
            }
            6 | 8 => {
                let mut c = [1.0; 4];
                for (i, slot) in c.iter_mut().enumerate().take(hex.len() / 2) {
                    *slot = channel(&hex[2 * i..2 * i + 2], 1.0)?;
                }
                Ok(Self::new(c[0], c[1], c[2], c[3]))
            }
            _ => Err(format!(
                "Invalid hex color format: expected 3, 4, 6, or 8 characters, got {}",
                hex.len()
            )),
        }
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        let byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let a = byte(self.a);
        if a == 255 {
            format!("#{:02X}{:02X}{:02X}", byte(self.r), byte(self.g), byte(self.b))
        } else {
            format!(
                "#{:02X}{:02X}{:02X}{:02X}",
                byte(self.r),
                byte(self.g),
                byte(self.b),
                a
            )
        }
    }

    /// Components as an array, in RGBA order.
    pub fn components(&self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Source-over composition of `self` on top of `below`.
    pub fn over(&self, below: &Color) -> Color {
        let a = self.a + below.a * (1.0 - self.a);
        if a <= 0.0 {
            return Color::TRANSPARENT;
        }
        let mix = |top: f64, bottom: f64| (top * self.a + bottom * below.a * (1.0 - self.a)) / a;
        Color::new(mix(self.r, below.r), mix(self.g, below.g), mix(self.b, below.b), a)
    }

    /// Common colors
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
