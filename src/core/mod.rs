//! Core types shared by every layer of ImageFlow.
//!
//! This module contains:
//! - The value model (numbers, geometry, colors, strings, arrays, image handles, errors)
//! - Error types for both the edit path and the query path

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{
    BridgeError, Culprit, FlowError, GraphError, NodeId, NodeIndex, NodeTypeError, TypeError,
    ValidationError, ValueError,
};
pub use types::{Callable, Closure, Color, ImageHandle, Point, Rect, Size, Value, ValueKind};
