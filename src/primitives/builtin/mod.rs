//! Built-in primitive implementations.
//!
//! This module contains the standard primitives that ship with ImageFlow.

mod collection;
mod color;
mod geometry;
mod logic;
mod math;

use crate::primitives::registry::PrimitiveRegistry;

/// Register all built-in primitives.
pub fn register_all(registry: &mut PrimitiveRegistry) {
    math::register(registry);
    logic::register(registry);
    geometry::register(registry);
    color::register(registry);
    collection::register(registry);
}
