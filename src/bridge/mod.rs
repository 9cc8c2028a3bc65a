//! Bridge to a foreign numeric runtime.
//!
//! Values cross in both directions through [`ForeignValue`]; expressions
//! can be shipped whole through [`compile`]. A function living in the
//! foreign runtime joins the primitive registry as a [`ForeignPrimitive`].

pub mod compile;
pub mod value;

pub use compile::{compile, ForeignCompiler};
pub use value::{tags, ForeignValue};

use crate::core::error::{BridgeError, ValueError};
use crate::core::types::Value;
use crate::primitives::registry::{Category, PrimitiveOp, PrimitiveSignature};
use std::sync::Arc;

/// A function implemented by the foreign runtime.
pub trait ForeignFunction: Send + Sync {
    /// Call with converted arguments; `Err` carries the runtime's message.
    fn call(&self, args: &[ForeignValue]) -> Result<ForeignValue, String>;
}

impl<F> ForeignFunction for F
where
    F: Fn(&[ForeignValue]) -> Result<ForeignValue, String> + Send + Sync,
{
    fn call(&self, args: &[ForeignValue]) -> Result<ForeignValue, String> {
        self(args)
    }
}

/// A primitive whose body runs in the foreign runtime.
#[derive(Clone)]
pub struct ForeignPrimitive {
    signature: PrimitiveSignature,
    function: Arc<dyn ForeignFunction>,
}

impl ForeignPrimitive {
    /// Wrap a foreign function. The signature is placed in the
    /// [`Category::Foreign`] palette group.
    pub fn new<F: ForeignFunction + 'static>(signature: PrimitiveSignature, function: F) -> Self {
        Self {
            signature: signature.with_category(Category::Foreign),
            function: Arc::new(function),
        }
    }

    fn call(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let foreign = args
            .iter()
            .map(ForeignValue::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let result = self
            .function
            .call(&foreign)
            .map_err(|message| BridgeError::Foreign {
                name: self.signature.name.clone(),
                message,
            })?;
        Value::try_from(result)
    }
}

impl std::fmt::Debug for ForeignPrimitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignPrimitive")
            .field("name", &self.signature.name)
            .finish()
    }
}

impl PrimitiveOp for ForeignPrimitive {
    fn signature(&self) -> &PrimitiveSignature {
        &self.signature
    }

    fn apply(&self, args: &[Value]) -> Result<Value, ValueError> {
        self.call(args).map_err(|e| {
            log::warn!("{}", e);
            ValueError::Domain(e.to_string())
        })
    }
}
