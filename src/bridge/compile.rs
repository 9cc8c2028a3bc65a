//! Compilation of expressions into foreign terms.
//!
//! A term is a [`ForeignValue::Block`] whose tag names the expression
//! variant. Names travel as `Str` fields, operand lists as nested
//! `ARRAY` blocks. Constants go through the value conversion, so an
//! expression embedding an error or function value does not compile.

use crate::bridge::value::{tags, ForeignValue};
use crate::core::error::BridgeError;
use crate::core::types::Value;
use crate::expr::ast::Expression;
use crate::expr::visitor::ExpressionVisitor;
use std::sync::Arc;

/// Term tags, disjoint from the value tags.
pub mod terms {
    /// `[value]`
    pub const CONSTANT: u8 = 16;
    /// `[name]`
    pub const VARIABLE: u8 = 17;
    /// `[index]`
    pub const ARGUMENT: u8 = 18;
    /// `[name, operands]`
    pub const PRIMITIVE: u8 = 19;
    /// `[operator, operands]`
    pub const APPLY: u8 = 20;
    /// `[array, lambda]`
    pub const MAP: u8 = 21;
    /// `[params, body]`
    pub const LAMBDA: u8 = 22;
}

/// Visitor producing foreign terms.
#[derive(Debug, Default)]
pub struct ForeignCompiler;

impl ForeignCompiler {
    fn list(&mut self, items: &[Arc<Expression>]) -> Result<ForeignValue, BridgeError> {
        Ok(ForeignValue::Block {
            tag: tags::ARRAY,
            fields: items
                .iter()
                .map(|e| e.accept(self))
                .collect::<Result<_, _>>()?,
        })
    }
}

fn term(tag: u8, fields: Vec<ForeignValue>) -> ForeignValue {
    ForeignValue::Block { tag, fields }
}

impl ExpressionVisitor for ForeignCompiler {
    type Output = Result<ForeignValue, BridgeError>;

    fn visit_constant(&mut self, value: &Value) -> Self::Output {
        Ok(term(terms::CONSTANT, vec![ForeignValue::try_from(value)?]))
    }

    fn visit_variable(&mut self, name: &str) -> Self::Output {
        Ok(term(terms::VARIABLE, vec![ForeignValue::Str(name.to_string())]))
    }

    fn visit_argument(&mut self, index: usize) -> Self::Output {
        Ok(term(terms::ARGUMENT, vec![ForeignValue::Int(index as i64)]))
    }

    fn visit_primitive(&mut self, name: &str, operands: &[Arc<Expression>]) -> Self::Output {
        Ok(term(
            terms::PRIMITIVE,
            vec![ForeignValue::Str(name.to_string()), self.list(operands)?],
        ))
    }

    fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) -> Self::Output {
        Ok(term(terms::APPLY, vec![operator.accept(self)?, self.list(operands)?]))
    }

    fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) -> Self::Output {
        Ok(term(terms::MAP, vec![array.accept(self)?, lambda.accept(self)?]))
    }

    fn visit_lambda(&mut self, params: &[String], body: &Arc<Expression>) -> Self::Output {
        let params = ForeignValue::Block {
            tag: tags::ARRAY,
            fields: params.iter().cloned().map(ForeignValue::Str).collect(),
        };
        Ok(term(terms::LAMBDA, vec![params, body.accept(self)?]))
    }
}

/// Compile an expression into a foreign term.
pub fn compile(expression: &Expression) -> Result<ForeignValue, BridgeError> {
    expression.accept(&mut ForeignCompiler)
}
