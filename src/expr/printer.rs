//! Pretty-printing of expressions.
//!
//! The output is meant for people (palette tooltips, error messages):
//! - primitives print as calls, `add(in0, 1)`, or bare names when used as values
//! - arguments print as `#0`
//! - lambdas print as `|x, y| body`

use crate::core::types::Value;
use crate::expr::ast::Expression;
use crate::expr::visitor::ExpressionVisitor;
use std::sync::Arc;

/// Printing visitor.
#[derive(Debug, Default)]
pub struct Printer;

impl Printer {
    fn list(&mut self, items: &[Arc<Expression>]) -> String {
        items
            .iter()
            .map(|e| e.accept(self))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ExpressionVisitor for Printer {
    type Output = String;

    fn visit_constant(&mut self, value: &Value) -> String {
        value.to_string()
    }

    fn visit_variable(&mut self, name: &str) -> String {
        name.to_string()
    }

    fn visit_argument(&mut self, index: usize) -> String {
        format!("#{}", index)
    }

    fn visit_primitive(&mut self, name: &str, operands: &[Arc<Expression>]) -> String {
        if operands.is_empty() {
            name.to_string()
        } else {
            format!("{}({})", name, self.list(operands))
        }
    }

    fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) -> String {
        let operator_text = operator.accept(self);
        let operator_text = match operator.as_ref() {
            Expression::Variable { .. } | Expression::Argument { .. } => operator_text,
            Expression::Primitive { operands, .. } if operands.is_empty() => operator_text,
            _ => format!("({})", operator_text),
        };
        format!("{}({})", operator_text, self.list(operands))
    }

    fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) -> String {
        format!("map({}, {})", array.accept(self), lambda.accept(self))
    }

    fn visit_lambda(&mut self, params: &[String], body: &Arc<Expression>) -> String {
        format!("|{}| {}", params.join(", "), body.accept(self))
    }
}

/// Render an expression on one line.
pub fn print(expression: &Expression) -> String {
    expression.accept(&mut Printer)
}
