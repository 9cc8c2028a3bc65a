//! Multi-interpretation of expressions.
//!
//! Every interpretation of the language (evaluation, type inference,
//! printing, foreign compilation) implements [`ExpressionVisitor`]. The
//! dispatch in [`Expression::accept`] is an exhaustive match, so a new
//! expression variant cannot be added without extending the trait and
//! therefore every implementation.

use crate::core::types::Value;
use crate::expr::ast::Expression;
use std::sync::Arc;

/// One operation per expression variant.
pub trait ExpressionVisitor {
    /// Result of visiting one expression.
    type Output;

    /// Visit a constant.
    fn visit_constant(&mut self, value: &Value) -> Self::Output;

    /// Visit a variable reference.
    fn visit_variable(&mut self, name: &str) -> Self::Output;

    /// Visit a positional argument reference.
    fn visit_argument(&mut self, index: usize) -> Self::Output;

    /// Visit a primitive (possibly without operands).
    fn visit_primitive(&mut self, name: &str, operands: &[Arc<Expression>]) -> Self::Output;

    /// Visit an application.
    fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) -> Self::Output;

    /// Visit an elementwise map.
    fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) -> Self::Output;

    /// Visit a lambda.
    fn visit_lambda(&mut self, params: &[String], body: &Arc<Expression>) -> Self::Output;
}

impl Expression {
    /// Dispatch to the visitor operation matching this variant.
    pub fn accept<V: ExpressionVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            Expression::Constant { value } => visitor.visit_constant(value),
            Expression::Variable { name } => visitor.visit_variable(name),
            Expression::Argument { index } => visitor.visit_argument(*index),
            Expression::Primitive { name, operands } => visitor.visit_primitive(name, operands),
            Expression::Apply { operator, operands } => visitor.visit_apply(operator, operands),
            Expression::Map { array, lambda } => visitor.visit_map(array, lambda),
            Expression::Lambda { params, body } => visitor.visit_lambda(params, body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts nodes of each tree, as a minimal third-party interpretation.
    struct NodeCounter;

    impl ExpressionVisitor for NodeCounter {
        type Output = usize;

        fn visit_constant(&mut self, _value: &Value) -> usize {
            1
        }

        fn visit_variable(&mut self, _name: &str) -> usize {
            1
        }

        fn visit_argument(&mut self, _index: usize) -> usize {
            1
        }

        fn visit_primitive(&mut self, _name: &str, operands: &[Arc<Expression>]) -> usize {
            1 + operands.iter().map(|e| e.accept(self)).sum::<usize>()
        }

        fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) -> usize {
            1 + operator.accept(self) + operands.iter().map(|e| e.accept(self)).sum::<usize>()
        }

        fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) -> usize {
            1 + array.accept(self) + lambda.accept(self)
        }

        fn visit_lambda(&mut self, _params: &[String], body: &Arc<Expression>) -> usize {
            1 + body.accept(self)
        }
    }

    #[test]
    fn test_accept_reaches_every_variant() {
        let tree = Expression::map(
            Expression::constant(Value::Array(vec![])),
            Expression::lambda(
                vec!["x"],
                Expression::apply(
                    Expression::primitive_ref("add"),
                    vec![Expression::variable("x"), Expression::argument(0)],
                ),
            ),
        );
        assert_eq!(tree.accept(&mut NodeCounter), 7);
    }
}
