//! Expression evaluation.
//!
//! Evaluation is total: every failure (unknown names, arity mismatches,
//! operands of the wrong kind, errors raised by primitives) produces a
//! [`Value::Error`], and an error operand poisons the operation that
//! consumes it.

use crate::core::types::{Callable, Closure, Value};
use crate::expr::ast::{input_variable, Expression};
use crate::expr::visitor::ExpressionVisitor;
use crate::primitives::registry::PrimitiveRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Variable bindings visible to an expression.
pub type Env = HashMap<String, Value>;

/// Nesting limit for closure calls.
///
/// Well-typed trees cannot recurse, but evaluation does not require a
/// successful typing.
pub const MAX_CALL_DEPTH: usize = 256;

/// Evaluation visitor.
pub struct Evaluator<'r> {
    registry: &'r PrimitiveRegistry,
    bindings: Env,
    arguments: Vec<Value>,
    depth: usize,
}

impl<'r> Evaluator<'r> {
    /// Create an evaluator with no bindings and no arguments.
    pub fn new(registry: &'r PrimitiveRegistry) -> Self {
        Self {
            registry,
            bindings: Env::new(),
            arguments: Vec::new(),
            depth: 0,
        }
    }

    /// Create an evaluator for the top level of a node: input `i` is bound
    /// both to the variable `in{i}` and to argument `i`.
    ///
    /// An unconnected slot leaves `in{i}` unbound and argument `i` an error.
    pub fn for_inputs(registry: &'r PrimitiveRegistry, inputs: Vec<Option<Value>>) -> Self {
        let mut evaluator = Self::new(registry);
        for (slot, input) in inputs.into_iter().enumerate() {
            let name = input_variable(slot);
            let value = match input {
                Some(value) => {
                    evaluator.bind(name, value.clone());
                    value
                }
                None => Value::error(format!("unbound variable '{}'", name)),
            };
            evaluator.arguments.push(value);
        }
        evaluator
    }

    /// Replace the bindings.
    pub fn with_bindings(mut self, bindings: Env) -> Self {
        self.bindings = bindings;
        self
    }

    /// Replace the current argument frame.
    pub fn with_arguments(mut self, arguments: Vec<Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Bind a variable.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Evaluate an expression in the current bindings and argument frame.
    pub fn evaluate(&mut self, expression: &Expression) -> Value {
        expression.accept(self)
    }

    /// Number of arguments a callable must be invoked with.
    pub fn arity_of(&self, callable: &Callable) -> Option<usize> {
        match callable {
            Callable::Lambda(closure) => Some(closure.arity()),
            Callable::Primitive(name) => self.registry.arity(name),
        }
    }

    /// Invoke a callable.
    pub fn call(&mut self, callable: &Callable, args: Vec<Value>) -> Value {
        if let Some(error) = args.iter().find(|a| a.is_error()) {
            return error.clone();
        }
        match callable {
            Callable::Primitive(name) => self.registry.invoke(name, &args),
            Callable::Lambda(closure) => self.call_closure(closure, args),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Value {
        let arity = closure.arity();
        if args.len() != arity {
            return arity_mismatch(arity, args.len());
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Value::error(format!("call depth limit of {} exceeded", MAX_CALL_DEPTH));
        }

        let mut bindings = closure.env.clone();
        for (name, value) in closure.params.iter().zip(args.iter()) {
            bindings.insert(name.clone(), value.clone());
        }
        let saved_bindings = std::mem::replace(&mut self.bindings, bindings);
        let saved_arguments = std::mem::replace(&mut self.arguments, args);
        self.depth += 1;

        let result = closure.body.accept(self);

        self.depth -= 1;
        self.arguments = saved_arguments;
        self.bindings = saved_bindings;
        result
    }

    /// Resolve the operator of an application or the callable of a map.
    ///
    /// Lambda literals and bare primitives are taken as callables directly;
    /// anything else is evaluated and must produce a function.
    fn callable(&mut self, expression: &Expression) -> Result<Callable, Value> {
        match expression {
            Expression::Lambda { params, body } => Ok(self.close(params, body)),
            Expression::Primitive { name, operands } if operands.is_empty() => {
                if self.registry.contains(name) {
                    Ok(Callable::Primitive(name.clone()))
                } else {
                    Err(unknown_primitive(name))
                }
            }
            other => match other.accept(self) {
                Value::Function(callable) => Ok(callable),
                error @ Value::Error(_) => Err(error),
                value => Err(Value::error(format!(
                    "type mismatch: expected Function, found {}",
                    value.kind()
                ))),
            },
        }
    }

    fn close(&self, params: &[String], body: &Arc<Expression>) -> Callable {
        Callable::Lambda(Arc::new(Closure {
            params: params.to_vec(),
            body: Arc::clone(body),
            env: self.bindings.clone(),
        }))
    }

    /// Evaluate operands left to right, stopping at the first error.
    fn operands(&mut self, operands: &[Arc<Expression>]) -> Result<Vec<Value>, Value> {
        let mut values = Vec::with_capacity(operands.len());
        for operand in operands {
            let value = operand.accept(self);
            if value.is_error() {
                return Err(value);
            }
            values.push(value);
        }
        Ok(values)
    }
}

fn arity_mismatch(expected: usize, found: usize) -> Value {
    Value::error(format!(
        "arity mismatch: expected {} argument(s), found {}",
        expected, found
    ))
}

fn unknown_primitive(name: &str) -> Value {
    Value::error(format!("unknown primitive '{}'", name))
}

impl ExpressionVisitor for Evaluator<'_> {
    type Output = Value;

    fn visit_constant(&mut self, value: &Value) -> Value {
        value.clone()
    }

    fn visit_variable(&mut self, name: &str) -> Value {
        match self.bindings.get(name) {
            Some(value) => value.clone(),
            None => Value::error(format!("unbound variable '{}'", name)),
        }
    }

    fn visit_argument(&mut self, index: usize) -> Value {
        match self.arguments.get(index) {
            Some(value) => value.clone(),
            None => Value::error(format!(
                "argument index out of range: #{} with {} argument(s)",
                index,
                self.arguments.len()
            )),
        }
    }

    fn visit_primitive(&mut self, name: &str, operands: &[Arc<Expression>]) -> Value {
        let Some(arity) = self.registry.arity(name) else {
            return unknown_primitive(name);
        };
        if operands.is_empty() && arity > 0 {
            return Value::Function(Callable::Primitive(name.to_string()));
        }
        if operands.len() != arity {
            return arity_mismatch(arity, operands.len());
        }
        match self.operands(operands) {
            Ok(args) => self.registry.invoke(name, &args),
            Err(error) => error,
        }
    }

    fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) -> Value {
        let callable = match self.callable(operator) {
            Ok(callable) => callable,
            Err(error) => return error,
        };
        match self.operands(operands) {
            Ok(args) => self.call(&callable, args),
            Err(error) => error,
        }
    }

    fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) -> Value {
        let items = match array.accept(self) {
            Value::Array(items) => items,
            error @ Value::Error(_) => return error,
            value => {
                return Value::error(format!(
                    "type mismatch: expected Array, found {}",
                    value.kind()
                ))
            }
        };
        let callable = match self.callable(lambda) {
            Ok(callable) => callable,
            Err(error) => return error,
        };
        match self.arity_of(&callable) {
            Some(1) => {}
            Some(arity) => return arity_mismatch(arity, 1),
            None => return Value::error("map operand is not callable"),
        }
        Value::Array(
            items
                .into_iter()
                .map(|item| self.call(&callable, vec![item]))
                .collect(),
        )
    }

    fn visit_lambda(&mut self, params: &[String], body: &Arc<Expression>) -> Value {
        Value::Function(self.close(params, body))
    }
}

/// Evaluate `expression` with no bindings or arguments.
pub fn evaluate(registry: &PrimitiveRegistry, expression: &Expression) -> Value {
    Evaluator::new(registry).evaluate(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PrimitiveRegistry {
        PrimitiveRegistry::with_builtins()
    }

    fn int(i: i64) -> Arc<Expression> {
        Expression::constant(Value::Integer(i))
    }

    fn ints(values: &[i64]) -> Value {
        Value::Array(values.iter().copied().map(Value::Integer).collect())
    }

    #[test]
    fn test_constant_and_primitive() {
        let registry = registry();
        let sum = Expression::primitive("add", vec![int(2), int(3)]);
        assert_eq!(evaluate(&registry, &sum), Value::Integer(5));
    }

    #[test]
    fn test_unbound_variable_and_argument() {
        let registry = registry();
        let unbound = evaluate(&registry, &Expression::variable("sigma"));
        assert!(unbound.error_message().unwrap().contains("unbound variable"));

        let missing = evaluate(&registry, &Expression::argument(0));
        assert!(missing.error_message().unwrap().contains("out of range"));
    }

    #[test]
    fn test_inputs_bound_twice() {
        let registry = registry();
        let mut evaluator = Evaluator::for_inputs(&registry, vec![Some(Value::Integer(4)), None]);
        let expr = Expression::primitive("mul", vec![Expression::input(0), Expression::argument(0)]);
        assert_eq!(evaluator.evaluate(&expr), Value::Integer(16));

        let unconnected = evaluator.evaluate(&Expression::input(1));
        assert_eq!(unconnected, Value::error("unbound variable 'in1'"));
        assert_eq!(evaluator.evaluate(&Expression::argument(1)), unconnected);
    }

    #[test]
    fn test_primitive_arity_checked_first() {
        let registry = registry();
        let result = evaluate(
            &registry,
            &Expression::primitive("add", vec![Expression::variable("nope")]),
        );
        assert!(result.error_message().unwrap().starts_with("arity mismatch"));
    }

    #[test]
    fn test_error_operand_short_circuits() {
        let registry = registry();
        let expr = Expression::primitive(
            "add",
            vec![Expression::constant(Value::error("boom")), Expression::variable("nope")],
        );
        assert_eq!(evaluate(&registry, &expr), Value::error("boom"));
    }

    #[test]
    fn test_bare_primitive_is_function() {
        let registry = registry();
        assert_eq!(
            evaluate(&registry, &Expression::primitive_ref("add")),
            Value::Function(Callable::Primitive("add".to_string()))
        );
        // Nullary primitives are invoked.
        assert_eq!(
            evaluate(&registry, &Expression::primitive_ref("pi")),
            Value::Number(std::f64::consts::PI)
        );
        assert!(evaluate(&registry, &Expression::primitive_ref("nope")).is_error());
    }

    #[test]
    fn test_apply_lambda_literal() {
        let registry = registry();
        let expr = Expression::apply(
            Expression::lambda(
                vec!["x", "y"],
                Expression::primitive("sub", vec![Expression::variable("x"), Expression::variable("y")]),
            ),
            vec![int(10), int(4)],
        );
        assert_eq!(evaluate(&registry, &expr), Value::Integer(6));
    }

    #[test]
    fn test_apply_parameterless_lambda_uses_arguments() {
        let registry = registry();
        let expr = Expression::apply(
            Expression::lambda(
                Vec::<String>::new(),
                Expression::primitive("mul", vec![Expression::argument(0), Expression::argument(1)]),
            ),
            vec![int(3), int(7)],
        );
        assert_eq!(evaluate(&registry, &expr), Value::Integer(21));
    }

    #[test]
    fn test_apply_arity_mismatch_is_reported() {
        let registry = registry();
        let expr = Expression::apply(
            Expression::lambda(vec!["x"], Expression::variable("x")),
            vec![int(1), int(2)],
        );
        let result = evaluate(&registry, &expr);
        assert!(result.error_message().unwrap().starts_with("arity mismatch"));

        let primitive = Expression::apply(Expression::primitive_ref("neg"), vec![]);
        assert!(evaluate(&registry, &primitive).is_error());
    }

    #[test]
    fn test_apply_non_function() {
        let registry = registry();
        let expr = Expression::apply(int(1), vec![int(2)]);
        let result = evaluate(&registry, &expr);
        assert!(result.error_message().unwrap().starts_with("type mismatch"));
    }

    #[test]
    fn test_closure_captures_environment() {
        let registry = registry();
        // (|k| |x| add(x, k))(10) applied to 5
        let make_adder = Expression::lambda(
            vec!["k"],
            Expression::lambda(
                vec!["x"],
                Expression::primitive("add", vec![Expression::variable("x"), Expression::variable("k")]),
            ),
        );
        let expr = Expression::apply(Expression::apply(make_adder, vec![int(10)]), vec![int(5)]);
        assert_eq!(evaluate(&registry, &expr), Value::Integer(15));
    }

    #[test]
    fn test_map_preserves_length_and_order() {
        let registry = registry();
        let expr = Expression::map(
            Expression::constant(ints(&[1, 2, 3])),
            Expression::lambda(
                vec!["x"],
                Expression::primitive("mul", vec![Expression::variable("x"), int(2)]),
            ),
        );
        assert_eq!(evaluate(&registry, &expr), ints(&[2, 4, 6]));

        let empty = Expression::map(
            Expression::constant(Value::Array(vec![])),
            Expression::primitive_ref("neg"),
        );
        assert_eq!(evaluate(&registry, &empty), Value::Array(vec![]));
    }

    #[test]
    fn test_map_keeps_element_errors_in_place() {
        let registry = registry();
        let array = Value::Array(vec![Value::Integer(1), Value::error("bad"), Value::Integer(3)]);
        let expr = Expression::map(Expression::constant(array), Expression::primitive_ref("neg"));
        assert_eq!(
            evaluate(&registry, &expr),
            Value::Array(vec![Value::Integer(-1), Value::error("bad"), Value::Integer(-3)])
        );
    }

    #[test]
    fn test_map_rejects_non_array_and_wrong_arity() {
        let registry = registry();
        let not_array = Expression::map(int(1), Expression::primitive_ref("neg"));
        assert!(evaluate(&registry, &not_array).is_error());

        let binary = Expression::map(
            Expression::constant(ints(&[1])),
            Expression::primitive_ref("add"),
        );
        assert!(evaluate(&registry, &binary)
            .error_message()
            .unwrap()
            .starts_with("arity mismatch"));
    }

    #[test]
    fn test_self_application_hits_depth_limit() {
        let registry = registry();
        let omega = Expression::lambda(
            vec!["f"],
            Expression::apply(Expression::variable("f"), vec![Expression::variable("f")]),
        );
        let expr = Expression::apply(omega.clone(), vec![omega]);
        let result = evaluate(&registry, &expr);
        assert!(result.error_message().unwrap().contains("depth limit"));
    }
}
