//! Type inference over expression trees.
//!
//! [`TypeInferencer`] walks a tree once, generating and solving equality
//! constraints on the fly through a [`TypeVarTable`]. Scoping follows
//! evaluation:
//! - lambda parameters shadow everything else
//! - `in{N}` reads node input N, as does `#N` outside any lambda
//! - node parameters other than `output` are visible by name
//!
//! Failures name the operand they are attributed to, so the graph can map
//! an input slot back to the upstream node that feeds it.

use crate::core::error::{Culprit, NodeIndex, NodeTypeError, TypeError, TypeResult};
use crate::core::types::Value;
use crate::expr::ast::{input_slot, Expression, MAX_ARGUMENTS, OUTPUT_PARAMETER};
use crate::expr::printer::{print, Printer};
use crate::expr::visitor::ExpressionVisitor;
use crate::primitives::registry::PrimitiveRegistry;
use crate::typing::ty::Type;
use crate::typing::unify::{TypeVarTable, UnifyError};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// What is known about one input slot of a node before typing it.
#[derive(Debug, Clone, Default)]
pub struct InputType {
    /// Node feeding the slot, if connected.
    pub source: Option<NodeIndex>,
    /// Generalized output type of the source, if it typed successfully.
    pub ty: Option<Type>,
}

impl InputType {
    /// A slot fed by `source`, whose output type is `ty`.
    pub fn connected(source: NodeIndex, ty: Option<Type>) -> Self {
        Self {
            source: Some(source),
            ty,
        }
    }
}

/// Type-inference visitor.
pub struct TypeInferencer<'r> {
    registry: &'r PrimitiveRegistry,
    table: TypeVarTable,
    /// Types of the node inputs; grows with fresh variables on demand.
    inputs: Vec<Type>,
    /// Types of node parameters bound so far.
    params: HashMap<String, Type>,
    /// Lambda parameter scopes, innermost last.
    scopes: Vec<HashMap<String, Type>>,
    /// Lambda argument frames, innermost last.
    frames: Vec<Vec<Type>>,
}

impl<'r> TypeInferencer<'r> {
    /// Create an inferencer with no known inputs.
    pub fn new(registry: &'r PrimitiveRegistry) -> Self {
        Self {
            registry,
            table: TypeVarTable::new(),
            inputs: Vec::new(),
            params: HashMap::new(),
            scopes: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Create an inferencer for the top level of a node.
    ///
    /// Known input types are instantiated independently; unknown ones
    /// become fresh variables.
    pub fn with_inputs(registry: &'r PrimitiveRegistry, inputs: &[InputType]) -> Self {
        let mut inferencer = Self::new(registry);
        for input in inputs {
            let ty = match &input.ty {
                Some(ty) => inferencer.table.instantiate(ty),
                None => inferencer.table.fresh(),
            };
            inferencer.inputs.push(ty);
        }
        inferencer
    }

    /// Bind a node parameter name to a type.
    pub fn bind(&mut self, name: impl Into<String>, ty: Type) {
        self.params.insert(name.into(), ty);
    }

    /// Infer the type of an expression, possibly containing variables.
    pub fn infer(&mut self, expression: &Expression) -> TypeResult<Type> {
        expression.accept(self)
    }

    /// Resolve and generalize a type produced by this inferencer.
    pub fn generalize(&self, ty: &Type) -> Type {
        self.table.generalize(ty)
    }

    /// Type the expressions read from input `slot`, generalized.
    pub fn input_type(&self, slot: usize) -> Option<Type> {
        self.inputs.get(slot).map(|ty| self.table.generalize(ty))
    }

    /// Number of input slots read or known so far.
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn input(&mut self, slot: usize) -> TypeResult<Type> {
        if slot >= self.inputs.len() && slot >= MAX_ARGUMENTS {
            return Err(TypeError::ArgumentOutOfRange {
                index: slot,
                available: MAX_ARGUMENTS,
            });
        }
        while self.inputs.len() <= slot {
            let ty = self.table.fresh();
            self.inputs.push(ty);
        }
        Ok(self.inputs[slot].clone())
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    /// The operand a failure at `site` is attributed to.
    fn culprit(&self, site: &Expression) -> Culprit {
        match site {
            Expression::Variable { name } if !self.is_shadowed(name) => match input_slot(name) {
                Some(slot) => Culprit::Input(slot),
                None => Culprit::Expression(name.clone()),
            },
            Expression::Argument { index } if self.frames.is_empty() => Culprit::Input(*index),
            other => Culprit::Expression(print(other)),
        }
    }

    fn attribute(&self, error: UnifyError, culprit: Culprit) -> TypeError {
        match error {
            UnifyError::Mismatch { left, right } => {
                let mut types = self.table.generalize_all(&[&left, &right]).into_iter();
                let expected = types.next().unwrap_or(left);
                let found = types.next().unwrap_or(right);
                TypeError::UnificationFailure {
                    expected,
                    found,
                    culprit,
                }
            }
            UnifyError::InfiniteType { var, ty } => {
                let mut types = self.table.generalize_all(&[&var, &ty]).into_iter();
                let var_general = types.next().unwrap_or(var);
                let ty_general = types.next().unwrap_or(ty);
                TypeError::InfiniteType {
                    var: var_general,
                    ty: ty_general,
                    culprit,
                }
            }
        }
    }

    /// Unify, attributing a failure to `site`.
    fn unify_at(&mut self, expected: &Type, found: &Type, site: &Expression) -> TypeResult<()> {
        self.table
            .unify(expected, found)
            .map_err(|e| self.attribute(e, self.culprit(site)))
    }

    fn operand_types(&mut self, operands: &[Arc<Expression>]) -> TypeResult<Vec<Type>> {
        operands.iter().map(|operand| operand.accept(self)).collect()
    }

    fn value_type(&mut self, value: &Value) -> TypeResult<Type> {
        Ok(match value {
            Value::Number(_) | Value::Integer(_) => Type::number(),
            Value::Boolean(_) => Type::boolean(),
            Value::Point(_) => Type::point(),
            Value::Rect(_) => Type::rect(),
            Value::Color(_) => Type::color(),
            Value::String(_) => Type::string(),
            Value::Image(_) => Type::image(),
            Value::Error(_) | Value::Function(_) => self.table.fresh(),
            Value::Array(items) => {
                let element = self.table.fresh();
                for item in items {
                    let item_type = self.value_type(item)?;
                    self.table.unify(&element, &item_type).map_err(|e| {
                        self.attribute(e, Culprit::Expression(value.to_string()))
                    })?;
                }
                Type::array(element)
            }
        })
    }
}

impl ExpressionVisitor for TypeInferencer<'_> {
    type Output = TypeResult<Type>;

    fn visit_constant(&mut self, value: &Value) -> TypeResult<Type> {
        self.value_type(value)
    }

    fn visit_variable(&mut self, name: &str) -> TypeResult<Type> {
        if let Some(ty) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Ok(ty.clone());
        }
        if let Some(slot) = input_slot(name) {
            return self.input(slot);
        }
        self.params
            .get(name)
            .cloned()
            .ok_or_else(|| TypeError::UnboundVariable(name.to_string()))
    }

    fn visit_argument(&mut self, index: usize) -> TypeResult<Type> {
        match self.frames.last() {
            None => self.input(index),
            Some(frame) => frame.get(index).cloned().ok_or(TypeError::ArgumentOutOfRange {
                index,
                available: frame.len(),
            }),
        }
    }

    fn visit_primitive(&mut self, name: &str, operands: &[Arc<Expression>]) -> TypeResult<Type> {
        let scheme = self
            .registry
            .signature(name)
            .map(|signature| signature.scheme.clone())
            .ok_or_else(|| TypeError::UnknownPrimitive(name.to_string()))?;

        let (params, result) = match self.table.instantiate(&scheme.as_type()) {
            Type::Function(params, result) => (params, *result),
            other => (Vec::new(), other),
        };

        if operands.is_empty() {
            return Ok(if params.is_empty() {
                result
            } else {
                Type::function(params, result)
            });
        }
        if operands.len() != params.len() {
            return Err(TypeError::ArityMismatch {
                expected: params.len(),
                found: operands.len(),
                expression: Printer.visit_primitive(name, operands),
            });
        }
        for (param, operand) in params.iter().zip(operands) {
            let found = operand.accept(self)?;
            self.unify_at(param, &found, operand)?;
        }
        Ok(result)
    }

    fn visit_apply(&mut self, operator: &Arc<Expression>, operands: &[Arc<Expression>]) -> TypeResult<Type> {
        let operator_type = operator.accept(self)?;
        let operand_types = self.operand_types(operands)?;

        match self.table.shallow_resolve(&operator_type) {
            Type::Function(params, result) => {
                if params.len() != operand_types.len() {
                    return Err(TypeError::ArityMismatch {
                        expected: params.len(),
                        found: operand_types.len(),
                        expression: Printer.visit_apply(operator, operands),
                    });
                }
                for ((param, found), operand) in params.iter().zip(&operand_types).zip(operands) {
                    self.unify_at(param, found, operand)?;
                }
                Ok(*result)
            }
            other => {
                let result = self.table.fresh();
                let expected = Type::function(operand_types, result.clone());
                self.unify_at(&expected, &other, operator)?;
                Ok(result)
            }
        }
    }

    fn visit_map(&mut self, array: &Arc<Expression>, lambda: &Arc<Expression>) -> TypeResult<Type> {
        let array_type = array.accept(self)?;
        let element = self.table.fresh();
        self.unify_at(&Type::array(element.clone()), &array_type, array)?;

        let callable = lambda.accept(self)?;
        match self.table.shallow_resolve(&callable) {
            Type::Function(params, result) => {
                if params.len() != 1 {
                    return Err(TypeError::ArityMismatch {
                        expected: params.len(),
                        found: 1,
                        expression: Printer.visit_map(array, lambda),
                    });
                }
                self.unify_at(&params[0], &element, array)?;
                Ok(Type::array(*result))
            }
            other => {
                let result = self.table.fresh();
                let expected = Type::function(vec![element], result.clone());
                self.unify_at(&expected, &other, lambda)?;
                Ok(Type::array(result))
            }
        }
    }

    fn visit_lambda(&mut self, params: &[String], body: &Arc<Expression>) -> TypeResult<Type> {
        let arity = if params.is_empty() {
            body.argument_arity()
        } else {
            params.len()
        };
        if arity > MAX_ARGUMENTS {
            return Err(TypeError::ArgumentOutOfRange {
                index: arity - 1,
                available: MAX_ARGUMENTS,
            });
        }
        let frame: Vec<Type> = (0..arity).map(|_| self.table.fresh()).collect();
        let scope = params.iter().cloned().zip(frame.iter().cloned()).collect();

        self.scopes.push(scope);
        self.frames.push(frame.clone());
        let result = body.accept(self);
        self.frames.pop();
        self.scopes.pop();

        Ok(Type::function(frame, result?))
    }
}

/// Infer the generalized type of a closed expression.
pub fn infer_expression(registry: &PrimitiveRegistry, expression: &Expression) -> TypeResult<Type> {
    let mut inferencer = TypeInferencer::new(registry);
    let ty = inferencer.infer(expression)?;
    Ok(inferencer.generalize(&ty))
}

/// Infer the output type of a node.
///
/// Parameters other than `output` are typed in order, each seeing the
/// ones before it; `output` sees all of them. A failure attributed to an
/// input slot names the node feeding that slot as its origin.
pub fn infer_node(
    registry: &PrimitiveRegistry,
    node: NodeIndex,
    params: &IndexMap<String, Arc<Expression>>,
    inputs: &[InputType],
) -> Result<Type, NodeTypeError> {
    let mut inferencer = TypeInferencer::with_inputs(registry, inputs);
    let locate = |parameter: &str, error: TypeError| {
        let origin = match error.culprit() {
            Some(Culprit::Input(slot)) => inputs
                .get(*slot)
                .and_then(|input| input.source)
                .unwrap_or(node),
            _ => node,
        };
        NodeTypeError {
            node,
            origin,
            parameter: parameter.to_string(),
            error,
        }
    };

    for (name, expression) in params.iter().filter(|(name, _)| name.as_str() != OUTPUT_PARAMETER) {
        let ty = inferencer.infer(expression).map_err(|e| locate(name, e))?;
        inferencer.bind(name.clone(), ty);
    }

    let output = params.get(OUTPUT_PARAMETER).ok_or_else(|| {
        locate(
            OUTPUT_PARAMETER,
            TypeError::UnboundVariable(OUTPUT_PARAMETER.to_string()),
        )
    })?;
    let ty = inferencer
        .infer(output)
        .map_err(|e| locate(OUTPUT_PARAMETER, e))?;
    Ok(inferencer.generalize(&ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typing::ty::TypeVar;

    fn registry() -> PrimitiveRegistry {
        PrimitiveRegistry::with_builtins()
    }

    fn int(i: i64) -> Arc<Expression> {
        Expression::constant(Value::Integer(i))
    }

    #[test]
    fn test_constants() {
        let registry = registry();
        assert_eq!(infer_expression(&registry, &int(1)).unwrap(), Type::number());
        let array = Expression::constant(Value::Array(vec![]));
        assert_eq!(
            infer_expression(&registry, &array).unwrap(),
            Type::array(Type::Generic(0))
        );
        let mixed = Expression::constant(Value::Array(vec![Value::Integer(1), Value::string("a")]));
        assert!(matches!(
            infer_expression(&registry, &mixed),
            Err(TypeError::UnificationFailure { .. })
        ));
    }

    #[test]
    fn test_primitive_application() {
        let registry = registry();
        let expr = Expression::primitive("lt", vec![int(1), int(2)]);
        assert_eq!(infer_expression(&registry, &expr).unwrap(), Type::boolean());

        let bare = Expression::primitive_ref("array_get");
        assert_eq!(
            infer_expression(&registry, &bare).unwrap(),
            Type::function(
                vec![Type::array(Type::Generic(0)), Type::number()],
                Type::Generic(0)
            )
        );
    }

    #[test]
    fn test_generic_primitive_instantiated_per_use() {
        let registry = registry();
        // `if` is used at Number and at Array<String> in one tree.
        let strings = Value::Array(vec![Value::string("x")]);
        let expr = Expression::primitive(
            "point",
            vec![
                Expression::primitive("if", vec![Expression::constant(true), int(1), int(2)]),
                Expression::primitive(
                    "array_length",
                    vec![Expression::primitive(
                        "if",
                        vec![
                            Expression::constant(false),
                            Expression::constant(strings),
                            Expression::constant(Value::Array(vec![])),
                        ],
                    )],
                ),
            ],
        );
        assert_eq!(infer_expression(&registry, &expr).unwrap(), Type::point());

        let unknown = Expression::primitive("no_such_thing", vec![int(1)]);
        assert_eq!(
            infer_expression(&registry, &unknown),
            Err(TypeError::UnknownPrimitive("no_such_thing".to_string()))
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let registry = registry();
        let expr = Expression::primitive("add", vec![int(1)]);
        match infer_expression(&registry, &expr) {
            Err(TypeError::ArityMismatch { expected, found, expression }) => {
                assert_eq!((expected, found), (2, 1));
                assert_eq!(expression, "add(1)");
            }
            other => panic!("unexpected {:?}", other),
        }

        let apply = Expression::apply(
            Expression::lambda(vec!["x"], Expression::variable("x")),
            vec![int(1), int(2)],
        );
        assert!(matches!(
            infer_expression(&registry, &apply),
            Err(TypeError::ArityMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn test_lambda_and_apply() {
        let registry = registry();
        let identity = Expression::lambda(vec!["x"], Expression::variable("x"));
        assert_eq!(
            infer_expression(&registry, &identity).unwrap(),
            Type::function(vec![Type::Generic(0)], Type::Generic(0))
        );

        let applied = Expression::apply(identity, vec![Expression::constant(Value::point(0.0, 0.0))]);
        assert_eq!(infer_expression(&registry, &applied).unwrap(), Type::point());

        let positional = Expression::lambda(
            Vec::<String>::new(),
            Expression::primitive("rect_translate", vec![Expression::argument(1), Expression::argument(0)]),
        );
        assert_eq!(
            infer_expression(&registry, &positional).unwrap(),
            Type::function(vec![Type::point(), Type::rect()], Type::rect())
        );
    }

    #[test]
    fn test_apply_variable_operator() {
        let registry = registry();
        // |f| f(1) : (Number -> 'a) -> 'a
        let expr = Expression::lambda(
            vec!["f"],
            Expression::apply(Expression::variable("f"), vec![int(1)]),
        );
        assert_eq!(
            infer_expression(&registry, &expr).unwrap(),
            Type::function(
                vec![Type::function(vec![Type::number()], Type::Generic(0))],
                Type::Generic(0)
            )
        );
    }

    #[test]
    fn test_apply_non_function() {
        let registry = registry();
        let expr = Expression::apply(int(1), vec![int(2)]);
        assert!(matches!(
            infer_expression(&registry, &expr),
            Err(TypeError::UnificationFailure { .. })
        ));
    }

    #[test]
    fn test_map_typing() {
        let registry = registry();
        let expr = Expression::map(
            Expression::primitive("range", vec![int(3)]),
            Expression::lambda(vec!["i"], Expression::primitive("point", vec![Expression::variable("i"), int(0)])),
        );
        assert_eq!(
            infer_expression(&registry, &expr).unwrap(),
            Type::array(Type::point())
        );

        let not_array = Expression::map(int(1), Expression::primitive_ref("neg"));
        assert!(matches!(
            infer_expression(&registry, &not_array),
            Err(TypeError::UnificationFailure { .. })
        ));

        let binary = Expression::map(
            Expression::primitive("range", vec![int(3)]),
            Expression::primitive_ref("add"),
        );
        assert!(matches!(
            infer_expression(&registry, &binary),
            Err(TypeError::ArityMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn test_self_application_is_infinite() {
        let registry = registry();
        let expr = Expression::lambda(
            vec!["f"],
            Expression::apply(Expression::variable("f"), vec![Expression::variable("f")]),
        );
        assert!(matches!(
            infer_expression(&registry, &expr),
            Err(TypeError::InfiniteType { .. })
        ));
    }

    #[test]
    fn test_unbound_and_out_of_range() {
        let registry = registry();
        assert_eq!(
            infer_expression(&registry, &Expression::variable("sigma")),
            Err(TypeError::UnboundVariable("sigma".to_string()))
        );
        let lambda = Expression::lambda(vec!["x"], Expression::argument(3));
        assert_eq!(
            infer_expression(&registry, &lambda),
            Err(TypeError::ArgumentOutOfRange { index: 3, available: 1 })
        );
    }

    #[test]
    fn test_oversized_frames_rejected() {
        let registry = registry();
        let lambda = Expression::lambda(Vec::<String>::new(), Expression::argument(usize::MAX));
        assert_eq!(
            infer_expression(&registry, &lambda),
            Err(TypeError::ArgumentOutOfRange {
                index: usize::MAX - 1,
                available: MAX_ARGUMENTS
            })
        );
        let lambda = Expression::lambda(Vec::<String>::new(), Expression::argument(1 << 40));
        assert!(infer_expression(&registry, &lambda).is_err());
        assert_eq!(
            infer_expression(&registry, &Expression::argument(1 << 40)),
            Err(TypeError::ArgumentOutOfRange {
                index: 1 << 40,
                available: MAX_ARGUMENTS
            })
        );
        assert!(infer_expression(&registry, &Expression::input(1 << 40)).is_err());
    }

    #[test]
    fn test_inputs_and_arguments_share_types() {
        let registry = registry();
        let mut inferencer = TypeInferencer::new(&registry);
        let expr = Expression::primitive(
            "rect_contains",
            vec![Expression::input(0), Expression::argument(1)],
        );
        let ty = inferencer.infer(&expr).unwrap();
        assert_eq!(inferencer.generalize(&ty), Type::boolean());
        assert_eq!(inferencer.input_type(0), Some(Type::rect()));
        assert_eq!(inferencer.input_type(1), Some(Type::point()));
        assert_eq!(inferencer.input_count(), 2);
    }

    #[test]
    fn test_culprit_names_input_slot() {
        let registry = registry();
        let inputs = vec![
            InputType::connected(0, Some(Type::string())),
            InputType::connected(1, Some(Type::number())),
        ];
        let mut params = IndexMap::new();
        params.insert(
            OUTPUT_PARAMETER.to_string(),
            Expression::primitive("add", vec![Expression::input(0), Expression::input(1)]),
        );

        let error = infer_node(&registry, 2, &params, &inputs).unwrap_err();
        assert_eq!(error.node, 2);
        assert_eq!(error.origin, 0);
        assert_eq!(
            error.error,
            TypeError::UnificationFailure {
                expected: Type::number(),
                found: Type::string(),
                culprit: Culprit::Input(0),
            }
        );
    }

    #[test]
    fn test_culprit_names_subexpression() {
        let registry = registry();
        let expr = Expression::primitive(
            "add",
            vec![int(1), Expression::primitive("concat", vec![
                Expression::constant(Value::string("a")),
                Expression::constant(Value::string("b")),
            ])],
        );
        match infer_expression(&registry, &expr) {
            Err(TypeError::UnificationFailure { culprit, .. }) => {
                assert_eq!(culprit, Culprit::Expression("concat(\"a\", \"b\")".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_node_parameters_are_bound() {
        let registry = registry();
        let mut params = IndexMap::new();
        params.insert(OUTPUT_PARAMETER.to_string(), Expression::primitive("mul", vec![
            Expression::variable("gain"),
            Expression::input(0),
        ]));
        params.insert("gain".to_string(), Expression::constant(Value::Number(2.0)));

        let ty = infer_node(&registry, 0, &params, &[InputType::default()]).unwrap();
        assert_eq!(ty, Type::number());

        params.insert("gain".to_string(), Expression::constant(Value::string("loud")));
        let error = infer_node(&registry, 0, &params, &[]).unwrap_err();
        assert_eq!(error.origin, 0);
        assert_eq!(error.parameter, OUTPUT_PARAMETER);
    }

    #[test]
    fn test_generic_inputs_instantiated_independently() {
        let registry = registry();
        let identity = Type::function(vec![Type::Generic(0)], Type::Generic(0));
        let inputs = vec![
            InputType::connected(0, Some(identity.clone())),
            InputType::connected(1, Some(identity)),
        ];
        let mut params = IndexMap::new();
        params.insert(
            OUTPUT_PARAMETER.to_string(),
            Expression::primitive("point", vec![
                Expression::apply(Expression::input(0), vec![int(1)]),
                Expression::apply(Expression::input(1), vec![int(2)]),
            ]),
        );
        assert_eq!(infer_node(&registry, 2, &params, &inputs).unwrap(), Type::point());

        // Unknown inputs are unconstrained.
        let unknown = TypeInferencer::with_inputs(&registry, &[InputType::default()]);
        assert!(matches!(unknown.inputs[0], Type::Var(TypeVar(_))));
    }
}
