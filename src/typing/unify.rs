//! Type variables and unification.
//!
//! Variables live in a union-find table keyed by variable id:
//! - `find` follows parent links with path compression
//! - unions between unbound variables are by rank
//! - only the representative of a class carries a binding
//!
//! Binding a variable is the only mutation besides path compression; the
//! occurs check keeps every binding acyclic.

use crate::typing::ty::{Type, TypeVar};
use std::collections::HashMap;
use thiserror::Error;

/// Low-level unification failure, before it is attributed to an expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnifyError {
    #[error("cannot unify {left} with {right}")]
    Mismatch { left: Type, right: Type },

    #[error("{var} occurs in {ty}")]
    InfiniteType { var: Type, ty: Type },
}

#[derive(Debug, Clone)]
enum Slot {
    Root { rank: u8, binding: Option<Type> },
    Link(u32),
}

/// Union-find table of type variables.
#[derive(Debug, Clone, Default)]
pub struct TypeVarTable {
    slots: Vec<Slot>,
}

impl TypeVarTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Mint a fresh, unbound variable.
    pub fn fresh(&mut self) -> Type {
        let id = self.slots.len() as u32;
        self.slots.push(Slot::Root {
            rank: 0,
            binding: None,
        });
        Type::Var(TypeVar(id))
    }

    /// Number of variables minted so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no variable was minted.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Representative of `var`'s class, compressing the path on the way.
    pub fn find(&mut self, var: TypeVar) -> TypeVar {
        let root = self.probe(var);
        let mut current = var.0;
        while let Some(Slot::Link(parent)) = self.slots.get(current as usize) {
            let parent = *parent;
            self.slots[current as usize] = Slot::Link(root.0);
            current = parent;
        }
        root
    }

    /// Representative of `var`'s class, without mutating the table.
    pub fn probe(&self, var: TypeVar) -> TypeVar {
        let mut current = var.0;
        while let Some(Slot::Link(parent)) = self.slots.get(current as usize) {
            current = *parent;
        }
        TypeVar(current)
    }

    /// Type bound to `var`'s class, if any.
    pub fn binding(&self, var: TypeVar) -> Option<&Type> {
        match self.slots.get(self.probe(var).0 as usize) {
            Some(Slot::Root { binding, .. }) => binding.as_ref(),
            _ => None,
        }
    }

    fn rank(&self, root: TypeVar) -> u8 {
        match self.slots.get(root.0 as usize) {
            Some(Slot::Root { rank, .. }) => *rank,
            _ => 0,
        }
    }

    /// Follow bindings until the head of the type is not a bound variable.
    pub fn shallow_resolve(&mut self, ty: &Type) -> Type {
        let mut ty = ty.clone();
        while let Type::Var(var) = ty {
            let root = self.find(var);
            match self.binding(root) {
                Some(bound) => ty = bound.clone(),
                None => return Type::Var(root),
            }
        }
        ty
    }

    /// Substitute every bound variable in `ty`, recursively.
    ///
    /// Unbound variables are replaced by their representative.
    pub fn resolve(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(var) => {
                let root = self.probe(*var);
                match self.binding(root) {
                    Some(bound) => self.resolve(bound),
                    None => Type::Var(root),
                }
            }
            Type::Array(element) => Type::array(self.resolve(element)),
            Type::Function(params, result) => Type::function(
                params.iter().map(|p| self.resolve(p)).collect(),
                self.resolve(result),
            ),
            Type::Base(_) | Type::Generic(_) => ty.clone(),
        }
    }

    /// Resolve `ty` and replace its unbound variables with generics,
    /// numbered by order of first appearance.
    pub fn generalize(&self, ty: &Type) -> Type {
        let mut names = HashMap::new();
        self.generalize_with(ty, &mut names)
    }

    /// Generalize several types with one shared numbering.
    pub fn generalize_all(&self, types: &[&Type]) -> Vec<Type> {
        let mut names = HashMap::new();
        types.iter().map(|ty| self.generalize_with(ty, &mut names)).collect()
    }

    fn generalize_with(&self, ty: &Type, names: &mut HashMap<TypeVar, u32>) -> Type {
        match self.resolve(ty) {
            Type::Var(var) => {
                let next = names.len() as u32;
                Type::Generic(*names.entry(var).or_insert(next))
            }
            Type::Array(element) => Type::array(self.generalize_with(&element, names)),
            Type::Function(params, result) => Type::function(
                params.iter().map(|p| self.generalize_with(p, names)).collect(),
                self.generalize_with(&result, names),
            ),
            other => other,
        }
    }

    /// Replace the generics of `ty` with fresh variables (one per generic).
    pub fn instantiate(&mut self, ty: &Type) -> Type {
        let mut fresh = HashMap::new();
        self.instantiate_with(ty, &mut fresh)
    }

    /// Instantiate several types with one shared mapping of generics.
    pub fn instantiate_all(&mut self, types: &[Type]) -> Vec<Type> {
        let mut fresh = HashMap::new();
        types.iter().map(|ty| self.instantiate_with(ty, &mut fresh)).collect()
    }

    fn instantiate_with(&mut self, ty: &Type, fresh: &mut HashMap<u32, Type>) -> Type {
        match ty {
            Type::Generic(n) => {
                if let Some(var) = fresh.get(n) {
                    return var.clone();
                }
                let var = self.fresh();
                fresh.insert(*n, var.clone());
                var
            }
            Type::Array(element) => Type::array(self.instantiate_with(element, fresh)),
            Type::Function(params, result) => {
                let params = params.iter().map(|p| self.instantiate_with(p, fresh)).collect();
                let result = self.instantiate_with(result, fresh);
                Type::function(params, result)
            }
            Type::Base(_) | Type::Var(_) => ty.clone(),
        }
    }

    /// Check if `var` occurs in `ty` once bindings are followed.
    pub fn occurs(&self, var: TypeVar, ty: &Type) -> bool {
        let var = self.probe(var);
        match ty {
            Type::Var(other) => {
                let other = self.probe(*other);
                if other == var {
                    return true;
                }
                match self.binding(other) {
                    Some(bound) => self.occurs(var, bound),
                    None => false,
                }
            }
            Type::Array(element) => self.occurs(var, element),
            Type::Function(params, result) => {
                params.iter().any(|p| self.occurs(var, p)) || self.occurs(var, result)
            }
            Type::Base(_) | Type::Generic(_) => false,
        }
    }

    /// Make `expected` and `found` equal.
    ///
    /// On failure the table may hold bindings made before the conflict was
    /// found; callers discard the table with the failed inference.
    pub fn unify(&mut self, expected: &Type, found: &Type) -> Result<(), UnifyError> {
        let a = self.shallow_resolve(expected);
        let b = self.shallow_resolve(found);

        match (&a, &b) {
            (Type::Var(x), Type::Var(y)) => {
                if x != y {
                    self.union(*x, *y);
                }
                Ok(())
            }
            (Type::Var(x), other) | (other, Type::Var(x)) => self.bind(*x, other),
            (Type::Base(p), Type::Base(q)) if p == q => Ok(()),
            (Type::Generic(m), Type::Generic(n)) if m == n => Ok(()),
            (Type::Array(p), Type::Array(q)) => self.unify(p, q).map_err(|e| self.widen(e, &a, &b)),
            (Type::Function(ps, r), Type::Function(qs, s)) if ps.len() == qs.len() => {
                for (p, q) in ps.iter().zip(qs.iter()) {
                    self.unify(p, q).map_err(|e| self.widen(e, &a, &b))?;
                }
                self.unify(r, s).map_err(|e| self.widen(e, &a, &b))
            }
            _ => Err(self.mismatch(&a, &b)),
        }
    }

    fn mismatch(&self, a: &Type, b: &Type) -> UnifyError {
        UnifyError::Mismatch {
            left: self.resolve(a),
            right: self.resolve(b),
        }
    }

    /// Report a nested mismatch in terms of the enclosing types.
    fn widen(&self, error: UnifyError, a: &Type, b: &Type) -> UnifyError {
        match error {
            UnifyError::Mismatch { .. } => self.mismatch(a, b),
            infinite => infinite,
        }
    }

    fn bind(&mut self, var: TypeVar, ty: &Type) -> Result<(), UnifyError> {
        if self.occurs(var, ty) {
            return Err(UnifyError::InfiniteType {
                var: Type::Var(var),
                ty: self.resolve(ty),
            });
        }
        let root = self.find(var);
        if let Some(Slot::Root { binding, .. }) = self.slots.get_mut(root.0 as usize) {
            *binding = Some(ty.clone());
        }
        Ok(())
    }

    fn union(&mut self, x: TypeVar, y: TypeVar) {
        let x = self.find(x);
        let y = self.find(y);
        if x == y {
            return;
        }
        let (rank_x, rank_y) = (self.rank(x), self.rank(y));
        let (child, parent) = if rank_x < rank_y { (x, y) } else { (y, x) };
        self.slots[child.0 as usize] = Slot::Link(parent.0);
        if rank_x == rank_y {
            if let Some(Slot::Root { rank, .. }) = self.slots.get_mut(parent.0 as usize) {
                *rank = rank.saturating_add(1);
            }
        }
    }
}
