use crate::{
    ast::{BinaryOp, Expr, ExprKind},
    runtime::{ExecutionContext, FOR_EACH, LOOP},
    scope::Scope,
    value::Value,
};

/// Decides whether an expression always produces the same value without
/// observable side effects.
///
/// Without a scope the analysis is best-effort: anything that depends on a
/// binding is reported as non-constant.
#[derive(Debug, Clone, Copy)]
pub struct ConstantAnalyzer<'a> {
    scope: Option<&'a Scope>,
}

impl<'a> ConstantAnalyzer<'a> {
    pub fn context_free() -> Self {
        Self { scope: None }
    }

    pub fn with_scope(scope: &'a Scope) -> Self {
        Self { scope: Some(scope) }
    }

    pub fn is_constant(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::DoubleLiteral(_) | ExprKind::StringLiteral(_) | ExprKind::Constant(_) => {
                true
            }
            ExprKind::Statement(_) => true,
            ExprKind::Parameter(_) => false,
            ExprKind::Identifier(name) => self
                .scope
                .and_then(|scope| scope.get_property(name))
                .is_some_and(|property| property.constant),
            ExprKind::Access { .. } => self.resolve(expr).is_some(),
            ExprKind::ArrayLiteral(elements) => self.all_constant(elements),
            ExprKind::ArrayAccess { array, index } => {
                self.is_constant(array) && self.is_constant(index)
            }
            ExprKind::Binary {
                op: BinaryOp::Conditional,
                left,
                right,
            } => {
                // a function on the right is called, so it has to be pure too
                self.is_constant(left)
                    && match self.resolve(right) {
                        Some(Value::Function(function)) => function.is_pure(),
                        Some(_) => true,
                        None => false,
                    }
            }
            ExprKind::Binary { left, right, .. } => {
                self.is_constant(left) && self.is_constant(right)
            }
            ExprKind::Unary { expr, .. } => self.is_constant(expr),
            ExprKind::TernaryConditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.is_constant(condition)
                    && self.is_constant(then_branch)
                    && self.is_constant(else_branch)
            }
            ExprKind::ExecutionScope(statements) => self.all_constant(statements),
            ExprKind::Call { function, args } => {
                // deliberately coarse for the built-ins
                if matches!(function.identifier(), Some(LOOP | FOR_EACH)) {
                    return true;
                }
                match self.resolve(function) {
                    Some(Value::Function(function)) => {
                        function.is_pure() && self.all_constant(args)
                    }
                    // calling a non-function always yields zero
                    Some(_) => true,
                    None => false,
                }
            }
        }
    }

    fn all_constant(&self, exprs: &[Expr]) -> bool {
        exprs.iter().all(|expr| self.is_constant(expr))
    }

    /// Value of `expr` when it is constant, `None` otherwise.
    ///
    /// Identifiers and access chains are looked up one link at a time, so a
    /// chain is walked once rather than once per level.
    fn resolve(&self, expr: &Expr) -> Option<Value> {
        match &expr.kind {
            ExprKind::Constant(value) => Some(value.clone()),
            ExprKind::Identifier(name) => self
                .scope?
                .get_property(name)
                .filter(|property| property.constant)
                .map(|property| property.value.clone()),
            ExprKind::Access { object, property } => match self.resolve(object)? {
                Value::Object(object) => object
                    .get_property(property)
                    .filter(|property| property.constant)
                    .map(|property| property.value),
                // accessing a non-object always yields zero
                _ => Some(Value::zero()),
            },
            // constant, but running them here would repeat their effects
            ExprKind::Call { function, .. }
                if matches!(function.identifier(), Some(LOOP | FOR_EACH)) =>
            {
                None
            }
            _ => {
                let scope = self.scope?;
                self.is_constant(expr)
                    .then(|| ExecutionContext::new(None, scope).eval(expr))
            }
        }
    }
}

/// Context-free constancy check.
pub fn is_constant(expr: &Expr) -> bool {
    ConstantAnalyzer::context_free().is_constant(expr)
}
