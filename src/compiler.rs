use std::{fmt, sync::Arc};

use indexmap::IndexSet;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, UnaryOp},
    constant::ConstantAnalyzer,
    diagnostics::{Diagnostic, DiagnosticKind},
    runtime::{ExecutionContext, FOR_EACH, LOOP},
    scope::{Scope, TEMP, TEMP_ALIAS},
    value::{normalize_name, Entity, ObjectValue, Value},
};

pub const DEFAULT_NAMESPACE: &str = "context";
pub const DEFAULT_NAMESPACE_ALIAS: &str = "c";

/// How the result of a specialized script is handed back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnShape {
    #[default]
    Number,
    Boolean,
    String,
    Value,
}

impl ReturnShape {
    pub fn coerce(self, value: Value) -> Output {
        match self {
            ReturnShape::Number => Output::Number(value.as_number()),
            ReturnShape::Boolean => Output::Boolean(value.as_bool()),
            ReturnShape::String => Output::String(value.as_string()),
            ReturnShape::Value => Output::Value(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Number(f64),
    Boolean(bool),
    String(String),
    Value(Value),
}

impl Output {
    pub fn as_number(&self) -> f64 {
        match self {
            Output::Number(n) => *n,
            Output::Boolean(b) => f64::from(u8::from(*b)),
            Output::String(_) => 0.0,
            Output::Value(value) => value.as_number(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Output::Number(n) => Value::Number(n),
            Output::Boolean(b) => Value::bool(b),
            Output::String(s) => Value::string(s),
            Output::Value(value) => value,
        }
    }
}

/// Named, ordered parameters of a specialized script.
///
/// Scripts read arguments as `<namespace>.<name>`; the default namespace is
/// `context`, also reachable as `c`.
#[derive(Debug, Clone)]
pub struct Signature {
    parameters: Vec<String>,
    namespace: String,
    aliases: Vec<String>,
    returns: ReturnShape,
}

impl Signature {
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parameters: parameters.into_iter().map(Into::into).collect(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            aliases: vec![DEFAULT_NAMESPACE_ALIAS.to_string()],
            returns: ReturnShape::default(),
        }
    }

    pub fn with_namespace<I, S>(mut self, namespace: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespace = namespace.into();
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn returning(mut self, shape: ReturnShape) -> Self {
        self.returns = shape;
        self
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn returns(&self) -> ReturnShape {
        self.returns
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.parameters
            .iter()
            .position(|parameter| parameter.eq_ignore_ascii_case(name))
    }

    pub fn is_namespace(&self, name: &str) -> bool {
        self.namespace_names().any(|ns| ns.eq_ignore_ascii_case(name))
    }

    fn namespace_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.namespace.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn validate(&self) -> Result<(), Diagnostic> {
        let mut seen = IndexSet::new();
        for parameter in &self.parameters {
            if !is_identifier(parameter) {
                return Err(compile_error(format!(
                    "invalid parameter name `{parameter}`"
                )));
            }
            if !seen.insert(normalize_name(parameter)) {
                return Err(compile_error(format!("duplicate parameter `{parameter}`"))
                    .with_note("parameter names are compared ignoring case"));
            }
        }
        for name in self.namespace_names() {
            if !is_identifier(name) {
                return Err(compile_error(format!("invalid parameter namespace `{name}`")));
            }
            if name.eq_ignore_ascii_case(TEMP) || name.eq_ignore_ascii_case(TEMP_ALIAS) {
                return Err(compile_error(format!(
                    "parameter namespace `{name}` collides with `temp`"
                )));
            }
        }
        Ok(())
    }

    /// Binds `args` as an immutable object under the namespace and its
    /// aliases. Missing arguments are zero.
    pub fn bind(&self, scope: &mut Scope, args: &[Value]) {
        let object = self
            .parameters
            .iter()
            .enumerate()
            .fold(ObjectValue::builder(), |builder, (slot, name)| {
                builder.value(name, args.get(slot).cloned().unwrap_or_default())
            })
            .build();
        for name in self.namespace_names() {
            scope.set(name, object.clone());
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn compile_error(message: String) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Compile, message)
}

struct CompiledInner {
    signature: Signature,
    body: Vec<Expr>,
    scope: Scope,
    entity: Option<Entity>,
    requirements: IndexSet<String>,
    folded: usize,
}

/// A script specialized against a fixed scope and signature.
#[derive(Clone)]
pub struct CompiledFunction {
    inner: Arc<CompiledInner>,
}

impl CompiledFunction {
    pub fn invoke(&self, args: &[Value]) -> Output {
        let inner = &*self.inner;
        let mut scope = inner.scope.copy();
        scope.bind_temp();
        inner.signature.bind(&mut scope, args);
        scope.freeze();
        let value = ExecutionContext::with_parameters(inner.entity.clone(), &scope, args)
            .run_script(&inner.body);
        inner.signature.returns.coerce(value)
    }

    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// External names the script reads, in order of first use.
    pub fn requirements(&self) -> &IndexSet<String> {
        &self.inner.requirements
    }

    pub fn artifact(&self) -> CompiledArtifact<'_> {
        CompiledArtifact {
            signature: &self.inner.signature,
            body: &self.inner.body,
            requirements: &self.inner.requirements,
            folded: self.inner.folded,
        }
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("signature", &self.inner.signature)
            .field("requirements", &self.inner.requirements)
            .finish()
    }
}

/// What the specializer produced, handed to the post-compile hook.
#[derive(Debug, Clone, Copy)]
pub struct CompiledArtifact<'a> {
    pub signature: &'a Signature,
    pub body: &'a [Expr],
    pub requirements: &'a IndexSet<String>,
    /// Number of subexpressions replaced by constants.
    pub folded: usize,
}

impl fmt::Display for CompiledArtifact<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fn {}({}) -> {:?} {{",
            self.signature.namespace,
            self.signature.parameters.join(", "),
            self.signature.returns
        )?;
        for statement in self.body {
            write!(f, " {statement};")?;
        }
        write!(f, " }}")
    }
}

/// Specializes `exprs` against `scope`.
///
/// Only bindings marked constant are folded, so later writes to mutable
/// bindings stay visible to the compiled function.
pub fn specialize(
    exprs: &[Expr],
    signature: Signature,
    scope: &Scope,
    entity: Option<Entity>,
) -> Result<CompiledFunction, Diagnostic> {
    signature.validate()?;

    let mut fold_scope = scope.copy();
    fold_scope.bind_temp();
    signature.bind(&mut fold_scope, &[]);
    fold_scope.freeze();

    let mut specializer = Specializer {
        signature: &signature,
        scope: &fold_scope,
        analyzer: ConstantAnalyzer::with_scope(&fold_scope),
        requirements: IndexSet::new(),
        folded: 0,
    };
    let body: Vec<Expr> = exprs.iter().map(|expr| specializer.rewrite(expr)).collect();
    let Specializer {
        requirements,
        folded,
        ..
    } = specializer;

    tracing::debug!(
        parameters = signature.parameters.len(),
        statements = body.len(),
        folded,
        requirements = ?requirements,
        "specialized script"
    );

    Ok(CompiledFunction {
        inner: Arc::new(CompiledInner {
            signature,
            body,
            scope: scope.copy(),
            entity,
            requirements,
            folded,
        }),
    })
}

struct Specializer<'a> {
    signature: &'a Signature,
    scope: &'a Scope,
    analyzer: ConstantAnalyzer<'a>,
    requirements: IndexSet<String>,
    folded: usize,
}

impl Specializer<'_> {
    fn rewrite(&mut self, expr: &Expr) -> Expr {
        let kind = match &expr.kind {
            ExprKind::Identifier(name) => {
                self.require(name);
                expr.kind.clone()
            }
            ExprKind::Access { object, property } => {
                if let Some(slot) = self.parameter_slot(object, property) {
                    return Expr::new(ExprKind::Parameter(slot), expr.span);
                }
                ExprKind::Access {
                    object: Box::new(self.rewrite(object)),
                    property: property.clone(),
                }
            }
            ExprKind::ArrayLiteral(elements) => ExprKind::ArrayLiteral(self.rewrite_all(elements)),
            ExprKind::ArrayAccess { array, index } => ExprKind::ArrayAccess {
                array: Box::new(self.rewrite(array)),
                index: Box::new(self.rewrite(index)),
            },
            ExprKind::Call { function, args } => match function.identifier() {
                Some(FOR_EACH) => {
                    let mut rewritten = Vec::with_capacity(args.len());
                    for (idx, arg) in args.iter().enumerate() {
                        rewritten.push(if idx == 0 {
                            self.rewrite_place(arg)
                        } else {
                            self.rewrite(arg)
                        });
                    }
                    ExprKind::Call {
                        function: function.clone(),
                        args: rewritten,
                    }
                }
                Some(LOOP) => ExprKind::Call {
                    function: function.clone(),
                    args: self.rewrite_all(args),
                },
                _ => ExprKind::Call {
                    function: Box::new(self.rewrite(function)),
                    args: self.rewrite_all(args),
                },
            },
            ExprKind::Binary { op, left, right } => {
                let left = if *op == BinaryOp::Assign {
                    self.rewrite_place(left)
                } else {
                    self.rewrite(left)
                };
                ExprKind::Binary {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(self.rewrite(right)),
                }
            }
            ExprKind::Unary { op, expr } => ExprKind::Unary {
                op: *op,
                expr: Box::new(self.rewrite(expr)),
            },
            ExprKind::TernaryConditional {
                condition,
                then_branch,
                else_branch,
            } => ExprKind::TernaryConditional {
                condition: Box::new(self.rewrite(condition)),
                then_branch: Box::new(self.rewrite(then_branch)),
                else_branch: Box::new(self.rewrite(else_branch)),
            },
            ExprKind::ExecutionScope(statements) => {
                ExprKind::ExecutionScope(self.rewrite_all(statements).into())
            }
            ExprKind::DoubleLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::Statement(_)
            | ExprKind::Constant(_)
            | ExprKind::Parameter(_) => return expr.clone(),
        };
        self.fold(Expr::new(kind, expr.span))
    }

    fn rewrite_all(&mut self, exprs: &[Expr]) -> Vec<Expr> {
        exprs.iter().map(|expr| self.rewrite(expr)).collect()
    }

    /// Rewrites a written-to access without turning it into a value.
    fn rewrite_place(&mut self, expr: &Expr) -> Expr {
        match &expr.kind {
            ExprKind::Access { object, property } => Expr::new(
                ExprKind::Access {
                    object: Box::new(self.rewrite(object)),
                    property: property.clone(),
                },
                expr.span,
            ),
            _ => self.rewrite(expr),
        }
    }

    fn parameter_slot(&self, object: &Expr, property: &str) -> Option<usize> {
        let namespace = object.identifier()?;
        if !self.signature.is_namespace(namespace) {
            return None;
        }
        self.signature.slot(property)
    }

    fn require(&mut self, name: &str) {
        if self.signature.is_namespace(name)
            || name.eq_ignore_ascii_case(TEMP)
            || name.eq_ignore_ascii_case(TEMP_ALIAS)
        {
            return;
        }
        self.requirements.insert(normalize_name(name));
    }

    fn fold(&mut self, expr: Expr) -> Expr {
        if !is_foldable(&expr) || !self.analyzer.is_constant(&expr) {
            return expr;
        }
        let value = ExecutionContext::new(None, self.scope).eval(&expr);
        tracing::trace!(expr = %expr, value = ?value, "folded constant");
        self.folded += 1;
        Expr::new(ExprKind::Constant(value), expr.span)
    }
}

/// Whether evaluating `expr` ahead of time is unobservable. Children are
/// rewritten first, so a node only qualifies once every child has already
/// collapsed into a literal or a folded constant.
fn is_foldable(expr: &Expr) -> bool {
    match &expr.kind {
        // already as small as it gets
        ExprKind::DoubleLiteral(_) | ExprKind::StringLiteral(_) | ExprKind::Constant(_) => false,
        ExprKind::Statement(_) | ExprKind::ExecutionScope(_) | ExprKind::Parameter(_) => false,
        ExprKind::Identifier(_) => true,
        ExprKind::Access { object, .. } => is_settled(object),
        ExprKind::ArrayLiteral(elements) => elements.iter().all(is_settled),
        ExprKind::ArrayAccess { array, index } => is_settled(array) && is_settled(index),
        ExprKind::Call { function, args } => {
            !matches!(function.identifier(), Some(LOOP | FOR_EACH))
                && is_settled(function)
                && args.iter().all(is_settled)
        }
        // `a ? f` calls `f` when it is a function, which may not be pure
        ExprKind::Binary {
            op: BinaryOp::Assign | BinaryOp::Conditional,
            ..
        } => false,
        ExprKind::Binary { left, right, .. } => is_settled(left) && is_settled(right),
        ExprKind::Unary { op, expr } => *op != UnaryOp::Return && is_settled(expr),
        ExprKind::TernaryConditional {
            condition,
            then_branch,
            else_branch,
        } => is_settled(condition) && is_settled(then_branch) && is_settled(else_branch),
    }
}

fn is_settled(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::DoubleLiteral(_) | ExprKind::StringLiteral(_) | ExprKind::Constant(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse_script, value::Property};
    use pretty_assertions::assert_eq;

    fn scope() -> Scope {
        let math = ObjectValue::builder()
            .constant("pi", 3.0)
            .function("sqrt", crate::value::Function::number1(true, f64::sqrt))
            .build();
        Scope::with_bindings([
            ("math", Property::new(math.into(), true)),
            ("variable", Property::new(ObjectValue::mutable().into(), false)),
        ])
    }

    fn render(source: &str, signature: Signature) -> String {
        let exprs = parse_script(source).unwrap();
        let compiled = specialize(&exprs, signature, &scope(), None).unwrap();
        compiled.artifact().to_string()
    }

    #[test]
    fn folds_pure_subexpressions_and_maps_parameters() {
        assert_eq!(
            render("math.sqrt(16) * c.speed + math.pi", Signature::new(["speed"])),
            "fn context(speed) -> Number { ((const(4.0) * param#0) + const(3.0)); }"
        );
    }

    #[test]
    fn keeps_side_effects_and_assignment_targets() {
        assert_eq!(
            render(
                "v.x = 1 + 2; loop(2, { variable.x = context.n; }); return variable.x",
                Signature::new(["n"])
            ),
            "fn context(n) -> Number { (v.x = const(3.0)); loop(2.0, { (variable.x = param#0); }); return variable.x; }"
        );
    }

    #[test]
    fn records_external_names_only() {
        let exprs = parse_script("temp.a = q.speed; loop(1, {}); variable.x + math.pi + other").unwrap();
        let signature = Signature::new(["speed"]).with_namespace("query", ["q"]);
        let compiled = specialize(&exprs, signature, &scope(), None).unwrap();
        let requirements: Vec<&str> = compiled.requirements().iter().map(String::as_str).collect();
        assert_eq!(requirements, vec!["variable", "math", "other"]);
    }

    #[test]
    fn rejects_invalid_signatures() {
        let cases = [
            Signature::new([""]),
            Signature::new(["1st"]),
            Signature::new(["speed", "Speed"]),
            Signature::new(["speed"]).with_namespace("temp", Vec::<String>::new()),
            Signature::new(["speed"]).with_namespace("query", ["T"]),
        ];
        for signature in cases {
            let err = specialize(&[], signature, &Scope::new(), None).unwrap_err();
            assert_eq!(err.kind, DiagnosticKind::Compile);
        }
    }
}
