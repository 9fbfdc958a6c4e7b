use std::{any::Any, fmt, sync::Arc};

use crate::{
    ast::Expr,
    compiler::{self, CompiledArtifact, CompiledFunction, Signature},
    diagnostics::{Diagnostic, Result},
    parser,
    runtime::ExecutionContext,
    scope::Scope,
    stdlib,
    value::{Entity, Function, ObjectValue, Property, Value},
};

pub type ParseErrorHandler = Arc<dyn Fn(&Diagnostic) + Send + Sync>;
pub type PostCompileHook = Arc<dyn Fn(&CompiledArtifact<'_>) + Send + Sync>;

/// What to do when a script handed over as source fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseFailurePolicy {
    /// Return the diagnostic to the caller.
    #[default]
    Propagate,
    /// Log it, forward it to the parse-error handler and evaluate to zero.
    Zero,
}

#[derive(Clone, Default)]
pub struct EngineConfig {
    pub parse_failure: ParseFailurePolicy,
    pub parse_error_handler: Option<ParseErrorHandler>,
    pub post_compile: Option<PostCompileHook>,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("parse_failure", &self.parse_failure)
            .field("parse_error_handler", &self.parse_error_handler.is_some())
            .field("post_compile", &self.post_compile.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    bindings: Vec<(String, Property)>,
    entity: Option<Entity>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn bind_value(self, name: &str, value: impl Into<Value>) -> Self {
        self.bind(name, Property::new(value.into(), false))
    }

    /// Binds a value that never changes and may be folded by the specializer.
    pub fn bind_constant(self, name: &str, value: impl Into<Value>) -> Self {
        self.bind(name, Property::new(value.into(), true))
    }

    pub fn bind_function(self, name: &str, function: Function) -> Self {
        self.bind_constant(name, function)
    }

    pub fn bind_object(self, name: &str, object: ObjectValue) -> Self {
        self.bind_constant(name, object)
    }

    /// Makes `alias` refer to whatever `target` is bound to.
    pub fn bind_alias(self, alias: &str, target: &str) -> Self {
        let property = self
            .bindings
            .iter()
            .rev()
            .find(|(name, _)| name.eq_ignore_ascii_case(target))
            .map(|(_, property)| property.clone());
        match property {
            Some(property) => self.bind(alias, property),
            None => {
                tracing::warn!(alias, target, "alias target is not bound");
                self
            }
        }
    }

    pub fn with_standard_library(self) -> Self {
        stdlib::install(self)
    }

    /// The host entity every evaluation starts with.
    pub fn entity<T: Any + Send + Sync>(mut self, entity: T) -> Self {
        self.entity = Some(Arc::new(entity));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn parse_failure(mut self, policy: ParseFailurePolicy) -> Self {
        self.config.parse_failure = policy;
        self
    }

    pub fn on_parse_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.config.parse_error_handler = Some(Arc::new(handler));
        self
    }

    pub fn post_compile<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CompiledArtifact<'_>) + Send + Sync + 'static,
    {
        self.config.post_compile = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            scope: Scope::with_bindings(self.bindings),
            entity: self.entity,
            config: self.config,
        }
    }

    fn bind(mut self, name: &str, property: Property) -> Self {
        self.bindings.push((name.to_string(), property));
        self
    }
}

/// Entry point for hosts: owns the base scope and evaluates or
/// specializes scripts against it.
#[derive(Clone)]
pub struct Engine {
    scope: Scope,
    entity: Option<Entity>,
    config: EngineConfig,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// An engine with `math`, `variable` and `v` registered.
    pub fn standard() -> Self {
        Self::builder().with_standard_library().build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn parse(&self, source: &str) -> Result<Vec<Expr>> {
        let exprs = parser::parse_script(source)?;
        tracing::debug!(statements = exprs.len(), "parsed script");
        Ok(exprs)
    }

    pub fn eval(&self, exprs: &[Expr]) -> Value {
        let mut scope = self.scope.copy();
        scope.bind_temp();
        scope.freeze();
        ExecutionContext::new(self.entity.clone(), &scope).run_script(exprs)
    }

    /// Interprets `exprs` with `args` bound under the signature's namespace.
    /// The result is not coerced.
    pub fn eval_with_arguments(&self, exprs: &[Expr], signature: &Signature, args: &[Value]) -> Value {
        let mut scope = self.scope.copy();
        scope.bind_temp();
        signature.bind(&mut scope, args);
        scope.freeze();
        ExecutionContext::new(self.entity.clone(), &scope).run_script(exprs)
    }

    pub fn eval_source(&self, source: &str) -> Result<Value> {
        let exprs = self.parse_with_policy(source)?;
        Ok(self.eval(&exprs))
    }

    pub fn eval_number(&self, source: &str) -> Result<f64> {
        self.eval_source(source).map(|value| value.as_number())
    }

    pub fn prepare(&self, source: &str) -> Result<PreparedScript<'_>> {
        let statements = self.parse_with_policy(source)?;
        Ok(PreparedScript {
            engine: self,
            statements,
        })
    }

    pub fn compile(&self, exprs: &[Expr], signature: Signature) -> Result<CompiledFunction> {
        let compiled = compiler::specialize(exprs, signature, &self.scope, self.entity.clone())?;
        if let Some(hook) = &self.config.post_compile {
            hook(&compiled.artifact());
        }
        Ok(compiled)
    }

    pub fn compile_source(&self, source: &str, signature: Signature) -> Result<CompiledFunction> {
        let exprs = self.parse_with_policy(source)?;
        self.compile(&exprs, signature)
    }

    /// Parses `source`; under [`ParseFailurePolicy::Zero`] a failure becomes
    /// an empty script, which evaluates to zero.
    fn parse_with_policy(&self, source: &str) -> Result<Vec<Expr>> {
        match parser::parse_script(source) {
            Ok(exprs) => {
                tracing::debug!(statements = exprs.len(), "parsed script");
                Ok(exprs)
            }
            Err(diagnostic) => match self.config.parse_failure {
                ParseFailurePolicy::Propagate => Err(diagnostic.into()),
                ParseFailurePolicy::Zero => {
                    tracing::warn!(%diagnostic, "script failed to parse, evaluating to zero");
                    if let Some(handler) = &self.config.parse_error_handler {
                        handler(&diagnostic);
                    }
                    Ok(Vec::new())
                }
            },
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("bindings", &self.scope.names())
            .field("entity", &self.entity.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// A parsed script kept for repeated evaluation.
#[derive(Debug)]
pub struct PreparedScript<'e> {
    engine: &'e Engine,
    statements: Vec<Expr>,
}

impl PreparedScript<'_> {
    pub fn evaluate(&self) -> Value {
        self.engine.eval(&self.statements)
    }

    pub fn statements(&self) -> &[Expr] {
        &self.statements
    }
}
