use std::any::Any;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, StatementOp, UnaryOp},
    scope::Scope,
    value::{Arguments, Entity, Function, Value},
};

pub const LOOP: &str = "loop";
pub const FOR_EACH: &str = "for_each";

/// Loop control requested by `break` or `continue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlag {
    Break,
    Continue,
}

impl From<StatementOp> for ControlFlag {
    fn from(op: StatementOp) -> Self {
        match op {
            StatementOp::Break => ControlFlag::Break,
            StatementOp::Continue => ControlFlag::Continue,
        }
    }
}

/// One evaluation frame.
///
/// Child frames share the scope, entity and parameter slots of their parent
/// but start with no control flag and no pending return.
pub struct ExecutionContext<'a> {
    entity: Option<Entity>,
    scope: &'a Scope,
    parameters: &'a [Value],
    flag: Option<ControlFlag>,
    return_value: Option<Value>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(entity: Option<Entity>, scope: &'a Scope) -> Self {
        Self::with_parameters(entity, scope, &[])
    }

    pub(crate) fn with_parameters(
        entity: Option<Entity>,
        scope: &'a Scope,
        parameters: &'a [Value],
    ) -> Self {
        Self {
            entity,
            scope,
            parameters,
            flag: None,
            return_value: None,
        }
    }

    pub fn child(&self) -> ExecutionContext<'a> {
        Self::with_parameters(self.entity.clone(), self.scope, self.parameters)
    }

    pub fn child_with_entity(&self, entity: Entity) -> ExecutionContext<'a> {
        Self::with_parameters(Some(entity), self.scope, self.parameters)
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.entity.as_ref()
    }

    /// The frame's entity, if it is a `T`.
    pub fn entity_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entity.as_ref()?.downcast_ref::<T>()
    }

    pub fn scope(&self) -> &'a Scope {
        self.scope
    }

    pub fn flag(&self) -> Option<ControlFlag> {
        self.flag
    }

    pub fn set_flag(&mut self, flag: Option<ControlFlag>) {
        self.flag = flag;
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn take_return(&mut self) -> Option<Value> {
        self.return_value.take()
    }

    /// Top-level driver: evaluates the statements in order and stops at the
    /// first pending return on this frame. Returns the last value otherwise.
    pub fn run_script(&mut self, statements: &[Expr]) -> Value {
        let mut last = Value::zero();
        for statement in statements {
            last = self.eval(statement);
            if let Some(value) = self.take_return() {
                return value;
            }
        }
        last
    }

    /// Body of a block function: runs until the end or until a control flag
    /// is raised on this frame. Pending returns stay on the frame.
    pub(crate) fn run_block(&mut self, statements: &[Expr]) -> Value {
        for statement in statements {
            self.eval(statement);
            if self.flag.is_some() {
                break;
            }
        }
        Value::zero()
    }

    pub fn eval(&mut self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::DoubleLiteral(value) => Value::Number(*value),
            ExprKind::StringLiteral(value) => Value::string(value.as_str()),
            ExprKind::ArrayLiteral(elements) => {
                let values = elements.iter().map(|element| self.eval(element)).collect();
                Value::array(values)
            }
            ExprKind::Identifier(name) => self.scope.get(name),
            ExprKind::Access { object, property } => match self.eval(object) {
                Value::Object(object) => object.get(property),
                _ => Value::zero(),
            },
            ExprKind::ArrayAccess { array, index } => {
                let array = self.eval(array);
                let index = self.eval(index);
                self.index(array, index)
            }
            ExprKind::Call { function, args } => self.call(function, args),
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Unary { op, expr } => {
                let value = self.eval(expr);
                self.unary(*op, value)
            }
            ExprKind::TernaryConditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition).as_bool() {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
            ExprKind::ExecutionScope(statements) => {
                Value::Function(Function::block(statements.clone()))
            }
            ExprKind::Statement(op) => {
                self.flag = Some((*op).into());
                Value::zero()
            }
            ExprKind::Constant(value) => value.clone(),
            ExprKind::Parameter(slot) => self.parameters.get(*slot).cloned().unwrap_or_default(),
        }
    }

    fn index(&self, array: Value, index: Value) -> Value {
        match array {
            // empty arrays would make the modulo below undefined
            Value::Array(values) if !values.is_empty() => {
                let position = index.as_number().max(0.0).floor() as usize % values.len();
                values[position].clone()
            }
            _ => Value::zero(),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Value {
        use BinaryOp::*;
        match op {
            And => Value::bool(self.eval(left).as_bool() && self.eval(right).as_bool()),
            Or => Value::bool(self.eval(left).as_bool() || self.eval(right).as_bool()),
            Less => self.comparison(left, right, |a, b| a < b),
            LessEqual => self.comparison(left, right, |a, b| a <= b),
            Greater => self.comparison(left, right, |a, b| a > b),
            GreaterEqual => self.comparison(left, right, |a, b| a >= b),
            Equal => self.comparison(left, right, |a, b| a == b),
            NotEqual => self.comparison(left, right, |a, b| a != b),
            Add => self.numeric(left, right, |a, b| a + b),
            Sub => self.numeric(left, right, |a, b| a - b),
            Mul => self.numeric(left, right, |a, b| a * b),
            Div => self.numeric(left, right, |a, b| if b == 0.0 { 0.0 } else { a / b }),
            Arrow => match self.eval(left) {
                Value::Entity(entity) => self.child_with_entity(entity).eval(right),
                _ => Value::zero(),
            },
            NullCoalesce => {
                let value = self.eval(left);
                if value.as_bool() {
                    value
                } else {
                    self.eval(right)
                }
            }
            Assign => {
                let value = self.eval(right);
                // only `object.property` targets are writable
                if let ExprKind::Access { object, property } = &left.kind {
                    if let Value::Object(target) = self.eval(object) {
                        target.set(property, value.clone());
                    }
                }
                value
            }
            Conditional => {
                if !self.eval(left).as_bool() {
                    return Value::zero();
                }
                match self.eval(right) {
                    Value::Function(function) => function.call(self, &mut Arguments::empty()),
                    value => value,
                }
            }
        }
    }

    fn comparison(&mut self, left: &Expr, right: &Expr, op: fn(f64, f64) -> bool) -> Value {
        let a = self.eval(left).as_number();
        let b = self.eval(right).as_number();
        Value::bool(op(a, b))
    }

    fn numeric(&mut self, left: &Expr, right: &Expr, op: fn(f64, f64) -> f64) -> Value {
        let a = self.eval(left).as_number();
        let b = self.eval(right).as_number();
        Value::Number(op(a, b))
    }

    fn unary(&mut self, op: UnaryOp, value: Value) -> Value {
        match op {
            UnaryOp::Not => Value::bool(!value.as_bool()),
            UnaryOp::Negate => Value::Number(-value.as_number()),
            UnaryOp::Return => {
                self.return_value = Some(value);
                Value::zero()
            }
        }
    }

    fn call(&mut self, function: &Expr, args: &[Expr]) -> Value {
        match function.identifier() {
            Some(LOOP) => return self.run_loop(args),
            Some(FOR_EACH) => return self.run_for_each(args),
            _ => {}
        }
        match self.eval(function) {
            Value::Function(function) => function.call(self, &mut Arguments::new(args)),
            _ => Value::zero(),
        }
    }

    /// `loop(times, body)`
    fn run_loop(&mut self, args: &[Expr]) -> Value {
        let mut arguments = Arguments::new(args);
        let times = round_half_up(arguments.next_number(self));
        let body = match arguments.next_value(self) {
            Value::Function(body) => body,
            _ => return Value::zero(),
        };
        tracing::trace!(times, "loop");
        for _ in 0..times {
            let mut frame = self.child();
            body.call(&mut frame, &mut Arguments::empty());
            if let Some(value) = frame.take_return() {
                return value;
            }
            if frame.flag == Some(ControlFlag::Break) {
                break;
            }
        }
        Value::zero()
    }

    /// `for_each(object.property, array, body)`
    fn run_for_each(&mut self, args: &[Expr]) -> Value {
        // the target is used as a place, never evaluated as a value
        let (object, property) = match args.first().map(|arg| &arg.kind) {
            Some(ExprKind::Access { object, property }) => (object, property),
            _ => return Value::zero(),
        };
        let mut arguments = Arguments::new(args.get(1..).unwrap_or_default());
        let elements = match arguments.next_value(self) {
            Value::Array(elements) => elements,
            _ => return Value::zero(),
        };
        let body = match arguments.next_value(self) {
            Value::Function(body) => body,
            _ => return Value::zero(),
        };
        tracing::trace!(len = elements.len(), "for_each");
        for element in elements.iter() {
            let mut frame = self.child();
            if let Value::Object(target) = self.eval(object) {
                target.set(property, element.clone());
            }
            body.call(&mut frame, &mut Arguments::empty());
            if let Some(value) = frame.take_return() {
                return value;
            }
            if frame.flag == Some(ControlFlag::Break) {
                break;
            }
        }
        Value::zero()
    }
}

/// Iteration count for `loop`: nearest integer, halves rounded up,
/// negative and NaN counts run zero times.
fn round_half_up(times: f64) -> u64 {
    let rounded = (times + 0.5).floor();
    if rounded >= 1.0 {
        rounded as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_counts_round_half_up() {
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(2.49), 2);
        assert_eq!(round_half_up(-3.0), 0);
        assert_eq!(round_half_up(f64::NAN), 0);
    }

    #[test]
    fn child_frames_do_not_inherit_control_state() {
        let scope = Scope::new();
        let mut frame = ExecutionContext::new(None, &scope);
        frame.set_flag(Some(ControlFlag::Break));
        frame.eval(&crate::parser::parse_expression("return 3").unwrap());
        let child = frame.child();
        assert_eq!(child.flag(), None);
        assert!(child.return_value().is_none());
        assert_eq!(frame.take_return(), Some(Value::number(3.0)));
    }
}
