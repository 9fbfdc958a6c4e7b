use std::{any::Any, cell::OnceCell, fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{ast::Expr, runtime::ExecutionContext};

/// Opaque host entity handle, the target of the `->` operator.
pub type Entity = Arc<dyn Any + Send + Sync>;

/// Host-implemented function body.
pub type NativeFn =
    dyn Fn(&mut ExecutionContext<'_>, &mut Arguments<'_>) -> Value + Send + Sync + 'static;

/// Property names are compared ignoring ASCII case.
pub(crate) fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

#[derive(Clone)]
pub enum Value {
    Number(f64),
    String(Arc<str>),
    Array(Arc<[Value]>),
    Object(ObjectValue),
    Function(Function),
    Entity(Entity),
}

impl Value {
    /// The universal fallback result.
    pub const fn zero() -> Self {
        Value::Number(0.0)
    }

    pub const fn number(value: f64) -> Self {
        Value::Number(value)
    }

    pub const fn bool(value: bool) -> Self {
        Value::Number(if value { 1.0 } else { 0.0 })
    }

    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Value::String(value.into())
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(values.into())
    }

    pub fn entity<T: Any + Send + Sync>(entity: T) -> Self {
        Value::Entity(Arc::new(entity))
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(values) => !values.is_empty(),
            Value::Object(object) => !object.is_empty(),
            Value::Function(_) | Value::Entity(_) => true,
        }
    }

    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            _ => 0.0,
        }
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Function(_) => "Function",
            Value::Entity(_) => "Entity",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::zero()
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::array(values)
    }
}

impl From<ObjectValue> for Value {
    fn from(object: ObjectValue) -> Self {
        Value::Object(object)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Entity(a), Value::Entity(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Array(values) => f.debug_list().entries(values.iter()).finish(),
            Value::Object(object) => f
                .debug_map()
                .entries(object.entries().into_iter().map(|(k, p)| (k, p.value)))
                .finish(),
            Value::Function(function) => write!(f, "{function:?}"),
            Value::Entity(_) => write!(f, "<entity>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Object(object) => {
                write!(f, "{{")?;
                for (idx, (key, property)) in object.entries().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {}", property.value)?;
                }
                write!(f, "}}")
            }
            Value::Function(_) => write!(f, "<function>"),
            Value::Entity(_) => write!(f, "<entity>"),
        }
    }
}

/// A named slot of an object or scope.
#[derive(Debug, Clone)]
pub struct Property {
    pub value: Value,
    /// Constant properties never change once registered and may be folded.
    pub constant: bool,
}

impl Property {
    pub fn new(value: Value, constant: bool) -> Self {
        Self { value, constant }
    }
}

struct ObjectInner {
    properties: RwLock<IndexMap<String, Property>>,
    mutable: bool,
}

/// Shared, case-insensitive property map. Clones share the same storage.
#[derive(Clone)]
pub struct ObjectValue(Arc<ObjectInner>);

impl ObjectValue {
    /// An empty object that accepts script writes, such as `temp` or
    /// `variable`.
    pub fn mutable() -> Self {
        Self::from_properties(IndexMap::new(), true)
    }

    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
    }

    fn from_properties(properties: IndexMap<String, Property>, mutable: bool) -> Self {
        Self(Arc::new(ObjectInner {
            properties: RwLock::new(properties),
            mutable,
        }))
    }

    pub fn is_mutable(&self) -> bool {
        self.0.mutable
    }

    pub fn get_property(&self, name: &str) -> Option<Property> {
        self.0.properties.read().get(&normalize_name(name)).cloned()
    }

    pub fn get(&self, name: &str) -> Value {
        self.get_property(name)
            .map(|property| property.value)
            .unwrap_or_default()
    }

    /// Writes a non-constant property. Returns `false` when the object
    /// rejects mutation or the property was registered as constant.
    pub fn set(&self, name: &str, value: Value) -> bool {
        if !self.0.mutable {
            return false;
        }
        let mut properties = self.0.properties.write();
        let key = normalize_name(name);
        if properties.get(&key).is_some_and(|property| property.constant) {
            return false;
        }
        properties.insert(key, Property::new(value, false));
        true
    }

    pub fn entries(&self) -> Vec<(String, Property)> {
        self.0
            .properties
            .read()
            .iter()
            .map(|(key, property)| (key.clone(), property.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.properties.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &ObjectValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("mutable", &self.0.mutable)
            .field("len", &self.len())
            .finish()
    }
}

/// Registration-time builder for host objects.
#[derive(Default)]
pub struct ObjectBuilder {
    properties: IndexMap<String, Property>,
    mutable: bool,
}

impl ObjectBuilder {
    pub fn value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties
            .insert(normalize_name(name), Property::new(value.into(), false));
        self
    }

    pub fn constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties
            .insert(normalize_name(name), Property::new(value.into(), true));
        self
    }

    /// Registers a function. The binding itself is constant; whether calls
    /// may be folded depends on the function's purity.
    pub fn function(self, name: &str, function: Function) -> Self {
        self.constant(name, function)
    }

    /// Allows scripts to write properties of the built object. Properties
    /// registered with [`ObjectBuilder::constant`] stay read-only.
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    pub fn build(self) -> ObjectValue {
        ObjectValue::from_properties(self.properties, self.mutable)
    }
}

#[derive(Clone)]
enum FunctionBody {
    Native(Arc<NativeFn>),
    Block(Arc<[Expr]>),
}

#[derive(Clone)]
pub struct Function {
    body: FunctionBody,
    pure: bool,
}

impl Function {
    pub fn native<F>(pure: bool, function: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>, &mut Arguments<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            body: FunctionBody::Native(Arc::new(function)),
            pure,
        }
    }

    pub fn number1<F>(pure: bool, function: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::native(pure, move |ctx, args| {
            let a = args.next_number(ctx);
            Value::Number(function(a))
        })
    }

    pub fn number2<F>(pure: bool, function: F) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::native(pure, move |ctx, args| {
            let a = args.next_number(ctx);
            let b = args.next_number(ctx);
            Value::Number(function(a, b))
        })
    }

    pub fn number3<F>(pure: bool, function: F) -> Self
    where
        F: Fn(f64, f64, f64) -> f64 + Send + Sync + 'static,
    {
        Self::native(pure, move |ctx, args| {
            let a = args.next_number(ctx);
            let b = args.next_number(ctx);
            let c = args.next_number(ctx);
            Value::Number(function(a, b, c))
        })
    }

    pub(crate) fn block(statements: Arc<[Expr]>) -> Self {
        Self {
            body: FunctionBody::Block(statements),
            pure: false,
        }
    }

    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn call(&self, ctx: &mut ExecutionContext<'_>, args: &mut Arguments<'_>) -> Value {
        match &self.body {
            FunctionBody::Native(function) => function(ctx, args),
            FunctionBody::Block(statements) => ctx.run_block(statements),
        }
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (&self.body, &other.body) {
            (FunctionBody::Native(a), FunctionBody::Native(b)) => Arc::ptr_eq(a, b),
            (FunctionBody::Block(a), FunctionBody::Block(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            FunctionBody::Native(_) => write!(f, "<native fn pure={}>", self.pure),
            FunctionBody::Block(statements) => write!(f, "<block of {}>", statements.len()),
        }
    }
}

/// One call argument. The expression is evaluated at most once, and only
/// when the callee asks for it.
pub struct Argument<'a> {
    expr: &'a Expr,
    value: OnceCell<Value>,
}

impl<'a> Argument<'a> {
    pub fn expression(&self) -> &'a Expr {
        self.expr
    }

    pub fn eval(&self, ctx: &mut ExecutionContext<'_>) -> Value {
        self.value.get_or_init(|| ctx.eval(self.expr)).clone()
    }
}

pub struct Arguments<'a> {
    args: Vec<Argument<'a>>,
    next: usize,
}

impl<'a> Arguments<'a> {
    pub fn new(exprs: &'a [Expr]) -> Self {
        Self {
            args: exprs
                .iter()
                .map(|expr| Argument {
                    expr,
                    value: OnceCell::new(),
                })
                .collect(),
            next: 0,
        }
    }

    pub fn empty() -> Self {
        Self {
            args: Vec::new(),
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument<'a>> {
        self.args.get(index)
    }

    pub fn next(&mut self) -> Option<&Argument<'a>> {
        let arg = self.args.get(self.next)?;
        self.next += 1;
        Some(arg)
    }

    /// Evaluates the next argument; missing arguments are zero.
    pub fn next_value(&mut self, ctx: &mut ExecutionContext<'_>) -> Value {
        match self.next() {
            Some(arg) => arg.eval(ctx),
            None => Value::zero(),
        }
    }

    pub fn next_number(&mut self, ctx: &mut ExecutionContext<'_>) -> f64 {
        self.next_value(ctx).as_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boolean_coercions_follow_emptiness() {
        assert!(Value::number(-0.5).as_bool());
        assert!(!Value::zero().as_bool());
        assert!(!Value::string("").as_bool());
        assert!(Value::string("x").as_bool());
        assert!(!Value::array(Vec::new()).as_bool());
        assert!(Value::array(vec![Value::zero()]).as_bool());
        assert!(!Value::Object(ObjectValue::mutable()).as_bool());
        assert!(Value::Object(ObjectValue::builder().value("a", 1.0).build()).as_bool());
        assert!(Value::Function(Function::number1(true, |x| x)).as_bool());
    }

    #[test]
    fn only_numbers_coerce_to_nonzero_numbers() {
        assert_eq!(Value::number(4.5).as_number(), 4.5);
        assert_eq!(Value::string("12").as_number(), 0.0);
        assert_eq!(Value::array(vec![Value::number(3.0)]).as_number(), 0.0);
        assert_eq!(Value::entity(7_u32).as_number(), 0.0);
    }

    #[test]
    fn string_coercions_render_nested_values() {
        assert_eq!(Value::number(1.0).as_string(), "1.0");
        assert_eq!(Value::number(0.25).as_string(), "0.25");
        let array = Value::array(vec![Value::number(1.0), Value::string("a")]);
        assert_eq!(array.as_string(), "[1.0, a]");
        let object = ObjectValue::builder()
            .value("X", 2.0)
            .value("list", array)
            .build();
        assert_eq!(Value::Object(object).as_string(), "{x: 2.0, list: [1.0, a]}");
    }

    #[test]
    fn objects_are_case_insensitive_and_may_reject_writes() {
        let object = ObjectValue::mutable();
        assert!(object.set("Speed", Value::number(3.0)));
        assert_eq!(object.get("SPEED"), Value::number(3.0));
        assert_eq!(object.get("missing"), Value::zero());
        assert!(!object.get_property("speed").unwrap().constant);

        let frozen = ObjectValue::builder().constant("pi", 3.0).build();
        assert!(!frozen.set("pi", Value::zero()));
        assert_eq!(frozen.get("PI"), Value::number(3.0));
        assert!(frozen.get_property("pi").unwrap().constant);
    }

    #[test]
    fn constant_properties_of_mutable_objects_stay_read_only() {
        let object = ObjectValue::builder()
            .constant("pi", 3.0)
            .value("speed", 1.0)
            .mutable()
            .build();
        assert!(!object.set("PI", Value::number(5.0)));
        assert_eq!(object.get("pi"), Value::number(3.0));
        assert!(object.get_property("pi").unwrap().constant);
        assert!(object.set("speed", Value::number(2.0)));
        assert!(object.set("fresh", Value::number(4.0)));
        assert_eq!(object.get("speed"), Value::number(2.0));
    }
}
