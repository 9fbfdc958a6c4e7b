use std::{fmt, sync::Arc};

use crate::{diagnostics::SourceSpan, value::Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    Arrow,
    NullCoalesce,
    Assign,
    Conditional,
    Equal,
    NotEqual,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Arrow => "->",
            BinaryOp::NullCoalesce => "??",
            BinaryOp::Assign => "=",
            BinaryOp::Conditional => "?",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementOp {
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    DoubleLiteral(f64),
    StringLiteral(String),
    ArrayLiteral(Vec<Expr>),
    Identifier(String),
    Access {
        object: Box<Expr>,
        property: String,
    },
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        function: Box<Expr>,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    TernaryConditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    ExecutionScope(Arc<[Expr]>),
    Statement(StatementOp),
    /// Value folded by the specializer.
    Constant(Value),
    /// Argument slot of a specialized signature.
    Parameter(usize),
}

impl Expr {
    pub fn new(kind: ExprKind, span: SourceSpan) -> Self {
        Self { kind, span }
    }

    /// Name of the identifier in function position, for built-in dispatch.
    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::DoubleLiteral(value) => write!(f, "{value:?}"),
            ExprKind::StringLiteral(value) => write!(f, "'{value}'"),
            ExprKind::ArrayLiteral(elements) => {
                write!(f, "[")?;
                write_list(f, elements, ", ")?;
                write!(f, "]")
            }
            ExprKind::Identifier(name) => write!(f, "{name}"),
            ExprKind::Access { object, property } => write!(f, "{object}.{property}"),
            ExprKind::ArrayAccess { array, index } => write!(f, "{array}[{index}]"),
            ExprKind::Call { function, args } => {
                write!(f, "{function}(")?;
                write_list(f, args, ", ")?;
                write!(f, ")")
            }
            ExprKind::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.symbol())
            }
            ExprKind::Unary { op, expr } => match op {
                UnaryOp::Not => write!(f, "!{expr}"),
                UnaryOp::Negate => write!(f, "-{expr}"),
                UnaryOp::Return => write!(f, "return {expr}"),
            },
            ExprKind::TernaryConditional {
                condition,
                then_branch,
                else_branch,
            } => write!(f, "({condition} ? {then_branch} : {else_branch})"),
            ExprKind::ExecutionScope(statements) => {
                write!(f, "{{")?;
                for statement in statements.iter() {
                    write!(f, " {statement};")?;
                }
                write!(f, " }}")
            }
            ExprKind::Statement(StatementOp::Break) => write!(f, "break"),
            ExprKind::Statement(StatementOp::Continue) => write!(f, "continue"),
            ExprKind::Constant(value) => write!(f, "const({value:?})"),
            ExprKind::Parameter(slot) => write!(f, "param#{slot}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr], separator: &str) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, "{separator}")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
