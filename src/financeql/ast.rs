//! FinanceQL abstract syntax tree.
//!
//! Every node carries the source position of its first token for error
//! reporting. `Display` renders a form that re-parses to an equal tree (up
//! to parenthesization).

use std::fmt;

use super::token::Pos;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    /// `*`: the current pipe input.
    PipeInput,
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `expr[30d]`: upgrades an instant expression to a window.
    Range {
        inner: Box<Expr>,
        /// Raw duration text, e.g. "30d".
        duration: String,
        days: i64,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Screener {
        filter: Box<Expr>,
    },
    Alert {
        condition: Box<Expr>,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            ExprKind::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            ExprKind::Bool(b) => write!(f, "{b}"),
            ExprKind::Ident(name) => write!(f, "{name}"),
            ExprKind::PipeInput => write!(f, "*"),
            ExprKind::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            ExprKind::Range { inner, duration, .. } => write!(f, "{inner}[{duration}]"),
            ExprKind::Binary { op, left, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "(-{operand})"),
                UnaryOp::Not => write!(f, "(NOT {operand})"),
            },
            ExprKind::Pipe { left, right } => write!(f, "{left} | {right}"),
            ExprKind::Screener { filter } => write!(f, "screener({filter})"),
            ExprKind::Alert { condition, message } => match message {
                Some(msg) => write!(f, "alert({condition}, \"{}\")", msg.replace('"', "\\\"")),
                None => write!(f, "alert({condition})"),
            },
        }
    }
}
