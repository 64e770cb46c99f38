//! FinanceQL tree-walk evaluator.
//!
//! Evaluation is async because data-backed builtins reach through the
//! `DataSource`; recursion goes through boxed futures. Key semantics:
//! - Function arguments that are bare identifiers pass as strings; that is
//!   how ticker symbols reach price functions.
//! - A pipe evaluates its left side, then the right side in a child context
//!   carrying the value. If the right side is a call that does not mention
//!   `*`, the pipe value is prepended to its argument list.
//! - Identifiers under a pipe stringify instead of resolving as tickers.
//! - `expr[Nd]` dispatches to a sibling `<fn>_range` builtin when one
//!   exists, otherwise slices a Vector result to its last N points.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use super::cache::EvalCache;
use super::functions::FunctionRegistry;
use super::value::{Row, Value};
use crate::data::DataSource;
use crate::error::QlError;

/// Everything a builtin needs, cheap to clone for child scopes.
#[derive(Clone)]
pub struct EvalContext {
    pub source: Arc<dyn DataSource>,
    pub cache: Arc<EvalCache>,
    pub functions: Arc<FunctionRegistry>,
    pub pipe_input: Option<Value>,
    pub token: CancellationToken,
}

impl EvalContext {
    pub fn new(
        source: Arc<dyn DataSource>,
        cache: Arc<EvalCache>,
        functions: Arc<FunctionRegistry>,
        token: CancellationToken,
    ) -> Self {
        Self { source, cache, functions, pipe_input: None, token }
    }

    fn with_pipe(&self, value: Value) -> Self {
        Self { pipe_input: Some(value), ..self.clone() }
    }

    fn in_pipe(&self) -> bool {
        self.pipe_input.is_some()
    }
}

/// Evaluate a parsed expression.
pub fn eval<'a>(ctx: &'a EvalContext, expr: &'a Expr) -> BoxFuture<'a, Result<Value, QlError>> {
    Box::pin(async move {
        if ctx.token.is_cancelled() {
            return Err(QlError::eval("evaluation cancelled"));
        }
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Scalar(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::PipeInput => Ok(ctx.pipe_input.clone().unwrap_or(Value::Nil)),
            ExprKind::Ident(name) => eval_ident(ctx, name).await,
            ExprKind::Call { name, args } => eval_call(ctx, name, args, None).await,
            ExprKind::Binary { op, left, right } => eval_binary(ctx, *op, left, right).await,
            ExprKind::Unary { op, operand } => {
                let value = eval(ctx, operand).await?;
                Ok(match op {
                    UnaryOp::Neg => Value::Scalar(-value.to_scalar()),
                    UnaryOp::Not => Value::Bool(!value.to_bool()),
                })
            }
            ExprKind::Pipe { left, right } => eval_pipe(ctx, left, right).await,
            ExprKind::Range { inner, days, .. } => eval_range(ctx, inner, *days).await,
            ExprKind::Screener { filter } => eval_screener(ctx, filter).await,
            ExprKind::Alert { condition, message } => {
                let triggered = eval(ctx, condition).await?.to_bool();
                if triggered {
                    Ok(Value::Str(
                        message.clone().unwrap_or_else(|| "alert triggered".to_string()),
                    ))
                } else {
                    Ok(Value::Nil)
                }
            }
        }
    })
}

/// Outside a pipe a bare identifier resolves as a ticker (implicit price
/// lookup); inside a pipe it stringifies so piped stages never re-fetch.
async fn eval_ident(ctx: &EvalContext, name: &str) -> Result<Value, QlError> {
    if ctx.in_pipe() {
        return Ok(Value::Str(name.to_string()));
    }
    match ctx.functions.get("price") {
        Some(function) => function(ctx, vec![Value::Str(name.to_string())]).await,
        None => Ok(Value::Str(name.to_string())),
    }
}

/// Evaluate call arguments: bare identifiers pass through as strings.
async fn eval_args(ctx: &EvalContext, args: &[Expr]) -> Result<Vec<Value>, QlError> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        let value = match &arg.kind {
            ExprKind::Ident(name) => Value::Str(name.clone()),
            _ => eval(ctx, arg).await?,
        };
        values.push(value);
    }
    Ok(values)
}

async fn eval_call(
    ctx: &EvalContext,
    name: &str,
    args: &[Expr],
    prepend: Option<Value>,
) -> Result<Value, QlError> {
    let Some(function) = ctx.functions.get(name) else {
        return Err(QlError::eval(format!("unknown function '{name}'")));
    };
    let mut values = eval_args(ctx, args).await?;
    if let Some(value) = prepend {
        values.insert(0, value);
    }
    function(ctx, values).await
}

async fn eval_binary(
    ctx: &EvalContext,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
) -> Result<Value, QlError> {
    match op {
        BinaryOp::And => {
            let lhs = eval(ctx, left).await?.to_bool();
            if !lhs {
                return Ok(Value::Bool(false));
            }
            let rhs = eval(ctx, right).await?.to_bool();
            return Ok(Value::Bool(rhs));
        }
        BinaryOp::Or => {
            let lhs = eval(ctx, left).await?.to_bool();
            if lhs {
                return Ok(Value::Bool(true));
            }
            let rhs = eval(ctx, right).await?.to_bool();
            return Ok(Value::Bool(rhs));
        }
        _ => {}
    }

    let lhs = eval(ctx, left).await?;
    let rhs = eval(ctx, right).await?;

    // String equality is case-insensitive; other comparisons go scalar.
    if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
        match op {
            BinaryOp::Eq => return Ok(Value::Bool(a.eq_ignore_ascii_case(b))),
            BinaryOp::Ne => return Ok(Value::Bool(!a.eq_ignore_ascii_case(b))),
            _ => {}
        }
    }

    let a = lhs.to_scalar();
    let b = rhs.to_scalar();
    Ok(match op {
        BinaryOp::Add => Value::Scalar(a + b),
        BinaryOp::Sub => Value::Scalar(a - b),
        BinaryOp::Mul => Value::Scalar(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                Value::Scalar(f64::NAN)
            } else {
                Value::Scalar(a / b)
            }
        }
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::Ge => Value::Bool(a >= b),
        BinaryOp::Le => Value::Bool(a <= b),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::Ne => Value::Bool(a != b),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    })
}

async fn eval_pipe(ctx: &EvalContext, left: &Expr, right: &Expr) -> Result<Value, QlError> {
    let piped = eval(ctx, left).await?;
    let child = ctx.with_pipe(piped.clone());

    // A call that already names `*` gets the value by substitution only;
    // otherwise the pipe value is prepended to its arguments.
    if let ExprKind::Call { name, args } = &right.kind {
        let prepend = if args.iter().any(mentions_pipe_input) { None } else { Some(piped) };
        return eval_call(&child, name, args, prepend).await;
    }
    eval(&child, right).await
}

fn mentions_pipe_input(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::PipeInput => true,
        ExprKind::Call { args, .. } => args.iter().any(mentions_pipe_input),
        ExprKind::Binary { left, right, .. } => {
            mentions_pipe_input(left) || mentions_pipe_input(right)
        }
        ExprKind::Unary { operand, .. } => mentions_pipe_input(operand),
        ExprKind::Range { inner, .. } => mentions_pipe_input(inner),
        _ => false,
    }
}

async fn eval_range(ctx: &EvalContext, inner: &Expr, days: i64) -> Result<Value, QlError> {
    // `price(X)[30d]` -> price_range(X, 30); `X[30d]` -> price_range(X, 30).
    match &inner.kind {
        ExprKind::Call { name, args } => {
            let range_name = format!("{name}_range");
            if ctx.functions.has(&range_name) {
                let mut values = eval_args(ctx, args).await?;
                values.push(Value::Scalar(days as f64));
                let function = ctx.functions.get(&range_name).expect("checked above");
                return function(ctx, values).await;
            }
        }
        ExprKind::Ident(ticker) if !ctx.in_pipe() => {
            if let Some(function) = ctx.functions.get("price_range") {
                return function(
                    ctx,
                    vec![Value::Str(ticker.clone()), Value::Scalar(days as f64)],
                )
                .await;
            }
        }
        _ => {}
    }

    // Fall through: evaluate and slice a vector tail.
    let value = eval(ctx, inner).await?;
    match value {
        Value::Vector(points) => {
            let keep = days.max(0) as usize;
            let start = points.len().saturating_sub(keep);
            Ok(Value::Vector(points[start..].to_vec()))
        }
        other => Ok(other),
    }
}

/// Screeners run the filter once per universe ticker with the ticker bound
/// as the pipe input, collecting matches into a table.
async fn eval_screener(ctx: &EvalContext, filter: &Expr) -> Result<Value, QlError> {
    let mut rows: Vec<Row> = Vec::new();
    for &ticker in super::functions::NIFTY50 {
        if ctx.token.is_cancelled() {
            return Err(QlError::eval("evaluation cancelled"));
        }
        let child = ctx.with_pipe(Value::Str(ticker.to_string()));
        match eval(&child, filter).await {
            Ok(value) => {
                if value.to_bool() {
                    let mut row = Row::new();
                    row.insert("ticker".to_string(), Value::Str(ticker.to_string()));
                    rows.push(row);
                }
            }
            // Missing data for one name never kills the screen.
            Err(e) => {
                tracing::debug!(ticker, error = %e, "screener skipped ticker");
            }
        }
    }
    Ok(Value::Table(rows))
}
