//! FinanceQL typed values and coercions.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub time: DateTime<Utc>,
    pub value: f64,
}

/// A table row: ordered column -> value map (BTreeMap keeps column order
/// deterministic across runs).
pub type Row = BTreeMap<String, Value>;

/// The eight value shapes queries evaluate to.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Scalar(f64),
    Str(String),
    Bool(bool),
    Vector(Vec<Point>),
    /// Keyed family of series (e.g. bollinger bands).
    Matrix(BTreeMap<String, Vec<Point>>),
    Table(Vec<Row>),
    #[default]
    Nil,
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
            Value::Table(_) => "table",
            Value::Nil => "nil",
        }
    }

    /// Directional coercion to a scalar. A vector yields its latest sample;
    /// an empty vector and Nil yield 0; strings parse when numeric.
    pub fn to_scalar(&self) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Vector(points) => points.last().map(|p| p.value).unwrap_or(0.0),
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
            Value::Matrix(_) | Value::Table(_) | Value::Nil => 0.0,
        }
    }

    /// Non-empty collections and non-zero numbers are true.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Scalar(v) => *v != 0.0 && !v.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Vector(points) => !points.is_empty(),
            Value::Matrix(m) => !m.is_empty(),
            Value::Table(rows) => !rows.is_empty(),
            Value::Nil => false,
        }
    }

    /// The underlying points of a vector, or None for other shapes.
    pub fn as_vector(&self) -> Option<&[Point]> {
        match self {
            Value::Vector(points) => Some(points),
            _ => None,
        }
    }

    /// Raw f64 series from a vector value.
    pub fn series(&self) -> Vec<f64> {
        self.as_vector()
            .map(|points| points.iter().map(|p| p.value).collect())
            .unwrap_or_default()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Vector(points) => {
                write!(f, "vector[{}]", points.len())?;
                if let Some(last) = points.last() {
                    write!(f, " latest={}", last.value)?;
                }
                Ok(())
            }
            Value::Matrix(m) => write!(f, "matrix[{} series]", m.len()),
            Value::Table(rows) => write!(f, "table[{} rows]", rows.len()),
            Value::Nil => write!(f, "nil"),
        }
    }
}
