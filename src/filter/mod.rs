//! Record filter expressions.
//!
//! A `FilterExpression` is parsed once from text and evaluated against every
//! decoded record of a partition before projection is applied. Records that do
//! not match are dropped inside the reader.

mod parser;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{FilterError, SchemaError};
use crate::reader::{Record, Value};
use crate::schema::RecordSchema;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Literal operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    String(String),
    Boolean(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{}", v),
            Literal::Real(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Parsed filter tree.
///
/// `And` and `Or` hold every operand of a chain, so tree depth only grows
/// with parentheses and negation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        path: String,
        op: CompareOp,
        literal: Literal,
    },
    In {
        path: String,
        literals: Vec<Literal>,
    },
}

impl Expr {
    fn evaluate(&self, record: &Record) -> bool {
        match self {
            Expr::And(terms) => terms.iter().all(|t| t.evaluate(record)),
            Expr::Or(terms) => terms.iter().any(|t| t.evaluate(record)),
            Expr::Not(inner) => !inner.evaluate(record),
            Expr::Compare { path, op, literal } => record
                .get_path(path)
                .and_then(|value| compare(value, literal))
                .is_some_and(|ordering| op.accepts(ordering)),
            Expr::In { path, literals } => record.get_path(path).is_some_and(|value| {
                literals
                    .iter()
                    .any(|lit| compare(value, lit) == Some(Ordering::Equal))
            }),
        }
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_paths(out);
                }
            }
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::Compare { path, .. } | Expr::In { path, .. } => {
                if !out.contains(&path.as_str()) {
                    out.push(path);
                }
            }
        }
    }
}

/// Order a record value against a literal.
///
/// Integer, unsigned and real values compare numerically with each other.
/// Any other pairing of kinds is incomparable.
fn compare(value: &Value, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (Value::Integer(a), Literal::Integer(b)) => Some(a.cmp(b)),
        (Value::Unsigned(a), Literal::Integer(b)) => Some((*a as i128).cmp(&(*b as i128))),
        (Value::String(a), Literal::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Boolean(a), Literal::Boolean(b)) => Some(a.cmp(b)),
        (value, Literal::Integer(b)) => value.as_f64()?.partial_cmp(&(*b as f64)),
        (value, Literal::Real(b)) => value.as_f64()?.partial_cmp(b),
        _ => None,
    }
}

/// A parsed record predicate.
///
/// Cheap to clone; every partition descriptor carries its own copy.
#[derive(Debug, Clone)]
pub struct FilterExpression {
    text: Arc<str>,
    root: Option<Arc<Expr>>,
}

impl FilterExpression {
    /// The filter that accepts every record.
    pub fn match_all() -> Self {
        Self {
            text: Arc::from(""),
            root: None,
        }
    }

    /// Parse filter text. Empty or whitespace-only text yields
    /// [`FilterExpression::match_all`].
    ///
    /// # Errors
    /// `FilterError::Syntax` with the byte position of the offending token.
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let root = parser::Parser::new(text)?.parse()?;
        Ok(Self {
            text: Arc::from(text.trim()),
            root: root.map(Arc::new),
        })
    }

    /// Whether this filter accepts every record.
    pub fn is_match_all(&self) -> bool {
        self.root.is_none()
    }

    /// The parsed tree, if any.
    pub fn expr(&self) -> Option<&Expr> {
        self.root.as_deref()
    }

    /// Evaluate against a record in its unprojected shape.
    pub fn matches(&self, record: &Record) -> bool {
        match &self.root {
            None => true,
            Some(expr) => expr.evaluate(record),
        }
    }

    /// Distinct field paths referenced, in first-use order.
    pub fn field_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        if let Some(expr) = &self.root {
            expr.collect_paths(&mut paths);
        }
        paths
    }

    /// Check that every referenced path names a scalar field outside lists.
    pub fn validate(&self, schema: &RecordSchema) -> Result<(), SchemaError> {
        for path in self.field_paths() {
            let usable = schema
                .lookup(path)
                .is_some_and(|field| field.field_type.is_scalar())
                && !schema.path_crosses_list(path);
            if !usable {
                return Err(SchemaError::UnknownField(path.to_string()));
            }
        }
        Ok(())
    }

    /// The filter text as given (trimmed).
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Default for FilterExpression {
    fn default() -> Self {
        Self::match_all()
    }
}

impl PartialEq for FilterExpression {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match_all() {
            f.write_str("<all>")
        } else {
            f.write_str(&self.text)
        }
    }
}

impl std::str::FromStr for FilterExpression {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
