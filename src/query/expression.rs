use std::cmp::Ordering;

use crate::catalog::value::DataValue;
use crate::storage::table::Tuple;
use super::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Executor-facing expression tree. Column references address one of the
/// operator's input tuples by position: index 0 is the only input for unary
/// operators, and the left/right side for joins.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    ColumnRef {
        tuple_index: usize,
        column_index: usize,
    },
    Literal(DataValue),
    Comparison {
        op: ComparisonOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    pub fn column(tuple_index: usize, column_index: usize) -> Self {
        Expression::ColumnRef { tuple_index, column_index }
    }

    /// Evaluate against a single input tuple
    pub fn evaluate(&self, tuple: &Tuple) -> QueryResult<DataValue> {
        self.evaluate_with(&[tuple])
    }

    /// Evaluate against a join's two input tuples
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> QueryResult<DataValue> {
        self.evaluate_with(&[left, right])
    }

    fn evaluate_with(&self, tuples: &[&Tuple]) -> QueryResult<DataValue> {
        match self {
            Expression::ColumnRef { tuple_index, column_index } => {
                let tuple = tuples.get(*tuple_index).ok_or_else(|| {
                    QueryError::InvalidExpression(format!("no input tuple {tuple_index}"))
                })?;
                tuple.value(*column_index).cloned().ok_or_else(|| {
                    QueryError::InvalidExpression(format!("no column {column_index}"))
                })
            }
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Comparison { op, left, right } => {
                let lhs = left.evaluate_with(tuples)?;
                let rhs = right.evaluate_with(tuples)?;
                // Comparisons against NULL never hold.
                if lhs.is_null() || rhs.is_null() {
                    return Ok(DataValue::Boolean(false));
                }
                let ord = lhs.compare(&rhs);
                let result = match op {
                    ComparisonOp::Equal => ord == Ordering::Equal,
                    ComparisonOp::NotEqual => ord != Ordering::Equal,
                    ComparisonOp::LessThan => ord == Ordering::Less,
                    ComparisonOp::LessThanOrEqual => ord != Ordering::Greater,
                    ComparisonOp::GreaterThan => ord == Ordering::Greater,
                    ComparisonOp::GreaterThanOrEqual => ord != Ordering::Less,
                };
                Ok(DataValue::Boolean(result))
            }
            Expression::Logic { op, left, right } => {
                let lhs = left.evaluate_with(tuples)?.as_bool()?;
                let rhs = right.evaluate_with(tuples)?.as_bool()?;
                Ok(DataValue::Boolean(match op {
                    LogicOp::And => lhs && rhs,
                    LogicOp::Or => lhs || rhs,
                }))
            }
        }
    }

    /// Does this predicate accept the given single tuple?
    pub fn matches(&self, tuple: &Tuple) -> QueryResult<bool> {
        self.evaluate(tuple)?.as_bool()
    }

    /// Does this predicate accept the given pair of join inputs?
    pub fn matches_join(&self, left: &Tuple, right: &Tuple) -> QueryResult<bool> {
        self.evaluate_join(left, right)?.as_bool()
    }
}

impl DataValue {
    pub(crate) fn as_bool(&self) -> QueryResult<bool> {
        match self {
            DataValue::Boolean(b) => Ok(*b),
            DataValue::Null => Ok(false),
            other => Err(QueryError::InvalidExpression(format!(
                "expected boolean, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(values: Vec<DataValue>) -> Tuple {
        Tuple::new(values)
    }

    #[test]
    fn test_column_and_literal() {
        let t = tuple(vec![DataValue::Integer(5), DataValue::Text("x".into())]);
        assert_eq!(Expression::column(0, 1).evaluate(&t).unwrap(), DataValue::Text("x".into()));
        assert_eq!(
            Expression::Literal(DataValue::Integer(9)).evaluate(&t).unwrap(),
            DataValue::Integer(9)
        );
        assert!(Expression::column(0, 7).evaluate(&t).is_err());
    }

    #[test]
    fn test_comparisons() {
        let t = tuple(vec![DataValue::Integer(5)]);
        let five_lt_six = Expression::Comparison {
            op: ComparisonOp::LessThan,
            left: Box::new(Expression::column(0, 0)),
            right: Box::new(Expression::Literal(DataValue::Integer(6))),
        };
        assert!(five_lt_six.matches(&t).unwrap());

        let null_eq = Expression::Comparison {
            op: ComparisonOp::Equal,
            left: Box::new(Expression::column(0, 0)),
            right: Box::new(Expression::Literal(DataValue::Null)),
        };
        assert!(!null_eq.matches(&t).unwrap());
    }

    #[test]
    fn test_join_evaluation() {
        let left = tuple(vec![DataValue::Integer(1)]);
        let right = tuple(vec![DataValue::Integer(1), DataValue::Integer(2)]);
        let eq = Expression::Comparison {
            op: ComparisonOp::Equal,
            left: Box::new(Expression::column(0, 0)),
            right: Box::new(Expression::column(1, 0)),
        };
        assert!(eq.matches_join(&left, &right).unwrap());

        let neq = Expression::Comparison {
            op: ComparisonOp::Equal,
            left: Box::new(Expression::column(0, 0)),
            right: Box::new(Expression::column(1, 1)),
        };
        assert!(!neq.matches_join(&left, &right).unwrap());
    }
}
