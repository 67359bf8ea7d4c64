use std::collections::HashMap;

use crate::common::types::Rid;
use crate::catalog::value::DataValue;
use crate::storage::table::Tuple;
use crate::query::expression::Expression;
use crate::query::plan::{AggregateExpr, AggregateFunction};
use crate::query::{QueryError, QueryResult};
use super::Executor;

/// Running state for one aggregate of one group
enum Accumulator {
    Count(i64),
    Sum(Option<DataValue>),
    Min(Option<DataValue>),
    Max(Option<DataValue>),
}

impl Accumulator {
    fn new(func: AggregateFunction) -> Self {
        match func {
            AggregateFunction::CountStar | AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum => Accumulator::Sum(None),
            AggregateFunction::Min => Accumulator::Min(None),
            AggregateFunction::Max => Accumulator::Max(None),
        }
    }

    fn update(&mut self, agg: &AggregateExpr, tuple: &Tuple) -> QueryResult<()> {
        let arg = match &agg.argument {
            Some(expr) => Some(expr.evaluate(tuple)?),
            None => None,
        };
        match self {
            Accumulator::Count(n) => {
                let counts = match agg.func {
                    AggregateFunction::CountStar => true,
                    _ => matches!(&arg, Some(v) if !v.is_null()),
                };
                if counts {
                    *n += 1;
                }
            }
            Accumulator::Sum(total) => {
                if let Some(value) = arg.filter(|v| !v.is_null()) {
                    *total = Some(match total.take() {
                        Some(prev) => add_values(&prev, &value)?,
                        None => value,
                    });
                }
            }
            Accumulator::Min(best) => {
                if let Some(value) = arg.filter(|v| !v.is_null()) {
                    let keep = match best {
                        Some(prev) => value.compare(prev).is_lt(),
                        None => true,
                    };
                    if keep {
                        *best = Some(value);
                    }
                }
            }
            Accumulator::Max(best) => {
                if let Some(value) = arg.filter(|v| !v.is_null()) {
                    let keep = match best {
                        Some(prev) => value.compare(prev).is_gt(),
                        None => true,
                    };
                    if keep {
                        *best = Some(value);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> DataValue {
        match self {
            Accumulator::Count(n) => DataValue::Integer(n),
            Accumulator::Sum(v) | Accumulator::Min(v) | Accumulator::Max(v) => {
                v.unwrap_or(DataValue::Null)
            }
        }
    }
}

fn add_values(a: &DataValue, b: &DataValue) -> QueryResult<DataValue> {
    use DataValue::*;
    match (a, b) {
        (Integer(x), Integer(y)) => Ok(Integer(x + y)),
        (Integer(x), Float(y)) => Ok(Float(*x as f64 + y)),
        (Float(x), Integer(y)) => Ok(Float(x + *y as f64)),
        (Float(x), Float(y)) => Ok(Float(x + y)),
        _ => Err(QueryError::InvalidExpression(format!(
            "cannot sum {a} and {b}"
        ))),
    }
}

/// Hash aggregation: one pass over the child builds per-group accumulators,
/// then groups are emitted in first-seen order as
/// `group keys ++ aggregate results`.
pub struct AggregationExecutor {
    child: Box<Executor>,
    group_by: Vec<Expression>,
    aggregates: Vec<AggregateExpr>,
    output: Vec<Tuple>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<Executor>,
        group_by: Vec<Expression>,
        aggregates: Vec<AggregateExpr>,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            output: Vec::new(),
            cursor: 0,
        }
    }

    pub fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.output.clear();
        self.cursor = 0;

        // Insertion-ordered groups: the map only remembers positions.
        let mut groups: Vec<(Vec<DataValue>, Vec<Accumulator>)> = Vec::new();
        let mut positions: HashMap<Vec<DataValue>, usize> = HashMap::new();

        while let Some((tuple, _)) = self.child.next()? {
            let mut key = Vec::with_capacity(self.group_by.len());
            for expr in &self.group_by {
                key.push(expr.evaluate(&tuple)?);
            }
            let slot = match positions.get(&key) {
                Some(&slot) => slot,
                None => {
                    let accumulators = self
                        .aggregates
                        .iter()
                        .map(|agg| Accumulator::new(agg.func))
                        .collect();
                    groups.push((key.clone(), accumulators));
                    positions.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };
            for (accumulator, agg) in groups[slot].1.iter_mut().zip(&self.aggregates) {
                accumulator.update(agg, &tuple)?;
            }
        }

        // No input and no grouping still yields one row of initial values.
        if groups.is_empty() && self.group_by.is_empty() {
            let values: Vec<DataValue> = self
                .aggregates
                .iter()
                .map(|agg| Accumulator::new(agg.func).finish())
                .collect();
            self.output.push(Tuple::new(values));
            return Ok(());
        }

        for (key, accumulators) in groups {
            let mut values = key;
            values.extend(accumulators.into_iter().map(Accumulator::finish));
            self.output.push(Tuple::new(values));
        }
        Ok(())
    }

    pub fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor >= self.output.len() {
            return Ok(None);
        }
        let tuple = self.output[self.cursor].clone();
        self.cursor += 1;
        Ok(Some((tuple, Rid::invalid())))
    }
}
