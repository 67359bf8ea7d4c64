use super::expression::{ComparisonOp, Expression, LogicOp};
use super::plan::PlanNode;

/// Rewrite eligible nested-loop joins into hash joins, bottom-up.
///
/// A join qualifies when its predicate is `col = col`, or two such
/// comparisons conjoined with AND, and every compared column references
/// exactly one input side (tuple index 0 = left, 1 = right). Key expression
/// vectors keep source order and are re-anchored to tuple index 0, since
/// each side's keys are evaluated against that side's tuple alone.
pub fn optimize_nlj_as_hash_join(plan: PlanNode) -> PlanNode {
    let plan = rewrite_children(plan);
    if let PlanNode::NestedLoopJoin { left, right, predicate } = plan {
        match extract_equi_keys(&predicate) {
            Some((left_keys, right_keys)) => PlanNode::HashJoin {
                left,
                right,
                left_keys,
                right_keys,
            },
            None => PlanNode::NestedLoopJoin { left, right, predicate },
        }
    } else {
        plan
    }
}

fn rewrite_children(plan: PlanNode) -> PlanNode {
    match plan {
        PlanNode::Insert { table_oid, child } => PlanNode::Insert {
            table_oid,
            child: Box::new(optimize_nlj_as_hash_join(*child)),
        },
        PlanNode::Update { table_oid, assignments, child } => PlanNode::Update {
            table_oid,
            assignments,
            child: Box::new(optimize_nlj_as_hash_join(*child)),
        },
        PlanNode::Delete { table_oid, child } => PlanNode::Delete {
            table_oid,
            child: Box::new(optimize_nlj_as_hash_join(*child)),
        },
        PlanNode::NestedLoopJoin { left, right, predicate } => PlanNode::NestedLoopJoin {
            left: Box::new(optimize_nlj_as_hash_join(*left)),
            right: Box::new(optimize_nlj_as_hash_join(*right)),
            predicate,
        },
        PlanNode::HashJoin { left, right, left_keys, right_keys } => PlanNode::HashJoin {
            left: Box::new(optimize_nlj_as_hash_join(*left)),
            right: Box::new(optimize_nlj_as_hash_join(*right)),
            left_keys,
            right_keys,
        },
        PlanNode::Aggregation { child, group_by, aggregates } => PlanNode::Aggregation {
            child: Box::new(optimize_nlj_as_hash_join(*child)),
            group_by,
            aggregates,
        },
        PlanNode::Sort { child, order_by } => PlanNode::Sort {
            child: Box::new(optimize_nlj_as_hash_join(*child)),
            order_by,
        },
        PlanNode::TopN { child, order_by, limit } => PlanNode::TopN {
            child: Box::new(optimize_nlj_as_hash_join(*child)),
            order_by,
            limit,
        },
        leaf @ (PlanNode::SeqScan { .. } | PlanNode::IndexScan { .. } | PlanNode::Values { .. }) => {
            leaf
        }
    }
}

fn extract_equi_keys(predicate: &Expression) -> Option<(Vec<Expression>, Vec<Expression>)> {
    match predicate {
        Expression::Comparison { .. } => {
            let mut left_keys = Vec::new();
            let mut right_keys = Vec::new();
            collect_equi_pair(predicate, &mut left_keys, &mut right_keys)?;
            Some((left_keys, right_keys))
        }
        Expression::Logic { op: LogicOp::And, left, right } => {
            let mut left_keys = Vec::new();
            let mut right_keys = Vec::new();
            collect_equi_pair(left, &mut left_keys, &mut right_keys)?;
            collect_equi_pair(right, &mut left_keys, &mut right_keys)?;
            Some((left_keys, right_keys))
        }
        _ => None,
    }
}

/// Accept `col = col` with one column per side of the join; push each
/// column onto its side's key vector, re-anchored to tuple index 0.
fn collect_equi_pair(
    expr: &Expression,
    left_keys: &mut Vec<Expression>,
    right_keys: &mut Vec<Expression>,
) -> Option<()> {
    let (lhs, rhs) = match expr {
        Expression::Comparison { op: ComparisonOp::Equal, left, right } => {
            (left.as_ref(), right.as_ref())
        }
        _ => return None,
    };
    let (l_tuple, l_col) = as_column(lhs)?;
    let (r_tuple, r_col) = as_column(rhs)?;
    if l_tuple == r_tuple {
        return None;
    }
    for (tuple_index, column_index) in [(l_tuple, l_col), (r_tuple, r_col)] {
        let anchored = Expression::column(0, column_index);
        match tuple_index {
            0 => left_keys.push(anchored),
            1 => right_keys.push(anchored),
            _ => return None,
        }
    }
    Some(())
}

fn as_column(expr: &Expression) -> Option<(usize, usize)> {
    match expr {
        Expression::ColumnRef { tuple_index, column_index } => Some((*tuple_index, *column_index)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nlj(predicate: Expression) -> PlanNode {
        PlanNode::NestedLoopJoin {
            left: Box::new(PlanNode::SeqScan { table_oid: 0, predicate: None }),
            right: Box::new(PlanNode::SeqScan { table_oid: 1, predicate: None }),
            predicate,
        }
    }

    fn col_eq(l: (usize, usize), r: (usize, usize)) -> Expression {
        Expression::Comparison {
            op: ComparisonOp::Equal,
            left: Box::new(Expression::column(l.0, l.1)),
            right: Box::new(Expression::column(r.0, r.1)),
        }
    }

    #[test]
    fn test_single_equality_rewrites() {
        let plan = optimize_nlj_as_hash_join(nlj(col_eq((0, 2), (1, 3))));
        match plan {
            PlanNode::HashJoin { left_keys, right_keys, .. } => {
                assert_eq!(left_keys, vec![Expression::column(0, 2)]);
                assert_eq!(right_keys, vec![Expression::column(0, 3)]);
            }
            other => panic!("expected hash join, got {other:?}"),
        }
    }

    #[test]
    fn test_reversed_sides_land_in_source_order() {
        // right.col = left.col: the key vectors still line up per side.
        let plan = optimize_nlj_as_hash_join(nlj(col_eq((1, 1), (0, 0))));
        match plan {
            PlanNode::HashJoin { left_keys, right_keys, .. } => {
                assert_eq!(left_keys, vec![Expression::column(0, 0)]);
                assert_eq!(right_keys, vec![Expression::column(0, 1)]);
            }
            other => panic!("expected hash join, got {other:?}"),
        }
    }

    #[test]
    fn test_conjunction_of_two_equalities() {
        let pred = Expression::Logic {
            op: LogicOp::And,
            left: Box::new(col_eq((0, 0), (1, 0))),
            right: Box::new(col_eq((1, 2), (0, 1))),
        };
        let plan = optimize_nlj_as_hash_join(nlj(pred));
        match plan {
            PlanNode::HashJoin { left_keys, right_keys, .. } => {
                assert_eq!(
                    left_keys,
                    vec![Expression::column(0, 0), Expression::column(0, 1)]
                );
                assert_eq!(
                    right_keys,
                    vec![Expression::column(0, 0), Expression::column(0, 2)]
                );
            }
            other => panic!("expected hash join, got {other:?}"),
        }
    }

    #[test]
    fn test_non_equi_predicates_pass_through() {
        let lt = Expression::Comparison {
            op: ComparisonOp::LessThan,
            left: Box::new(Expression::column(0, 0)),
            right: Box::new(Expression::column(1, 0)),
        };
        assert!(matches!(
            optimize_nlj_as_hash_join(nlj(lt)),
            PlanNode::NestedLoopJoin { .. }
        ));

        // Equality against a literal is not a join key.
        let lit = Expression::Comparison {
            op: ComparisonOp::Equal,
            left: Box::new(Expression::column(0, 0)),
            right: Box::new(Expression::Literal(crate::catalog::value::DataValue::Integer(3))),
        };
        assert!(matches!(
            optimize_nlj_as_hash_join(nlj(lit)),
            PlanNode::NestedLoopJoin { .. }
        ));

        // Both columns on the same side: pass through.
        assert!(matches!(
            optimize_nlj_as_hash_join(nlj(col_eq((0, 0), (0, 1)))),
            PlanNode::NestedLoopJoin { .. }
        ));
    }

    #[test]
    fn test_rewrite_recurses_into_children() {
        let inner = nlj(col_eq((0, 0), (1, 0)));
        let outer = PlanNode::Sort {
            child: Box::new(inner),
            order_by: vec![],
        };
        match optimize_nlj_as_hash_join(outer) {
            PlanNode::Sort { child, .. } => {
                assert!(matches!(*child, PlanNode::HashJoin { .. }));
            }
            other => panic!("expected sort, got {other:?}"),
        }
    }
}
