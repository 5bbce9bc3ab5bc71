//! Shard-key constraint algebra.
//!
//! A constraint is one atomic condition on the shard column. Conjunctions are
//! reduced by exact integer interval arithmetic: every constraint denotes a
//! union of at most two closed intervals over i64, and merging intersects
//! those unions pairwise. No floating point, no approximation.

/// One atomic condition on the shard column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    Eq(i64),
    Ne(i64),
    Lt(i64),
    Lte(i64),
    Gt(i64),
    Gte(i64),
    /// Inclusive on both ends
    Range(i64, i64),
}

impl Constraint {
    /// Build a range constraint, normalizing degenerate cases:
    /// a single point becomes `Eq`, an inverted interval is empty.
    pub fn range(begin: i64, end: i64) -> Option<Constraint> {
        match begin.cmp(&end) {
            std::cmp::Ordering::Greater => None,
            std::cmp::Ordering::Equal => Some(Constraint::Eq(begin)),
            std::cmp::Ordering::Less => Some(Constraint::Range(begin, end)),
        }
    }

    /// Whether `x` satisfies this constraint
    pub fn matches(&self, x: i64) -> bool {
        match *self {
            Constraint::Eq(v) => x == v,
            Constraint::Ne(v) => x != v,
            Constraint::Lt(v) => x < v,
            Constraint::Lte(v) => x <= v,
            Constraint::Gt(v) => x > v,
            Constraint::Gte(v) => x >= v,
            Constraint::Range(b, e) => b <= x && x <= e,
        }
    }

    /// Whether this constraint admits any value inside the closed
    /// interval `[begin, end]`
    pub fn overlaps(&self, begin: i64, end: i64) -> bool {
        if begin > end {
            return false;
        }
        self.intervals()
            .iter()
            .any(|&(lo, hi)| lo <= end && begin <= hi)
    }

    /// The set this constraint denotes, as disjoint closed intervals
    fn intervals(&self) -> Vec<(i64, i64)> {
        match *self {
            Constraint::Eq(v) => vec![(v, v)],
            Constraint::Ne(v) => {
                let mut out = Vec::with_capacity(2);
                if v > i64::MIN {
                    out.push((i64::MIN, v - 1));
                }
                if v < i64::MAX {
                    out.push((v + 1, i64::MAX));
                }
                out
            }
            Constraint::Lt(v) => {
                if v == i64::MIN {
                    vec![]
                } else {
                    vec![(i64::MIN, v - 1)]
                }
            }
            Constraint::Lte(v) => vec![(i64::MIN, v)],
            Constraint::Gt(v) => {
                if v == i64::MAX {
                    vec![]
                } else {
                    vec![(v + 1, i64::MAX)]
                }
            }
            Constraint::Gte(v) => vec![(v, i64::MAX)],
            Constraint::Range(b, e) => {
                if b <= e {
                    vec![(b, e)]
                } else {
                    vec![]
                }
            }
        }
    }

    /// Convert a non-empty closed interval back into the canonical constraint
    fn from_interval(lo: i64, hi: i64) -> Constraint {
        debug_assert!(lo <= hi);
        if lo == hi {
            Constraint::Eq(lo)
        } else if lo == i64::MIN && hi == i64::MAX {
            Constraint::Range(lo, hi)
        } else if lo == i64::MIN {
            Constraint::Lt(hi + 1)
        } else if hi == i64::MAX {
            Constraint::Gt(lo - 1)
        } else {
            Constraint::Range(lo, hi)
        }
    }
}

/// Merge one pair of AND-ed constraints into zero, one, two or three
/// constraints covering exactly the intersection of the two.
pub fn merge(a: Constraint, b: Constraint) -> Vec<Constraint> {
    if a == b {
        return vec![a];
    }

    let mut out = Vec::new();
    for &(alo, ahi) in &a.intervals() {
        for &(blo, bhi) in &b.intervals() {
            let lo = alo.max(blo);
            let hi = ahi.min(bhi);
            if lo <= hi {
                out.push(Constraint::from_interval(lo, hi));
            }
        }
    }
    out
}

/// Merge two constraint lists produced by independent AND-ed sub-expressions.
///
/// Each list is a disjunction over the same column, so the conjunction is the
/// Cartesian product of pairwise merges. An empty result means the combined
/// predicate is unsatisfiable.
pub fn merge_lists(left: &[Constraint], right: &[Constraint]) -> Vec<Constraint> {
    let mut out: Vec<Constraint> = Vec::new();
    for &a in left {
        for &b in right {
            for merged in merge(a, b) {
                if !out.contains(&merged) {
                    out.push(merged);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::Constraint::*;
    use super::*;

    /// Whether `x` satisfies a constraint list (a disjunction)
    fn list_matches(constraints: &[Constraint], x: i64) -> bool {
        constraints.iter().any(|c| c.matches(x))
    }

    /// Every kind with a representative value, for matrix tests
    fn samples() -> Vec<Constraint> {
        vec![
            Eq(10),
            Eq(5),
            Ne(10),
            Ne(5),
            Lt(10),
            Lt(5),
            Lte(10),
            Lte(5),
            Gt(10),
            Gt(5),
            Gte(10),
            Gte(5),
            Range(3, 12),
            Range(6, 9),
            Range(11, 20),
        ]
    }

    #[test]
    fn test_merge_soundness_matrix() {
        // x satisfies merge(a, b) iff x satisfies both a and b, checked over
        // every kind pair with boundary-heavy probe values
        let probes: Vec<i64> = (-2..=22).chain([i64::MIN, i64::MAX]).collect();
        for &a in &samples() {
            for &b in &samples() {
                let merged = merge(a, b);
                for &x in &probes {
                    assert_eq!(
                        list_matches(&merged, x),
                        a.matches(x) && b.matches(x),
                        "a={a:?} b={b:?} x={x} merged={merged:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_eq_pairs() {
        assert_eq!(merge(Eq(7), Eq(7)), vec![Eq(7)]);
        assert!(merge(Eq(7), Eq(8)).is_empty());
        assert_eq!(merge(Eq(7), Ne(8)), vec![Eq(7)]);
        assert!(merge(Eq(7), Ne(7)).is_empty());
    }

    #[test]
    fn test_eq_against_bounds() {
        assert_eq!(merge(Eq(10), Gt(5)), vec![Eq(10)]);
        assert!(merge(Eq(5), Gt(5)).is_empty());
        assert_eq!(merge(Eq(5), Gte(5)), vec![Eq(5)]);
        assert_eq!(merge(Eq(4), Lt(5)), vec![Eq(4)]);
        assert!(merge(Eq(5), Lt(5)).is_empty());
        assert_eq!(merge(Eq(5), Lte(5)), vec![Eq(5)]);
        assert_eq!(merge(Eq(5), Range(1, 10)), vec![Eq(5)]);
        assert!(merge(Eq(11), Range(1, 10)).is_empty());
    }

    #[test]
    fn test_ne_pair_splits_into_three() {
        let merged = merge(Ne(10), Ne(5));
        assert_eq!(merged.len(), 3);
        assert!(merged.contains(&Gt(10)));
        assert!(merged.contains(&Lt(5)));
        assert!(merged.contains(&Range(6, 9)));
    }

    #[test]
    fn test_adjacent_ne_pair_has_no_gap() {
        // nothing lies strictly between 5 and 6
        let merged = merge(Ne(5), Ne(6));
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&Lt(5)));
        assert!(merged.contains(&Gt(6)));
    }

    #[test]
    fn test_opposing_bounds_become_range() {
        assert_eq!(merge(Gt(5), Lt(10)), vec![Range(6, 9)]);
        assert_eq!(merge(Gt(5), Lte(10)), vec![Range(6, 10)]);
        assert_eq!(merge(Gte(5), Lt(10)), vec![Range(5, 9)]);
        assert_eq!(merge(Gte(5), Lte(10)), vec![Range(5, 10)]);
        // touching bounds collapse to a point
        assert_eq!(merge(Gte(5), Lte(5)), vec![Eq(5)]);
        assert_eq!(merge(Gt(5), Lt(7)), vec![Eq(6)]);
        // disjoint bounds are unsatisfiable
        assert!(merge(Gt(10), Lt(5)).is_empty());
        assert!(merge(Gt(5), Lt(6)).is_empty());
    }

    #[test]
    fn test_same_direction_keeps_tighter_bound() {
        assert_eq!(merge(Gt(5), Gt(10)), vec![Gt(10)]);
        assert_eq!(merge(Gte(5), Gte(10)), vec![Gte(10)]);
        assert_eq!(merge(Gt(5), Gte(10)), vec![Gte(10)]);
        assert_eq!(merge(Gt(10), Gte(5)), vec![Gt(10)]);
        assert_eq!(merge(Lt(10), Lt(5)), vec![Lt(5)]);
        assert_eq!(merge(Lte(10), Lte(5)), vec![Lte(5)]);
        assert_eq!(merge(Lt(5), Lte(10)), vec![Lt(5)]);
    }

    #[test]
    fn test_range_intersection() {
        assert_eq!(merge(Range(1, 10), Range(5, 20)), vec![Range(5, 10)]);
        assert_eq!(merge(Range(1, 10), Range(10, 20)), vec![Eq(10)]);
        assert!(merge(Range(1, 5), Range(6, 10)).is_empty());
    }

    #[test]
    fn test_bound_clips_range() {
        assert_eq!(merge(Gt(5), Range(1, 10)), vec![Range(6, 10)]);
        assert_eq!(merge(Lte(7), Range(1, 10)), vec![Range(1, 7)]);
        assert_eq!(merge(Ne(5), Range(1, 10)), vec![Range(1, 4), Range(6, 10)]);
        assert_eq!(merge(Ne(1), Range(1, 10)), vec![Range(2, 10)]);
        assert!(merge(Gt(10), Range(1, 10)).is_empty());
    }

    #[test]
    fn test_merge_lists_cartesian() {
        // (> 10 OR < 10) AND (> 5 OR < 5), the NE-pair encoding of
        // x != 10 AND x != 5
        let left = vec![Gt(10), Lt(10)];
        let right = vec![Gt(5), Lt(5)];
        let merged = merge_lists(&left, &right);
        assert_eq!(merged.len(), 3);
        assert!(merged.contains(&Gt(10)));
        assert!(merged.contains(&Lt(5)));
        assert!(merged.contains(&Range(6, 9)));
    }

    #[test]
    fn test_merge_lists_unsatisfiable() {
        assert!(merge_lists(&[Eq(1)], &[Eq(2)]).is_empty());
    }

    #[test]
    fn test_extreme_values() {
        assert!(merge(Lt(i64::MIN), Lte(0)).is_empty());
        assert!(merge(Gt(i64::MAX), Gte(0)).is_empty());
        assert_eq!(merge(Gte(i64::MAX), Lte(i64::MAX)), vec![Eq(i64::MAX)]);
    }

    #[test]
    fn test_overlaps_closed_interval() {
        assert!(Eq(150).overlaps(101, 200));
        assert!(!Eq(150).overlaps(1, 100));
        assert!(Range(50, 150).overlaps(1, 100));
        assert!(Range(50, 150).overlaps(101, 200));
        assert!(Gt(100).overlaps(101, 200));
        assert!(!Gt(200).overlaps(101, 200));
        assert!(Lt(101).overlaps(1, 100));
        assert!(!Lt(1).overlaps(1, 100));
        assert!(Ne(5).overlaps(1, 10));
        assert!(!Ne(5).overlaps(5, 5));
    }

    #[test]
    fn test_range_constructor_normalizes() {
        assert_eq!(Constraint::range(5, 5), Some(Eq(5)));
        assert_eq!(Constraint::range(5, 9), Some(Range(5, 9)));
        assert_eq!(Constraint::range(9, 5), None);
    }
}
