use serde::Deserialize;

use crate::parser::{Constraint, Extraction};

use super::RouteError;

/// Sharding rule for one logical table
#[derive(Debug, Clone, Deserialize)]
pub struct ShardingRule {
    /// Logical table name (exact match, case-insensitive)
    pub table: String,
    /// Column carrying the shard key
    pub column: String,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// How shard-key constraints map onto db groups
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleKind {
    /// `value mod groups.len()` indexes into the ordered group list
    Hash { groups: Vec<String> },
    /// Ordered, non-overlapping inclusive value intervals
    Range { slots: Vec<RangeSlot> },
}

/// One interval of the shard-key space owned by a group
#[derive(Debug, Clone, Deserialize)]
pub struct RangeSlot {
    pub group: String,
    pub begin: i64,
    pub end: i64,
}

impl ShardingRule {
    /// Every group this rule can route to, in declaration order
    pub fn all_groups(&self) -> Vec<String> {
        match &self.kind {
            RuleKind::Hash { groups } => groups.clone(),
            RuleKind::Range { slots } => {
                let mut out: Vec<String> = Vec::with_capacity(slots.len());
                for slot in slots {
                    if !out.contains(&slot.group) {
                        out.push(slot.group.clone());
                    }
                }
                out
            }
        }
    }

    /// Resolve an extraction outcome to the db groups that must be queried.
    ///
    /// Resolution is a pure function of the rule and the constraints; the
    /// same inputs always produce the same group list. Writes may never
    /// target more than one group.
    pub fn resolve(
        &self,
        extraction: &Extraction,
        is_write: bool,
    ) -> Result<Vec<String>, RouteError> {
        let groups = match extraction {
            // no usable shard-key information: broadcast
            Extraction::AllShards | Extraction::NoShardKey => self.all_groups(),
            Extraction::Constraints(constraints) => {
                if constraints.is_empty() {
                    return Err(RouteError::HitNothing);
                }
                match &self.kind {
                    RuleKind::Hash { groups } => resolve_hash(groups, constraints)?,
                    RuleKind::Range { slots } => resolve_range(slots, constraints)?,
                }
            }
        };

        if is_write && groups.len() > 1 {
            return Err(RouteError::MultiShardWrite);
        }
        Ok(groups)
    }
}

fn resolve_hash(groups: &[String], constraints: &[Constraint]) -> Result<Vec<String>, RouteError> {
    let slot_count = groups.len() as i64;
    if slot_count == 0 {
        return Err(RouteError::WrongHash);
    }

    // only a pure-EQ constraint list pins hash slots
    let mut out: Vec<String> = Vec::new();
    for constraint in constraints {
        match *constraint {
            Constraint::Eq(value) => {
                let group = &groups[value.rem_euclid(slot_count) as usize];
                if !out.contains(group) {
                    out.push(group.clone());
                }
            }
            _ => return Ok(groups.to_vec()),
        }
    }

    if out.is_empty() {
        return Err(RouteError::WrongHash);
    }
    Ok(out)
}

fn resolve_range(slots: &[RangeSlot], constraints: &[Constraint]) -> Result<Vec<String>, RouteError> {
    let mut out: Vec<String> = Vec::new();
    for slot in slots {
        let hit = constraints.iter().any(|c| c.overlaps(slot.begin, slot.end));
        if hit && !out.contains(&slot.group) {
            out.push(slot.group.clone());
        }
    }

    if out.is_empty() {
        return Err(RouteError::WrongRange);
    }
    Ok(out)
}
