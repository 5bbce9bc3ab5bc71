//! Statement routing: shard-key extraction, group resolution, read-write
//! split. The output of [`Router::route_statement`] is everything the session
//! needs to dispatch one statement.

mod resolve;
mod rw_split;

pub use resolve::{RuleKind, ShardingRule};
pub use rw_split::RouteTarget;

use std::collections::HashMap;

use crate::parser::{AnalyzerError, SqlAnalyzer, StatementType};

/// Routing decision for one statement
#[derive(Debug, Clone)]
pub struct RoutePlan {
    /// Target db groups, in rule declaration order
    pub groups: Vec<String>,
    pub target: RouteTarget,
    pub is_write: bool,
    pub stmt_type: StatementType,
    /// LIMIT from the statement, for client-side trimming on fan-out reads
    pub limit: Option<u64>,
}

impl RoutePlan {
    pub fn is_scatter(&self) -> bool {
        self.groups.len() > 1
    }
}

/// Statement router shared by every session
pub struct Router {
    /// Rules keyed by lowercase logical table name
    rules: HashMap<String, ShardingRule>,
    /// Group serving statements that touch no sharded table
    default_group: String,
    analyzer: SqlAnalyzer,
}

impl Router {
    pub fn new(rules: Vec<ShardingRule>, default_group: String) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| (r.table.to_lowercase(), r))
            .collect();
        Self {
            rules,
            default_group,
            analyzer: SqlAnalyzer::new(),
        }
    }

    pub fn default_group(&self) -> &str {
        &self.default_group
    }

    pub fn find_rule(&self, table: &str) -> Option<&ShardingRule> {
        // qualified names match on their last segment
        let bare = table.rsplit('.').next().unwrap_or(table);
        self.rules.get(&bare.to_lowercase())
    }

    /// Analyze and route one statement.
    ///
    /// `in_transaction` and `master_hint` only influence the read-write
    /// split; the group set is a pure function of the rule and the SQL text.
    pub fn route_statement(
        &self,
        sql: &str,
        in_transaction: bool,
        master_hint: bool,
    ) -> Result<RoutePlan, RouteError> {
        let analysis = self.analyzer.analyze(sql)?;
        let is_write = analysis.stmt_type.is_write();
        let target = rw_split::split(analysis.stmt_type, in_transaction, master_hint);

        let mut sharded: Vec<&ShardingRule> = Vec::new();
        for table in &analysis.tables {
            if let Some(rule) = self.find_rule(table) {
                if !sharded.iter().any(|r| r.table == rule.table) {
                    sharded.push(rule);
                }
            }
        }

        let groups = match sharded.as_slice() {
            [] => vec![self.default_group.clone()],
            [rule] => {
                let extraction = analysis.extract(&rule.column)?;
                rule.resolve(&extraction, is_write)?
            }
            // joining two sharded tables cannot be routed safely
            _ => return Err(RouteError::NotSupport("join across sharded tables")),
        };

        // result shapes the proxy cannot merge are only safe on one shard
        if groups.len() > 1 {
            if let Some(shape) = analysis.fan_out_blocker {
                return Err(RouteError::NotSupport(shape));
            }
        }

        Ok(RoutePlan {
            groups,
            target,
            is_write,
            stmt_type: analysis.stmt_type,
            limit: analysis.limit,
        })
    }
}

/// Statement-scoped routing failures. Every variant maps to one fixed ERR
/// packet; the client connection survives all of them.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("shard key constraints match no group")]
    HitNothing,

    #[error("insert statement must bind the shard column to a literal value")]
    NoShardColumn,

    #[error("write statement would hit more than one shard")]
    MultiShardWrite,

    #[error("shard key value is outside every configured range")]
    WrongRange,

    #[error("shard key value cannot be hashed to a group")]
    WrongHash,

    #[error("statement is not supported by the router: {0}")]
    NotSupport(&'static str),

    #[error("failed to parse statement: {0}")]
    Parse(String),
}

impl RouteError {
    /// MySQL error code carried by the ERR packet
    pub fn code(&self) -> u16 {
        // ER_UNKNOWN_ERROR, matching what clients expect from a proxy
        1105
    }

    pub fn sql_state(&self) -> &'static str {
        "HY000"
    }
}

impl From<AnalyzerError> for RouteError {
    fn from(err: AnalyzerError) -> Self {
        match err {
            AnalyzerError::NoShardColumn => RouteError::NoShardColumn,
            AnalyzerError::ParseError(msg) => RouteError::Parse(msg),
            AnalyzerError::EmptyStatement => RouteError::Parse("empty statement".into()),
            AnalyzerError::MultipleStatements(_) => {
                RouteError::NotSupport("multi-statement batch")
            }
            AnalyzerError::Unsupported(what) => RouteError::NotSupport(what),
        }
    }
}
