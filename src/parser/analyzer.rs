use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, Query, Select, SelectItem, SetExpr, Statement, TableFactor,
    TableWithJoins, UnaryOperator, Value,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use super::constraint::{merge_lists, Constraint};

/// SQL analysis result: everything the router needs from one statement
#[derive(Debug, Clone)]
pub struct SqlAnalysis {
    pub stmt_type: StatementType,
    /// Tables referenced by the statement
    pub tables: Vec<String>,
    /// WHERE clause, kept for shard-key extraction once the rule is known
    pub selection: Option<Expr>,
    /// Column list and literal rows for INSERT/REPLACE
    pub insert: Option<InsertValues>,
    /// LIMIT, used for client-side row trimming on fan-out reads
    pub limit: Option<u64>,
    /// Result shape that cannot be merged row-by-row across shards; only
    /// enforced when the statement resolves to more than one group
    pub fan_out_blocker: Option<&'static str>,
}

/// Column list and value rows of an INSERT statement
#[derive(Debug, Clone)]
pub struct InsertValues {
    pub columns: Vec<String>,
    /// One entry per row; non-literal expressions are None
    pub rows: Vec<Vec<Option<i64>>>,
}

/// Type of SQL statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Begin,
    Commit,
    Rollback,
    Set,
    Show,
    Use,
    Other,
}

impl StatementType {
    pub fn is_read_only(&self) -> bool {
        matches!(self, StatementType::Select | StatementType::Show)
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StatementType::Insert | StatementType::Update | StatementType::Delete
        )
    }
}

/// Outcome of shard-key extraction for one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Normalized constraints on the shard column. An empty list means the
    /// predicate is unsatisfiable (constraints were found but contradict).
    Constraints(Vec<Constraint>),
    /// Conditions exist but none bound the shard column
    NoShardKey,
    /// No WHERE clause at all
    AllShards,
}

/// SQL Analyzer over the MySQL dialect
pub struct SqlAnalyzer {
    dialect: MySqlDialect,
}

impl SqlAnalyzer {
    pub fn new() -> Self {
        Self {
            dialect: MySqlDialect {},
        }
    }

    /// Parse and analyze one SQL statement
    pub fn analyze(&self, sql: &str) -> Result<SqlAnalysis, AnalyzerError> {
        let sql_trimmed = sql.trim();

        // transaction control never needs a full parse
        let sql_upper = sql_trimmed.to_uppercase();
        if sql_upper.starts_with("BEGIN") || sql_upper.starts_with("START TRANSACTION") {
            return Ok(SqlAnalysis::bare(StatementType::Begin));
        }
        if sql_upper.starts_with("COMMIT") {
            return Ok(SqlAnalysis::bare(StatementType::Commit));
        }
        if sql_upper.starts_with("ROLLBACK") {
            return Ok(SqlAnalysis::bare(StatementType::Rollback));
        }

        let statements = Parser::parse_sql(&self.dialect, sql_trimmed)
            .map_err(|e| AnalyzerError::ParseError(e.to_string()))?;

        match statements.len() {
            0 => Err(AnalyzerError::EmptyStatement),
            1 => self.analyze_statement(&statements[0]),
            n => Err(AnalyzerError::MultipleStatements(n)),
        }
    }

    fn analyze_statement(&self, stmt: &Statement) -> Result<SqlAnalysis, AnalyzerError> {
        match stmt {
            Statement::Query(query) => self.analyze_query(query),
            Statement::Insert {
                table_name,
                columns,
                source,
                ..
            } => {
                let insert = source
                    .as_deref()
                    .and_then(|src| match src.body.as_ref() {
                        SetExpr::Values(values) => Some(values),
                        _ => None,
                    })
                    .map(|values| InsertValues {
                        columns: columns.iter().map(|c| c.value.clone()).collect(),
                        rows: values
                            .rows
                            .iter()
                            .map(|row| row.iter().map(literal_i64).collect())
                            .collect(),
                    });

                Ok(SqlAnalysis {
                    stmt_type: StatementType::Insert,
                    tables: vec![table_name.to_string()],
                    selection: None,
                    insert,
                    limit: None,
                    fan_out_blocker: None,
                })
            }
            Statement::Update {
                table, selection, ..
            } => Ok(SqlAnalysis {
                stmt_type: StatementType::Update,
                tables: table_names(table),
                selection: selection.clone(),
                insert: None,
                limit: None,
                fan_out_blocker: None,
            }),
            Statement::Delete {
                from, selection, ..
            } => Ok(SqlAnalysis {
                stmt_type: StatementType::Delete,
                tables: from.iter().flat_map(table_names).collect(),
                selection: selection.clone(),
                insert: None,
                limit: None,
                fan_out_blocker: None,
            }),
            Statement::SetVariable { .. } => Ok(SqlAnalysis::bare(StatementType::Set)),
            Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowVariable { .. } => Ok(SqlAnalysis::bare(StatementType::Show)),
            Statement::Use { db_name } => {
                let mut analysis = SqlAnalysis::bare(StatementType::Use);
                analysis.tables = vec![db_name.to_string()];
                Ok(analysis)
            }
            Statement::StartTransaction { .. } => Ok(SqlAnalysis::bare(StatementType::Begin)),
            Statement::Commit { .. } => Ok(SqlAnalysis::bare(StatementType::Commit)),
            Statement::Rollback { .. } => Ok(SqlAnalysis::bare(StatementType::Rollback)),
            _ => Ok(SqlAnalysis::bare(StatementType::Other)),
        }
    }

    fn analyze_query(&self, query: &Query) -> Result<SqlAnalysis, AnalyzerError> {
        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select,
            // UNION/INTERSECT/EXCEPT cannot be routed safely
            SetExpr::SetOperation { .. } => return Err(AnalyzerError::Unsupported("set operation")),
            _ => return Err(AnalyzerError::Unsupported("query shape")),
        };

        let tables: Vec<String> = select.from.iter().flat_map(table_names).collect();
        let limit = query.limit.as_ref().and_then(|e| literal_i64(e)).and_then(|v| u64::try_from(v).ok());

        Ok(SqlAnalysis {
            stmt_type: StatementType::Select,
            tables,
            selection: select.selection.clone(),
            insert: None,
            limit,
            fan_out_blocker: fan_out_blocker(select, query),
        })
    }
}

/// Detect result shapes a fan-out cannot reproduce by concatenating shard
/// rows: aggregates and GROUP BY/HAVING need a re-aggregation pass, OFFSET
/// and ORDER BY under LIMIT need a global sort. Single-group statements are
/// unaffected; the backend computes the full answer itself.
fn fan_out_blocker(select: &Select, query: &Query) -> Option<&'static str> {
    let grouped = match &select.group_by {
        GroupByExpr::All => true,
        GroupByExpr::Expressions(exprs) => !exprs.is_empty(),
    };
    if grouped {
        return Some("GROUP BY across shards");
    }
    if select.having.is_some() {
        return Some("HAVING across shards");
    }
    let aggregated = select.projection.iter().any(|item| match item {
        SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
            contains_aggregate(expr)
        }
        _ => false,
    });
    if aggregated {
        return Some("aggregate function across shards");
    }
    if query.offset.is_some() {
        return Some("OFFSET across shards");
    }
    if !query.order_by.is_empty() && query.limit.is_some() {
        return Some("ORDER BY with LIMIT across shards");
    }
    None
}

fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function(func) => matches!(
            func.name.to_string().to_uppercase().as_str(),
            "COUNT" | "SUM" | "AVG" | "MIN" | "MAX" | "GROUP_CONCAT" | "STD" | "STDDEV" | "VARIANCE"
        ),
        Expr::BinaryOp { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            contains_aggregate(expr)
        }
        _ => false,
    }
}

impl Default for SqlAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlAnalysis {
    fn bare(stmt_type: StatementType) -> Self {
        Self {
            stmt_type,
            tables: vec![],
            selection: None,
            insert: None,
            limit: None,
            fan_out_blocker: None,
        }
    }

    /// Extract shard-key constraints for `column` from this statement.
    ///
    /// For INSERT the literal bound to the shard column yields one EQ per
    /// row. Without a column list the shard key is read positionally from
    /// the first value; `Err` means a given column list omits the shard
    /// column (or binds it to a non-literal), which the router surfaces to
    /// the client.
    pub fn extract(&self, column: &str) -> Result<Extraction, AnalyzerError> {
        if self.stmt_type == StatementType::Insert {
            let insert = self
                .insert
                .as_ref()
                .ok_or(AnalyzerError::NoShardColumn)?;
            let idx = if insert.columns.is_empty() {
                0
            } else {
                insert
                    .columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(column))
                    .ok_or(AnalyzerError::NoShardColumn)?
            };

            let mut constraints = Vec::with_capacity(insert.rows.len());
            for row in &insert.rows {
                let value = row
                    .get(idx)
                    .copied()
                    .flatten()
                    .ok_or(AnalyzerError::NoShardColumn)?;
                let eq = Constraint::Eq(value);
                if !constraints.contains(&eq) {
                    constraints.push(eq);
                }
            }
            return Ok(Extraction::Constraints(constraints));
        }

        match &self.selection {
            None => Ok(Extraction::AllShards),
            Some(expr) => Ok(walk(expr, column, false)),
        }
    }
}

/// Post-order walk of the boolean expression tree. `negated` tracks the
/// parity of enclosing NOTs; leaves pick the complementary operator and
/// AND/OR swap roles under it.
fn walk(expr: &Expr, column: &str, negated: bool) -> Extraction {
    match expr {
        Expr::Nested(inner) => walk(inner, column, negated),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => walk(expr, column, !negated),
        Expr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let l = walk(left, column, negated);
                let r = walk(right, column, negated);
                let is_and = (*op == BinaryOperator::And) != negated;
                if is_and {
                    and_combine(l, r)
                } else {
                    or_combine(l, r)
                }
            }
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => comparison_leaf(left, op, right, column, negated),
            _ => Extraction::NoShardKey,
        },
        Expr::InList {
            expr,
            list,
            negated: in_negated,
        } => in_list_leaf(expr, list, column, negated ^ in_negated),
        Expr::Between {
            expr,
            negated: between_negated,
            low,
            high,
        } => between_leaf(expr, low, high, column, negated ^ between_negated),
        _ => Extraction::NoShardKey,
    }
}

fn and_combine(left: Extraction, right: Extraction) -> Extraction {
    use Extraction::*;
    match (left, right) {
        (Constraints(a), Constraints(b)) => Constraints(merge_lists(&a, &b)),
        // partial information is still usable
        (Constraints(a), _) => Constraints(a),
        (_, Constraints(b)) => Constraints(b),
        _ => NoShardKey,
    }
}

fn or_combine(left: Extraction, right: Extraction) -> Extraction {
    use Extraction::*;
    match (left, right) {
        (Constraints(mut a), Constraints(b)) => {
            for c in b {
                if !a.contains(&c) {
                    a.push(c);
                }
            }
            Constraints(a)
        }
        // an unbounded branch makes the whole disjunction unbounded
        _ => NoShardKey,
    }
}

fn comparison_leaf(
    left: &Expr,
    op: &BinaryOperator,
    right: &Expr,
    column: &str,
    negated: bool,
) -> Extraction {
    // value op column is read as column (flipped op) value
    let (value, op) = if column_matches(left, column) {
        match literal_i64(right) {
            Some(v) => (v, op.clone()),
            None => return Extraction::NoShardKey,
        }
    } else if column_matches(right, column) {
        match literal_i64(left) {
            Some(v) => (v, flip(op)),
            None => return Extraction::NoShardKey,
        }
    } else {
        return Extraction::NoShardKey;
    };

    let op = if negated { complement(&op) } else { op };

    let constraints = match op {
        BinaryOperator::Eq => vec![Constraint::Eq(value)],
        // `<>` splits into the GT/LT pair so the merger sees plain bounds
        BinaryOperator::NotEq => vec![Constraint::Gt(value), Constraint::Lt(value)],
        BinaryOperator::Lt => vec![Constraint::Lt(value)],
        BinaryOperator::LtEq => vec![Constraint::Lte(value)],
        BinaryOperator::Gt => vec![Constraint::Gt(value)],
        BinaryOperator::GtEq => vec![Constraint::Gte(value)],
        _ => return Extraction::NoShardKey,
    };
    Extraction::Constraints(constraints)
}

fn in_list_leaf(expr: &Expr, list: &[Expr], column: &str, negated: bool) -> Extraction {
    if !column_matches(expr, column) {
        return Extraction::NoShardKey;
    }

    let mut values: Vec<i64> = Vec::with_capacity(list.len());
    for item in list {
        match literal_i64(item) {
            Some(v) => values.push(v),
            // a non-literal member means the set cannot be bounded
            None => return Extraction::NoShardKey,
        }
    }
    if values.is_empty() {
        return Extraction::NoShardKey;
    }
    values.sort_unstable();
    values.dedup();

    if !negated {
        return Extraction::Constraints(values.into_iter().map(Constraint::Eq).collect());
    }

    // NOT IN: the complement of the sorted values. Everything below the
    // first, the gaps between neighbors, everything above the last.
    let mut constraints = Vec::with_capacity(values.len() + 1);
    let first = values[0];
    let last = values[values.len() - 1];
    if first > i64::MIN {
        constraints.push(Constraint::Lt(first));
    }
    for pair in values.windows(2) {
        if let Some(gap) = Constraint::range(pair[0] + 1, pair[1] - 1) {
            constraints.push(gap);
        }
    }
    if last < i64::MAX {
        constraints.push(Constraint::Gt(last));
    }
    Extraction::Constraints(constraints)
}

fn between_leaf(expr: &Expr, low: &Expr, high: &Expr, column: &str, negated: bool) -> Extraction {
    if !column_matches(expr, column) {
        return Extraction::NoShardKey;
    }
    let (low, high) = match (literal_i64(low), literal_i64(high)) {
        (Some(l), Some(h)) => (l, h),
        _ => return Extraction::NoShardKey,
    };

    if negated {
        Extraction::Constraints(vec![Constraint::Lt(low), Constraint::Gt(high)])
    } else {
        // an inverted BETWEEN is a contradiction, not missing information
        Extraction::Constraints(Constraint::range(low, high).into_iter().collect())
    }
}

fn column_matches(expr: &Expr, column: &str) -> bool {
    match expr {
        Expr::Identifier(ident) => ident.value.eq_ignore_ascii_case(column),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .is_some_and(|ident| ident.value.eq_ignore_ascii_case(column)),
        _ => false,
    }
}

fn flip(op: &BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        other => other.clone(),
    }
}

fn complement(op: &BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Eq => BinaryOperator::NotEq,
        BinaryOperator::NotEq => BinaryOperator::Eq,
        BinaryOperator::Lt => BinaryOperator::GtEq,
        BinaryOperator::LtEq => BinaryOperator::Gt,
        BinaryOperator::Gt => BinaryOperator::LtEq,
        BinaryOperator::GtEq => BinaryOperator::Lt,
        other => other.clone(),
    }
}

fn literal_i64(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Value(Value::Number(n, _)) => n.parse().ok(),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr.as_ref() {
            Expr::Value(Value::Number(n, _)) => n.parse::<i64>().ok().map(|v| -v),
            _ => None,
        },
        _ => None,
    }
}

fn table_names(table_with_joins: &TableWithJoins) -> Vec<String> {
    let mut tables = vec![];
    if let TableFactor::Table { name, .. } = &table_with_joins.relation {
        tables.push(name.to_string());
    }
    for join in &table_with_joins.joins {
        if let TableFactor::Table { name, .. } = &join.relation {
            tables.push(name.to_string());
        }
    }
    tables
}

/// Analyzer errors
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("failed to parse SQL: {0}")]
    ParseError(String),

    #[error("empty statement")]
    EmptyStatement,

    #[error("multi-statement batch ({0} statements)")]
    MultipleStatements(usize),

    #[error("unsupported statement shape: {0}")]
    Unsupported(&'static str),

    #[error("insert does not bind the shard column to a literal")]
    NoShardColumn,
}
