use crate::parser::StatementType;

/// Read-write routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Master,
    Replica,
}

/// Pick the backend role for one statement.
///
/// The split decision happens once per statement, before dispatch, and never
/// changes mid-flight. A `/*MASTER*/` hint and an open transaction both force
/// the master regardless of statement type.
pub fn split(stmt_type: StatementType, in_transaction: bool, master_hint: bool) -> RouteTarget {
    if master_hint || in_transaction {
        return RouteTarget::Master;
    }

    if stmt_type.is_read_only() {
        RouteTarget::Replica
    } else {
        RouteTarget::Master
    }
}
