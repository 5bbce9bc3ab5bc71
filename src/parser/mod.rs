mod analyzer;
mod constraint;

pub use analyzer::{AnalyzerError, Extraction, SqlAnalyzer, StatementType};
pub use constraint::Constraint;
