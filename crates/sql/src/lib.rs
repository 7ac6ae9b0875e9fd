use csql_common::{CsqlError, Result};
use sqlparser::ast::{Query, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

pub fn parse_sql(sql: &str) -> Result<Vec<Statement>> {
    let dialect = GenericDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| CsqlError::Planning(e.to_string()))
}

/// Parse exactly one SELECT statement into its query tree.
pub fn parse_single_query(sql: &str) -> Result<Box<Query>> {
    let mut stmts = parse_sql(sql)?;
    if stmts.len() != 1 {
        return Err(CsqlError::Planning(
            "expected a single SQL statement".to_string(),
        ));
    }
    match stmts.remove(0) {
        Statement::Query(q) => Ok(q),
        other => Err(CsqlError::Planning(format!(
            "expected a SELECT statement, got: {other}"
        ))),
    }
}
