//! Statement classification
//!
//! Parses SQL text and labels it with the command kind of its root
//! statement. Classification is syntactic only and never fails: anything
//! the parser rejects is labelled [`StatementType::UNKNOWN`].

use serde::Serialize;
use sqlparser::ast::{SetExpr, SetOperator, Statement};
use sqlparser::dialect::{dialect_from_str, Dialect, GenericDialect};
use sqlparser::parser::Parser;
use std::fmt;

/// Command kind of a SQL statement, e.g. `Select`, `Insert` or `Unknown`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StatementType(String);

impl StatementType {
    /// Label used when the statement cannot be parsed
    pub const UNKNOWN: &'static str = "Unknown";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    /// Lower-cased label, the form policy lists are matched against
    pub fn policy_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Default parser dialect
pub const DEFAULT_DIALECT: &str = "snowflake";

/// Classifies SQL text using a named sqlparser dialect
#[derive(Debug, Clone)]
pub struct StatementClassifier {
    dialect: String,
}

impl StatementClassifier {
    /// Create a classifier for the given dialect name (`snowflake`, `sqlite`,
    /// `postgresql`, ...). Unrecognized names fall back to `generic`.
    pub fn new(dialect: impl Into<String>) -> Self {
        let mut dialect = dialect.into().to_lowercase();
        if dialect_from_str(&dialect).is_none() {
            tracing::warn!("Unknown SQL dialect '{}', falling back to generic", dialect);
            dialect = "generic".to_string();
        }
        Self { dialect }
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    /// Classify a single SQL statement.
    ///
    /// Empty input, parse errors and multi-statement batches all yield
    /// `Unknown`.
    pub fn classify(&self, sql: &str) -> StatementType {
        let dialect: Box<dyn Dialect> =
            dialect_from_str(&self.dialect).unwrap_or_else(|| Box::new(GenericDialect {}));

        match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) => match statements.as_slice() {
                [statement] => StatementType::new(command_kind(statement)),
                _ => {
                    tracing::debug!(count = statements.len(), "Expected exactly one statement");
                    StatementType::unknown()
                }
            },
            Err(e) => {
                tracing::debug!("Failed to parse statement: {}", e);
                StatementType::unknown()
            }
        }
    }
}

impl Default for StatementClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_DIALECT)
    }
}

/// Name of the root construct of a parsed statement
fn command_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Query(query) => set_expr_kind(&query.body),
        Statement::Insert { .. } => "Insert",
        Statement::Update { .. } => "Update",
        Statement::Delete { .. } => "Delete",
        Statement::Merge { .. } => "Merge",
        Statement::CreateTable { .. }
        | Statement::CreateVirtualTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateStage { .. }
        | Statement::CreateType { .. }
        | Statement::CreateExtension { .. }
        | Statement::CreatePolicy { .. }
        | Statement::CreateSecret { .. }
        | Statement::CreateMacro { .. }
        | Statement::CreateTrigger { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. } => "Create",
        Statement::Drop { .. }
        | Statement::DropFunction { .. }
        | Statement::DropProcedure { .. }
        | Statement::DropTrigger { .. }
        | Statement::DropSecret { .. }
        | Statement::DropPolicy { .. } => "Drop",
        Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterRole { .. }
        | Statement::AlterPolicy { .. } => "Alter",
        Statement::Truncate { .. } => "TruncateTable",
        Statement::Use { .. } => "Use",
        Statement::ExplainTable { .. } => "Describe",
        Statement::ShowTables { .. }
        | Statement::ShowViews { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowCollation { .. }
        | Statement::ShowCreate { .. } => "Show",
        Statement::StartTransaction { .. } => "Transaction",
        Statement::Commit { .. } => "Commit",
        Statement::Rollback { .. } => "Rollback",
        Statement::Grant { .. } => "Grant",
        Statement::Revoke { .. } => "Revoke",
        Statement::SetVariable { .. } => "Set",
        Statement::Copy { .. } | Statement::CopyIntoSnowflake { .. } => "Copy",
        _ => "Command",
    }
}

fn set_expr_kind(body: &SetExpr) -> &'static str {
    match body {
        SetExpr::Select(_) => "Select",
        SetExpr::Query(query) => set_expr_kind(&query.body),
        SetExpr::SetOperation { op, .. } => match op {
            SetOperator::Union => "Union",
            SetOperator::Intersect => "Intersect",
            SetOperator::Except => "Except",
            #[allow(unreachable_patterns)]
            _ => "Union",
        },
        SetExpr::Values(_) => "Values",
        _ => "Select",
    }
}
