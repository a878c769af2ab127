use thiserror::Error;

use crate::constants::layout_constants;
use crate::cursor::Rows;
use crate::row::{Row, RowError};
use crate::table::{Table, TableError};

pub enum MetaCommand {
    Exit,
    Constants,
    Btree,
    Unrecognized(String),
}

impl From<&str> for MetaCommand {
    fn from(s: &str) -> Self {
        match s.trim() {
            ".exit" => MetaCommand::Exit,
            ".constants" => MetaCommand::Constants,
            ".btree" => MetaCommand::Btree,
            other => MetaCommand::Unrecognized(other.to_string()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Statement {
    Insert { row: Row },
    Select,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatementError {
    #[error("Syntax error. Could not parse statement.")]
    Syntax,
    #[error(transparent)]
    Row(#[from] RowError),
    #[error("Unrecognized keyword at start of '{0}'.")]
    Unrecognized(String),
}

pub enum VMResult<'t> {
    /// Rows decoded one at a time as the caller iterates.
    Rows(Rows<'t>),
    Success,
}

pub fn prepare_statement(original_input: &str) -> Result<Statement, StatementError> {
    let mut parts = original_input.split_whitespace();
    match parts.next() {
        Some("insert") => {
            let (id, username, email) = match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(username), Some(email)) => (id, username, email),
                _ => return Err(StatementError::Syntax),
            };
            let id = id.parse().map_err(|_| StatementError::Syntax)?;

            let row = Row::new(id, username, email);
            row.validate()?;
            Ok(Statement::Insert { row })
        }
        Some("select") => Ok(Statement::Select),
        _ => Err(StatementError::Unrecognized(original_input.to_string())),
    }
}

pub struct VirtualMachine<'a> {
    pub table: &'a mut Table,
}

impl VirtualMachine<'_> {
    pub fn execute_statement(&mut self, statement: Statement) -> Result<VMResult<'_>, TableError> {
        match statement {
            Statement::Insert { row } => {
                self.table.insert(&row)?;
                Ok(VMResult::Success)
            }
            Statement::Select => Ok(VMResult::Rows(self.table.select()?)),
        }
    }

    /// Output lines of a diagnostic meta command.
    pub fn execute_meta_command(&mut self, command: &MetaCommand) -> Result<Vec<String>, TableError> {
        match command {
            MetaCommand::Exit => Ok(Vec::new()),
            MetaCommand::Constants => {
                let mut lines = vec!["Constants:".to_string()];
                lines.extend(
                    layout_constants()
                        .iter()
                        .map(|(name, value)| format!("{name}: {value}")),
                );
                Ok(lines)
            }
            MetaCommand::Btree => {
                let mut lines = vec!["Tree:".to_string()];
                lines.extend(self.table.tree()?.lines().map(str::to_string));
                Ok(lines)
            }
            MetaCommand::Unrecognized(command) => Ok(vec![format!("Unrecognized command '{command}'")]),
        }
    }
}
