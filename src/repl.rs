//! The line-oriented command loop: prompt, read a line, dispatch, print.

use std::io::{BufRead, Write};

use thiserror::Error;
use tracing::debug;

use crate::table::{Table, TableError};
use crate::virtual_machine::{prepare_statement, MetaCommand, VMResult, VirtualMachine};

pub const PROMPT: &str = "db > ";

#[derive(Debug, Error)]
pub enum ReplError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Runs commands from `input` until `.exit` or end of input.
///
/// Insert and validation failures are reported on `output` and the loop
/// goes on. Storage failures end the loop with an error, since the table
/// can no longer be trusted.
pub fn run<R, W>(table: &mut Table, mut input: R, mut output: W) -> Result<(), ReplError>
where
    R: BufRead,
    W: Write,
{
    let mut vm = VirtualMachine { table };
    let mut input_buffer = String::new();

    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        input_buffer.clear();
        if input.read_line(&mut input_buffer)? == 0 {
            // no trailing newline was echoed for the prompt
            writeln!(output)?;
            return Ok(());
        }
        let line = input_buffer.trim();
        debug!(line, "read command");

        if line.starts_with('.') {
            let command = MetaCommand::from(line);
            if let MetaCommand::Exit = command {
                return Ok(());
            }
            for text in vm.execute_meta_command(&command)? {
                writeln!(output, "{text}")?;
            }
            continue;
        }

        let statement = match prepare_statement(line) {
            Ok(statement) => statement,
            Err(e) => {
                writeln!(output, "{e}")?;
                continue;
            }
        };

        match vm.execute_statement(statement) {
            Ok(VMResult::Rows(rows)) => {
                for row in rows {
                    let row = row?;
                    writeln!(output, "({}, {}, {})", row.id, row.username, row.email)?;
                }
                writeln!(output, "Executed.")?;
            }
            Ok(VMResult::Success) => writeln!(output, "Executed.")?,
            Err(e @ (TableError::DuplicateKey { .. } | TableError::TableFull)) => {
                writeln!(output, "Error: {e}")?
            }
            Err(TableError::Row(e)) => writeln!(output, "{e}")?,
            Err(e) => return Err(e.into()),
        }
    }
}
