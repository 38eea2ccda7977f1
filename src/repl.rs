use std::io::{BufRead, Write};

use tracing::{debug, error};

use crate::{
    executor::{
        Executor,
        command::{Command, QueryResult},
    },
    planner::statement::{Statement, parse_statement},
    types::{error::DatabaseError, value::Value},
};

pub const PROMPT: &str = "db > ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Runs one line and writes its output. Only fatal errors are returned;
/// everything else is printed and the session goes on.
pub fn handle_line<W: Write>(executor: &mut Executor, line: &str, output: &mut W) -> Result<Flow, DatabaseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Flow::Continue);
    }
    let command = match parse_statement(line) {
        Ok(Statement::Meta(meta)) => Command::Meta { meta },
        Ok(Statement::Command(command)) => command,
        Err(e) => {
            writeln!(output, "{}", e)?;
            return Ok(Flow::Continue);
        }
    };

    match executor.execute(command) {
        Ok(QueryResult::Exit) => return Ok(Flow::Exit),
        Ok(result) => write_result(&result, output)?,
        Err(e) if e.is_fatal() => {
            error!(error = %e, "aborting session");
            writeln!(output, "Error: {}", e)?;
            return Err(e);
        }
        Err(e @ DatabaseError::RecordNotFound { .. }) => {
            writeln!(output, "{}", e)?;
            writeln!(output, "Executed.")?;
        }
        Err(e) => {
            debug!(error = %e, "statement failed");
            writeln!(output, "{}", e)?;
        }
    }
    Ok(Flow::Continue)
}

pub fn write_result<W: Write>(result: &QueryResult, output: &mut W) -> Result<(), DatabaseError> {
    match result {
        QueryResult::Rows { rows, .. } => {
            for row in rows {
                writeln!(output, "{}", format_row(row))?;
            }
            writeln!(output, "Executed.")?;
        }
        QueryResult::Tree(tree) => write!(output, "Tree:\n{}", tree)?,
        QueryResult::Constants(constants) => write!(output, "Constants:\n{}", constants)?,
        QueryResult::Message(message) | QueryResult::Transaction { message, .. } => {
            writeln!(output, "{}", message)?;
            writeln!(output, "Executed.")?;
        }
        QueryResult::Affected { .. } => writeln!(output, "Executed.")?,
        QueryResult::Exit => {}
    }
    Ok(())
}

pub fn format_row(values: &[Value]) -> String {
    let fields: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("({})", fields.join(", "))
}

/// The plain prompt loop used when input is not a terminal. Output is
/// byte-for-byte what scripted sessions expect.
pub fn run<R: BufRead, W: Write>(executor: &mut Executor, mut input: R, output: &mut W) -> Result<(), DatabaseError> {
    let mut line = String::new();
    let outcome = loop {
        write!(output, "{}", PROMPT)?;
        output.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break Ok(());
        }
        match handle_line(executor, &line, output) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    output.flush()?;
    let closed = executor.close();
    outcome?;
    closed
}
