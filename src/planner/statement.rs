use crate::{
    executor::{
        command::{Command, MetaCommand},
        predicate::{ComparisonOp, WhereClause},
    },
    planner::error::PlannerError,
    types::value::Value,
};

/// One line typed at the REPL.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Meta(MetaCommand),
    Command(Command),
}

const KEY_COLUMN: &str = "id";

pub fn parse_meta(line: &str) -> Result<MetaCommand, PlannerError> {
    match line.trim() {
        ".exit" => Ok(MetaCommand::Exit),
        ".constants" => Ok(MetaCommand::Constants),
        ".btree" => Ok(MetaCommand::Btree),
        other => Err(PlannerError::UnrecognizedMetaCommand(other.to_string())),
    }
}

/// Parses the whitespace separated statement forms of the REPL:
///
/// ```text
/// insert <id> <username> <email>
/// select [where <column> <op> <value>]
/// update <id> <column> <value>
/// delete where <column> <op> <value>
/// ```
pub fn parse_statement(line: &str) -> Result<Statement, PlannerError> {
    let line = line.trim();
    if line.starts_with('.') {
        return parse_meta(line).map(Statement::Meta);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let keyword = words.first().map(|w| w.to_ascii_lowercase()).unwrap_or_default();

    let command = match keyword.as_str() {
        "insert" => {
            if words.len() != 4 {
                return Err(PlannerError::Syntax);
            }
            // Only the id is typed; names and emails are stored as written.
            Command::Insert {
                table: None,
                values: vec![
                    Value::from_literal(words[1]),
                    Value::Text(words[2].to_string()),
                    Value::Text(words[3].to_string()),
                ],
            }
        }
        "select" => Command::Select {
            table: None,
            columns: Vec::new(),
            where_clause: match words.len() {
                1 => None,
                _ => Some(parse_where(&words[1..])?),
            },
        },
        "update" => {
            if words.len() != 4 {
                return Err(PlannerError::Syntax);
            }
            Command::Update {
                table: None,
                column: words[2].to_string(),
                value: Value::Text(words[3].to_string()),
                where_clause: Some(WhereClause::new(
                    KEY_COLUMN,
                    ComparisonOp::Equal,
                    Value::from_literal(words[1]),
                )),
            }
        }
        "delete" => Command::Delete {
            table: None,
            where_clause: Some(parse_where(&words[1..])?),
        },
        _ => return Err(PlannerError::UnrecognizedKeyword(line.to_string())),
    };
    Ok(Statement::Command(command))
}

fn parse_where(words: &[&str]) -> Result<WhereClause, PlannerError> {
    match words {
        [kw, column, op, value] if kw.eq_ignore_ascii_case("where") => {
            let operator = ComparisonOp::from_symbol(op).ok_or(PlannerError::Syntax)?;
            Ok(WhereClause::new(*column, operator, Value::from_literal(value)))
        }
        _ => Err(PlannerError::Syntax),
    }
}
