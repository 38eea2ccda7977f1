#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("SQL tokenizer error: {0}")]
    Tokenizer(#[from] sqlparser::tokenizer::TokenizerError),
    #[error("Syntax error. Could not parse statement.")]
    Syntax,
    #[error("Invalid {statement} statement: {details}")]
    InvalidStatement {
        statement: &'static str,
        details: String,
    },
    #[error("Unrecognized keyword at the start of '{0}'.")]
    UnrecognizedKeyword(String),
    #[error("Unrecognized command '{0}'")]
    UnrecognizedMetaCommand(String),
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),
}
