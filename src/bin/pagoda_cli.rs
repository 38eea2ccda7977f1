use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pagoda::{
    config::ClientConfig,
    network::{
        client::{ClientError, Connection},
        protocol::Response,
    },
};
use rustyline::{DefaultEditor, error::ReadlineError};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

/// Interactive SQL client for a pagoda server
#[derive(Parser, Debug)]
#[command(name = "pagoda_cli", version)]
struct Args {
    #[arg(short = 'H', long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Database selected after connecting
    #[arg(short, long)]
    database: Option<String>,

    #[arg(short, long)]
    user: Option<String>,

    /// Password for --user; read from PAGODA_PASSWORD when omitted
    #[arg(long, env = "PAGODA_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.database.is_some() {
        config.database = args.database;
    }
    if args.user.is_some() {
        config.username = args.user;
    }
    if args.password.is_some() {
        config.password = args.password;
    }

    let mut connection = Connection::from_config(&config)
        .await
        .with_context(|| format!("could not reach {}:{}", config.host, config.port))?;
    println!("Connected to {}:{}. Type 'exit' to quit.", config.host, config.port);

    let mut rl = DefaultEditor::new()?;
    loop {
        let prompt = match connection.transaction_id() {
            Some(id) => format!("pagoda[tx {}]> ", id),
            None => "pagoda> ".to_string(),
        };
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        let sql = line.trim();
        if sql.is_empty() {
            continue;
        }
        if matches!(sql.to_ascii_lowercase().as_str(), "exit" | "quit" | "\\q") {
            break;
        }
        rl.add_history_entry(sql)?;

        match connection.execute(sql).await {
            Ok(response) => print_response(&response),
            Err(err @ ClientError::Connection(_)) => return Err(err.into()),
            Err(err) => eprintln!("{}", err),
        }
    }
    connection.close().await?;
    Ok(())
}

fn print_response(response: &Response) {
    if let (Some(columns), Some(rows)) = (&response.columns, &response.rows) {
        println!("{}", columns.join(" | "));
        for row in rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| match row.get(c) {
                    Some(JsonValue::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                })
                .collect();
            println!("{}", cells.join(" | "));
        }
    }
    if let Some(message) = &response.message {
        println!("{}", message);
    }
}
