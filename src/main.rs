use std::{
    io::{self, IsTerminal, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagoda::{
    config::ServerConfig,
    executor::Executor,
    network::server::Server,
    repl::{self, Flow, PROMPT},
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing::info;
use tracing_subscriber::EnvFilter;

const HISTORY_FILE: &str = ".pagoda_history";

#[derive(Parser, Debug)]
#[command(name = "pagoda", version, about = "A single-file B+tree record store")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Table file opened by the interactive prompt
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve the wire protocol
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Accept every command without LOGIN
        #[arg(long)]
        no_auth: bool,
        /// TOML file layered under the environment and these flags
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match (cli.command, cli.file) {
        (
            Some(Mode::Serve {
                host,
                port,
                data_dir,
                no_auth,
                config,
            }),
            _,
        ) => {
            init_tracing("info");
            let mut settings = ServerConfig::load(config.as_deref()).context("failed to load configuration")?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(data_dir) = data_dir {
                settings.data_dir = data_dir;
            }
            if no_auth {
                settings.auth = false;
            }
            serve(settings)
        }
        (None, Some(file)) => {
            init_tracing("warn");
            run_repl(file)
        }
        (None, None) => anyhow::bail!("Must supply a database filename."),
    }
}

fn serve(settings: ServerConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = Server::bind(&settings).await?;
        server
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("interrupt received");
            })
            .await?;
        Ok::<(), anyhow::Error>(())
    })
}

fn run_repl(file: PathBuf) -> Result<()> {
    let mut executor =
        Executor::open_file(&file).with_context(|| format!("unable to open {}", file.display()))?;
    if !io::stdin().is_terminal() {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        repl::run(&mut executor, io::stdin().lock(), &mut out)?;
        return Ok(());
    }

    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(HISTORY_FILE);
    let mut stdout = io::stdout();
    let outcome = loop {
        match read_multiline_command(&mut rl) {
            Ok(input) => {
                if !input.trim().is_empty() {
                    rl.add_history_entry(input.as_str())?;
                }
                match repl::handle_line(&mut executor, &input, &mut stdout) {
                    Ok(Flow::Continue) => stdout.flush()?,
                    Ok(Flow::Exit) => break Ok(()),
                    Err(e) => break Err(e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break Ok(()),
            Err(err) => {
                executor.close()?;
                return Err(err.into());
            }
        }
    };
    let _ = rl.save_history(HISTORY_FILE);
    let closed = executor.close();
    outcome?;
    closed?;
    Ok(())
}

/// A trailing backslash continues the statement on the next line.
fn read_multiline_command(rl: &mut DefaultEditor) -> rustyline::Result<String> {
    let mut input = String::new();
    let mut prompt = PROMPT;
    loop {
        let line = rl.readline(prompt)?;
        let trimmed = line.trim_end();
        match trimmed.strip_suffix('\\') {
            Some(head) => {
                input.push_str(head);
                input.push(' ');
                prompt = "  -> ";
            }
            None => {
                input.push_str(trimmed);
                return Ok(input);
            }
        }
    }
}
