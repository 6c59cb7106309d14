//! gemchat - a terminal chat client for the Gemini API.
//!
//! Forwards a question (or an interactive conversation) to the Gemini
//! generateContent endpoint with lightweight persona templating, prints
//! the reply and appends each exchange to a daily transcript.

mod api;
mod auth;
mod config;
mod persona;
mod session;
mod transcript;
mod tui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::Command as ProcessCommand;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::Config;
use persona::PersonaSet;
use session::ChatSession;
use transcript::Transcript;

#[derive(Parser)]
#[command(name = "gemchat")]
#[command(author, version, about = "A terminal chat client for the Gemini API")]
#[command(
    long_about = "Ask a single question, or start an interactive chat.\n\nRuns interactively when --chat is set or when no question is given."
)]
struct Cli {
    /// The question to ask (multiple words are joined with spaces)
    #[arg(value_name = "QUESTION")]
    question: Vec<String>,

    /// Persona style for the reply (see `gemchat personas`)
    #[arg(long, value_name = "NAME")]
    style: Option<String>,

    /// Override the model
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Force the interactive chat loop even when a question is given
    #[arg(long)]
    chat: bool,

    /// Ask for detailed answers
    #[arg(long)]
    long: bool,

    /// Full-screen chat interface
    #[arg(long)]
    tui: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open configuration file in $EDITOR
    Config,
    /// List available personas
    Personas,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep stderr quiet by default; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gemchat=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Config) => handle_config(),
        Some(Commands::Personas) => handle_personas(),
        None => run(cli).await,
    }
}

/// Resolve settings, then run one of the three modes.
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let model = cli.model.unwrap_or(config.default_model);
    let style = cli.style.unwrap_or(config.default_style);
    let question = cli.question.join(" ");

    let personas = PersonaSet::load(&Config::personas_path()?);
    let mut session = ChatSession::new(personas.instruction(&style));
    let transcript = Transcript::new(Config::log_dir()?);

    // Credential failures happen here, once, before any dispatch.
    let api_key = auth::resolve_api_key()?;
    let client = api::GeminiClient::new(api_key);

    debug!("Model: {}, style: {}", model, style);

    if cli.tui {
        let log_dir = Config::log_dir()?;
        let initial = (!question.is_empty()).then_some(question);
        tui::run_tui(&client, &model, &mut session, &log_dir, initial, cli.long).await
    } else if cli.chat || question.is_empty() {
        session::run_chat(&client, &model, &mut session, &transcript, cli.long).await
    } else {
        session::run_once(&client, &model, &session, &transcript, &question, cli.long).await
    }
}

/// Open the config file in $EDITOR, writing defaults first if needed.
fn handle_config() -> Result<()> {
    let (config_path, created) = Config::ensure_exists()?;
    if created {
        println!("Created default config at {}", config_path.display());
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}

/// List the merged persona set.
fn handle_personas() -> Result<()> {
    let personas = PersonaSet::load(&Config::personas_path()?);

    println!("Available Personas");
    println!("==================\n");

    for name in personas.names() {
        let instruction = personas.instruction(name);
        let preview: String = instruction.chars().take(72).collect();
        let ellipsis = if instruction.chars().count() > 72 { "..." } else { "" };
        println!("  {}\n    {}{}\n", name, preview, ellipsis);
    }

    println!("Usage:");
    println!("  gemchat --style hacker \"your question\"");
    println!(
        "  Overrides: add entries to {}",
        Config::personas_path()?.display()
    );

    Ok(())
}
