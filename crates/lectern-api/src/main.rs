//! `lectern`: chat with lecture decks from the terminal or over REST.
//!
//! Parses arguments, installs tracing, wires [`AppState`] and dispatches to
//! a command handler in [`cli`].

mod cli;
mod http;
mod state;

use clap::{CommandFactory, Parser};

use cli::{Cli, Commands, SessionCommand};
use lectern_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing_options = TracingOptions {
        verbosity: cli.verbose,
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        otel: cli.otel,
    };
    // Held until exit so buffered spans are flushed.
    let _tracing = match init_tracing(tracing_options) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: tracing disabled: {e}");
            None
        }
    };

    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    let action = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "lectern", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Serve { host, port } => {
            let state = AppState::init().await?;
            return cli::serve::serve(state, &host, port).await;
        }
        Commands::Session { action } => action,
    };

    let state = AppState::init().await?;
    use cli::session as cmd;
    let result = match action {
        SessionCommand::Create {
            course,
            title,
            deck,
        } => cmd::create_session(&state, course, &title, deck.as_deref(), json).await,
        SessionCommand::List { course } => cmd::list_sessions(&state, course, json).await,
        SessionCommand::Show { id } => cmd::show_session(&state, id, json).await,
        SessionCommand::Rename { id, title } => cmd::rename_session(&state, id, &title, json).await,
        SessionCommand::Delete { id, force } => cmd::delete_session(&state, id, force, json).await,
        SessionCommand::Send { id, text, file } => {
            cmd::send_message(&state, id, &text, file.as_deref(), json).await
        }
        SessionCommand::NextSlide { id } => cmd::next_slide(&state, id, json).await,
        SessionCommand::Deck { id, path } => cmd::replace_deck(&state, id, &path, json).await,
        SessionCommand::Transcript { id } => cmd::print_transcript(&state, id, json).await,
    };
    state.db.close().await;
    result
}
