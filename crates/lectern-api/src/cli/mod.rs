//! CLI command definitions for the `lectern` binary.
//!
//! Uses clap derive macros for argument parsing. Session commands follow a
//! noun-verb pattern (e.g., `lectern session create`, `lectern session send`).

pub mod serve;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use uuid::Uuid;

/// Chat with your lecture slides.
#[derive(Parser)]
#[command(name = "lectern", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for verbose, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit log lines as JSON objects on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage chat sessions.
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Create a session, optionally with a slide deck.
    Create {
        /// Course the session belongs to.
        #[arg(long)]
        course: Uuid,

        /// Session title (1 to 150 characters).
        #[arg(long)]
        title: String,

        /// Deck to upload (pdf, pptx, ppt, odp).
        #[arg(long)]
        deck: Option<PathBuf>,
    },

    /// List a course's sessions, newest first.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        course: Uuid,
    },

    /// Show a session and its conversation.
    Show { id: Uuid },

    /// Rename a session.
    Rename { id: Uuid, title: String },

    /// Delete a session and everything stored for it.
    #[command(alias = "rm")]
    Delete {
        id: Uuid,

        /// Skip confirmation prompt.
        #[arg(long)]
        force: bool,
    },

    /// Send a message, optionally with an image.
    Send {
        id: Uuid,

        text: String,

        /// Image to attach (png, jpg, jpeg).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Explain the next slide of the session's deck.
    #[command(name = "next-slide")]
    NextSlide { id: Uuid },

    /// Replace the session's deck and restart the walk-through.
    Deck { id: Uuid, path: PathBuf },

    /// Print the visible transcript.
    Transcript { id: Uuid },
}
