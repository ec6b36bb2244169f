//! Session CLI commands: create, list, show, rename, delete, send,
//! next-slide, deck, transcript.
//!
//! Every command goes through the same coordinator the REST API uses, so
//! locking and lifecycle rules are identical on both surfaces.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use lectern_core::chat::{SlideAdvance, Upload};
use lectern_types::transcript::{TranscriptEntry, TurnRole};

use crate::http::handlers::session::{NextSlideView, SessionView};
use crate::state::AppState;

/// Create a session, uploading a deck when one is given.
///
/// # Examples
///
/// ```bash
/// lectern session create --course <uuid> --title "Week 3" --deck week3.pptx
/// ```
pub async fn create_session(
    state: &AppState,
    course_id: Uuid,
    title: &str,
    deck: Option<&Path>,
    json: bool,
) -> Result<()> {
    let upload = match deck {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };

    let spinner = spinner("Creating session...")?;
    let result = state
        .coordinator
        .create_session(course_id, title, upload)
        .await;
    spinner.finish_and_clear();
    let session = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&SessionView::from(&session))?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Created session '{}'",
        style("✓").green().bold(),
        style(&session.title).cyan().bold()
    );
    println!("  {}", style(session.id).dim());
    if let Some(deck) = &session.deck {
        println!(
            "  Deck {} loaded. Walk through it with: {}",
            style(&deck.original_name).cyan(),
            style(format!("lectern session next-slide {}", session.id)).yellow()
        );
    }
    println!();

    Ok(())
}

/// List a course's sessions in a table, newest first.
pub async fn list_sessions(state: &AppState, course_id: Uuid, json: bool) -> Result<()> {
    let sessions = state.coordinator.list_sessions(course_id).await?;

    if json {
        let views: Vec<SessionView> = sessions.iter().map(SessionView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions for this course. Start one with: {}",
            style("i").blue().bold(),
            style(format!(
                "lectern session create --course {course_id} --title <title>"
            ))
            .yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Title").fg(Color::White),
        Cell::new("Deck").fg(Color::White),
        Cell::new("Slides").fg(Color::White),
        Cell::new("Created").fg(Color::White),
        Cell::new("ID").fg(Color::White),
    ]);

    for session in &sessions {
        let deck = session
            .deck
            .as_ref()
            .map(|d| d.original_name.clone())
            .unwrap_or_else(|| "-".to_string());

        let slides_cell = if session.slides_mode {
            Cell::new("on").fg(Color::Green)
        } else {
            Cell::new("off").fg(Color::DarkGrey)
        };

        table.add_row(vec![
            Cell::new(truncate(&session.title, 40)).fg(Color::Cyan),
            Cell::new(deck).fg(Color::White),
            slides_cell,
            Cell::new(session.created_at.format("%Y-%m-%d %H:%M").to_string())
                .fg(Color::DarkGrey),
            Cell::new(session.id.to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// Show a session header followed by its visible history.
pub async fn show_session(state: &AppState, session_id: Uuid, json: bool) -> Result<()> {
    let conversation = state.coordinator.get_conversation(session_id).await?;

    if json {
        let out = serde_json::json!({
            "session": SessionView::from(&conversation.session),
            "history": conversation.history,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let session = &conversation.session;
    println!();
    println!("  {}", style(&session.title).cyan().bold());
    println!(
        "  {} {}",
        style("Created:").dim(),
        session.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    match &session.deck {
        Some(deck) => println!(
            "  {} {} ({}, slides {})",
            style("Deck:").dim(),
            deck.original_name,
            deck.kind,
            if session.slides_mode { "on" } else { "off" }
        ),
        None => println!("  {} none", style("Deck:").dim()),
    }
    println!();

    if conversation.history.is_empty() {
        println!("  {}", style("No messages yet.").dim());
        println!();
    }
    for entry in &conversation.history {
        print_entry(entry);
    }

    Ok(())
}

/// Rename a session.
pub async fn rename_session(
    state: &AppState,
    session_id: Uuid,
    title: &str,
    json: bool,
) -> Result<()> {
    let session = state.coordinator.rename_session(session_id, title).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&SessionView::from(&session))?);
    } else {
        println!(
            "  {} Renamed to '{}'.",
            style("✓").green().bold(),
            style(&session.title).cyan()
        );
    }

    Ok(())
}

/// Delete a session with confirmation.
///
/// # Examples
///
/// ```bash
/// lectern session delete <session-id>
/// lectern session delete <session-id> --force
/// ```
pub async fn delete_session(
    state: &AppState,
    session_id: Uuid,
    force: bool,
    json: bool,
) -> Result<()> {
    if !force && !json {
        let session = state.coordinator.get_session(session_id).await?;
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete session '{}' and everything stored for it?",
                style(&session.title).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    state.coordinator.delete_session(session_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"deleted": true, "session_id": session_id.to_string()})
        );
    } else {
        println!("  {} Session deleted.", style("x").red().bold());
    }

    Ok(())
}

/// Send a message (with an optional image) and print the reply.
pub async fn send_message(
    state: &AppState,
    session_id: Uuid,
    text: &str,
    file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let upload = match file {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };

    let spinner = spinner("Thinking...")?;
    let result = state
        .coordinator
        .append_user_turn(session_id, text, upload)
        .await;
    spinner.finish_and_clear();
    let exchange = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&exchange)?);
        return Ok(());
    }

    println!();
    println!("{}", exchange.model.text());
    println!();

    Ok(())
}

/// Rasterize and explain the next slide.
pub async fn next_slide(state: &AppState, session_id: Uuid, json: bool) -> Result<()> {
    let spinner = spinner("Rendering slide...")?;
    let result = state.coordinator.advance_slide(session_id).await;
    spinner.finish_and_clear();
    let advance = result?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&NextSlideView::from(advance))?
        );
        return Ok(());
    }

    match advance {
        SlideAdvance::Page(page) => {
            println!();
            println!(
                "  {} {}",
                style(format!("Slide {}/{}", page.number(), page.page_count))
                    .cyan()
                    .bold(),
                style(state.coordinator.layout().resolve(&page.page_ref).display()).dim()
            );
            println!();
            println!("{}", page.explanation.text);
            println!();
        }
        SlideAdvance::Exhausted { .. } => {
            println!();
            println!(
                "  {} No more slides to show. Slides mode is now off.",
                style("i").blue().bold()
            );
            println!();
        }
    }

    Ok(())
}

/// Replace a session's deck.
pub async fn replace_deck(
    state: &AppState,
    session_id: Uuid,
    path: &Path,
    json: bool,
) -> Result<()> {
    let upload = read_upload(path).await?;

    let spinner = spinner("Uploading deck...")?;
    let result = state.coordinator.replace_deck(session_id, upload).await;
    spinner.finish_and_clear();
    let session = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&SessionView::from(&session))?);
    } else {
        println!(
            "  {} Deck replaced. The walk-through starts again from the first slide.",
            style("✓").green().bold()
        );
    }

    Ok(())
}

/// Print the visible transcript.
pub async fn print_transcript(state: &AppState, session_id: Uuid, json: bool) -> Result<()> {
    let entries = state.coordinator.get_transcript(session_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    for entry in &entries {
        print_entry(entry);
    }

    Ok(())
}

// --- Helpers ---

async fn read_upload(path: &Path) -> Result<Upload> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("'{}' has no usable file name", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    Ok(Upload::new(file_name, bytes))
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

fn print_entry(entry: &TranscriptEntry) {
    let label = match entry.role {
        TurnRole::User => style("You").green().bold(),
        TurnRole::Model => style("Tutor").cyan().bold(),
    };
    println!("  {label} {}", style(format!("#{}", entry.sequence_no)).dim());
    if let Some(media) = &entry.media_ref {
        println!("  {}", style(format!("[{media}]")).dim());
    }
    if !entry.text.is_empty() {
        println!("{}", entry.text);
    }
    println!();
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}
