//! Full-screen chat interface.
//!
//! Presents the same prompt -> dispatch -> display cycle as the line
//! loop inside a scrolling message list, with a single-line compose box.
//! Exactly one dispatch is ever in flight; input events are not
//! processed while a request is outstanding. On exit (Esc or Ctrl+C)
//! the entire message list is flushed once to a uniquely-named
//! timestamped file.

use anyhow::{Context as AnyhowContext, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::api::GeminiClient;
use crate::session::{apply_long, ChatSession, Role, Turn};

/// Run the full-screen chat. The transcript file path is fixed at
/// session start so the shutdown save always targets the same file.
pub async fn run_tui(
    client: &GeminiClient,
    model: &str,
    session: &mut ChatSession,
    log_dir: &Path,
    initial_question: Option<String>,
    long: bool,
) -> Result<()> {
    let save_path = log_dir.join(format!("chat-{}.log", Local::now().format("%Y%m%d-%H%M%S")));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the chat loop
    let result =
        run_chat_loop(&mut terminal, client, model, session, initial_question, long).await;

    // Restore terminal before anything that might print
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    // Flush the transcript exactly once, whatever way the loop ended.
    if !session.turns().is_empty() {
        let path = save_transcript(&save_path, session.turns())?;
        println!("Transcript saved to {}", path.display());
    }

    result
}

/// The main event loop.
async fn run_chat_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    client: &GeminiClient,
    model: &str,
    session: &mut ChatSession,
    initial_question: Option<String>,
    long: bool,
) -> Result<()> {
    let mut input = seed_input(initial_question);
    let mut status: Option<String> = None;
    let mut waiting = false;

    loop {
        terminal.draw(|frame| draw_ui(frame, model, session.turns(), &input, waiting, &status))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            // Only handle key press events (not release)
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(());
                }
                KeyCode::Enter => {
                    let text = input.value().trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    input.reset();
                    status = None;

                    let user_text = apply_long(&text, long);
                    let prompt = session.prompt_with(&user_text);
                    debug!("TUI dispatch, prompt is {} characters", prompt.len());

                    // Redraw once so the user sees the waiting state, then
                    // block on the dispatch. No new input is processed until
                    // it completes.
                    waiting = true;
                    terminal.draw(|frame| {
                        draw_ui(frame, model, session.turns(), &input, waiting, &status)
                    })?;

                    match client.dispatch(model, &prompt).await {
                        Ok(reply) => {
                            session.commit(user_text, reply);
                        }
                        Err(e) => {
                            status = Some(format!("Error: {}", e));
                        }
                    }
                    waiting = false;
                }
                _ => {
                    input.handle_event(&Event::Key(key));
                }
            }
        }
    }
}

/// Draw the message list, compose line and status bar.
fn draw_ui(
    frame: &mut Frame,
    model: &str,
    turns: &[Turn],
    input: &Input,
    waiting: bool,
    status: &Option<String>,
) {
    let areas = chat_layout(frame.area());

    // Message list
    let mut lines: Vec<Line> = Vec::new();
    for turn in turns {
        let label_style = match turn.role {
            Role::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Role::Assistant => Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        };
        lines.push(Line::from(Span::styled(
            format!("{}:", turn.role.label()),
            label_style,
        )));
        for text_line in turn.text.lines() {
            lines.push(Line::from(text_line.to_string()));
        }
        lines.push(Line::from(""));
    }

    // Keep the tail of the conversation visible.
    let height = areas.messages.height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(height) as u16;

    let messages = Paragraph::new(lines)
        .block(
            Block::default()
                .title(format!(" gemchat ({}) ", model))
                .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(messages, areas.messages);

    // Compose line
    let compose_title = if waiting { " waiting... " } else { " message " };
    let compose_block = Block::default()
        .title(compose_title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = compose_block.inner(areas.compose);
    frame.render_widget(compose_block, areas.compose);

    let input_width = inner.width as usize;
    let cursor_pos = input.visual_cursor();
    let scroll = if cursor_pos >= input_width {
        cursor_pos - input_width + 1
    } else {
        0
    };
    let visible: String = input.value().chars().skip(scroll).take(input_width).collect();
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            visible,
            Style::default().fg(Color::White),
        ))),
        inner,
    );
    if !waiting {
        frame.set_cursor_position((inner.x + (cursor_pos - scroll) as u16, inner.y));
    }

    // Status bar
    let status_line = match status {
        Some(message) => Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )),
        None => Line::from(Span::styled(
            "Enter: send  Esc: quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(status_line), areas.status);
}

/// Compose line, pre-filled with a question given on the command line.
fn seed_input(initial: Option<String>) -> Input {
    match initial {
        Some(question) => Input::default().with_value(question),
        None => Input::default(),
    }
}

struct ChatAreas {
    messages: Rect,
    compose: Rect,
    status: Rect,
}

/// Split the screen into message list, compose line and status bar.
fn chat_layout(area: Rect) -> ChatAreas {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(area);
    ChatAreas {
        messages: chunks[0],
        compose: chunks[1],
        status: chunks[2],
    }
}

/// Serialize the full message list to `path` with a truncating write.
/// Calling it a second time rewrites identical content, so a double
/// save cannot corrupt or duplicate the transcript.
fn save_transcript(path: &Path, turns: &[Turn]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    let mut contents = String::new();
    for turn in turns {
        contents.push_str(turn.role.label());
        contents.push_str(": ");
        contents.push_str(&turn.text);
        contents.push('\n');
    }
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write transcript: {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_turns() -> Vec<Turn> {
        vec![
            Turn {
                role: Role::User,
                text: "hello".to_string(),
            },
            Turn {
                role: Role::Assistant,
                text: "Hi!".to_string(),
            },
        ]
    }

    #[test]
    fn test_seed_input_prefills_question() {
        let input = seed_input(Some("what is recursion?".to_string()));
        assert_eq!(input.value(), "what is recursion?");
        assert_eq!(seed_input(None).value(), "");
    }

    #[test]
    fn test_chat_layout_heights() {
        let areas = chat_layout(Rect::new(0, 0, 80, 24));
        assert_eq!(areas.compose.height, 3);
        assert_eq!(areas.status.height, 1);
        assert_eq!(areas.messages.height, 20);
    }

    #[test]
    fn test_save_transcript_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("chat-test.log");

        save_transcript(&path, &sample_turns()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "You: hello\nGemini: Hi!\n");
    }

    #[test]
    fn test_save_transcript_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat-test.log");

        save_transcript(&path, &sample_turns()).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        save_transcript(&path, &sample_turns()).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }
}
