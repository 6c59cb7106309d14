//! Conversation state and the two session loops.
//!
//! The conversation is an ordered list of role-tagged turns; the prompt
//! sent on each dispatch is a pure function over that list. Matching the
//! behavior being modeled, only user turns are serialized back into the
//! prompt: assistant replies are recorded (for display and transcripts)
//! but the model never sees its own prior answers. Context growth is
//! unbounded until `clear`.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::api::GeminiClient;
use crate::persona::{LONG_SUFFIX, RULES_TEXT};
use crate::transcript::Transcript;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Display label for the TUI and saved transcripts.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Gemini",
        }
    }
}

/// One exchange entry.
#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Accumulated conversation state for one session.
pub struct ChatSession {
    base: String,
    turns: Vec<Turn>,
}

impl ChatSession {
    /// Start a session from a persona's instruction text. The rules text
    /// is folded into the base prompt once, ahead of any turns.
    pub fn new(persona_text: &str) -> Self {
        Self {
            base: format!("{}\n{}", persona_text, RULES_TEXT),
            turns: Vec::new(),
        }
    }

    /// Serialize the prompt for the accumulated context.
    ///
    /// Only `Role::User` turns are rendered; assistant turns are skipped
    /// on purpose (see module docs).
    pub fn render_prompt(&self) -> String {
        let mut prompt = self.base.clone();
        for turn in &self.turns {
            if turn.role == Role::User {
                prompt.push_str("\n\nUser: ");
                prompt.push_str(&turn.text);
            }
        }
        prompt
    }

    /// The prompt that a dispatch of `user_text` would send: the full
    /// accumulated context plus the new user turn. Used before commit so
    /// a failed dispatch leaves the context untouched.
    pub fn prompt_with(&self, user_text: &str) -> String {
        format!("{}\n\nUser: {}", self.render_prompt(), user_text)
    }

    /// Record a completed exchange.
    pub fn commit(&mut self, user_text: String, reply: String) {
        self.turns.push(Turn {
            role: Role::User,
            text: user_text,
        });
        self.turns.push(Turn {
            role: Role::Assistant,
            text: reply,
        });
    }

    /// Drop all accumulated turns, restoring the session-start context.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// Append the verbosity suffix when --long is set.
pub fn apply_long(text: &str, long: bool) -> String {
    if long {
        format!("{}{}", text, LONG_SUFFIX)
    } else {
        text.to_string()
    }
}

/// Single-shot mode: one question, one dispatch, then exit. Any failure
/// propagates and aborts the process with a non-zero status.
pub async fn run_once(
    client: &GeminiClient,
    model: &str,
    session: &ChatSession,
    transcript: &Transcript,
    question: &str,
    long: bool,
) -> Result<()> {
    let user_text = apply_long(question, long);
    let prompt = session.prompt_with(&user_text);

    let reply = client.dispatch(model, &prompt).await?;
    println!("{}", reply);
    transcript.log_exchange(&user_text, &reply)?;
    Ok(())
}

/// Interactive loop: read a line, dispatch the full accumulated context,
/// print and log the reply. `exit`/`quit` ends the session, `clear`
/// resets the context without a network call. Dispatch failures are
/// printed and the loop continues; nothing is retried here.
pub async fn run_chat(
    client: &GeminiClient,
    model: &str,
    session: &mut ChatSession,
    transcript: &Transcript,
    long: bool,
) -> Result<()> {
    println!("Chatting with {}. Type 'exit' to quit, 'clear' to reset.", model);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            // stdin closed
            println!();
            return Ok(());
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            println!("Goodbye!");
            return Ok(());
        }
        if input == "clear" {
            session.clear();
            println!("Context cleared.");
            continue;
        }

        let user_text = apply_long(input, long);
        let prompt = session.prompt_with(&user_text);
        debug!("Prompt is {} characters", prompt.len());

        match client.dispatch(model, &prompt).await {
            Ok(reply) => {
                println!("\n{}\n", reply);
                transcript.log_exchange(&user_text, &reply)?;
                session.commit(user_text, reply);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }
}
