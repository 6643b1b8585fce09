use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::providers::{Outcome, TextGenerator};
use crate::models::{ChatMessage, ConversationTurn, SessionMemory};

/// Histories shorter than this are left alone.
pub const MIN_HISTORY_TO_SUMMARIZE: usize = 5;
/// Turns kept verbatim after a summary.
pub const RETAINED_TURNS: usize = 10;
pub const SUMMARY_CONTEXT_KEY: &str = "conversation_summary";

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: usize = 500;

const SUMMARY_INSTRUCTION: &str = "Summarize the key points from this customer support conversation.
Extract:
1. Customer's main issues or requests
2. Important details provided by the customer (e.g., account info, product details)
3. Solutions or actions suggested
4. Any unresolved issues

Format as a concise JSON with these keys: \"issues\", \"details\", \"solutions\", \"unresolved\".
Keep each value brief but informative.";

/// Extract the first balanced top-level JSON object from a string.
/// Handles braces inside JSON strings and escaped quotes.
fn extract_first_json_object(s: &str) -> Option<&str> {
    let mut start: Option<usize> = None;
    let mut depth: i32 = 0;

    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if start.is_none() {
            if ch == '{' {
                start = Some(i);
                depth = 1;
            }
            continue;
        }

        if in_string {
            if escaped {
                escaped = false;
                continue;
            }
            match ch {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let st = start?;
                    return Some(&s[st..=i]); // inclusive end
                }
            }
            _ => {}
        }
    }

    None
}

/// Provider reply as a JSON object, or `{"summary": raw}` when it is not one.
/// Models often wrap the object in prose or a code fence.
fn parse_summary(raw: &str) -> Value {
    extract_first_json_object(raw)
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| json!({ "summary": raw }))
}

fn transcript(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .flat_map(|turn| {
            [
                format!("User: {}", turn.message),
                format!("Assistant: {}", turn.response),
            ]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compacts a long session history into a structured summary.
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Summarize `memory` into `context["conversation_summary"]` and keep only
    /// the most recent turns. A failed provider call returns the memory
    /// unchanged as a degraded outcome.
    pub async fn summarize(&self, mut memory: SessionMemory) -> Outcome<SessionMemory> {
        if memory.history.len() < MIN_HISTORY_TO_SUMMARIZE {
            return Outcome::Fresh(memory);
        }

        let messages = [
            ChatMessage::system(SUMMARY_INSTRUCTION),
            ChatMessage::user(transcript(&memory.history)),
        ];

        let raw = match self
            .generator
            .generate_with(&messages, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "Summarization failed for user {}, session {}: {}",
                    memory.user_id, memory.session_id, e
                );
                return Outcome::degraded(memory, format!("summarization failed: {}", e));
            }
        };

        memory
            .context
            .insert(SUMMARY_CONTEXT_KEY.to_string(), parse_summary(&raw));

        let excess = memory.history.len().saturating_sub(RETAINED_TURNS);
        memory.history.drain(..excess);

        info!(
            "Summarized context for user {}, session {}",
            memory.user_id, memory.session_id
        );
        Outcome::Fresh(memory)
    }
}
