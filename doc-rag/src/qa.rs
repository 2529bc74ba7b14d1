//! Context assembly for answer generation.
//!
//! The language model itself lives outside this crate behind
//! [`AnswerGenerator`]; this module turns retrieval results into the ordered,
//! deduplicated context it receives and collects citations for the reply.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RagError;
use crate::record::{Chunk, RetrievalResult};

/// Context handed to the generator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnswerContext {
    /// Chunk texts joined by blank lines, best match first.
    pub context_text: String,
    pub chunks: Vec<Chunk>,
}

impl AnswerContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Unique `"{filename} p.{page}"` citations in context order.
    pub fn citations(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.chunks
            .iter()
            .map(Chunk::citation)
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }
}

/// Builds the generator context from ranked results.
///
/// Keeps result order and drops repeats of the same `(document_id, chunk_id)`.
pub fn build_context(results: &[RetrievalResult]) -> AnswerContext {
    let mut seen: HashSet<(&str, usize)> = HashSet::new();
    let chunks: Vec<Chunk> = results
        .iter()
        .filter(|r| seen.insert((r.chunk.meta.page.document_id.as_str(), r.chunk.meta.chunk_id)))
        .map(|r| r.chunk.clone())
        .collect();

    let context_text = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    debug!(target: "doc_rag::qa", results = results.len(), kept = chunks.len(), "context assembled");
    AnswerContext {
        context_text,
        chunks,
    }
}

/// Number of most recent turns forwarded to the generator.
pub const HISTORY_TURNS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Renders the last [`HISTORY_TURNS`] turns as `"User: ..."` / `"Assistant: ..."` lines.
pub fn format_history(history: &[ChatTurn]) -> String {
    let start = history.len().saturating_sub(HISTORY_TURNS);
    history[start..]
        .iter()
        .map(|t| format!("{}: {}", t.role.label(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Everything the generator sees for one question.
#[derive(Clone, Copy, Debug)]
pub struct GenerationInput<'a> {
    pub question: &'a str,
    pub context_text: &'a str,
    /// Output of [`format_history`]; empty for a fresh conversation.
    pub chat_history: &'a str,
    pub chunks: &'a [Chunk],
}

/// Generated reply plus the citations it is grounded on.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub cited: Vec<String>,
}

/// External answer-generation collaborator (an LLM client).
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, input: &GenerationInput<'_>) -> Result<String, RagError>;
}

/// Assembles context and asks `generator` for an answer.
///
/// With no context the generator is not called and a fixed reply naming the
/// domain is returned. `history` may be empty.
pub fn ask(
    generator: &dyn AnswerGenerator,
    query: &str,
    domain: &str,
    results: &[RetrievalResult],
    history: &[ChatTurn],
) -> Result<Answer, RagError> {
    let ctx = build_context(results);
    if ctx.is_empty() {
        return Ok(Answer {
            text: no_context_reply(domain),
            cited: Vec::new(),
        });
    }
    let chat_history = format_history(history);
    let text = generator.generate(&GenerationInput {
        question: query,
        context_text: &ctx.context_text,
        chat_history: &chat_history,
        chunks: &ctx.chunks,
    })?;
    Ok(Answer {
        text,
        cited: ctx.citations(),
    })
}

fn no_context_reply(domain: &str) -> String {
    format!(
        "I couldn't find relevant information in our {domain} documents. \
         For further assistance, please contact the {domain} team."
    )
}
