// src/memory.rs
//
// Hybrid conversational memory: a bounded window of recent turns plus a
// running narrative summary, persisted per chat session. The summary is
// re-derived each turn (never appended to) so its size stays bounded.
use crate::error::RagError;
use crate::llm::ChatModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

/// Maximum turns kept in the rolling window; oldest dropped first.
pub const MAX_RECENT_TURNS: usize = 5;

const SUMMARY_TEMPERATURE: f32 = 0.2;
/// Cap on the transcript fed to the summarizer, so regeneration cost does not
/// grow with conversation length.
const SUMMARY_INPUT_MAX_CHARS: usize = 6000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    /// Storage tag, matching the wire format already present in chat_history
    /// rows ("human"/"ai").
    pub fn storage_tag(&self) -> &'static str {
        match self {
            TurnRole::User => "human",
            TurnRole::Assistant => "ai",
        }
    }

    pub fn from_storage_tag(tag: &str) -> Option<Self> {
        match tag {
            "human" | "user" => Some(TurnRole::User),
            "ai" | "assistant" => Some(TurnRole::Assistant),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
        }
    }
}

/// A single message in the conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    pub summary: String,
    pub recent_turns: Vec<Turn>,
}

impl MemorySnapshot {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty() && self.recent_turns.is_empty()
    }

    /// Deterministic textual rendering for the model prompt. An empty
    /// snapshot renders to an empty string; each block is omitted when its
    /// field is empty.
    pub fn render_context(&self) -> String {
        let mut context = String::new();

        if !self.summary.is_empty() {
            context.push_str(&format!("Conversation Summary: {}\n\n", self.summary));
        }

        if !self.recent_turns.is_empty() {
            let lines: Vec<String> = self
                .recent_turns
                .iter()
                .map(|turn| format!("{}: {}", turn.role.display_name(), turn.content))
                .collect();
            context.push_str(&format!("Recent Messages:\n{}\n\n", lines.join("\n")));
        }

        context
    }
}

// Wire format stored in the chat_history.messages JSONB column:
// {"summary": "...", "recent_messages": [{"type": "human", "data": {"content": "..."}}]}
#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    #[serde(rename = "type")]
    kind: String,
    data: StoredContent,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredContent {
    content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredSnapshot {
    summary: String,
    recent_messages: Vec<StoredMessage>,
}

impl StoredSnapshot {
    fn from_snapshot(snapshot: &MemorySnapshot) -> Self {
        Self {
            summary: snapshot.summary.clone(),
            recent_messages: snapshot
                .recent_turns
                .iter()
                .map(|turn| StoredMessage {
                    kind: turn.role.storage_tag().to_string(),
                    data: StoredContent {
                        content: turn.content.clone(),
                    },
                })
                .collect(),
        }
    }

    fn into_snapshot(self) -> MemorySnapshot {
        let recent_turns = self
            .recent_messages
            .into_iter()
            .filter_map(|message| {
                TurnRole::from_storage_tag(&message.kind).map(|role| Turn {
                    role,
                    content: message.data.content,
                })
            })
            .collect();

        MemorySnapshot {
            summary: self.summary,
            recent_turns,
        }
    }
}

/// Persistence seam for memory snapshots, keyed by chat id.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(&self, chat_id: &str) -> Result<Option<MemorySnapshot>, RagError>;
    /// Last-writer-wins upsert. Concurrent writers for one chat id race and
    /// the later write wins; that trade-off is accepted rather than
    /// serialized per session.
    async fn upsert(&self, chat_id: &str, snapshot: &MemorySnapshot) -> Result<(), RagError>;
    /// Returns whether a record existed. Idempotent.
    async fn delete(&self, chat_id: &str) -> Result<bool, RagError>;
}

#[derive(Debug, Clone)]
pub struct PgMemoryStore {
    pool: PgPool,
}

impl PgMemoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn get(&self, chat_id: &str) -> Result<Option<MemorySnapshot>, RagError> {
        let row = sqlx::query_as::<_, (Option<sqlx::types::Json<serde_json::Value>>,)>(
            "SELECT messages FROM chat_history WHERE chat_id = $1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        let value = match row {
            Some((Some(json),)) => json.0,
            _ => return Ok(None),
        };

        match serde_json::from_value::<StoredSnapshot>(value) {
            Ok(stored) => Ok(Some(stored.into_snapshot())),
            Err(e) => {
                // A malformed row degrades to an empty memory instead of
                // failing the request.
                tracing::warn!(
                    "Malformed memory snapshot for chat {}: {}; treating as empty",
                    chat_id,
                    e
                );
                Ok(None)
            }
        }
    }

    async fn upsert(&self, chat_id: &str, snapshot: &MemorySnapshot) -> Result<(), RagError> {
        let stored = serde_json::to_value(StoredSnapshot::from_snapshot(snapshot))?;

        sqlx::query(
            "INSERT INTO chat_history (chat_id, messages, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (chat_id)
             DO UPDATE SET messages = EXCLUDED.messages, updated_at = NOW()",
        )
        .bind(chat_id)
        .bind(sqlx::types::Json(stored))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, chat_id: &str) -> Result<bool, RagError> {
        let result = sqlx::query("DELETE FROM chat_history WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Load / update / persist operations over the hybrid memory.
pub struct HybridMemoryManager {
    store: Arc<dyn MemoryStore>,
    summarizer: Arc<dyn ChatModel>,
}

impl HybridMemoryManager {
    pub fn new(store: Arc<dyn MemoryStore>, summarizer: Arc<dyn ChatModel>) -> Self {
        Self { store, summarizer }
    }

    /// Fetch the persisted snapshot. Absence is not an error, and store
    /// failures degrade to an empty memory rather than failing the request.
    pub async fn load(&self, chat_id: &str) -> MemorySnapshot {
        match self.store.get(chat_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => MemorySnapshot::default(),
            Err(e) => {
                tracing::warn!("Failed to load memory for chat {}: {}; starting fresh", chat_id, e);
                MemorySnapshot::default()
            }
        }
    }

    /// Append the turn pair, truncate the window, and re-derive the summary.
    /// Returns a new snapshot; the input is stale afterwards. If the
    /// summarizer fails the previous summary is kept and the turns are still
    /// appended.
    pub async fn record_turn(
        &self,
        snapshot: &MemorySnapshot,
        user_text: &str,
        assistant_text: &str,
    ) -> MemorySnapshot {
        let mut turns = snapshot.recent_turns.clone();
        turns.push(Turn::user(user_text));
        turns.push(Turn::assistant(assistant_text));
        if turns.len() > MAX_RECENT_TURNS {
            let excess = turns.len() - MAX_RECENT_TURNS;
            turns.drain(..excess);
        }

        let summary = match self.summarize(&snapshot.summary, &turns).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("Summarization failed, keeping previous summary: {}", e);
                snapshot.summary.clone()
            }
        };

        MemorySnapshot {
            summary,
            recent_turns: turns,
        }
    }

    /// Write the snapshot to the store. Persistence failures are logged and
    /// swallowed; the memory update is lost for that turn but the caller's
    /// response still goes out.
    pub async fn persist(&self, chat_id: &str, snapshot: &MemorySnapshot) {
        if let Err(e) = self.store.upsert(chat_id, snapshot).await {
            tracing::error!("Failed to persist memory for chat {}: {}", chat_id, e);
        } else {
            tracing::debug!("Saved memory for chat {}", chat_id);
        }
    }

    /// Hard-delete the session's memory. Returns whether a record existed.
    pub async fn clear(&self, chat_id: &str) -> bool {
        match self.store.delete(chat_id).await {
            Ok(existed) => {
                if existed {
                    tracing::info!("Cleared chat history for {}", chat_id);
                }
                existed
            }
            Err(e) => {
                tracing::error!("Failed to clear chat history for {}: {}", chat_id, e);
                false
            }
        }
    }

    async fn summarize(&self, previous_summary: &str, turns: &[Turn]) -> Result<String, RagError> {
        let transcript: Vec<String> = turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role.display_name(), turn.content))
            .collect();
        let transcript = transcript.join("\n");
        let transcript = clamp_tail(&transcript, SUMMARY_INPUT_MAX_CHARS);

        let prompt = format!(
            "Summarize the conversation below into a single short paragraph.\n\
             Keep what the learner wants to study, their constraints, and the courses discussed so far.\n\n\
             Previous summary:\n{}\n\n\
             Latest messages:\n{}\n\n\
             Updated summary:",
            if previous_summary.is_empty() {
                "(none)"
            } else {
                previous_summary
            },
            transcript
        );

        let summary = self.summarizer.generate(&prompt, SUMMARY_TEMPERATURE).await?;
        Ok(summary.trim().to_string())
    }
}

/// Last `max_chars` characters of `text`, on a char boundary.
fn clamp_tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}
