//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Citation attached to an assistant message when web grounding was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingUrl {
    pub title: String,
    pub uri: String,
}

/// One turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Creation-order key, unique within a session
    pub id: u64,
    /// Who spoke
    pub role: Role,
    /// Plain text; for assistant turns this is the extracted chat region
    pub content: String,
    /// Creation time, non-decreasing across the log
    pub timestamp: DateTime<Utc>,
    /// Titles of resources attached to a user turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Citations returned by the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_urls: Option<Vec<GroundingUrl>>,
}

/// File kinds the library knows how to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Pdf,
    Jpg,
    Png,
}

/// Analysis lifecycle of a library resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Analyzing,
    Analyzed,
}

/// A previously ingested visual resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResource {
    pub id: Uuid,
    /// Original file name
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    /// Human-readable size, e.g. "0.4 MB"
    pub size: String,
    pub status: DocumentStatus,
    /// Classification returned by analysis
    pub subject: String,
    /// Short description returned by analysis
    pub summary: String,
    /// Equations extracted by analysis
    pub equations: Vec<String>,
    /// Encoded image as a data URL, reused as vision context for chat turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A single study card shown in the flashcard panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

/// Structured result of splitting one raw model reply into its panels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTutorResponse {
    /// Text shown in the chat log
    pub chat_text: String,
    /// `None` when the reply carried no study plan region
    pub study_plan: Option<Vec<String>>,
    /// `None` when the reply carried no sidebar region
    pub sidebar_resources: Option<Vec<String>>,
    /// Always replaces the previous set; empty when absent
    pub flashcards: Vec<Flashcard>,
}

/// Format a byte count the way the library lists it.
pub fn format_size(bytes: usize) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}
