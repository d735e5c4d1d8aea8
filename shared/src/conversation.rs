//! Per-session conversation state.
//!
//! Owns the append-only message log, the resource library, the panels derived
//! from model replies and the current mode. Study plan and sidebar resources
//! are sticky: a reply without those regions leaves them as they were.
//! Flashcards are replaced on every reply.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::gateway::GatewayMessage;
use crate::mode::{Mode, ModeController};
use crate::models::{DocumentResource, Flashcard, GroundingUrl, Message, ParsedTutorResponse, Role};
use crate::prompts::{GREETING, STUDY_PLAN_PLACEHOLDER};
use crate::{Error, Result};

/// Short-lived user-facing notice, e.g. a rejected upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

impl Notice {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub library: Vec<DocumentResource>,
    pub active_resource_id: Option<Uuid>,
    pub study_plan: Vec<String>,
    pub sidebar_resources: Vec<String>,
    pub flashcards: Vec<Flashcard>,
    pub mode: Mode,
    pub notice: Option<Notice>,
    pub pending: bool,
}

/// State of one tutoring session.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    library: Vec<DocumentResource>,
    active_resource: Option<Uuid>,
    study_plan: Vec<String>,
    sidebar_resources: Vec<String>,
    flashcards: Vec<Flashcard>,
    mode: ModeController,
    notice: Option<Notice>,
    pending: bool,
    next_id: u64,
    generation: u64,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationState {
    /// Fresh session: one greeting, empty library, tutoring mode.
    pub fn new() -> Self {
        let mut state = Self {
            messages: Vec::new(),
            library: Vec::new(),
            active_resource: None,
            study_plan: vec![STUDY_PLAN_PLACEHOLDER.to_string()],
            sidebar_resources: Vec::new(),
            flashcards: Vec::new(),
            mode: ModeController::new(),
            notice: None,
            pending: false,
            next_id: 0,
            generation: 0,
        };
        state.append_assistant_text(GREETING);
        state
    }

    /// Start over, dropping the log and the library.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new();
        self.generation = generation;
    }

    /// Bumped on every reset; replies started in an older generation are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Library, newest first.
    pub fn library(&self) -> &[DocumentResource] {
        &self.library
    }

    pub fn active_resource(&self) -> Option<&DocumentResource> {
        let id = self.active_resource?;
        self.library.iter().find(|doc| doc.id == id)
    }

    pub fn study_plan(&self) -> &[String] {
        &self.study_plan
    }

    pub fn sidebar_resources(&self) -> &[String] {
        &self.sidebar_resources
    }

    pub fn flashcards(&self) -> &[Flashcard] {
        &self.flashcards
    }

    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The current notice, if it has not expired yet.
    pub fn active_notice(&self, now: DateTime<Utc>) -> Option<&Notice> {
        self.notice.as_ref().filter(|notice| notice.is_active(now))
    }

    /// Append a user turn, recording the attached resource's title.
    pub fn append_user_message(
        &mut self,
        content: &str,
        attachment: Option<&DocumentResource>,
    ) -> &Message {
        let attachments = attachment.map(|doc| vec![doc.title.clone()]).unwrap_or_default();
        self.push(Role::User, content.to_string(), attachments, None)
    }

    /// Append a parsed reply and update the panels.
    pub fn append_assistant_message(
        &mut self,
        parsed: ParsedTutorResponse,
        grounding: Vec<GroundingUrl>,
    ) -> &Message {
        if let Some(plan) = parsed.study_plan.filter(|plan| !plan.is_empty()) {
            self.study_plan = plan;
        }
        if let Some(resources) = parsed.sidebar_resources.filter(|r| !r.is_empty()) {
            self.sidebar_resources = resources;
        }
        // A turn sent in tutoring mode can land after a switch to evaluation.
        self.flashcards = if self.mode.mode().allows_flashcards() {
            parsed.flashcards
        } else {
            Vec::new()
        };

        let grounding = (!grounding.is_empty()).then_some(grounding);
        self.push(Role::Assistant, parsed.chat_text, Vec::new(), grounding)
    }

    /// Append an assistant message that did not come from the model.
    pub fn append_assistant_text(&mut self, content: &str) -> &Message {
        self.push(Role::Assistant, content.to_string(), Vec::new(), None)
    }

    /// Switch modes and announce the new one in the log.
    pub fn toggle_mode(&mut self) -> &Message {
        let announcement = self.mode.toggle();
        if !self.mode.mode().allows_flashcards() {
            self.flashcards.clear();
        }
        self.append_assistant_text(announcement)
    }

    /// Make a library resource the vision context for later turns, or clear it.
    pub fn attach_resource(&mut self, id: Option<Uuid>) -> Result<()> {
        if let Some(id) = id {
            if !self.library.iter().any(|doc| doc.id == id) {
                return Err(Error::NotFound(format!("Document {}", id)));
            }
        }
        self.active_resource = id;
        Ok(())
    }

    /// Add a freshly analyzed resource at the front of the library.
    pub fn add_resource(&mut self, resource: DocumentResource) {
        self.library.insert(0, resource);
    }

    pub fn set_notice(&mut self, message: &str, ttl: std::time::Duration) {
        let expires_at = Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.notice = Some(Notice {
            message: message.to_string(),
            expires_at,
        });
    }

    /// Claim the single outbound request slot.
    pub fn begin_request(&mut self) -> Result<()> {
        if self.pending {
            return Err(Error::RequestInFlight);
        }
        self.pending = true;
        Ok(())
    }

    pub fn finish_request(&mut self) {
        self.pending = false;
    }

    /// History as sent upstream. The last user turn carries the current mode
    /// directive; the log itself is left untouched.
    pub fn outbound_history(&self) -> Vec<GatewayMessage> {
        let mut history: Vec<GatewayMessage> = self
            .messages
            .iter()
            .map(|message| GatewayMessage {
                role: message.role,
                text: message.content.clone(),
            })
            .collect();

        if let Some(last) = history.last_mut().filter(|m| m.role == Role::User) {
            last.text = self.mode.apply_directive(&last.text);
        }

        history
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            library: self.library.clone(),
            active_resource_id: self.active_resource,
            study_plan: self.study_plan.clone(),
            sidebar_resources: self.sidebar_resources.clone(),
            flashcards: self.flashcards.clone(),
            mode: self.mode(),
            notice: self.active_notice(now).cloned(),
            pending: self.pending,
        }
    }

    fn push(
        &mut self,
        role: Role,
        content: String,
        attachments: Vec<String>,
        grounding_urls: Option<Vec<GroundingUrl>>,
    ) -> &Message {
        let now = Utc::now();
        let timestamp = match self.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        self.next_id += 1;
        self.messages.push(Message {
            id: self.next_id,
            role,
            content,
            timestamp,
            attachments,
            grounding_urls,
        });
        &self.messages[self.messages.len() - 1]
    }
}
