//! Tutoring service: drives a turn from user input to updated panels.
//!
//! Gateway failures never leave this module. An unreadable image becomes the
//! apology reply, any other failure becomes the generic retry message, and
//! the session stays usable either way.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::conversation::ConversationSnapshot;
use crate::gateway::{
    DocumentAnalysis, GatewayMessage, GatewayRequest, GatewayResponse, ImagePayload, ModelGateway,
};
use crate::mode::Mode;
use crate::models::{
    format_size, DocumentResource, DocumentStatus, DocumentType, Flashcard, Message,
    ParsedTutorResponse,
};
use crate::parser::parse;
use crate::prompts;
use crate::store::{SessionHandle, SessionStore};
use crate::{Config, Error, Result};

const PNG_MIME_TYPE: &str = "image/png";

/// Where an upload came from. Workspace uploads also become the active
/// context and are announced in the chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOrigin {
    #[default]
    Library,
    Workspace,
}

/// A file handed to ingestion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original file name
    pub file_name: String,
    /// Declared MIME type
    pub mime_type: String,
    /// Base64 payload, bare or as a data URL
    pub data: String,
}

impl UploadedFile {
    /// PNG by declared MIME type or by file name suffix.
    pub fn is_png(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case(PNG_MIME_TYPE)
            || self.file_name.to_lowercase().ends_with(".png")
    }
}

/// Result of one tutoring turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    /// The assistant message appended for this turn
    pub message: Message,
    pub study_plan: Vec<String>,
    pub sidebar_resources: Vec<String>,
    pub flashcards: Vec<Flashcard>,
    pub mode: Mode,
}

/// Service owning all sessions and the gateway they talk to.
pub struct TutorService {
    gateway: Arc<dyn ModelGateway>,
    sessions: SessionStore,
    notice_ttl: Duration,
}

impl TutorService {
    /// Create a new tutoring service.
    pub fn new(gateway: Arc<dyn ModelGateway>, config: &Config) -> Self {
        Self {
            gateway,
            sessions: SessionStore::new(),
            notice_ttl: config.notice_ttl,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start a session and return its id.
    pub async fn create_session(&self) -> Uuid {
        let id = self.sessions.create().await;
        info!("Created session {}", id);
        id
    }

    /// New-session action: reset the log, library and panels.
    pub async fn reset_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions.reset(session_id).await?;
        info!("Reset session {}", session_id);
        Ok(())
    }

    /// Forget a session.
    pub async fn close_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions.remove(session_id).await?;
        info!("Closed session {}", session_id);
        Ok(())
    }

    pub async fn snapshot(&self, session_id: Uuid) -> Result<ConversationSnapshot> {
        let session = self.sessions.get(session_id).await?;
        let state = session.lock().await;
        Ok(state.snapshot(Utc::now()))
    }

    /// Flip between tutoring and evaluation, returning the announcement.
    pub async fn toggle_mode(&self, session_id: Uuid) -> Result<Message> {
        let session = self.sessions.get(session_id).await?;
        let mut state = session.lock().await;
        let message = state.toggle_mode().clone();
        info!("Session {} switched to {:?} mode", session_id, state.mode());
        Ok(message)
    }

    /// Attach a library resource as vision context, or detach with `None`.
    pub async fn attach_resource(&self, session_id: Uuid, document_id: Option<Uuid>) -> Result<()> {
        let session = self.sessions.get(session_id).await?;
        let mut state = session.lock().await;
        state.attach_resource(document_id)
    }

    /// Send one user turn and apply the reply.
    ///
    /// Only one turn may be pending per session; a second concurrent send
    /// fails with `Error::RequestInFlight` and leaves the log untouched.
    pub async fn send_message(
        &self,
        session_id: Uuid,
        input: &str,
        use_search: bool,
    ) -> Result<TurnOutcome> {
        let session = self.sessions.get(session_id).await?;

        let (history, thumbnail, mode, generation) = {
            let mut state = session.lock().await;
            let active = state.active_resource().cloned();
            let content = match (input.trim(), &active) {
                ("", Some(doc)) => prompts::analyze_resource_request(&doc.title),
                ("", None) => {
                    return Err(Error::Validation("Message cannot be empty".to_string()))
                }
                (text, _) => text.to_string(),
            };

            state.begin_request()?;
            state.append_user_message(&content, active.as_ref());
            (
                state.outbound_history(),
                active.and_then(|doc| doc.thumbnail),
                state.mode(),
                state.generation(),
            )
        };

        // The reply is applied on its own task so a caller that stops
        // waiting cannot leave the session pending.
        let gateway = Arc::clone(&self.gateway);
        let turn = tokio::spawn(async move {
            let result = complete(gateway.as_ref(), history, thumbnail, use_search).await;
            apply_reply(&session, session_id, generation, mode, result).await
        });

        turn.await
            .map_err(|e| Error::Internal(format!("Turn for session {} aborted: {}", session_id, e)))?
    }

    /// Validate, analyze and store an uploaded PNG.
    ///
    /// Non-PNG files are rejected before any gateway call with a transient
    /// notice. Analysis failures fall back to default fields; the upload
    /// still succeeds.
    pub async fn ingest_document(
        &self,
        session_id: Uuid,
        file: UploadedFile,
        origin: IngestOrigin,
    ) -> Result<DocumentResource> {
        let session = self.sessions.get(session_id).await?;

        if !file.is_png() {
            warn!(
                "Rejected upload {} ({}) for session {}",
                file.file_name, file.mime_type, session_id
            );
            let mut state = session.lock().await;
            state.set_notice(prompts::PNG_ONLY_NOTICE, self.notice_ttl);
            if origin == IngestOrigin::Workspace {
                state.append_assistant_text(prompts::PNG_ONLY_NOTICE);
            }
            return Err(Error::UnsupportedFileType(file.file_name));
        }

        let mut image = ImagePayload::from_data_url(&file.data)
            .map_err(|e| Error::Validation(format!("Invalid file data: {}", e)))?;
        image.mime_type = PNG_MIME_TYPE.to_string();
        let size = format_size(image.data.len());
        let thumbnail = image.to_data_url();

        let analysis = match self.gateway.analyze_document(image).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!("Analysis failed for {}: {}", file.file_name, e);
                DocumentAnalysis::fallback()
            }
        };

        let subject = match analysis.subject.trim() {
            "" => prompts::DEFAULT_SUBJECT.to_string(),
            subject => subject.to_string(),
        };

        let resource = DocumentResource {
            id: Uuid::new_v4(),
            title: file.file_name,
            doc_type: DocumentType::Png,
            size,
            status: DocumentStatus::Analyzed,
            subject,
            summary: analysis.summary,
            equations: analysis.equations,
            thumbnail: Some(thumbnail),
            created_at: Utc::now(),
        };

        let mut state = session.lock().await;
        state.add_resource(resource.clone());
        if origin == IngestOrigin::Workspace {
            state.attach_resource(Some(resource.id))?;
            state.append_assistant_text(&prompts::indexed_resource_message(&resource.title));
        }

        info!(
            "Indexed {} ({}, {}) for session {}",
            resource.title, resource.subject, resource.size, session_id
        );

        Ok(resource)
    }
}

async fn complete(
    gateway: &dyn ModelGateway,
    history: Vec<GatewayMessage>,
    thumbnail: Option<String>,
    use_search: bool,
) -> Result<GatewayResponse> {
    let image = thumbnail
        .as_deref()
        .map(ImagePayload::from_data_url)
        .transpose()?;

    debug!(
        "Dispatching turn: history={}, image={}, search={}",
        history.len(),
        image.is_some(),
        use_search
    );

    gateway
        .complete(GatewayRequest {
            history,
            image,
            system_instruction: prompts::SYSTEM_INSTRUCTION.to_string(),
            use_search,
        })
        .await
}

/// Apply a finished completion to the session and clear its pending flag.
async fn apply_reply(
    session: &SessionHandle,
    session_id: Uuid,
    generation: u64,
    mode: Mode,
    result: Result<GatewayResponse>,
) -> Result<TurnOutcome> {
    let mut state = session.lock().await;
    if state.generation() != generation {
        info!("Session {} was reset while a turn was pending; dropping reply", session_id);
        return Err(Error::NotFound(format!("Session {} turn", session_id)));
    }

    let message = match result {
        Ok(response) => {
            let parsed = parse(&response.text, mode);
            state.append_assistant_message(parsed, response.grounding).clone()
        }
        Err(Error::ImageProcessing(e)) => {
            error!("Image could not be processed for session {}: {}", session_id, e);
            let apology = ParsedTutorResponse {
                chat_text: prompts::IMAGE_APOLOGY.to_string(),
                ..Default::default()
            };
            state.append_assistant_message(apology, Vec::new()).clone()
        }
        Err(e) => {
            error!("Completion failed for session {}: {}", session_id, e);
            state.append_assistant_text(prompts::GENERIC_FAILURE).clone()
        }
    };
    state.finish_request();

    info!(
        "Turn completed for session {}: mode={:?}, plan={}, resources={}, flashcards={}",
        session_id,
        mode,
        state.study_plan().len(),
        state.sidebar_resources().len(),
        state.flashcards().len()
    );

    Ok(TurnOutcome {
        message,
        study_plan: state.study_plan().to_vec(),
        sidebar_resources: state.sidebar_resources().to_vec(),
        flashcards: state.flashcards().to_vec(),
        mode: state.mode(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GroundingUrl, Role};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0K";

    /// Scripted gateway that records every call.
    #[derive(Default)]
    struct FakeGateway {
        replies: Mutex<VecDeque<Result<GatewayResponse>>>,
        analysis: Mutex<Option<Result<DocumentAnalysis>>>,
        requests: Mutex<Vec<GatewayRequest>>,
        analyses: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeGateway {
        fn replying(replies: Vec<Result<GatewayResponse>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        fn text(text: &str) -> Result<GatewayResponse> {
            Ok(GatewayResponse {
                text: text.to_string(),
                grounding: vec![],
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len() + self.analyses.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> GatewayRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ModelGateway for FakeGateway {
        async fn complete(&self, request: GatewayRequest) -> Result<GatewayResponse> {
            self.requests.lock().unwrap().push(request);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| FakeGateway::text("[CHAT_RESPONSE]\nok"))
        }

        async fn analyze_document(&self, _image: ImagePayload) -> Result<DocumentAnalysis> {
            self.analyses.fetch_add(1, Ordering::SeqCst);
            self.analysis
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(DocumentAnalysis {
                    equations: vec!["x + 2 = 5".to_string()],
                    summary: "Ecuación lineal".to_string(),
                    subject: "Álgebra".to_string(),
                }))
        }
    }

    fn service(gateway: Arc<FakeGateway>) -> TutorService {
        TutorService::new(gateway, &Config::default())
    }

    fn png(name: &str) -> UploadedFile {
        UploadedFile {
            file_name: name.to_string(),
            mime_type: "image/png".to_string(),
            data: PNG_DATA_URL.to_string(),
        }
    }

    #[tokio::test]
    async fn test_turn_updates_panels() {
        let gateway = Arc::new(FakeGateway::replying(vec![FakeGateway::text(
            "[CHAT_RESPONSE]\nHola\n\n[STUDY_PLAN]\n1. Paso uno\n2. Paso dos\n\n[FLASHCARDS]\nTarjeta 1:\nNota: A\nRecordar: B\n",
        )]));
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let outcome = tutor.send_message(id, "¿Qué es una ecuación?", false).await.unwrap();

        assert_eq!(outcome.message.content, "Hola");
        assert_eq!(outcome.message.role, Role::Assistant);
        assert_eq!(outcome.study_plan, vec!["Paso uno", "Paso dos"]);
        assert_eq!(
            outcome.flashcards,
            vec![Flashcard {
                question: "A".to_string(),
                answer: "B".to_string()
            }]
        );

        let request = gateway.last_request();
        assert_eq!(request.system_instruction, prompts::SYSTEM_INSTRUCTION);
        assert!(request.image.is_none());
        let last = request.history.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.text.starts_with("¿Qué es una ecuación?\n"));
        assert!(last.text.ends_with(Mode::Tutoring.directive()));

        let snapshot = tutor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.messages.len(), 3);
        assert_eq!(snapshot.messages[1].content, "¿Qué es una ecuación?");
        assert!(!snapshot.pending);
    }

    #[tokio::test]
    async fn test_grounding_reaches_message() {
        let url = GroundingUrl {
            title: "Khan".to_string(),
            uri: "https://example.org/fracciones".to_string(),
        };
        let gateway = Arc::new(FakeGateway::replying(vec![Ok(GatewayResponse {
            text: "[CHAT_RESPONSE]\nMira esto".to_string(),
            grounding: vec![url.clone()],
        })]));
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let outcome = tutor.send_message(id, "fracciones", true).await.unwrap();
        assert_eq!(outcome.message.grounding_urls, Some(vec![url]));
        assert!(gateway.last_request().use_search);
    }

    #[tokio::test]
    async fn test_image_failure_becomes_apology() {
        let gateway = Arc::new(FakeGateway::replying(vec![Err(Error::ImageProcessing(
            "Unable to process input image".to_string(),
        ))]));
        let tutor = service(gateway);
        let id = tutor.create_session().await;

        let outcome = tutor.send_message(id, "mira", false).await.unwrap();
        assert_eq!(outcome.message.content, prompts::IMAGE_APOLOGY);
        assert!(!tutor.snapshot(id).await.unwrap().pending);
    }

    #[tokio::test]
    async fn test_general_failure_keeps_session_usable() {
        let gateway = Arc::new(FakeGateway::replying(vec![
            Err(Error::Gateway("throttled".to_string())),
            FakeGateway::text("[CHAT_RESPONSE]\nDe nuevo aquí"),
        ]));
        let tutor = service(gateway);
        let id = tutor.create_session().await;

        let outcome = tutor.send_message(id, "hola", false).await.unwrap();
        assert_eq!(outcome.message.content, prompts::GENERIC_FAILURE);

        let outcome = tutor.send_message(id, "hola otra vez", false).await.unwrap();
        assert_eq!(outcome.message.content, "De nuevo aquí");
    }

    #[tokio::test]
    async fn test_blank_input_without_context_is_rejected() {
        let gateway = Arc::new(FakeGateway::default());
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let err = tutor.send_message(id, "   ", false).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(tutor.snapshot(id).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_non_png_rejected_without_gateway_call() {
        let gateway = Arc::new(FakeGateway::default());
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let file = UploadedFile {
            file_name: "apuntes.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            data: "JVBERi0=".to_string(),
        };
        let err = tutor
            .ingest_document(id, file, IngestOrigin::Library)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedFileType(_)));
        assert_eq!(gateway.calls(), 0);
        let snapshot = tutor.snapshot(id).await.unwrap();
        assert!(snapshot.library.is_empty());
        assert_eq!(snapshot.notice.unwrap().message, prompts::PNG_ONLY_NOTICE);
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_non_png_in_workspace_is_announced() {
        let gateway = Arc::new(FakeGateway::default());
        let tutor = service(gateway);
        let id = tutor.create_session().await;

        let file = UploadedFile {
            file_name: "foto.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            data: "AQID".to_string(),
        };
        assert!(tutor
            .ingest_document(id, file, IngestOrigin::Workspace)
            .await
            .is_err());

        let snapshot = tutor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.messages.last().unwrap().content, prompts::PNG_ONLY_NOTICE);
    }

    #[tokio::test]
    async fn test_png_accepted_by_suffix() {
        let gateway = Arc::new(FakeGateway::default());
        let tutor = service(gateway);
        let id = tutor.create_session().await;

        let file = UploadedFile {
            file_name: "Pizarra.PNG".to_string(),
            mime_type: "application/octet-stream".to_string(),
            data: "iVBORw0K".to_string(),
        };
        let resource = tutor
            .ingest_document(id, file, IngestOrigin::Library)
            .await
            .unwrap();
        assert_eq!(resource.thumbnail.as_deref(), Some(PNG_DATA_URL));
    }

    #[tokio::test]
    async fn test_library_ingest_records_analysis() {
        let gateway = Arc::new(FakeGateway::default());
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let resource = tutor
            .ingest_document(id, png("ecuacion.png"), IngestOrigin::Library)
            .await
            .unwrap();

        assert_eq!(resource.status, DocumentStatus::Analyzed);
        assert_eq!(resource.subject, "Álgebra");
        assert_eq!(resource.equations, vec!["x + 2 = 5"]);
        assert_eq!(resource.size, "0.0 MB");

        let snapshot = tutor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.library.len(), 1);
        assert_eq!(snapshot.active_resource_id, None);
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_analysis_failure_uses_fallback() {
        let gateway = Arc::new(FakeGateway::default());
        *gateway.analysis.lock().unwrap() = Some(Err(Error::Gateway("bad schema".to_string())));
        let tutor = service(gateway);
        let id = tutor.create_session().await;

        let resource = tutor
            .ingest_document(id, png("tabla.png"), IngestOrigin::Library)
            .await
            .unwrap();
        assert_eq!(resource.subject, "Matemáticas");
        assert_eq!(resource.summary, "PNG listo para análisis");
        assert!(resource.equations.is_empty());
    }

    #[tokio::test]
    async fn test_blank_subject_defaults() {
        let gateway = Arc::new(FakeGateway::default());
        *gateway.analysis.lock().unwrap() = Some(Ok(DocumentAnalysis {
            equations: vec![],
            summary: String::new(),
            subject: "  ".to_string(),
        }));
        let tutor = service(gateway);
        let id = tutor.create_session().await;

        let resource = tutor
            .ingest_document(id, png("tabla.png"), IngestOrigin::Library)
            .await
            .unwrap();
        assert_eq!(resource.subject, prompts::DEFAULT_SUBJECT);
    }

    #[tokio::test]
    async fn test_workspace_ingest_attaches_and_sends_image() {
        let gateway = Arc::new(FakeGateway::default());
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let resource = tutor
            .ingest_document(id, png("triangulo.png"), IngestOrigin::Workspace)
            .await
            .unwrap();

        let snapshot = tutor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.active_resource_id, Some(resource.id));
        assert_eq!(
            snapshot.messages.last().unwrap().content,
            prompts::indexed_resource_message("triangulo.png")
        );

        tutor.send_message(id, "", false).await.unwrap();
        let request = gateway.last_request();
        let image = request.image.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a]);
        assert!(request
            .history
            .last()
            .unwrap()
            .text
            .starts_with("Analiza este recurso: triangulo.png"));

        let snapshot = tutor.snapshot(id).await.unwrap();
        let user = &snapshot.messages[snapshot.messages.len() - 2];
        assert_eq!(user.attachments, vec!["triangulo.png"]);
    }

    #[tokio::test]
    async fn test_evaluation_mode_suppresses_flashcards() {
        let gateway = Arc::new(FakeGateway::replying(vec![FakeGateway::text(
            "[CHAT_RESPONSE]\nPregunta 1 de 5: ¿7 x 8?\n[FLASHCARDS]\nTarjeta 1:\nNota: A\nRecordar: B\n",
        )]));
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let announcement = tutor.toggle_mode(id).await.unwrap();
        assert_eq!(announcement.content, Mode::Evaluation.announcement());

        let outcome = tutor.send_message(id, "listo", false).await.unwrap();
        assert!(outcome.flashcards.is_empty());
        assert_eq!(outcome.mode, Mode::Evaluation);
        assert!(gateway
            .last_request()
            .history
            .last()
            .unwrap()
            .text
            .ends_with(Mode::Evaluation.directive()));
    }

    #[tokio::test]
    async fn test_second_send_while_pending_is_rejected() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(FakeGateway {
            gate: Some(gate.clone()),
            ..FakeGateway::replying(vec![FakeGateway::text("[CHAT_RESPONSE]\nprimera")])
        });
        let tutor = Arc::new(service(gateway.clone()));
        let id = tutor.create_session().await;

        let first = {
            let tutor = Arc::clone(&tutor);
            tokio::spawn(async move { tutor.send_message(id, "uno", false).await })
        };

        while !tutor.snapshot(id).await.unwrap().pending {
            tokio::task::yield_now().await;
        }

        let err = tutor.send_message(id, "dos", false).await.unwrap_err();
        assert!(matches!(err, Error::RequestInFlight));

        gate.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.message.content, "primera");

        let snapshot = tutor.snapshot(id).await.unwrap();
        let contents: Vec<&str> = snapshot.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["uno", "primera"]);
        assert_eq!(gateway.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_to_evaluation_while_pending_drops_flashcards() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(FakeGateway {
            gate: Some(gate.clone()),
            ..FakeGateway::replying(vec![FakeGateway::text(
                "[CHAT_RESPONSE]\nBien\n[FLASHCARDS]\nTarjeta 1:\nNota: Suma\nRecordar: juntar\n",
            )])
        });
        let tutor = Arc::new(service(gateway));
        let id = tutor.create_session().await;

        let first = {
            let tutor = Arc::clone(&tutor);
            tokio::spawn(async move { tutor.send_message(id, "uno", false).await })
        };
        while !tutor.snapshot(id).await.unwrap().pending {
            tokio::task::yield_now().await;
        }

        tutor.toggle_mode(id).await.unwrap();
        gate.notify_one();

        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.message.content, "Bien");
        assert_eq!(outcome.mode, Mode::Evaluation);
        assert!(outcome.flashcards.is_empty());
        assert!(tutor.snapshot(id).await.unwrap().flashcards.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_send_still_completes() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(FakeGateway {
            gate: Some(gate.clone()),
            ..FakeGateway::replying(vec![FakeGateway::text("[CHAT_RESPONSE]\nprimera")])
        });
        let tutor = service(gateway.clone());
        let id = tutor.create_session().await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            tutor.send_message(id, "uno", false),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(tutor.snapshot(id).await.unwrap().pending);

        gate.notify_one();
        while tutor.snapshot(id).await.unwrap().pending {
            tokio::task::yield_now().await;
        }

        let snapshot = tutor.snapshot(id).await.unwrap();
        let contents: Vec<&str> = snapshot.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["uno", "primera"]);

        gate.notify_one();
        let outcome = tutor.send_message(id, "dos", false).await.unwrap();
        assert_eq!(outcome.message.content, "ok");
        assert_eq!(gateway.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reply_after_reset_is_dropped() {
        let gate = Arc::new(Notify::new());
        let gateway = Arc::new(FakeGateway {
            gate: Some(gate.clone()),
            ..FakeGateway::default()
        });
        let tutor = Arc::new(service(gateway));
        let id = tutor.create_session().await;

        let pending = {
            let tutor = Arc::clone(&tutor);
            tokio::spawn(async move { tutor.send_message(id, "uno", false).await })
        };
        while !tutor.snapshot(id).await.unwrap().pending {
            tokio::task::yield_now().await;
        }

        tutor.reset_session(id).await.unwrap();
        gate.notify_one();
        assert!(pending.await.unwrap().is_err());

        let snapshot = tutor.snapshot(id).await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert!(!snapshot.pending);
    }

    #[tokio::test]
    async fn test_close_session() {
        let tutor = service(Arc::new(FakeGateway::default()));
        let id = tutor.create_session().await;
        tutor.close_session(id).await.unwrap();
        assert!(tutor.snapshot(id).await.is_err());
        assert!(matches!(tutor.close_session(id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let tutor = service(Arc::new(FakeGateway::default()));
        let err = tutor.send_message(Uuid::new_v4(), "hola", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
