//! Shared library for the CambridgeAI tutoring workspace.
//!
//! This crate provides the response parser, per-session conversation state,
//! the mode controller and the model gateway used by the Lambda functions.

pub mod bedrock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mode;
pub mod models;
pub mod parser;
pub mod prompts;
pub mod store;
pub mod tutor;

pub use bedrock::BedrockGateway;
pub use config::Config;
pub use conversation::{ConversationSnapshot, ConversationState, Notice};
pub use error::{Error, Result};
pub use gateway::{DocumentAnalysis, GatewayRequest, GatewayResponse, ImagePayload, ModelGateway};
pub use mode::{Mode, ModeController};
pub use models::{DocumentResource, Flashcard, GroundingUrl, Message, ParsedTutorResponse, Role};
pub use parser::parse;
pub use store::SessionStore;
pub use tutor::{IngestOrigin, TurnOutcome, TutorService, UploadedFile};
