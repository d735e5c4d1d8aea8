//! Model gateway abstraction.
//!
//! The tutoring flow only needs two capabilities from the generative model:
//! a conversational completion (optionally with one image) and a
//! schema-constrained analysis of an uploaded PNG.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::models::{GroundingUrl, Role};
use crate::{Error, Result};

/// One turn of history sent upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayMessage {
    pub role: Role,
    pub text: String,
}

/// Inline image attached to the final user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// MIME type, e.g. `image/png`
    pub mime_type: String,
    /// Decoded image bytes
    pub data: Vec<u8>,
}

impl ImagePayload {
    /// Decode a `data:<mime>;base64,<payload>` URL.
    ///
    /// Anything without the data-URL prefix is taken as raw base64 PNG data.
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let (mime_type, encoded) = match split_data_url(data_url) {
            Some((mime, encoded)) => (mime.to_string(), encoded),
            None => ("image/png".to_string(), data_url.trim()),
        };

        let data = STANDARD
            .decode(encoded)
            .map_err(|e| Error::ImageProcessing(format!("Invalid base64 image data: {}", e)))?;

        Ok(Self { mime_type, data })
    }

    /// Encode back to a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }
}

fn split_data_url(data_url: &str) -> Option<(&str, &str)> {
    let rest = data_url.strip_prefix("data:")?;
    let (mime, encoded) = rest.split_once(";base64,")?;
    if !mime.starts_with("image/") || mime.len() == "image/".len() {
        return None;
    }
    Some((mime, encoded.trim()))
}

/// A conversational completion request.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Ordered history, oldest first
    pub history: Vec<GatewayMessage>,
    /// Optional image for the last user turn
    pub image: Option<ImagePayload>,
    /// Behavior contract for the model
    pub system_instruction: String,
    /// Ask the model to ground its answer with web search
    pub use_search: bool,
}

/// Raw completion result.
#[derive(Debug, Clone, Default)]
pub struct GatewayResponse {
    /// Tagged free text, to be split by the parser
    pub text: String,
    /// Citations when grounding was used
    pub grounding: Vec<GroundingUrl>,
}

/// Structured result of analyzing an uploaded resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub equations: Vec<String>,
    pub summary: String,
    pub subject: String,
}

impl DocumentAnalysis {
    /// Fields used when analysis fails.
    pub fn fallback() -> Self {
        Self {
            equations: Vec::new(),
            summary: "PNG listo para análisis".to_string(),
            subject: "Matemáticas".to_string(),
        }
    }
}

/// The external generative model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Complete a tutoring turn.
    ///
    /// Returns `Error::ImageProcessing` when the remote service cannot decode
    /// the attached image and `Error::Gateway` for every other failure.
    async fn complete(&self, request: GatewayRequest) -> Result<GatewayResponse>;

    /// Extract subject, summary and equations from a PNG.
    async fn analyze_document(&self, image: ImagePayload) -> Result<DocumentAnalysis>;
}
