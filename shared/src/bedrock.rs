//! Bedrock Converse implementation of the model gateway.

use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::converse::{ConverseError, ConverseOutput};
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ImageBlock, ImageFormat, ImageSource, InferenceConfiguration,
    Message as BedrockMessage, SpecificToolChoice, SystemContentBlock, Tool, ToolChoice,
    ToolConfiguration, ToolInputSchema, ToolSpecification,
};
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_smithy_types::{Document, Number};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::gateway::{
    DocumentAnalysis, GatewayMessage, GatewayRequest, GatewayResponse, ImagePayload, ModelGateway,
};
use crate::models::Role;
use crate::prompts::ANALYSIS_PROMPT;
use crate::{Config, Error, Result};

/// Name of the tool the analysis call is forced to use.
const ANALYSIS_TOOL: &str = "record_analysis";

/// Gateway backed by the Bedrock Converse API.
pub struct BedrockGateway {
    client: BedrockClient,
    model_id: String,
    analysis_model_id: String,
    max_tokens: i32,
}

impl BedrockGateway {
    /// Create a gateway from an existing client.
    pub fn new(client: BedrockClient, config: &Config) -> Self {
        Self {
            client,
            model_id: config.model_id.clone(),
            analysis_model_id: config.analysis_model_id.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// Load AWS credentials from the environment and build a gateway.
    pub async fn from_config(config: &Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;
        Self::new(BedrockClient::new(&aws_config), config)
    }

    fn inference_config(&self) -> InferenceConfiguration {
        InferenceConfiguration::builder()
            .max_tokens(self.max_tokens)
            .build()
    }
}

#[async_trait]
impl ModelGateway for BedrockGateway {
    async fn complete(&self, request: GatewayRequest) -> Result<GatewayResponse> {
        if request.use_search {
            debug!("Web search grounding is not available through Bedrock; answering without it");
        }

        let turns = normalize_turns(&request.history);
        if turns.is_empty() {
            return Err(Error::Gateway("Conversation has no user turn".to_string()));
        }
        let messages = build_messages(turns, request.image.as_ref())?;

        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .set_messages(Some(messages))
            .system(SystemContentBlock::Text(request.system_instruction))
            .inference_config(self.inference_config())
            .send()
            .await
            .map_err(classify_error)?;

        let message = response_message(&response)?;
        let text = message
            .content()
            .iter()
            .filter_map(|block| block.as_text().ok())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("");

        info!(
            "Converse completed: model={}, stop_reason={:?}, chars={}",
            self.model_id,
            response.stop_reason(),
            text.len()
        );

        Ok(GatewayResponse {
            text,
            grounding: Vec::new(),
        })
    }

    async fn analyze_document(&self, image: ImagePayload) -> Result<DocumentAnalysis> {
        let message = BedrockMessage::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(ANALYSIS_PROMPT.to_string()))
            .content(image_block(&image)?)
            .build()
            .map_err(|e| Error::Gateway(format!("Failed to build analysis message: {}", e)))?;

        let response = self
            .client
            .converse()
            .model_id(&self.analysis_model_id)
            .messages(message)
            .tool_config(analysis_tool_config()?)
            .inference_config(self.inference_config())
            .send()
            .await
            .map_err(classify_error)?;

        let input = response_message(&response)?
            .content()
            .iter()
            .find_map(|block| block.as_tool_use().ok())
            .map(|tool_use| document_to_json(tool_use.input()))
            .ok_or_else(|| Error::Gateway("Model did not return an analysis".to_string()))?;

        Ok(serde_json::from_value(input)?)
    }
}

/// Reshape history for Converse: it must open with a user turn and roles
/// must alternate. Leading assistant turns and blank turns are dropped;
/// consecutive turns from the same speaker are merged.
fn normalize_turns(history: &[GatewayMessage]) -> Vec<(Role, String)> {
    let mut turns: Vec<(Role, String)> = Vec::new();

    for message in history
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .skip_while(|m| m.role == Role::Assistant)
    {
        match turns.last_mut() {
            Some((role, text)) if *role == message.role => {
                text.push_str("\n\n");
                text.push_str(&message.text);
            }
            _ => turns.push((message.role, message.text.clone())),
        }
    }

    turns
}

fn build_messages(
    turns: Vec<(Role, String)>,
    image: Option<&ImagePayload>,
) -> Result<Vec<BedrockMessage>> {
    let last = turns.len().saturating_sub(1);

    turns
        .into_iter()
        .enumerate()
        .map(|(index, (role, text))| {
            let mut builder = BedrockMessage::builder()
                .role(conversation_role(role))
                .content(ContentBlock::Text(text));
            if index == last && role == Role::User {
                if let Some(image) = image {
                    builder = builder.content(image_block(image)?);
                }
            }
            builder
                .build()
                .map_err(|e| Error::Gateway(format!("Failed to build message: {}", e)))
        })
        .collect()
}

fn conversation_role(role: Role) -> ConversationRole {
    match role {
        Role::User => ConversationRole::User,
        Role::Assistant => ConversationRole::Assistant,
    }
}

fn image_block(image: &ImagePayload) -> Result<ContentBlock> {
    let format = match image.mime_type.as_str() {
        "image/png" => ImageFormat::Png,
        "image/jpeg" | "image/jpg" => ImageFormat::Jpeg,
        "image/gif" => ImageFormat::Gif,
        "image/webp" => ImageFormat::Webp,
        other => {
            return Err(Error::ImageProcessing(format!(
                "Unsupported image type: {}",
                other
            )))
        }
    };

    let block = ImageBlock::builder()
        .format(format)
        .source(ImageSource::Bytes(Blob::new(image.data.clone())))
        .build()
        .map_err(|e| Error::ImageProcessing(format!("Failed to build image block: {}", e)))?;

    Ok(ContentBlock::Image(block))
}

fn analysis_tool_config() -> Result<ToolConfiguration> {
    let schema = json!({
        "type": "object",
        "properties": {
            "equations": { "type": "array", "items": { "type": "string" } },
            "summary": { "type": "string" },
            "subject": { "type": "string" }
        },
        "required": ["equations", "summary", "subject"]
    });

    let spec = ToolSpecification::builder()
        .name(ANALYSIS_TOOL)
        .description("Record the subject, summary and equations found in an educational image.")
        .input_schema(ToolInputSchema::Json(json_to_document(schema)))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build analysis tool: {}", e)))?;

    let choice = SpecificToolChoice::builder()
        .name(ANALYSIS_TOOL)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build tool choice: {}", e)))?;

    ToolConfiguration::builder()
        .tools(Tool::ToolSpec(spec))
        .tool_choice(ToolChoice::Tool(choice))
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build tool config: {}", e)))
}

fn response_message(response: &ConverseOutput) -> Result<&BedrockMessage> {
    response
        .output()
        .and_then(|output| output.as_message().ok())
        .ok_or_else(|| Error::Gateway("No message in model response".to_string()))
}

/// Image decode failures come back as validation errors that name the image.
fn classify_error<R>(err: SdkError<ConverseError, R>) -> Error
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if let Some(ConverseError::ValidationException(e)) = err.as_service_error() {
        let message = e.message().unwrap_or_default();
        if mentions_image(message) {
            return Error::ImageProcessing(message.to_string());
        }
    }
    Error::Gateway(format!("Converse call failed: {}", DisplayErrorContext(&err)))
}

fn mentions_image(message: &str) -> bool {
    message.to_lowercase().contains("image")
}

fn json_to_document(value: Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                Document::Number(Number::Float(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => Document::String(s),
        Value::Array(items) => Document::Array(items.into_iter().map(json_to_document).collect()),
        Value::Object(map) => Document::Object(
            map.into_iter()
                .map(|(key, value)| (key, json_to_document(value)))
                .collect(),
        ),
    }
}

fn document_to_json(document: &Document) -> Value {
    match document {
        Document::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), document_to_json(value)))
                .collect(),
        ),
        Document::Array(items) => Value::Array(items.iter().map(document_to_json).collect()),
        Document::Number(Number::PosInt(n)) => Value::from(*n),
        Document::Number(Number::NegInt(n)) => Value::from(*n),
        Document::Number(Number::Float(f)) => Value::from(*f),
        Document::String(s) => Value::String(s.clone()),
        Document::Bool(b) => Value::Bool(*b),
        Document::Null => Value::Null,
    }
}
