pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream };
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use log::info;

use super::{ LlmConfig, LlmError };
use crate::models::chat::Turn;
use self::openai::OpenAIChatClient;

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub role: String,
    pub content: MessageContent,
}

impl From<&Turn> for RequestMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role().as_str().to_string(),
            content: MessageContent::Text(turn.content().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn from_turns<'a>(
        model: impl Into<String>,
        temperature: f32,
        turns: impl IntoIterator<Item = &'a Turn>
    ) -> Self {
        Self {
            model: model.into(),
            messages: turns.into_iter().map(RequestMessage::from).collect(),
            temperature: Some(temperature),
            max_tokens: None,
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LlmError>;

    /// Providers without native streaming deliver the whole reply as one fragment.
    async fn stream_completion(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let response = self.complete(request).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(response.response) })))
    }

    fn supports_native_streaming(&self) -> bool {
        false
    }

    fn get_base_url(&self) -> String;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TextStream
    where
        F: FnOnce(mpsc::Sender<Result<String, LlmError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// `None` when no credential is configured; callers must treat that as the
/// feature being disabled rather than as a failure.
pub fn new_client(config: &LlmConfig) -> Result<Option<Arc<dyn ChatClient>>, LlmError> {
    if !config.has_credential() {
        info!("No API key configured; model calls are disabled");
        return Ok(None);
    }
    let client = OpenAIChatClient::from_config(config)?;
    info!(
        "Chat client configured: BaseURL={}, native streaming={}",
        client.get_base_url(),
        client.supports_native_streaming()
    );
    Ok(Some(Arc::new(client)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_messages_follow_turn_order() {
        let turns = vec![Turn::system("be brief"), Turn::user("hi"), Turn::assistant("hello")];
        let request = ChatRequest::from_turns("gpt-4", 0.5, &turns);

        let roles: Vec<&str> = request.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(request.messages[1].content, MessageContent::Text("hi".into()));
    }

    #[test]
    fn image_parts_serialize_in_openai_shape() {
        let message = RequestMessage {
            role: "user".into(),
            content: MessageContent::Parts(
                vec![
                    ContentPart::Text { text: "what is this".into() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: "data:image/jpeg;base64,AAAA".into() },
                    }
                ]
            ),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": "what is this" },
                    { "type": "image_url", "image_url": { "url": "data:image/jpeg;base64,AAAA" } }
                ]
            })
        );
    }

    #[test]
    fn no_credential_means_no_client() {
        let client = new_client(&LlmConfig::default()).unwrap();
        assert!(client.is_none());
    }
}
